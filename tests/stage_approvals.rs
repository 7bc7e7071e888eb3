use tempfile::{tempdir, TempDir};

use projecthub::approvals::{ApprovalStatus, ApprovalStore};
use projecthub::db::Database;
use projecthub::notifications::NotificationStore;
use projecthub::projects::{NewProjectInput, ProjectStatus, ProjectStore, MEMBER_ROLE};
use projecthub::services::{StageApprovalService, StageTransition};
use projecthub::stages::Stage;

struct Fixture {
    _dir: TempDir,
    projects: ProjectStore,
    approvals: ApprovalStore,
    notifications: NotificationStore,
    service: StageApprovalService,
}

async fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("hub.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    let projects = ProjectStore::new(db.clone());
    let approvals = ApprovalStore::new(db.clone());
    let notifications = NotificationStore::new(db);
    let service =
        StageApprovalService::new(projects.clone(), approvals.clone(), notifications.clone());
    Fixture {
        _dir: dir,
        projects,
        approvals,
        notifications,
        service,
    }
}

async fn project_with_members(fx: &Fixture, members: &[&str]) -> String {
    let project = fx
        .projects
        .create(
            "owner",
            &NewProjectInput {
                name: "Harbour extension".to_string(),
                status: Some(ProjectStatus::InProgress),
                ..NewProjectInput::default()
            },
        )
        .await
        .unwrap();
    for member in members {
        fx.projects
            .add_member(&project.id, member, MEMBER_ROLE)
            .await
            .unwrap();
    }
    project.id
}

fn decide(project_id: &str, stage: Stage, status: ApprovalStatus, actor: &str) -> StageTransition {
    StageTransition {
        project_id: project_id.to_string(),
        stage,
        status,
        comment: None,
        actor_id: actor.to_string(),
    }
}

#[tokio::test]
async fn repeated_writes_keep_one_row_with_latest_status() {
    let fx = fixture().await;
    let project_id = project_with_members(&fx, &["alice"]).await;

    fx.service
        .request(&project_id, Stage::Planning, None, "alice")
        .await
        .unwrap();
    fx.service
        .transition(decide(&project_id, Stage::Planning, ApprovalStatus::Rejected, "owner"))
        .await
        .unwrap();
    let outcome = fx
        .service
        .transition(decide(&project_id, Stage::Planning, ApprovalStatus::Approved, "owner"))
        .await
        .unwrap();

    assert_eq!(
        fx.approvals
            .count_for_stage(&project_id, Stage::Planning)
            .await
            .unwrap(),
        1
    );
    let row = fx
        .approvals
        .find(&project_id, Stage::Planning)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ApprovalStatus::Approved);
    assert_eq!(row.requested_by.as_deref(), Some("alice"));
    assert_eq!(row.approved_by.as_deref(), Some("owner"));
    assert!(row.approved_at.is_some());
    assert_eq!(outcome.approval.id, row.id);
}

#[tokio::test]
async fn returning_to_pending_clears_decision_fields() {
    let fx = fixture().await;
    let project_id = project_with_members(&fx, &[]).await;

    fx.service
        .transition(decide(&project_id, Stage::Execution, ApprovalStatus::Approved, "owner"))
        .await
        .unwrap();
    let outcome = fx
        .service
        .transition(decide(&project_id, Stage::Execution, ApprovalStatus::Pending, "owner"))
        .await
        .unwrap();

    assert_eq!(outcome.approval.status, ApprovalStatus::Pending);
    assert!(outcome.approval.approved_by.is_none());
    assert!(outcome.approval.approved_at.is_none());
}

#[tokio::test]
async fn approving_all_five_stages_completes_the_project() {
    let fx = fixture().await;
    let project_id = project_with_members(&fx, &[]).await;

    for stage in &Stage::ALL[..4] {
        let outcome = fx
            .service
            .transition(decide(&project_id, *stage, ApprovalStatus::Approved, "owner"))
            .await
            .unwrap();
        assert!(!outcome.project_completed);
    }
    let project = fx.projects.get(&project_id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::InProgress);
    assert_eq!(project.progress, 0);

    let outcome = fx
        .service
        .transition(decide(&project_id, Stage::Closure, ApprovalStatus::Approved, "owner"))
        .await
        .unwrap();
    assert!(outcome.project_completed);

    let project = fx.projects.get(&project_id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert_eq!(project.progress, 100);

    let listing = fx.service.list_for_project(&project_id).await.unwrap();
    assert!(listing.completed);
    assert_eq!(listing.stages.len(), 5);
}

#[tokio::test]
async fn rejection_notifies_every_member_except_the_actor() {
    let fx = fixture().await;
    let project_id = project_with_members(&fx, &["alice", "bob"]).await;

    let outcome = fx
        .service
        .transition(StageTransition {
            comment: Some("scope unclear".to_string()),
            ..decide(&project_id, Stage::Initiation, ApprovalStatus::Rejected, "alice")
        })
        .await
        .unwrap();
    assert_eq!(outcome.notified, 2);

    for user in ["owner", "bob"] {
        let inbox = fx.notifications.list_for_user(user, false, 50).await.unwrap();
        assert_eq!(inbox.len(), 1, "{user} should get one notification");
        assert_eq!(inbox[0].kind, "stage_rejected");
        assert!(inbox[0].message.contains("Reason: scope unclear"));
    }
    assert!(fx
        .notifications
        .list_for_user("alice", false, 50)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn request_then_approval_notifies_owner_then_requester() {
    let fx = fixture().await;
    let project_id = project_with_members(&fx, &["bob"]).await;

    fx.service
        .request(&project_id, Stage::Monitoring, None, "bob")
        .await
        .unwrap();
    let owner_inbox = fx.notifications.list_for_user("owner", false, 50).await.unwrap();
    assert_eq!(owner_inbox.len(), 1);
    assert_eq!(owner_inbox[0].kind, "stage_approval_requested");

    fx.service
        .transition(decide(&project_id, Stage::Monitoring, ApprovalStatus::Approved, "owner"))
        .await
        .unwrap();
    let bob_inbox = fx.notifications.list_for_user("bob", false, 50).await.unwrap();
    assert_eq!(bob_inbox.len(), 1);
    assert_eq!(bob_inbox[0].kind, "stage_approved");
    assert_eq!(
        bob_inbox[0].link.as_deref(),
        Some(format!("/projects/{project_id}").as_str())
    );
}

#[tokio::test]
async fn transition_on_missing_project_is_not_found() {
    let fx = fixture().await;
    let err = fx
        .service
        .transition(decide("missing", Stage::Planning, ApprovalStatus::Approved, "owner"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        projecthub::error::ProjectHubError::NotFound(_)
    ));
}
