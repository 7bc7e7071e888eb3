use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::tempdir;

use projecthub::approvals::{ApprovalStatus, ApprovalStore, ApprovalWrite};
use projecthub::db::Database;
use projecthub::notifications::NotificationStore;
use projecthub::projects::{NewProjectInput, ProjectStore};
use projecthub::services::StageDeadlineJob;
use projecthub::stages::Stage;

#[tokio::test]
async fn deadline_reminders_are_sent_once_per_stage() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("hub.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    let projects = ProjectStore::new(db.clone());
    let approvals = ApprovalStore::new(db.clone());
    let notifications = NotificationStore::new(db);

    let deadlines = BTreeMap::from([
        ("initiation".to_string(), "2026-10-10".to_string()),
        ("planning".to_string(), "2026-10-21".to_string()),
        ("execution".to_string(), "2026-12-01".to_string()),
    ]);
    let project = projects
        .create(
            "owner",
            &NewProjectInput {
                name: "Library fit-out".to_string(),
                stage_deadlines: Some(deadlines),
                ..NewProjectInput::default()
            },
        )
        .await
        .unwrap();
    approvals
        .upsert(&ApprovalWrite {
            project_id: &project.id,
            stage: Stage::Initiation,
            status: ApprovalStatus::Approved,
            requested_by: Some("owner"),
            approved_by: Some("owner"),
            approved_at: Some(1),
            comment: None,
        })
        .await
        .unwrap();

    let job = StageDeadlineJob::new(
        projects,
        approvals,
        notifications.clone(),
        Duration::from_secs(60),
        3,
    );
    let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

    assert_eq!(job.run_once(today).await.unwrap(), 1);
    assert_eq!(job.run_once(today).await.unwrap(), 0);

    let inbox = notifications.list_for_user("owner", false, 50).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, "stage_deadline");
    assert_eq!(
        inbox[0].link.as_deref(),
        Some(format!("/projects/{}?stage=planning", project.id).as_str())
    );
}
