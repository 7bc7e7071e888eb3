use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequest, FromRequestParts, Json, Path, Query, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::approvals::{ApprovalStatus, ApprovalStore};
use crate::blocker_fsm::BlockerStatus;
use crate::blockers::BlockerStore;
use crate::config::Config;
use crate::db::Database;
use crate::error::{ProjectHubError, Result};
use crate::notifications::{Notification, NotificationStore};
use crate::profiles::{ProfileFields, ProfileStore};
use crate::projects::{
    NewProjectInput, ProjectChanges, ProjectStatus, ProjectStore, MEMBER_ROLE, OWNER_ROLE,
};
use crate::scheduler::Scheduler;
use crate::services::{
    BlockerPatch, BlockerService, StageApprovalService, StageDeadlineJob, StageTransition,
    TaskService,
};
use crate::stages::Stage;
use crate::tasks::{NewTaskInput, TaskChanges, TaskPriority, TaskStatus, TaskStore};

const ACTOR_HEADER: &str = "x-user-id";
const DEFAULT_NOTIFICATION_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub profiles: ProfileStore,
    pub projects: ProjectStore,
    pub tasks: TaskService,
    pub task_store: TaskStore,
    pub approvals: StageApprovalService,
    pub blockers: BlockerService,
    pub notifications: NotificationStore,
    pub token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Database, token: Option<&str>) -> Self {
        let profiles = ProfileStore::new(db.clone());
        let projects = ProjectStore::new(db.clone());
        let task_store = TaskStore::new(db.clone());
        let approval_store = ApprovalStore::new(db.clone());
        let blocker_store = BlockerStore::new(db.clone());
        let notifications = NotificationStore::new(db);

        Self {
            tasks: TaskService::new(task_store.clone(), projects.clone(), notifications.clone()),
            approvals: StageApprovalService::new(
                projects.clone(),
                approval_store,
                notifications.clone(),
            ),
            blockers: BlockerService::new(
                blocker_store,
                task_store.clone(),
                projects.clone(),
                notifications.clone(),
            ),
            profiles,
            projects,
            task_store,
            notifications,
            token: token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(Arc::from),
        }
    }
}

#[derive(Serialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct NotificationList {
    notifications: Vec<Notification>,
    unread_count: i64,
}

#[derive(Serialize)]
struct Affected {
    updated: usize,
}

#[derive(Serialize)]
struct Deleted {
    id: String,
    deleted: bool,
}

/// Distinguishes an absent field from an explicit `null`.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
    full_name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectBody {
    name: String,
    description: Option<String>,
    status: Option<String>,
    stage_deadlines: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateProjectBody {
    name: Option<String>,
    description: Option<String>,
    status: Option<String>,
    progress: Option<i32>,
    stage_deadlines: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMemberBody {
    user_id: String,
    role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskQuery {
    project_id: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskBody {
    project_id: String,
    title: String,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    stage: Option<String>,
    due_date: Option<String>,
    assignee: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskBody {
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    stage: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    assignee: Option<Option<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectQuery {
    project_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestApprovalBody {
    project_id: String,
    stage_id: String,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionApprovalBody {
    project_id: String,
    status: String,
    comment: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockerQuery {
    project_id: Option<String>,
    task_id: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBlockerBody {
    task_id: String,
    reason: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateBlockerBody {
    #[serde(default, deserialize_with = "nullable")]
    assignee_id: Option<Option<String>>,
    status: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationQuery {
    unread_only: Option<bool>,
    limit: Option<usize>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles/me", get(get_my_profile))
        .route("/profiles/{id}", get(get_profile).put(put_profile))
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route(
            "/projects/{id}/members",
            get(list_members).post(add_member),
        )
        .route(
            "/projects/{id}/members/{user_id}",
            delete(remove_member),
        )
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route(
            "/project-stage-approvals",
            get(list_stage_approvals).post(request_stage_approval),
        )
        .route(
            "/project-stage-approvals/{stage_id}",
            patch(transition_stage_approval),
        )
        .route("/blockers", get(list_blockers).post(create_blocker))
        .route("/blockers/{id}", patch(update_blocker))
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/{id}/read", post(mark_notification_read))
        .with_state(state)
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(DataResponse { data })).into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

/// `Json` extractor whose rejection uses the `{message}` envelope.
struct JsonBody<T>(T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(error_response(
                StatusCode::BAD_REQUEST,
                rejection.body_text(),
            )),
        }
    }
}

/// `Query` extractor whose rejection uses the `{message}` envelope.
struct QueryParams<T>(T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(error_response(
                StatusCode::BAD_REQUEST,
                rejection.body_text(),
            )),
        }
    }
}

fn status_for(err: &ProjectHubError) -> StatusCode {
    match err {
        ProjectHubError::Validation(_) => StatusCode::BAD_REQUEST,
        ProjectHubError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ProjectHubError::Forbidden(_) => StatusCode::FORBIDDEN,
        ProjectHubError::NotFound(_) => StatusCode::NOT_FOUND,
        ProjectHubError::Conflict(_) => StatusCode::CONFLICT,
        ProjectHubError::Config(_) | ProjectHubError::Database(_) | ProjectHubError::Runtime(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Client errors echo their message; server errors are logged and replaced
/// by `context`.
fn failure(err: ProjectHubError, context: &str) -> Response {
    if err.is_client_error() {
        error_response(status_for(&err), err.to_string())
    } else {
        tracing::error!("{}: {}", context, err);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
    }
}

fn authorize(headers: &HeaderMap, token: Option<&str>) -> std::result::Result<(), Response> {
    let Some(expected_token) = token else {
        return Ok(());
    };

    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("").trim();
    let api_key = api_key.trim();

    if bearer == expected_token || api_key == expected_token {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

/// Checks the shared token and returns the acting user id.
fn authenticate(headers: &HeaderMap, state: &AppState) -> std::result::Result<String, Response> {
    authorize(headers, state.token.as_deref())?;
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|actor| !actor.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing user identity"))
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = ProjectHubError>,
{
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse)
        .transpose()
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProjectHubError::Validation(format!("{name} is required")))
}

macro_rules! actor_or_return {
    ($headers:expr, $state:expr) => {
        match authenticate(&$headers, &$state) {
            Ok(actor) => actor,
            Err(response) => return response,
        }
    };
}

async fn health() -> Json<DataResponse<HealthResponse>> {
    Json(DataResponse {
        data: HealthResponse {
            status: "ok",
            version: env!("PROJECTHUB_GIT_SHA"),
        },
    })
}

async fn get_my_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = actor_or_return!(headers, state);
    match state.profiles.get(&actor).await {
        Ok(profile) => respond(StatusCode::OK, profile),
        Err(err) => failure(err, "Failed to load profile"),
    }
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    match state.profiles.get(&id).await {
        Ok(profile) => respond(StatusCode::OK, profile),
        Err(err) => failure(err, "Failed to load profile"),
    }
}

async fn put_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ProfileBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    if actor != id.trim() {
        return error_response(StatusCode::FORBIDDEN, "Cannot edit another user's profile");
    }
    let fields = ProfileFields {
        full_name: body.full_name,
        email: body.email,
        role: body.role,
        avatar_url: body.avatar_url,
    };
    match state.profiles.upsert(&id, &fields).await {
        Ok(profile) => respond(StatusCode::OK, profile),
        Err(err) => failure(err, "Failed to save profile"),
    }
}

async fn list_projects(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = actor_or_return!(headers, state);
    match state.projects.list_for_user(&actor).await {
        Ok(projects) => respond(StatusCode::OK, projects),
        Err(err) => failure(err, "Failed to list projects"),
    }
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<CreateProjectBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let input = NewProjectInput {
            name: body.name,
            description: body.description,
            status: parse_opt::<ProjectStatus>(body.status.as_deref())?,
            stage_deadlines: body.stage_deadlines,
        };
        state.projects.create(&actor, &input).await
    }
    .await;
    match result {
        Ok(project) => {
            tracing::info!(project_id = %project.id, actor_id = %actor, "Project created");
            respond(StatusCode::CREATED, project)
        }
        Err(err) => failure(err, "Failed to create project"),
    }
}

async fn get_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    match state.projects.get(&id).await {
        Ok(project) => respond(StatusCode::OK, project),
        Err(err) => failure(err, "Failed to load project"),
    }
}

async fn update_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateProjectBody>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    let result = async {
        let changes = ProjectChanges {
            name: body.name,
            description: body.description,
            status: parse_opt::<ProjectStatus>(body.status.as_deref())?,
            progress: body.progress,
            stage_deadlines: body.stage_deadlines,
        };
        state.projects.update(&id, &changes).await
    }
    .await;
    match result {
        Ok(project) => respond(StatusCode::OK, project),
        Err(err) => failure(err, "Failed to update project"),
    }
}

async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let project = state.projects.get(&id).await?;
        if project.owner_id != actor {
            return Err(ProjectHubError::Forbidden(
                "only the project owner can delete it".to_string(),
            ));
        }
        state.projects.delete(&id).await
    }
    .await;
    match result {
        Ok(deleted) => {
            tracing::info!(project_id = %id, actor_id = %actor, "Project deleted");
            respond(StatusCode::OK, Deleted { id, deleted })
        }
        Err(err) => failure(err, "Failed to delete project"),
    }
}

async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    let result = async {
        state.projects.get(&id).await?;
        state.projects.list_members(&id).await
    }
    .await;
    match result {
        Ok(members) => respond(StatusCode::OK, members),
        Err(err) => failure(err, "Failed to list members"),
    }
}

async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AddMemberBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let project = state.projects.get(&id).await?;
        if project.owner_id != actor {
            return Err(ProjectHubError::Forbidden(
                "only the project owner can add members".to_string(),
            ));
        }
        if body.user_id.trim() == project.owner_id {
            return Err(ProjectHubError::Validation(
                "the project owner is already a member".to_string(),
            ));
        }
        let role = body.role.as_deref().unwrap_or(MEMBER_ROLE);
        if role.trim() == OWNER_ROLE {
            return Err(ProjectHubError::Validation(
                "a project has exactly one owner".to_string(),
            ));
        }
        state.projects.add_member(&id, &body.user_id, role).await
    }
    .await;
    match result {
        Ok(member) => respond(StatusCode::CREATED, member),
        Err(err) => failure(err, "Failed to add member"),
    }
}

async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(String, String)>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let project = state.projects.get(&id).await?;
        if user_id == project.owner_id {
            return Err(ProjectHubError::Validation(
                "the project owner cannot be removed".to_string(),
            ));
        }
        if actor != project.owner_id && actor != user_id {
            return Err(ProjectHubError::Forbidden(
                "only the project owner can remove other members".to_string(),
            ));
        }
        if !state.projects.remove_member(&id, &user_id).await? {
            return Err(ProjectHubError::NotFound(format!("member {user_id}")));
        }
        Ok::<(), ProjectHubError>(())
    }
    .await;
    match result {
        Ok(()) => respond(
            StatusCode::OK,
            Deleted {
                id: user_id,
                deleted: true,
            },
        ),
        Err(err) => failure(err, "Failed to remove member"),
    }
}

async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<TaskQuery>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    let result = async {
        let project_id = required(query.project_id.as_deref(), "projectId")?;
        let status = parse_opt::<TaskStatus>(query.status.as_deref())?;
        state.task_store.list_for_project(project_id, status).await
    }
    .await;
    match result {
        Ok(tasks) => respond(StatusCode::OK, tasks),
        Err(err) => failure(err, "Failed to list tasks"),
    }
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<CreateTaskBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let input = NewTaskInput {
            project_id: body.project_id,
            title: body.title,
            description: body.description,
            status: parse_opt::<TaskStatus>(body.status.as_deref())?,
            priority: parse_opt::<TaskPriority>(body.priority.as_deref())?,
            stage: parse_opt::<Stage>(body.stage.as_deref())?,
            due_date: body.due_date,
            assignee: body.assignee,
        };
        state.tasks.create(&input, &actor).await
    }
    .await;
    match result {
        Ok(task) => respond(StatusCode::CREATED, task),
        Err(err) => failure(err, "Failed to create task"),
    }
}

async fn update_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateTaskBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let stage = match body.stage {
            Some(value) => Some(parse_opt::<Stage>(value.as_deref())?),
            None => None,
        };
        let changes = TaskChanges {
            title: body.title,
            description: body.description,
            status: parse_opt::<TaskStatus>(body.status.as_deref())?,
            priority: parse_opt::<TaskPriority>(body.priority.as_deref())?,
            stage,
            due_date: body.due_date,
            assignee: body.assignee,
        };
        state.tasks.update(&id, &changes, &actor).await
    }
    .await;
    match result {
        Ok(task) => respond(StatusCode::OK, task),
        Err(err) => failure(err, "Failed to update task"),
    }
}

async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    match state.task_store.delete(&id).await {
        Ok(true) => respond(StatusCode::OK, Deleted { id, deleted: true }),
        Ok(false) => failure(
            ProjectHubError::NotFound(format!("task {id}")),
            "Failed to delete task",
        ),
        Err(err) => failure(err, "Failed to delete task"),
    }
}

async fn list_stage_approvals(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<ProjectQuery>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    let result = async {
        let project_id = required(query.project_id.as_deref(), "projectId")?;
        state.approvals.list_for_project(project_id).await
    }
    .await;
    match result {
        Ok(approvals) => respond(StatusCode::OK, approvals),
        Err(err) => failure(err, "Failed to list stage approvals"),
    }
}

async fn request_stage_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<RequestApprovalBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let stage: Stage = body.stage_id.parse()?;
        let status = parse_opt::<ApprovalStatus>(body.status.as_deref())?;
        state
            .approvals
            .request(body.project_id.trim(), stage, status, &actor)
            .await
    }
    .await;
    match result {
        Ok(outcome) => respond(StatusCode::OK, outcome),
        Err(err) => failure(err, "Failed to request stage approval"),
    }
}

async fn transition_stage_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(stage_id): Path<String>,
    JsonBody(body): JsonBody<TransitionApprovalBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let stage: Stage = stage_id.parse()?;
        let status: ApprovalStatus = body.status.parse()?;
        state
            .approvals
            .transition(StageTransition {
                project_id: body.project_id.trim().to_string(),
                stage,
                status,
                comment: body.comment,
                actor_id: actor.clone(),
            })
            .await
    }
    .await;
    match result {
        Ok(outcome) => respond(StatusCode::OK, outcome),
        Err(err) => failure(err, "Failed to update stage approval"),
    }
}

async fn list_blockers(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<BlockerQuery>,
) -> Response {
    let _actor = actor_or_return!(headers, state);
    let result = async {
        let status = parse_opt::<BlockerStatus>(query.status.as_deref())?;
        state
            .blockers
            .list(
                query.project_id.as_deref(),
                query.task_id.as_deref(),
                status,
            )
            .await
    }
    .await;
    match result {
        Ok(blockers) => respond(StatusCode::OK, blockers),
        Err(err) => failure(err, "Failed to list blockers"),
    }
}

async fn create_blocker(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<CreateBlockerBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = state
        .blockers
        .report(
            body.task_id.trim(),
            body.reason.as_deref(),
            body.notes.as_deref(),
            &actor,
        )
        .await;
    match result {
        Ok(blocker) => respond(StatusCode::CREATED, blocker),
        Err(err) => failure(err, "Failed to report blocker"),
    }
}

async fn update_blocker(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateBlockerBody>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let patch = BlockerPatch {
            // An explicit null unassigns, same as an empty string.
            assignee_id: body.assignee_id.map(Option::unwrap_or_default),
            status: parse_opt::<BlockerStatus>(body.status.as_deref())?,
            notes: body.notes,
        };
        state.blockers.update(&id, &patch, &actor).await
    }
    .await;
    match result {
        Ok(blocker) => respond(StatusCode::OK, blocker),
        Err(err) => failure(err, "Failed to update blocker"),
    }
}

async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<NotificationQuery>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    let result = async {
        let notifications = state
            .notifications
            .list_for_user(
                &actor,
                query.unread_only.unwrap_or(false),
                query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT),
            )
            .await?;
        let unread_count = state.notifications.unread_count(&actor).await?;
        Ok::<_, ProjectHubError>(NotificationList {
            notifications,
            unread_count,
        })
    }
    .await;
    match result {
        Ok(list) => respond(StatusCode::OK, list),
        Err(err) => failure(err, "Failed to list notifications"),
    }
}

async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = actor_or_return!(headers, state);
    match state.notifications.mark_read(&id, &actor).await {
        Ok(true) => respond(StatusCode::OK, Affected { updated: 1 }),
        Ok(false) => failure(
            ProjectHubError::NotFound(format!("notification {id}")),
            "Failed to update notification",
        ),
        Err(err) => failure(err, "Failed to update notification"),
    }
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let actor = actor_or_return!(headers, state);
    match state.notifications.mark_all_read(&actor).await {
        Ok(updated) => respond(StatusCode::OK, Affected { updated }),
        Err(err) => failure(err, "Failed to update notifications"),
    }
}

pub async fn run(config: Config) -> Result<()> {
    run_with_shutdown(config, std::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let db_path = config.sqlite_path();
    let db = match config.database.max_connections {
        Some(max) => Database::open_with_pool_size(&db_path, max).await?,
        None => Database::open(&db_path).await?,
    };
    tracing::info!(db_path = %db_path, "Database ready");

    let approval_store = ApprovalStore::new(db.clone());
    let state = AppState::new(db, config.api_token());
    if state.token.is_none() {
        tracing::warn!("No API token configured; requests are identified by x-user-id only");
    }

    let mut scheduler = Scheduler::new();
    if config.deadlines.enabled {
        scheduler.register_job(Arc::new(StageDeadlineJob::new(
            state.projects.clone(),
            approval_store,
            state.notifications.clone(),
            Duration::from_secs(config.deadlines.poll_seconds.max(1)),
            config.deadlines.warn_days,
        )));
    }
    scheduler.start();

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ProjectHubError::Runtime(e.to_string()))?;
    tracing::info!(addr = %addr, "projecthubd listening");
    let shutdown = async move {
        shutdown.await;
        scheduler.stop().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ProjectHubError::Runtime(e.to_string()))?;

    Ok(())
}
