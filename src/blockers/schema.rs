diesel::table! {
    blockers (id) {
        id -> Text,
        task_id -> Text,
        project_id -> Text,
        reporter_id -> Text,
        assignee_id -> Nullable<Text>,
        reason -> Nullable<Text>,
        notes -> Nullable<Text>,
        status -> Text,
        resolved_at -> Nullable<BigInt>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
