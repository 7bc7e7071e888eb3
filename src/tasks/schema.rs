diesel::table! {
    tasks (id) {
        id -> Text,
        project_id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        status -> Text,
        priority -> Text,
        stage -> Nullable<Text>,
        due_date -> Nullable<Text>,
        assignee -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
