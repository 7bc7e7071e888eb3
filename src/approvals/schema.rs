diesel::table! {
    project_stage_approvals (id) {
        id -> Text,
        project_id -> Text,
        stage_id -> Text,
        status -> Text,
        requested_by -> Nullable<Text>,
        approved_by -> Nullable<Text>,
        approved_at -> Nullable<BigInt>,
        comment -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
