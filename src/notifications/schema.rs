diesel::table! {
    notifications (id) {
        id -> Text,
        user_id -> Text,
        title -> Text,
        message -> Text,
        kind -> Text,
        link -> Nullable<Text>,
        created_at -> BigInt,
        is_read -> Bool,
    }
}
