diesel::table! {
    profiles (id) {
        id -> Text,
        full_name -> Text,
        email -> Nullable<Text>,
        role -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
