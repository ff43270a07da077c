// Diesel table definitions for the Postgres backend.

diesel::table! {
    backfill_log (year, month) {
        year -> Integer,
        month -> Integer,
        status -> Text,
        retry_count -> Integer,
        error_message -> Nullable<Text>,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        last_retry_at -> Nullable<Timestamptz>,
        books_generated -> Nullable<Integer>,
        isbns_resolved -> Nullable<Integer>,
        provider_calls -> Nullable<Text>,
        resolution_rate -> Nullable<Double>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    books (isbn) {
        isbn -> Text,
        title -> Text,
        authors -> Text,
        publisher -> Nullable<Text>,
        published_date -> Nullable<Text>,
        description -> Nullable<Text>,
        cover_url -> Nullable<Text>,
        external_ids -> Text,
        resolved_by -> Text,
        discovered_year -> Nullable<Integer>,
        discovered_month -> Nullable<Integer>,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(backfill_log, books);
