// Diesel schema shared by the SQLite and Postgres backends.
// Tablas: shadows, resources, locks. Timestamps are Unix milliseconds.
diesel::table! {
    shadows (namespace, name) {
        namespace -> Text,
        name -> Text,
        report -> Text,
        desire -> Text,
        report_meta -> Text,
        desire_meta -> Text,
        desire_version -> Text,
        create_time -> BigInt,
        update_time -> BigInt,
    }
}
diesel::table! {
    resources (kind, namespace, name) {
        kind -> Text,
        namespace -> Text,
        name -> Text,
        version -> Text,
        payload -> Text,
        create_time -> BigInt,
        update_time -> BigInt,
    }
}
diesel::table! {
    locks (name) {
        name -> Text,
        version -> Text,
        expire_time -> BigInt,
    }
}
