//! Esquema Diesel. Reemplazable con `diesel print-schema`.

diesel::table! {
    evidence_objects (object_key) {
        object_key -> Text,
        content_type -> Text,
        body -> Bytea,
        updated_at -> Timestamptz,
    }
}
