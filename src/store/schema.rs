//! C2: schema registry. Migrates an operation document in place to the
//! current schema version the first time it is accessed after an upgrade.

use anyhow::Result;
use serde_json::Value;

use crate::models::operation::CURRENT_SCHEMA_VERSION;

/// Apply every migration between the document's recorded version (absent
/// means 0) and `CURRENT_SCHEMA_VERSION`, in order, inside a single
/// in-memory pass. The caller persists the result.
pub fn migrate(mut doc: Value) -> Result<(Value, bool)> {
    let from = doc
        .get("_schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    if from >= CURRENT_SCHEMA_VERSION {
        return Ok((doc, false));
    }

    let mut version = from;
    if version < 1 {
        doc = migrate_v0_to_v1(doc);
        version = 1;
    }
    if version < 2 {
        doc = migrate_v1_to_v2(doc);
        version = 2;
    }

    if let Value::Object(map) = &mut doc {
        map.insert("_schema_version".into(), Value::from(version));
        map.insert(
            "_migrated_at".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }

    Ok((doc, true))
}

/// v0 documents predate `merge_queued`; default new field to `true` so
/// existing operations keep their prior auto-enqueue behavior.
fn migrate_v0_to_v1(mut doc: Value) -> Value {
    if let Value::Object(map) = &mut doc {
        map.entry("merge_queued").or_insert(Value::Bool(true));
    }
    doc
}

/// v1 carried a legacy `safe` flag whose semantics are not recoverable;
/// it is dropped on migration rather than translated.
fn migrate_v1_to_v2(mut doc: Value) -> Value {
    if let Value::Object(map) = &mut doc {
        map.remove("safe");
    }
    doc
}
