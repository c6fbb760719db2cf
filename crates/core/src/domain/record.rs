use serde_json::{Map, Value};

/// A row returned by the ERP. Shape depends on the collection's field projection.
pub type Record = Map<String, Value>;

pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}
