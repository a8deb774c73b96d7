use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};
use sync_core::error::SyncError;
use sync_core::record::{FieldValue, Record};
use sync_core::store::{DocumentStore, WriteBatch};
use tracing::debug;

use super::credentials::TokenSource;
use super::{block_on, read_json, GcpError};

const SERVICE: &str = "firestore";
const API_ROOT: &str = "https://firestore.googleapis.com/v1";

pub struct FirestoreStore {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    project_id: String,
    database: String,
}

impl FirestoreStore {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<TokenSource>,
        project_id: String,
        database: String,
    ) -> Self {
        Self {
            http,
            tokens,
            project_id,
            database,
        }
    }

    fn database_path(&self) -> String {
        database_path(&self.project_id, &self.database)
    }

    async fn send_commit(&self, batch: &WriteBatch) -> Result<(), GcpError> {
        let token = self.tokens.access_token(&self.http).await?;
        let database = self.database_path();
        let url = format!("{API_ROOT}/{database}/documents:commit");
        let body = commit_request_body(&database, batch);

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let _: Value = read_json(SERVICE, response).await?;
        Ok(())
    }
}

impl DocumentStore for FirestoreStore {
    fn commit(&self, batch: &WriteBatch) -> Result<(), SyncError> {
        debug!(
            component = "firestore",
            event = "commit_started",
            collection = batch.collection(),
            writes = batch.len(),
            "committing batch"
        );
        block_on(self.send_commit(batch)).map_err(GcpError::into_commit_error)
    }
}

fn database_path(project_id: &str, database: &str) -> String {
    format!("projects/{project_id}/databases/{database}")
}

pub fn document_name(database_path: &str, collection: &str, document_id: &str) -> String {
    format!("{database_path}/documents/{collection}/{document_id}")
}

/// `documents:commit` body with one full-overwrite `update` per staged write.
///
/// No `updateMask` is sent, so fields absent from the payload are removed.
pub fn commit_request_body(database_path: &str, batch: &WriteBatch) -> Value {
    let writes: Vec<Value> = batch
        .writes()
        .iter()
        .map(|write| {
            json!({
                "update": {
                    "name": document_name(database_path, batch.collection(), &write.document_id),
                    "fields": encode_fields(&write.payload),
                }
            })
        })
        .collect();
    json!({ "writes": writes })
}

pub fn encode_fields(record: &Record) -> Map<String, Value> {
    record
        .iter()
        .map(|(name, value)| (name.to_string(), encode_value(value)))
        .collect()
}

pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => json!({ "nullValue": "NULL_VALUE" }),
        FieldValue::Bool(flag) => json!({ "booleanValue": flag }),
        FieldValue::Integer(number) => json!({ "integerValue": number.to_string() }),
        FieldValue::Float(number) => json!({ "doubleValue": encode_double(*number) }),
        FieldValue::String(text) => json!({ "stringValue": text }),
        FieldValue::Bytes(bytes) => json!({ "bytesValue": STANDARD.encode(bytes) }),
        FieldValue::Timestamp(at) => {
            json!({ "timestampValue": at.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        // civil date-times carry no zone and are stored as UTC
        FieldValue::DateTime(at) => {
            json!({ "timestampValue": at.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        FieldValue::Array(values) => json!({
            "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        FieldValue::Map(record) => json!({ "mapValue": { "fields": encode_fields(record) } }),
    }
}

/// JSON numbers cannot carry non-finite doubles; the proto3 mapping uses strings.
fn encode_double(number: f64) -> Value {
    if number.is_nan() {
        Value::from("NaN")
    } else if number.is_infinite() {
        Value::from(if number > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        Value::from(number)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn builds_document_names_under_database() {
        let database = database_path("analytics-prod", "(default)");
        assert_eq!(
            document_name(&database, "users", "a1"),
            "projects/analytics-prod/databases/(default)/documents/users/a1"
        );
    }

    #[test]
    fn encodes_scalar_values() {
        assert_eq!(
            encode_value(&FieldValue::Integer(42)),
            json!({"integerValue": "42"})
        );
        assert_eq!(
            encode_value(&FieldValue::Float(1.5)),
            json!({"doubleValue": 1.5})
        );
        assert_eq!(
            encode_value(&FieldValue::Float(f64::NEG_INFINITY)),
            json!({"doubleValue": "-Infinity"})
        );
        assert_eq!(
            encode_value(&FieldValue::Null),
            json!({"nullValue": "NULL_VALUE"})
        );
        assert_eq!(
            encode_value(&FieldValue::Bytes(vec![1, 2, 3])),
            json!({"bytesValue": "AQID"})
        );
        let at = Utc
            .with_ymd_and_hms(2026, 2, 14, 8, 30, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(
            encode_value(&FieldValue::Timestamp(at)),
            json!({"timestampValue": "2026-02-14T08:30:00Z"})
        );
        assert_eq!(
            encode_value(&FieldValue::DateTime(at.naive_utc())),
            json!({"timestampValue": "2026-02-14T08:30:00Z"})
        );
    }

    #[test]
    fn encodes_nested_values() {
        let record = Record::from_json(json!({
            "tags": ["a", true],
            "owner": {"name": "ada"}
        }))
        .expect("object should convert");

        let fields = encode_fields(&record);
        assert_eq!(
            fields.get("tags"),
            Some(&json!({"arrayValue": {"values": [
                {"stringValue": "a"},
                {"booleanValue": true}
            ]}}))
        );
        assert_eq!(
            fields.get("owner"),
            Some(&json!({"mapValue": {"fields": {"name": {"stringValue": "ada"}}}}))
        );
    }

    #[test]
    fn commit_body_overwrites_each_document() {
        let mut batch = WriteBatch::new("users");
        batch.set(
            "a1",
            Record::from_json(json!({"x": 1})).expect("object should convert"),
        );
        batch.set(
            "b2",
            Record::from_json(json!({"x": 2})).expect("object should convert"),
        );

        let body = commit_request_body("projects/p/databases/(default)", &batch);

        assert_eq!(
            body,
            json!({"writes": [
                {"update": {
                    "name": "projects/p/databases/(default)/documents/users/a1",
                    "fields": {"x": {"integerValue": "1"}}
                }},
                {"update": {
                    "name": "projects/p/databases/(default)/documents/users/b2",
                    "fields": {"x": {"integerValue": "2"}}
                }}
            ]})
        );
        assert!(body["writes"][0].get("updateMask").is_none());
    }
}
