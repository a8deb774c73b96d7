use serde::{Deserialize, Serialize};
use serde_json::Value;
use sync_core::config::SyncConfig;
use sync_core::error::SyncError;
use sync_core::event::{decode_trigger_message, TriggerMessage};
use sync_core::store::DocumentStore;
use sync_core::transfer::{transfer_records, TransferSummary};
use sync_core::warehouse::Warehouse;
use tracing::{error, info, warn};

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_ABORTED: &str = "aborted";

/// Builds warehouse and document-store clients for one run.
pub trait Connector {
    type Warehouse: Warehouse;
    type Store: DocumentStore;

    fn warehouse(&self, config: &SyncConfig) -> Self::Warehouse;
    fn document_store(&self, config: &SyncConfig) -> Self::Store;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TransferSummary>,
}

impl SyncResponse {
    fn completed(summary: TransferSummary) -> Self {
        Self {
            status: STATUS_COMPLETED.to_string(),
            error_code: None,
            error_message: None,
            summary: Some(summary),
        }
    }

    fn aborted(error: &SyncError) -> Self {
        Self {
            status: STATUS_ABORTED.to_string(),
            error_code: Some(error.code().to_string()),
            error_message: Some(error.to_string()),
            summary: None,
        }
    }
}

/// Runs one sync for a trigger event. Never fails: every outcome is logged
/// and reported through the returned status.
pub fn handle_sync_event(
    event: &Value,
    lookup: impl Fn(&str) -> Option<String>,
    connector: &impl Connector,
) -> SyncResponse {
    match decode_trigger_message(event) {
        TriggerMessage::Absent => {}
        TriggerMessage::Decoded(message) => info!(
            component = "sync_handler",
            event = "message_received",
            payload = %message,
            "received trigger message"
        ),
        TriggerMessage::Undecodable(reason) => warn!(
            component = "sync_handler",
            event = "message_undecodable",
            reason = %reason,
            "ignoring undecodable trigger message"
        ),
    }

    let config = match SyncConfig::from_lookup(lookup) {
        Ok(value) => value,
        Err(config_error) => return abort("config_missing", config_error),
    };

    let store = connector.document_store(&config);
    info!(
        component = "sync_handler",
        event = "store_ready",
        project_id = %config.project_id,
        database = %config.database,
        "document store client ready"
    );

    let warehouse = connector.warehouse(&config);
    let rows = match warehouse.run_query(&config.query) {
        Ok(value) => value,
        Err(query_error) => return abort("query_failed", query_error),
    };

    let summary = transfer_records(rows, &config.collection, &config.id_field, &store);
    SyncResponse::completed(summary)
}

fn abort(event: &str, cause: SyncError) -> SyncResponse {
    error!(
        component = "sync_handler",
        event,
        error_code = cause.code(),
        error = %cause,
        "sync aborted"
    );
    SyncResponse::aborted(&cause)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;
    use sync_core::record::Record;
    use sync_core::store::WriteBatch;

    use super::*;

    struct StubWarehouse {
        rows: Result<Vec<Record>, String>,
        queries: Mutex<Vec<String>>,
    }

    impl StubWarehouse {
        fn returning(rows: Vec<serde_json::Value>) -> Self {
            Self {
                rows: Ok(rows
                    .into_iter()
                    .map(|row| Record::from_json(row).expect("rows are objects"))
                    .collect()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                rows: Err(message.to_string()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().expect("poisoned mutex").clone()
        }
    }

    impl Warehouse for StubWarehouse {
        fn run_query(&self, query: &str) -> Result<Vec<Record>, SyncError> {
            self.queries
                .lock()
                .expect("poisoned mutex")
                .push(query.to_string());
            self.rows.clone().map_err(SyncError::Query)
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        commits: Mutex<Vec<WriteBatch>>,
    }

    impl RecordingStore {
        fn commits(&self) -> Vec<WriteBatch> {
            self.commits.lock().expect("poisoned mutex").clone()
        }
    }

    impl DocumentStore for RecordingStore {
        fn commit(&self, batch: &WriteBatch) -> Result<(), SyncError> {
            self.commits
                .lock()
                .expect("poisoned mutex")
                .push(batch.clone());
            Ok(())
        }
    }

    struct StubConnector<'a> {
        warehouse: &'a StubWarehouse,
        store: &'a RecordingStore,
        configs: Mutex<Vec<SyncConfig>>,
    }

    impl<'a> StubConnector<'a> {
        fn new(warehouse: &'a StubWarehouse, store: &'a RecordingStore) -> Self {
            Self {
                warehouse,
                store,
                configs: Mutex::new(Vec::new()),
            }
        }

        fn connections(&self) -> usize {
            self.configs.lock().expect("poisoned mutex").len()
        }
    }

    impl<'a> Connector for StubConnector<'a> {
        type Warehouse = &'a StubWarehouse;
        type Store = &'a RecordingStore;

        fn warehouse(&self, config: &SyncConfig) -> Self::Warehouse {
            self.configs
                .lock()
                .expect("poisoned mutex")
                .push(config.clone());
            self.warehouse
        }

        fn document_store(&self, _config: &SyncConfig) -> Self::Store {
            self.store
        }
    }

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PROJECT_ID", "analytics-prod"),
            ("BIGQUERY_QUERY", "SELECT uid, x FROM ds.users"),
            ("FIRESTORE_COLLECTION", "users"),
            ("FIRESTORE_ID_FIELD", "uid"),
        ])
    }

    fn lookup(env: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |name: &str| env.get(name).map(|value| value.to_string())
    }

    #[test]
    fn syncs_rows_into_collection() {
        let warehouse = StubWarehouse::returning(vec![
            json!({"uid": "a-1", "x": 1}),
            json!({"uid": "b 2", "x": 2}),
        ]);
        let store = RecordingStore::default();
        let connector = StubConnector::new(&warehouse, &store);

        let response = handle_sync_event(
            &json!({"data": STANDARD.encode("run now")}),
            lookup(full_env()),
            &connector,
        );

        assert_eq!(response.status, STATUS_COMPLETED);
        assert_eq!(warehouse.queries(), vec!["SELECT uid, x FROM ds.users"]);

        let commits = store.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].collection(), "users");
        let ids: Vec<&str> = commits[0]
            .writes()
            .iter()
            .map(|write| write.document_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "b2"]);

        let summary = response.summary.expect("completed run has a summary");
        assert_eq!(summary.documents_written, 2);
        assert_eq!(summary.batches_committed, 1);
    }

    #[test]
    fn missing_project_id_stops_before_any_client_call() {
        let warehouse = StubWarehouse::returning(vec![json!({"uid": "a", "x": 1})]);
        let store = RecordingStore::default();
        let connector = StubConnector::new(&warehouse, &store);
        let mut env = full_env();
        env.remove("PROJECT_ID");

        let response = handle_sync_event(&json!({}), lookup(env), &connector);

        assert_eq!(response.status, STATUS_ABORTED);
        assert_eq!(response.error_code.as_deref(), Some("missing_config"));
        assert!(response
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("PROJECT_ID")));
        assert_eq!(connector.connections(), 0);
        assert!(warehouse.queries().is_empty());
        assert!(store.commits().is_empty());
    }

    #[test]
    fn query_failure_attempts_no_writes() {
        let warehouse = StubWarehouse::failing("Access Denied");
        let store = RecordingStore::default();
        let connector = StubConnector::new(&warehouse, &store);

        let response = handle_sync_event(&json!({}), lookup(full_env()), &connector);

        assert_eq!(response.status, STATUS_ABORTED);
        assert_eq!(response.error_code.as_deref(), Some("query_error"));
        assert_eq!(warehouse.queries().len(), 1);
        assert!(store.commits().is_empty());
    }

    #[test]
    fn undecodable_message_does_not_block_the_run() {
        let warehouse = StubWarehouse::returning(vec![json!({"uid": "z9", "x": 1})]);
        let store = RecordingStore::default();
        let connector = StubConnector::new(&warehouse, &store);

        let response = handle_sync_event(&json!({"data": "***"}), lookup(full_env()), &connector);

        assert_eq!(response.status, STATUS_COMPLETED);
        assert_eq!(store.commits().len(), 1);
    }

    #[test]
    fn empty_result_completes_without_commits() {
        let warehouse = StubWarehouse::returning(Vec::new());
        let store = RecordingStore::default();
        let connector = StubConnector::new(&warehouse, &store);

        let response = handle_sync_event(&json!({}), lookup(full_env()), &connector);

        assert_eq!(response.status, STATUS_COMPLETED);
        assert!(store.commits().is_empty());
        assert_eq!(response.summary, Some(TransferSummary::default()));
    }

    #[test]
    fn response_serializes_without_empty_fields() {
        let response = SyncResponse::aborted(&SyncError::Query("boom".to_string()));
        let body = serde_json::to_value(&response).expect("response should serialize");
        assert_eq!(
            body,
            json!({
                "status": "aborted",
                "error_code": "query_error",
                "error_message": "warehouse query failed: boom"
            })
        );
    }
}
