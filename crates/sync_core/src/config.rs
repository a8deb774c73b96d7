use crate::error::SyncError;

pub const PROJECT_ID_VAR: &str = "PROJECT_ID";
pub const QUERY_VAR: &str = "BIGQUERY_QUERY";
pub const COLLECTION_VAR: &str = "FIRESTORE_COLLECTION";
pub const ID_FIELD_VAR: &str = "FIRESTORE_ID_FIELD";
pub const LOCATION_VAR: &str = "BIGQUERY_LOCATION";
pub const DATABASE_VAR: &str = "FIRESTORE_DATABASE";

pub const DEFAULT_DATABASE: &str = "(default)";

/// Everything one sync run needs, read once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub project_id: String,
    pub query: String,
    pub collection: String,
    pub id_field: String,
    pub location: Option<String>,
    pub database: String,
}

impl SyncConfig {
    /// Reads the configuration through `lookup`; empty values count as missing.
    ///
    /// Every absent required name is reported in one error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let project_id = read(PROJECT_ID_VAR);
        let query = read(QUERY_VAR);
        let collection = read(COLLECTION_VAR);
        let id_field = read(ID_FIELD_VAR);

        match (project_id, query, collection, id_field) {
            (Some(project_id), Some(query), Some(collection), Some(id_field)) => Ok(Self {
                project_id,
                query,
                collection,
                id_field,
                location: read(LOCATION_VAR),
                database: read(DATABASE_VAR).unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            }),
            (project_id, query, collection, id_field) => {
                let missing = [
                    (PROJECT_ID_VAR, project_id.is_none()),
                    (QUERY_VAR, query.is_none()),
                    (COLLECTION_VAR, collection.is_none()),
                    (ID_FIELD_VAR, id_field.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(SyncError::MissingConfig(missing))
            }
        }
    }

    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name: &str| values.get(name).cloned()
    }

    #[test]
    fn loads_required_values_and_defaults() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("PROJECT_ID", "analytics-prod"),
            ("BIGQUERY_QUERY", "SELECT * FROM ds.users"),
            ("FIRESTORE_COLLECTION", "users"),
            ("FIRESTORE_ID_FIELD", "uid"),
        ]))
        .expect("config should load");

        assert_eq!(config.project_id, "analytics-prod");
        assert_eq!(config.collection, "users");
        assert_eq!(config.id_field, "uid");
        assert_eq!(config.location, None);
        assert_eq!(config.database, "(default)");
    }

    #[test]
    fn honors_optional_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("PROJECT_ID", "p"),
            ("BIGQUERY_QUERY", "SELECT 1"),
            ("FIRESTORE_COLLECTION", "c"),
            ("FIRESTORE_ID_FIELD", "id"),
            ("BIGQUERY_LOCATION", "EU"),
            ("FIRESTORE_DATABASE", "mirror"),
        ]))
        .expect("config should load");

        assert_eq!(config.location.as_deref(), Some("EU"));
        assert_eq!(config.database, "mirror");
    }

    #[test]
    fn reports_all_missing_names() {
        let error = SyncConfig::from_lookup(lookup_from(&[
            ("BIGQUERY_QUERY", "SELECT 1"),
            ("FIRESTORE_ID_FIELD", ""),
        ]))
        .expect_err("config should fail");

        match error {
            SyncError::MissingConfig(names) => assert_eq!(
                names,
                vec!["PROJECT_ID", "FIRESTORE_COLLECTION", "FIRESTORE_ID_FIELD"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }
}
