use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sync_core::error::SyncError;
use sync_core::record::{FieldValue, Record};
use sync_core::warehouse::Warehouse;
use tracing::{info, warn};

use super::credentials::TokenSource;
use super::{block_on, read_json, GcpError};

const SERVICE: &str = "bigquery";
const API_ROOT: &str = "https://bigquery.googleapis.com/bigquery/v2";
/// Server-side wait per request; the client keeps polling past it.
const POLL_TIMEOUT_MS: u64 = 10_000;
const PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    max_results: u32,
    format_options: FormatOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    job_reference: Option<JobReference>,
    total_rows: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("REPEATED"))
    }
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

pub struct BigQueryWarehouse {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    project_id: String,
    location: Option<String>,
}

impl BigQueryWarehouse {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<TokenSource>,
        project_id: String,
        location: Option<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            project_id,
            location,
        }
    }

    async fn fetch_rows(&self, query: &str) -> Result<Vec<Record>, GcpError> {
        let token = self.tokens.access_token(&self.http).await?;
        let request = QueryRequest {
            query,
            use_legacy_sql: false,
            timeout_ms: POLL_TIMEOUT_MS,
            max_results: PAGE_SIZE,
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
            location: self.location.as_deref(),
        };
        let url = format!("{API_ROOT}/projects/{}/queries", self.project_id);
        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await?;
        let first: QueryResponse = read_json(SERVICE, response).await?;

        let pages = JobPages {
            warehouse: self,
            token: &token,
        };
        let (records, total_rows) = collect_rows(first, &pages).await?;

        info!(
            component = "bigquery",
            event = "query_completed",
            project_id = %self.project_id,
            rows = records.len(),
            total_rows = total_rows.as_deref().unwrap_or("unknown"),
            "query completed with {} rows",
            records.len()
        );
        Ok(records)
    }

    async fn get_query_results(
        &self,
        token: &str,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, GcpError> {
        let url = format!(
            "{API_ROOT}/projects/{}/queries/{}",
            self.project_id, job.job_id
        );
        let mut params = vec![
            ("timeoutMs", POLL_TIMEOUT_MS.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(location) = job.location.as_deref().or(self.location.as_deref()) {
            params.push(("location", location.to_string()));
        }
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token.to_string()));
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        read_json(SERVICE, response).await
    }
}

/// Follow-up `getQueryResults` calls for one job.
trait PageSource {
    async fn next_page(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, GcpError>;
}

struct JobPages<'a> {
    warehouse: &'a BigQueryWarehouse,
    token: &'a str,
}

impl PageSource for JobPages<'_> {
    async fn next_page(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, GcpError> {
        self.warehouse
            .get_query_results(self.token, job, page_token)
            .await
    }
}

/// Polls until the job completes, then follows `pageToken`s until the last
/// page. Rows come back in result order; the schema is only sent once.
///
/// Failed jobs surface as non-2xx responses. `errors` on a successful response
/// are warnings and are only logged.
async fn collect_rows(
    mut page: QueryResponse,
    pages: &impl PageSource,
) -> Result<(Vec<Record>, Option<String>), GcpError> {
    let mut schema: Option<TableSchema> = None;
    let mut records = Vec::new();
    loop {
        if !page.errors.is_empty() {
            warn!(
                component = "bigquery",
                event = "query_warnings",
                details = %describe_errors(&page.errors),
                "query reported warnings"
            );
        }

        let mut page_token = None;
        if page.job_complete {
            if let Some(page_schema) = page.schema.take() {
                schema = Some(page_schema);
            }
            if !page.rows.is_empty() {
                let fields = schema
                    .as_ref()
                    .map(|value| value.fields.as_slice())
                    .ok_or_else(|| GcpError::malformed(SERVICE, "rows without schema"))?;
                for row in std::mem::take(&mut page.rows) {
                    records.push(decode_row(fields, row)?);
                }
            }
            match page.page_token.take() {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        let job = page
            .job_reference
            .clone()
            .ok_or_else(|| GcpError::malformed(SERVICE, "missing jobReference"))?;
        page = pages.next_page(&job, page_token.as_deref()).await?;
    }

    Ok((records, page.total_rows))
}

impl Warehouse for BigQueryWarehouse {
    fn run_query(&self, query: &str) -> Result<Vec<Record>, SyncError> {
        info!(
            component = "bigquery",
            event = "query_started",
            project_id = %self.project_id,
            "running warehouse query"
        );
        block_on(self.fetch_rows(query)).map_err(GcpError::into_query_error)
    }
}

fn describe_errors(errors: &[ErrorProto]) -> String {
    errors
        .iter()
        .map(|error| {
            format!(
                "{}: {}",
                error.reason.as_deref().unwrap_or("error"),
                error.message.as_deref().unwrap_or("no message")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn decode_row(fields: &[TableFieldSchema], row: TableRow) -> Result<Record, GcpError> {
    if row.f.len() != fields.len() {
        return Err(GcpError::malformed(
            SERVICE,
            format!(
                "row has {} cells but schema has {} fields",
                row.f.len(),
                fields.len()
            ),
        ));
    }

    let mut record = Record::new();
    for (field, cell) in fields.iter().zip(row.f) {
        record.insert(field.name.clone(), decode_cell(field, cell.v)?);
    }
    Ok(record)
}

fn decode_cell(field: &TableFieldSchema, value: Value) -> Result<FieldValue, GcpError> {
    if !field.is_repeated() {
        return decode_single(field, value);
    }

    match value {
        Value::Null => Ok(FieldValue::Array(Vec::new())),
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                let inner = match item {
                    Value::Object(mut wrapper) => wrapper.remove("v").unwrap_or(Value::Null),
                    other => other,
                };
                decode_single(field, inner)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::Array),
        other => Err(unexpected(field, &other)),
    }
}

fn decode_single(field: &TableFieldSchema, value: Value) -> Result<FieldValue, GcpError> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    match field.field_type.to_ascii_uppercase().as_str() {
        "RECORD" | "STRUCT" => {
            let row: TableRow = serde_json::from_value(value)
                .map_err(|error| GcpError::malformed(SERVICE, error.to_string()))?;
            decode_row(&field.fields, row).map(FieldValue::Map)
        }
        "INTEGER" | "INT64" => {
            let text = cell_text(field, &value)?;
            text.parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| unexpected(field, &value))
        }
        "FLOAT" | "FLOAT64" => {
            let text = cell_text(field, &value)?;
            text.parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| unexpected(field, &value))
        }
        "BOOLEAN" | "BOOL" => match cell_text(field, &value)?.to_ascii_lowercase().as_str() {
            "true" => Ok(FieldValue::Bool(true)),
            "false" => Ok(FieldValue::Bool(false)),
            _ => Err(unexpected(field, &value)),
        },
        "TIMESTAMP" => {
            let text = cell_text(field, &value)?;
            parse_timestamp(&text)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| unexpected(field, &value))
        }
        "DATETIME" => {
            let text = cell_text(field, &value)?;
            parse_civil_datetime(&text)
                .map(FieldValue::DateTime)
                .ok_or_else(|| unexpected(field, &value))
        }
        "BYTES" => {
            let text = cell_text(field, &value)?;
            STANDARD
                .decode(text.as_bytes())
                .map(FieldValue::Bytes)
                .map_err(|_| unexpected(field, &value))
        }
        _ => Ok(FieldValue::String(cell_text(field, &value)?)),
    }
}

/// Accepts int64 microseconds and the legacy float-seconds encoding.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(micros) = text.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros);
    }
    let seconds = text.parse::<f64>().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

fn parse_civil_datetime(text: &str) -> Option<NaiveDateTime> {
    text.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
}

fn cell_text(field: &TableFieldSchema, value: &Value) -> Result<String, GcpError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(unexpected(field, other)),
    }
}

fn unexpected(field: &TableFieldSchema, value: &Value) -> GcpError {
    GcpError::malformed(
        SERVICE,
        format!(
            "column '{}' of type {} cannot hold {value}",
            field.name, field.field_type
        ),
    )
}
