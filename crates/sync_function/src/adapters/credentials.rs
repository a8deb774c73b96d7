use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{read_json, GcpError};

pub const ACCESS_TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the server-reported expiry.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    value: String,
    refresh_after: DateTime<Utc>,
}

impl CachedToken {
    fn from_response(response: MetadataTokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = (response.expires_in - REFRESH_MARGIN_SECS).max(0);
        Self {
            value: response.access_token,
            refresh_after: now + Duration::seconds(lifetime),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_after
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// Where OAuth bearer tokens come from.
pub enum TokenSource {
    Static(String),
    MetadataServer {
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

impl TokenSource {
    pub fn metadata_server(url: impl Into<String>) -> Self {
        Self::MetadataServer {
            url: url.into(),
            cache: Mutex::new(None),
        }
    }

    /// A non-empty `GOOGLE_OAUTH_ACCESS_TOKEN` wins over the metadata server.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(ACCESS_TOKEN_VAR).filter(|token| !token.trim().is_empty()) {
            Some(token) => Self::Static(token.trim().to_string()),
            None => Self::metadata_server(METADATA_TOKEN_URL),
        }
    }

    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, GcpError> {
        let (url, cache) = match self {
            Self::Static(token) => return Ok(token.clone()),
            Self::MetadataServer { url, cache } => (url, cache),
        };

        let now = Utc::now();
        let cached = lock_cache(cache)?
            .clone()
            .filter(|token| token.is_fresh(now));
        if let Some(token) = cached {
            return Ok(token.value);
        }

        let response = http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|error| {
                GcpError::Credentials(format!("metadata server unreachable: {error}"))
            })?;
        let token: MetadataTokenResponse = read_json("metadata server", response)
            .await
            .map_err(|error| GcpError::Credentials(error.to_string()))?;

        let cached = CachedToken::from_response(token, now);
        let value = cached.value.clone();
        *lock_cache(cache)? = Some(cached);
        Ok(value)
    }
}

fn lock_cache(
    cache: &Mutex<Option<CachedToken>>,
) -> Result<std::sync::MutexGuard<'_, Option<CachedToken>>, GcpError> {
    cache
        .lock()
        .map_err(|_| GcpError::Credentials("token cache lock poisoned".to_string()))
}
