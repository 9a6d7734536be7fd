//! HTTP client for the per-user app-data record.
//!
//! The record lives in a PostgREST-style table keyed by `id = user id` with
//! a single `data` document column and an `updated_at` stamp. Upsert is
//! insert-or-replace; the row processed last by the service wins.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use fitfolio_core::appdata::AppData;
use fitfolio_core::sync::RemoteRecordStore;

use crate::error::{ConnectError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_LOG_BODY_CHARS: usize = 512;
const RECORD_TABLE_PATH: &str = "/rest/v1/user_app_data";

#[derive(Debug, Deserialize)]
struct UserRecordRow {
    data: AppData,
}

#[derive(Debug, Serialize)]
struct UpsertRecordBody<'a> {
    id: &'a str,
    data: &'a AppData,
    updated_at: String,
}

/// Client for the hosted user-record table.
///
/// Constructed once by the application entry point and passed by reference
/// to the sync engine; holds no state beyond the HTTP client itself.
#[derive(Debug, Clone)]
pub struct UserRecordClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UserRecordClient {
    /// Create a new record client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the cloud API (e.g., "https://api.fitfolio.app")
    /// * `api_key` - The service API key used for both the apikey and bearer headers
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key_value = HeaderValue::from_str(&self.api_key)
            .map_err(|_| ConnectError::invalid_request("Invalid API key format"))?;
        headers.insert("apikey", key_value);

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| ConnectError::invalid_request("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Connect] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Connect] API response error ({}): {}", status, preview);
    }

    fn record_url(&self, user_id: Option<&str>) -> String {
        match user_id {
            Some(user_id) => format!(
                "{}{}?id=eq.{}&select=data",
                self.base_url,
                RECORD_TABLE_PATH,
                urlencoding::encode(user_id)
            ),
            None => format!("{}{}", self.base_url, RECORD_TABLE_PATH),
        }
    }

    /// Read the record for `user_id`. `Ok(None)` means the row does not
    /// exist; transport and API failures are errors.
    pub async fn fetch_record(&self, user_id: &str) -> Result<Option<AppData>> {
        let response = self
            .client
            .get(self.record_url(Some(user_id)))
            .headers(self.headers()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(ConnectError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        let rows: Vec<UserRecordRow> = serde_json::from_str(&body)?;
        Ok(rows.into_iter().next().map(|row| row.data))
    }

    /// Insert-or-replace the whole document for `user_id`, stamping
    /// `updated_at`. Only an acknowledged (2xx) response is a success.
    pub async fn upsert_record(&self, user_id: &str, data: &AppData) -> Result<()> {
        let body = UpsertRecordBody {
            id: user_id,
            data,
            updated_at: Utc::now().to_rfc3339(),
        };

        let response = self
            .client
            .post(self.record_url(None))
            .headers(self.headers()?)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("[Connect] Upserted record for user {}", user_id);
            return Ok(());
        }

        let body = response.text().await?;
        Self::log_response(status, &body);
        Err(ConnectError::api(
            status.as_u16(),
            format!("Request failed: {}", body),
        ))
    }
}

#[async_trait]
impl RemoteRecordStore for UserRecordClient {
    async fn fetch(&self, user_id: &str) -> Option<AppData> {
        match self.fetch_record(user_id).await {
            Ok(found) => found,
            Err(err) => {
                warn!("[Connect] Fetch for user {} failed: {}", user_id, err);
                None
            }
        }
    }

    async fn upsert(&self, user_id: &str, data: &AppData) -> std::result::Result<(), String> {
        self.upsert_record(user_id, data)
            .await
            .map_err(|err| err.to_string())
    }
}
