//! Claim store backed by a shared spreadsheet.
//!
//! Reads go straight to the Sheets v4 values API with an API key. Writes go
//! through a deployed script endpoint that appends one row per claim.

use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use claim_ledger::{AppendReceipt, ClaimSnapshot, ClaimStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SheetSettings;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const CLAIM_RANGE: &str = "Sheet1!A:E";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    action: &'static str,
    number: u32,
    timestamp: String,
    claimant: &'a str,
}

#[derive(Debug, Clone)]
pub struct SheetsClaimStore {
    client: reqwest::Client,
    settings: SheetSettings,
    range: RangeInclusive<u32>,
}

impl SheetsClaimStore {
    pub fn new(settings: SheetSettings, range: RangeInclusive<u32>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("lucky-carousel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| StoreError::Unavailable(format!("http client init failed: {err}")))?;
        Ok(Self {
            client,
            settings,
            range,
        })
    }

    fn values_url(&self) -> String {
        format!(
            "{SHEETS_API}/{}/values/{CLAIM_RANGE}",
            self.settings.spreadsheet_id
        )
    }

    async fn fetch(&self) -> Result<ClaimSnapshot, StoreError> {
        let response = self
            .client
            .get(self.values_url())
            .query(&[("key", self.settings.api_key.as_str())])
            .send()
            .await
            .map_err(unavailable)?;
        let status = response.status();
        let body = response.text().await.map_err(unavailable)?;
        if !status.is_success() {
            if status == reqwest::StatusCode::FORBIDDEN {
                warn!("claim sheet refused access; check sharing settings and API key restrictions");
            }
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        parse_value_range(&body, self.range.clone())
    }

    async fn append(&self, number: u32, claimant: &str) -> Result<AppendReceipt, StoreError> {
        let request = AppendRequest {
            action: "append",
            number,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            claimant,
        };
        let response = self
            .client
            .post(&self.settings.script_url)
            .json(&request)
            .send()
            .await
            .map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        debug!(number, "claim appended to sheet");
        Ok(AppendReceipt { success: true })
    }
}

impl ClaimStore for SheetsClaimStore {
    fn fetch_claimed(&self) -> impl Future<Output = Result<ClaimSnapshot, StoreError>> + Send {
        self.fetch()
    }

    fn append_claim(
        &self,
        number: u32,
        claimant: &str,
    ) -> impl Future<Output = Result<AppendReceipt, StoreError>> + Send {
        self.append(number, claimant)
    }
}

fn unavailable(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(200).collect())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Projects a values-API payload onto the claimed numbers within `range`.
pub fn parse_value_range(body: &str, range: RangeInclusive<u32>) -> Result<ClaimSnapshot, StoreError> {
    let parsed: ValueRange =
        serde_json::from_str(body).map_err(|err| StoreError::Malformed(err.to_string()))?;
    let rows: Vec<Vec<String>> = parsed
        .values
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Ok(ClaimSnapshot::from_rows(&rows, range))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_payload() {
        let body = r#"{
            "range": "Sheet1!A1:E4",
            "majorDimension": "ROWS",
            "values": [
                ["Number", "Timestamp", "UserAgent", "Note", "Claimant"],
                ["7", "2026-01-01T10:00:00.000Z", "", "", "Alice"],
                [42, "2026-01-01T10:01:00.000Z"],
                ["250", "", "", "", "Mallory"]
            ]
        }"#;
        let snapshot = parse_value_range(body, 1..=100).unwrap();
        assert_eq!(snapshot.claimed.iter().copied().collect::<Vec<_>>(), vec![7, 42]);
        assert_eq!(snapshot.number_for("Alice"), Some(7));
        assert_eq!(snapshot.number_for("Mallory"), None);
    }

    #[test]
    fn empty_sheet_has_no_values_key() {
        let snapshot = parse_value_range(r#"{"range": "Sheet1!A1:E1"}"#, 1..=100).unwrap();
        assert!(snapshot.claimed.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_value_range("<html>", 1..=100),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn api_error_message_is_extracted() {
        let body = r#"{"error": {"code": 403, "message": "The caller does not have permission"}}"#;
        assert_eq!(error_message(body), "The caller does not have permission");
        assert_eq!(error_message("  plain failure \n"), "plain failure");
    }

    #[test]
    fn values_url_targets_claim_range() {
        let store = SheetsClaimStore::new(
            SheetSettings {
                spreadsheet_id: "abc123".into(),
                api_key: "key".into(),
                script_url: "https://script.example/exec".into(),
            },
            1..=100,
        )
        .unwrap();
        assert_eq!(
            store.values_url(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/Sheet1!A:E"
        );
    }
}
