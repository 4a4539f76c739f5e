//! Spreadsheet-service reader (Google Sheets API v4).
//!
//! # Responsibility
//! - Authenticate with a service-account credentials file.
//! - Fetch every cell of the first sheet as a raw grid, header row included.
//!
//! # Invariants
//! - A missing credentials path fails at construction, before any network I/O.
//! - One access token is obtained lazily and reused for the reader lifetime.
//! - Credential contents are never logged.

use super::normalize::{normalize, DateFormat, RawCell, RawGrid};
use super::{SourceError, SourceResult, TableSource};
use crate::config::{env_lookup, resolve_credentials_path, ConfigError};
use crate::model::table::CanonicalTable;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::{error, info};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const REQUEST_TIMEOUT_SECS: u64 = 30;

static DOCUMENT_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").expect("valid document url regex")
});
static DOCUMENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid document id regex"));

/// Extracts a document id from a bare id or a full document URL.
pub fn extract_document_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if let Some(caps) = DOCUMENT_URL_RE.captures(trimmed) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    DOCUMENT_ID_RE
        .is_match(trimmed)
        .then(|| trimmed.to_string())
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Reads the first sheet of a remote spreadsheet document.
pub struct SpreadsheetServiceReader {
    document_id: String,
    credentials_path: PathBuf,
    date_format: DateFormat,
    api_base: String,
    client: Client,
    access_token: OnceCell<String>,
}

impl SpreadsheetServiceReader {
    /// Builds a reader; `credentials_path` falls back to `GOOGLE_SHEETS_CREDENTIALS_PATH`.
    pub fn new(document: &str, credentials_path: Option<&str>) -> SourceResult<Self> {
        Self::with_lookup(document, credentials_path, env_lookup)
    }

    /// Same as [`Self::new`] with an injected environment lookup.
    pub fn with_lookup(
        document: &str,
        credentials_path: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SourceResult<Self> {
        let credentials_path = resolve_credentials_path(credentials_path, lookup)?;
        let document_id =
            extract_document_id(document).ok_or_else(|| ConfigError::InvalidValue {
                name: "spreadsheet document id",
                reason: format!("`{}` is neither an id nor a document URL", document.trim()),
            })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| SourceError::RemoteAccess(err.to_string()))?;

        Ok(Self {
            document_id,
            credentials_path,
            date_format: DateFormat::default(),
            api_base: SHEETS_API_BASE.to_string(),
            client,
            access_token: OnceCell::new(),
        })
    }

    /// Overrides the pattern used for date cells.
    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    /// Points the reader at a different API root, e.g. a regional proxy.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    fn access_token(&self) -> SourceResult<&str> {
        self.access_token
            .get_or_try_init(|| self.authenticate())
            .map(String::as_str)
    }

    fn authenticate(&self) -> SourceResult<String> {
        let raw = std::fs::read_to_string(&self.credentials_path).map_err(|err| {
            SourceError::Authentication(format!(
                "cannot read credentials file `{}`: {err}",
                self.credentials_path.display()
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|err| {
            SourceError::Authentication(format!("invalid service account credentials: {err}"))
        })?;
        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: SHEETS_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|err| SourceError::Authentication(format!("invalid private key: {err}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|err| SourceError::Authentication(format!("cannot sign assertion: {err}")))?;

        let response = self
            .client
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .map_err(|err| SourceError::Authentication(format!("token request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::Authentication(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().map_err(|err| {
            SourceError::Authentication(format!("unreadable token response: {err}"))
        })?;
        info!("event=sheets_auth module=table status=ok");
        Ok(token.access_token)
    }

    fn document_url(&self, extra_segments: &[&str]) -> SourceResult<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|err| ConfigError::InvalidValue {
            name: "spreadsheet api base",
            reason: err.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|()| ConfigError::InvalidValue {
                name: "spreadsheet api base",
                reason: format!("`{}` cannot carry a path", self.api_base),
            })?
            .push(&self.document_id)
            .extend(extra_segments);
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> SourceResult<T> {
        let token = self.access_token()?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .map_err(|err| SourceError::RemoteAccess(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::Authentication(format!(
                "spreadsheet service returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::RemoteAccess(format!(
                "spreadsheet service returned {status}: {body}"
            )));
        }

        response
            .json()
            .map_err(|err| SourceError::Format(format!("unexpected service response: {err}")))
    }

    fn read_grid(&self) -> SourceResult<RawGrid> {
        let meta: SpreadsheetMeta =
            self.get_json(self.document_url(&[])?, &[("fields", "sheets.properties.title")])?;
        let title = meta
            .sheets
            .into_iter()
            .next()
            .map(|sheet| sheet.properties.title)
            .ok_or_else(|| SourceError::Format("spreadsheet contains no sheets".to_string()))?;

        let range = format!("'{}'", title.replace('\'', "''"));
        let values: ValueRange = self.get_json(
            self.document_url(&["values", range.as_str()])?,
            &[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ],
        )?;

        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(raw_cell).collect())
            .collect())
    }
}

impl TableSource for SpreadsheetServiceReader {
    fn read(&self) -> SourceResult<CanonicalTable> {
        let started_at = Instant::now();
        match self.read_grid() {
            Ok(grid) => {
                let table = normalize(&grid, &self.date_format);
                info!(
                    "event=table_read module=table source=sheets status=ok rows={} duration_ms={}",
                    table.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(table)
            }
            Err(err) => {
                error!(
                    "event=table_read module=table source=sheets status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn describe(&self) -> String {
        format!("Spreadsheet service (ID: {})", self.document_id)
    }
}

fn raw_cell(value: serde_json::Value) -> RawCell {
    match value {
        serde_json::Value::Null => RawCell::Empty,
        serde_json::Value::String(text) => RawCell::from(text),
        serde_json::Value::Bool(flag) => RawCell::Bool(flag),
        serde_json::Value::Number(number) => number.as_f64().map_or(RawCell::Empty, RawCell::Number),
        other => RawCell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_document_id, SpreadsheetServiceReader};
    use crate::config::{ConfigError, ENV_SHEETS_CREDENTIALS_PATH};
    use crate::table::{SourceError, TableSource};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn document_id_accepts_bare_id_and_url() {
        assert_eq!(
            extract_document_id(" 1p8PaZ8cDc_rEU-kD ").as_deref(),
            Some("1p8PaZ8cDc_rEU-kD")
        );
        assert_eq!(
            extract_document_id("https://docs.google.com/spreadsheets/d/abc-DEF_1/edit#gid=0")
                .as_deref(),
            Some("abc-DEF_1")
        );
        assert_eq!(extract_document_id("not an id"), None);
    }

    #[test]
    fn missing_credentials_path_is_configuration_error() {
        let err = SpreadsheetServiceReader::with_lookup("abc", None, no_env)
            .err()
            .expect("construction must fail");
        assert!(matches!(
            err,
            SourceError::Configuration(ConfigError::MissingVar(name))
                if name == ENV_SHEETS_CREDENTIALS_PATH
        ));
    }

    #[test]
    fn credentials_path_falls_back_to_environment() {
        let reader = SpreadsheetServiceReader::with_lookup("abc", None, |name| {
            (name == ENV_SHEETS_CREDENTIALS_PATH).then(|| "/etc/creds.json".to_string())
        })
        .unwrap();
        assert_eq!(reader.document_id(), "abc");
        assert_eq!(reader.describe(), "Spreadsheet service (ID: abc)");
    }

    #[test]
    fn unreadable_credentials_fail_authentication_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("creds.json");
        let reader =
            SpreadsheetServiceReader::with_lookup("abc", missing.to_str(), no_env).unwrap();
        assert!(matches!(reader.read(), Err(SourceError::Authentication(_))));

        let broken = dir.path().join("broken.json");
        std::fs::write(
            &broken,
            r#"{"client_email":"svc@example.iam","private_key":"not a pem"}"#,
        )
        .unwrap();
        let reader =
            SpreadsheetServiceReader::with_lookup("abc", broken.to_str(), no_env).unwrap();
        let err = reader.read().unwrap_err();
        assert!(err.to_string().contains("invalid private key"), "unexpected: {err}");
    }
}
