//! Firestore REST v1 adapter.
//!
//! # Responsibility
//! - Translate `RemoteStore` calls into Firestore REST requests.
//! - Encode item fields as Firestore typed values and decode them back.
//!
//! # Invariants
//! - `timestamp` is written as `integerValue`; reads also accept `doubleValue`.
//! - Documents missing `name` or `timestamp` are rejected, never defaulted.
//! - Every non-success response is logged once and returned as `RemoteError`.
//!
//! # Wire format
//! - create: `POST {documents}/{collection}` with `{"fields": ...}`
//! - list_all: `GET {documents}/{collection}?pageSize=N`, following `nextPageToken`
//! - list_where: `POST {documents}:runQuery` with a `structuredQuery`
//! - update: `PATCH {documents}/{collection}/{id}` with an update mask and
//!   `currentDocument.exists=true`
//! - delete: `DELETE {documents}/{collection}/{id}`

use super::{RemoteError, RemoteResult, RemoteStore, TimestampFilter};
use crate::model::item::{validate_id, Item, ItemFields, ItemId};
use log::{debug, error};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_DATABASE_ID: &str = "(default)";
pub const DEFAULT_COLLECTION: &str = "items";

const LIST_PAGE_SIZE: u32 = 300;
const FIELD_NAME: &str = "name";
const FIELD_TIMESTAMP: &str = "timestamp";

static DOCUMENT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^projects/[^/]+/databases/[^/]+/documents/(?:[^/]+/[^/]+/)*[^/]+/([^/]+)$")
        .expect("valid document name regex")
});

/// Connection settings for one Firestore collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreSettings {
    pub base_url: String,
    pub project_id: String,
    pub database_id: String,
    pub collection: String,
    /// Appended as the `key` query parameter when set.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl FirestoreSettings {
    /// Settings for the default database and `items` collection of a project.
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: project_id.into(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// `{base}/projects/{project}/databases/{database}/documents`.
    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.database_id
        )
    }
}

/// `RemoteStore` backed by the Firestore REST API.
pub struct FirestoreRestStore {
    client: Client,
    settings: FirestoreSettings,
    documents_url: Url,
}

impl FirestoreRestStore {
    /// Builds an HTTP client for the given settings.
    ///
    /// # Errors
    /// - `InvalidConfig` when the HTTP client cannot be built, or for any
    ///   error of [`Self::with_client`].
    pub fn new(settings: FirestoreSettings) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| RemoteError::InvalidConfig(format!("http client: {err}")))?;
        Self::with_client(settings, client)
    }

    /// Uses a caller-built HTTP client; `settings.timeout` is ignored.
    ///
    /// # Errors
    /// - `InvalidConfig` when an identifier is blank or the base URL does not parse.
    pub fn with_client(settings: FirestoreSettings, client: Client) -> RemoteResult<Self> {
        for (label, value) in [
            ("project_id", &settings.project_id),
            ("database_id", &settings.database_id),
            ("collection", &settings.collection),
        ] {
            if value.trim().is_empty() {
                return Err(RemoteError::InvalidConfig(format!("{label} must be set")));
            }
        }

        let documents_url = Url::parse(&settings.documents_url())
            .map_err(|err| RemoteError::InvalidConfig(format!("invalid base_url: {err}")))?;

        Ok(Self {
            client,
            settings,
            documents_url,
        })
    }

    pub fn settings(&self) -> &FirestoreSettings {
        &self.settings
    }

    fn collection_url(&self) -> RemoteResult<Url> {
        self.child_url(&[self.settings.collection.as_str()])
    }

    fn document_url(&self, id: &str) -> RemoteResult<Url> {
        validate_id(id).map_err(RemoteError::InvalidId)?;
        self.child_url(&[self.settings.collection.as_str(), id])
    }

    fn run_query_url(&self) -> RemoteResult<Url> {
        let raw = format!("{}:runQuery", self.documents_url);
        Url::parse(&raw).map_err(|err| RemoteError::InvalidConfig(err.to_string()))
    }

    fn child_url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidConfig("base_url cannot be a base".to_string()))?
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.settings.api_key {
            Some(key) => builder.query(&[("key", key.as_str())]),
            None => builder,
        }
    }

    /// Sends one request and maps transport and status failures.
    fn send(
        &self,
        op: &'static str,
        target: Option<&str>,
        builder: RequestBuilder,
    ) -> RemoteResult<Response> {
        let started_at = Instant::now();
        let outcome = builder
            .send()
            .map_err(|err| RemoteError::Unavailable(err.to_string()))
            .and_then(|response| check_status(response, target));

        match &outcome {
            Ok(response) => debug!(
                "event=remote_request module=remote.firestore op={op} status=ok http_status={} duration_ms={}",
                response.status().as_u16(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=remote_request module=remote.firestore op={op} status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        outcome
    }
}

impl RemoteStore for FirestoreRestStore {
    fn create(&self, fields: &ItemFields) -> RemoteResult<ItemId> {
        let builder = self
            .request(Method::POST, self.collection_url()?)
            .json(&json!({ "fields": encode_fields(fields) }));
        let document: Document = read_json(self.send("create", None, builder)?)?;
        document_id(&document.name)
    }

    fn list_all(&self) -> RemoteResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self
                .request(Method::GET, self.collection_url()?)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token.as_str())]);
            }

            let page: ListDocumentsResponse = read_json(self.send("list_all", None, builder)?)?;
            for document in &page.documents {
                items.push(decode_document(document)?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }

    fn list_where(&self, filter: TimestampFilter) -> RemoteResult<Vec<Item>> {
        let builder = self
            .request(Method::POST, self.run_query_url()?)
            .json(&structured_query(&self.settings.collection, filter));
        let rows: Vec<RunQueryRow> = read_json(self.send("list_where", None, builder)?)?;
        decode_run_query(rows)
    }

    fn update(&self, id: &str, fields: &ItemFields) -> RemoteResult<()> {
        let builder = self
            .request(Method::PATCH, self.document_url(id)?)
            .query(&[
                ("updateMask.fieldPaths", FIELD_NAME),
                ("updateMask.fieldPaths", FIELD_TIMESTAMP),
                ("currentDocument.exists", "true"),
            ])
            .json(&json!({ "fields": encode_fields(fields) }));
        self.send("update", Some(id), builder)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> RemoteResult<()> {
        let builder = self.request(Method::DELETE, self.document_url(id)?);
        self.send("delete", Some(id), builder)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

/// One `runQuery` stream element; progress-only rows carry no document.
#[derive(Debug, Deserialize)]
struct RunQueryRow {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn check_status(response: Response, target: Option<&str>) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::NOT_FOUND if target.is_some() => {
            RemoteError::NotFound(target.unwrap_or_default().to_string())
        }
        other => RemoteError::Status {
            code: other.as_u16(),
            message,
        },
    })
}

fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .map_err(|err| RemoteError::Decode(err.to_string()))
}

fn encode_fields(fields: &ItemFields) -> Value {
    json!({
        FIELD_NAME: { "stringValue": fields.name },
        FIELD_TIMESTAMP: { "integerValue": fields.timestamp.to_string() },
    })
}

fn structured_query(collection: &str, filter: TimestampFilter) -> Value {
    let op = match filter {
        TimestampFilter::After(_) => "GREATER_THAN",
        TimestampFilter::AtOrAfter(_) => "GREATER_THAN_OR_EQUAL",
    };
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": FIELD_TIMESTAMP },
                    "op": op,
                    "value": { "integerValue": filter.cursor().to_string() },
                }
            }
        }
    })
}

fn decode_run_query(rows: Vec<RunQueryRow>) -> RemoteResult<Vec<Item>> {
    rows.iter()
        .filter_map(|row| row.document.as_ref())
        .map(decode_document)
        .collect()
}

fn decode_document(document: &Document) -> RemoteResult<Item> {
    let id = document_id(&document.name)?;
    let name = document
        .fields
        .get(FIELD_NAME)
        .and_then(|value| value.get("stringValue"))
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field(&id, FIELD_NAME))?;
    let timestamp = document
        .fields
        .get(FIELD_TIMESTAMP)
        .and_then(|value| value.as_object())
        .ok_or_else(|| missing_field(&id, FIELD_TIMESTAMP))
        .and_then(|value| decode_integer(&id, value))?;

    Ok(Item::with_id(id, name, timestamp))
}

fn decode_integer(id: &str, value: &Map<String, Value>) -> RemoteResult<i64> {
    if let Some(raw) = value.get("integerValue") {
        // Proto3 JSON renders int64 as a string, but accept bare numbers too.
        let parsed = match raw {
            Value::String(text) => text.parse::<i64>().ok(),
            Value::Number(number) => number.as_i64(),
            _ => None,
        };
        return parsed.ok_or_else(|| {
            RemoteError::Decode(format!("document {id}: bad integerValue {raw}"))
        });
    }

    if let Some(number) = value.get("doubleValue").and_then(Value::as_f64) {
        if number.is_finite() && number.fract() == 0.0 {
            return Ok(number as i64);
        }
        return Err(RemoteError::Decode(format!(
            "document {id}: timestamp {number} is not an integer"
        )));
    }

    Err(missing_field(id, FIELD_TIMESTAMP))
}

fn document_id(name: &str) -> RemoteResult<ItemId> {
    DOCUMENT_NAME_RE
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| RemoteError::Decode(format!("unexpected document name `{name}`")))
}

fn missing_field(id: &str, field: &str) -> RemoteError {
    RemoteError::Decode(format!("document {id} has no usable `{field}` field"))
}
