//! Remote stores over a plain HTTP object/document gateway
//!
//! Routes:
//! - blobs: `HEAD|GET|PUT {endpoint}/{bucket}/{key}`
//! - documents: `GET|POST {endpoint}/documents/{collection}/{owner}/{subcollection}`
//! - metadata: `GET|PATCH {endpoint}/documents/{collection}/{owner}`
//!
//! Sync HTTP via ureq. Every call carries a global timeout so a stalled
//! gateway surfaces as a storage error instead of hanging the request.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use super::{validate_key, validate_owner_id, BlobStore, Document, DocumentStore};
use crate::error::{EngineError, EngineResult};

/// Upper bound on a single downloaded blob.
const MAX_BLOB_BYTES: u64 = 256 * 1024 * 1024;

type Response = ureq::http::Response<ureq::Body>;

fn make_agent(timeout_secs: u64) -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(timeout_secs)))
        .build()
        .new_agent()
}

/// Read a bearer token from a credentials file.
///
/// Accepts either the raw token or a JSON object with a `token` or
/// `access_token` field.
pub(crate) fn read_token(path: &Path) -> EngineResult<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        EngineError::Config(format!("cannot read credentials {}: {e}", path.display()))
    })?;
    let raw = raw.trim();

    let token = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => ["token", "access_token"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "credentials {} has no 'token' field",
                    path.display()
                ))
            })?,
        _ => raw.to_string(),
    };

    if token.is_empty() {
        return Err(EngineError::Config(format!(
            "credentials {} are empty",
            path.display()
        )));
    }
    Ok(token)
}

/// Map a non-2xx response to an engine error.
fn check_status(key: &str, response: Response) -> EngineResult<Response> {
    let status = response.status().as_u16();
    if status == 404 {
        return Err(EngineError::NotFound(key.to_string()));
    }
    if status >= 400 {
        let text = response.into_body().read_to_string().unwrap_or_default();
        return Err(EngineError::storage(key, format!("HTTP {status}: {text}")));
    }
    Ok(response)
}

/// The id the gateway assigned to a newly added document.
fn document_id(url: &str, body: &str) -> EngineResult<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| EngineError::Schema(format!("{url} returned a non-JSON body: {e}")))?;
    let id = match value.get("id") {
        Some(Value::String(id)) => id.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(EngineError::Schema(format!(
            "{url} did not return a document id"
        )));
    }
    Ok(id)
}

struct Gateway {
    agent: ureq::Agent,
    endpoint: String,
    token: Option<String>,
}

impl Gateway {
    fn new(endpoint: &str, token: Option<String>, timeout_secs: u64) -> Self {
        Self {
            agent: make_agent(timeout_secs),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn auth(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

macro_rules! authed {
    ($gw:expr, $req:expr) => {{
        let req = $req;
        match $gw.auth() {
            Some(value) => req.header("Authorization", &value),
            None => req,
        }
    }};
}

pub struct HttpBlobStore {
    gateway: Gateway,
    bucket: String,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str, bucket: &str, token: Option<String>, timeout_secs: u64) -> Self {
        Self {
            gateway: Gateway::new(endpoint, token, timeout_secs),
            bucket: bucket.to_string(),
        }
    }

    fn url(&self, key: &str) -> EngineResult<String> {
        validate_key(key)?;
        Ok(format!("{}/{}/{}", self.gateway.endpoint, self.bucket, key))
    }
}

impl BlobStore for HttpBlobStore {
    fn name(&self) -> &str {
        "http"
    }

    fn exists(&self, key: &str) -> EngineResult<bool> {
        let url = self.url(key)?;
        let response = authed!(self.gateway, self.gateway.agent.head(&url))
            .call()
            .map_err(|e| EngineError::storage(key, e))?;
        match check_status(key, response) {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn get(&self, key: &str) -> EngineResult<Vec<u8>> {
        let url = self.url(key)?;
        let response = authed!(self.gateway, self.gateway.agent.get(&url))
            .call()
            .map_err(|e| EngineError::storage(key, e))?;
        let response = check_status(key, response)?;
        response
            .into_body()
            .with_config()
            .limit(MAX_BLOB_BYTES)
            .read_to_vec()
            .map_err(|e| EngineError::storage(key, e))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> EngineResult<()> {
        let url = self.url(key)?;
        let response = authed!(self.gateway, self.gateway.agent.put(&url))
            .header("Content-Type", "application/octet-stream")
            .send(bytes)
            .map_err(|e| EngineError::storage(key, e))?;
        check_status(key, response)?;
        tracing::debug!("Uploaded {} bytes to {}", bytes.len(), url);
        Ok(())
    }
}

pub struct HttpDocumentStore {
    gateway: Gateway,
}

impl HttpDocumentStore {
    pub fn new(endpoint: &str, token: Option<String>, timeout_secs: u64) -> Self {
        Self {
            gateway: Gateway::new(endpoint, token, timeout_secs),
        }
    }

    fn owner_url(&self, collection: &str, owner: &str) -> EngineResult<String> {
        validate_key(collection)?;
        validate_owner_id(owner)?;
        Ok(format!(
            "{}/documents/{}/{}",
            self.gateway.endpoint, collection, owner
        ))
    }
}

impl DocumentStore for HttpDocumentStore {
    fn name(&self) -> &str {
        "http"
    }

    fn query_by_owner(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
    ) -> EngineResult<Vec<Document>> {
        validate_key(subcollection)?;
        let url = format!("{}/{}", self.owner_url(collection, owner)?, subcollection);
        let response = authed!(self.gateway, self.gateway.agent.get(&url))
            .call()
            .map_err(|e| EngineError::storage(&url, e))?;
        let response = match check_status(&url, response) {
            Ok(r) => r,
            Err(EngineError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let body: Value = response
            .into_body()
            .read_json()
            .map_err(|e| EngineError::storage(&url, e))?;

        let Value::Array(items) = body else {
            return Err(EngineError::Schema(format!("{url} did not return a JSON array")));
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    fn add_document(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
        document: Document,
    ) -> EngineResult<String> {
        validate_key(subcollection)?;
        let url = format!("{}/{}", self.owner_url(collection, owner)?, subcollection);
        let response = authed!(self.gateway, self.gateway.agent.post(&url))
            .send_json(Value::Object(document))
            .map_err(|e| EngineError::storage(&url, e))?;
        let response = check_status(&url, response)?;
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| EngineError::storage(&url, e))?;
        document_id(&url, &body)
    }

    fn set_metadata(&self, collection: &str, owner: &str, fields: Document) -> EngineResult<()> {
        let url = self.owner_url(collection, owner)?;
        let response = authed!(self.gateway, self.gateway.agent.patch(&url))
            .send_json(Value::Object(fields))
            .map_err(|e| EngineError::storage(&url, e))?;
        check_status(&url, response)?;
        Ok(())
    }

    fn get_metadata(&self, collection: &str, owner: &str) -> EngineResult<Option<Document>> {
        let url = self.owner_url(collection, owner)?;
        let response = authed!(self.gateway, self.gateway.agent.get(&url))
            .call()
            .map_err(|e| EngineError::storage(&url, e))?;
        let response = match check_status(&url, response) {
            Ok(r) => r,
            Err(EngineError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match response
            .into_body()
            .read_json::<Value>()
            .map_err(|e| EngineError::storage(&url, e))?
        {
            Value::Object(map) => Ok(Some(map)),
            Value::Null => Ok(None),
            _ => Err(EngineError::Schema(format!("{url} did not return a JSON object"))),
        }
    }
}
