//! Scroll and bulk access to one Elasticsearch index.

use std::collections::HashMap;

use cocom_core::{CocomError, DocumentStore, FetchPage, Result};
use log::{debug, warn};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ElasticConfig;

/// Strip credentials from a URL before it is logged.
pub fn anonymize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string().trim_end_matches('/').to_string()
        }
        Ok(_) => url.trim_end_matches('/').to_string(),
        Err(_) => match url.split_once("://") {
            Some((scheme, rest)) => match rest.rsplit_once('@') {
                Some((_, host)) => format!("{scheme}://{host}"),
                None => url.to_string(),
            },
            None => url.to_string(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Elasticsearch index implementing [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct ElasticStore {
    config: ElasticConfig,
    index: String,
    client: Client,
}

impl ElasticStore {
    /// Handle to `index` on the cluster described by `config`.
    pub fn new(config: ElasticConfig, index: impl Into<String>) -> Self {
        Self {
            config,
            index: index.into(),
            client: Client::new(),
        }
    }

    /// Name of the index this handle points at.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Connection settings in use.
    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }

    /// Create the index unless it already exists.
    pub fn create_index(&self) -> Result<()> {
        let response = self
            .client
            .put(self.index_url(""))
            .send()
            .map_err(|err| request_failed(&self.describe(), err))?;
        let status = response.status();
        if status.is_success() {
            debug!("created index {}", self.describe());
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        if status.as_u16() == 400 && body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(CocomError::Store(format!(
            "elasticsearch error creating {} ({status}): {body}",
            self.describe()
        )))
    }

    /// Make recent writes visible to searches.
    pub fn refresh(&self) -> Result<()> {
        let response = self
            .client
            .post(self.index_url("/_refresh"))
            .send()
            .map_err(|err| request_failed(&self.describe(), err))?;
        check_status(response, &self.describe()).map(|_| ())
    }

    fn index_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}{suffix}",
            self.config.base_url(),
            urlencoding::encode(&self.index)
        )
    }

    fn start_scroll(&self) -> Result<Option<SearchResponse>> {
        let mut body = json!({ "size": self.config.scroll_size });
        if let Some(field) = &self.config.sort_field {
            let mut order = serde_json::Map::new();
            order.insert(field.clone(), json!({ "order": "asc" }));
            body["sort"] = json!([Value::Object(order)]);
        }
        let response = self
            .client
            .post(self.index_url("/_search"))
            .query(&[("scroll", self.config.scroll_keepalive.as_str())])
            .json(&body)
            .send()
            .map_err(|err| request_failed(&self.describe(), err))?;
        if response.status().as_u16() == 404 {
            warn!("index {} not found, nothing to fetch", self.describe());
            return Ok(None);
        }
        let response = check_status(response, &self.describe())?;
        decode(response, &self.describe()).map(Some)
    }

    fn continue_scroll(&self, scroll_id: &str) -> Result<SearchResponse> {
        let response = self
            .client
            .post(format!("{}/_search/scroll", self.config.base_url()))
            .json(&json!({
                "scroll": self.config.scroll_keepalive,
                "scroll_id": scroll_id,
            }))
            .send()
            .map_err(|err| request_failed(&self.describe(), err))?;
        let response = check_status(response, &self.describe())?;
        decode(response, &self.describe())
    }

    fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .client
            .delete(format!("{}/_search/scroll", self.config.base_url()))
            .json(&json!({ "scroll_id": scroll_id }))
            .send();
        if let Err(err) = result {
            debug!("failed to clear scroll on {}: {err}", self.describe());
        }
    }

    fn upload_chunk(&self, chunk: &[Value], id_field: &str) -> Result<usize> {
        let mut payload = String::new();
        for item in chunk {
            let id = match item.get(id_field) {
                Some(Value::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => {
                    return Err(CocomError::Store(format!(
                        "document missing id field {id_field}"
                    )));
                }
            };
            payload.push_str(&json!({ "index": { "_id": id } }).to_string());
            payload.push('\n');
            payload.push_str(&item.to_string());
            payload.push('\n');
        }

        let response = self
            .client
            .post(self.index_url("/_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .map_err(|err| request_failed(&self.describe(), err))?;
        let response = check_status(response, &self.describe())?;
        let bulk: BulkResponse = decode(response, &self.describe())?;

        let mut inserted = 0;
        for item in bulk.items.iter().flat_map(|entry| entry.values()) {
            if (200..300).contains(&item.status) {
                inserted += 1;
            } else if let Some(error) = &item.error {
                debug!(
                    "bulk item {} rejected by {} ({}): {error}",
                    item.id.as_deref().unwrap_or("?"),
                    self.describe(),
                    item.status
                );
            }
        }
        if bulk.errors {
            debug!(
                "bulk request to {} reported errors: {inserted}/{} accepted",
                self.describe(),
                chunk.len()
            );
        }
        Ok(inserted)
    }
}

impl DocumentStore for ElasticStore {
    fn describe(&self) -> String {
        format!("{}/{}", anonymize_url(self.config.base_url()), self.index)
    }

    fn fetch_page(&self, cursor: Option<String>) -> Result<FetchPage> {
        let response = match cursor {
            None => match self.start_scroll()? {
                Some(response) => response,
                None => return Ok(FetchPage::default()),
            },
            Some(scroll_id) => self.continue_scroll(&scroll_id)?,
        };

        let items: Vec<Value> = response
            .hits
            .hits
            .into_iter()
            .map(|hit| hit.source)
            .collect();
        let cursor = match response.scroll_id {
            Some(scroll_id) if items.is_empty() => {
                self.clear_scroll(&scroll_id);
                None
            }
            other => other,
        };
        Ok(FetchPage { items, cursor })
    }

    fn bulk_upload(&self, items: &[Value], id_field: &str) -> Result<usize> {
        let mut inserted = 0;
        for chunk in items.chunks(self.config.max_items_bulk.max(1)) {
            inserted += self.upload_chunk(chunk, id_field)?;
        }
        if !items.is_empty() {
            self.refresh()?;
        }
        Ok(inserted)
    }

    fn max_items_bulk(&self) -> usize {
        self.config.max_items_bulk
    }

    fn open_index(&self, index: &str) -> Result<Box<dyn DocumentStore>> {
        let store = Self {
            config: self.config.clone(),
            index: index.to_string(),
            client: self.client.clone(),
        };
        store.create_index()?;
        Ok(Box::new(store))
    }
}

fn request_failed(target: &str, err: reqwest::Error) -> CocomError {
    CocomError::Store(format!("elasticsearch request to {target} failed: {err}"))
}

fn check_status(response: Response, target: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().unwrap_or_default();
    Err(CocomError::Store(format!(
        "elasticsearch error from {target} ({status}): {body}"
    )))
}

fn decode<T: serde::de::DeserializeOwned>(response: Response, target: &str) -> Result<T> {
    response.json().map_err(|err| {
        CocomError::Store(format!(
            "elasticsearch response decode failed for {target}: {err}"
        ))
    })
}
