//! Document store abstraction used for fetching and bulk uploading records.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde_json::Value;

use crate::error::{CocomError, Result};

/// One page of fetched documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPage {
    /// Documents in store order.
    pub items: Vec<Value>,
    /// Cursor for the next page, `None` when this is the last one.
    pub cursor: Option<String>,
}

/// An indexed document store holding one dataset.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStore {
    /// Log-safe description of the store location.
    fn describe(&self) -> String;
    /// Fetch the page following `cursor`, or the first page when `None`.
    fn fetch_page(&self, cursor: Option<String>) -> Result<FetchPage>;
    /// Upsert documents keyed by `id_field`, returning how many were accepted.
    fn bulk_upload(&self, items: &[Value], id_field: &str) -> Result<usize>;
    /// Largest batch the store accepts in one bulk call.
    fn max_items_bulk(&self) -> usize;
    /// Open another dataset on the same store, creating it if needed.
    fn open_index(&self, index: &str) -> Result<Box<dyn DocumentStore>>;
}

/// Lazily iterate every document of a store.
pub fn fetch<S: DocumentStore + ?Sized>(store: &S) -> Scroll<'_, S> {
    Scroll {
        store,
        buffer: Vec::new().into_iter(),
        cursor: None,
        started: false,
        done: false,
    }
}

/// Iterator over all documents, pulling pages on demand.
pub struct Scroll<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    buffer: std::vec::IntoIter<Value>,
    cursor: Option<String>,
    started: bool,
    done: bool,
}

impl<S: DocumentStore + ?Sized> Iterator for Scroll<'_, S> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if self.done || (self.started && self.cursor.is_none()) {
                return None;
            }

            self.started = true;
            match self.store.fetch_page(self.cursor.take()) {
                Ok(page) => {
                    debug!(
                        "fetched {} items from {}",
                        page.items.len(),
                        self.store.describe()
                    );
                    if page.items.is_empty() {
                        self.done = true;
                    }
                    self.cursor = page.cursor;
                    self.buffer = page.items.into_iter();
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryIndex {
    documents: Vec<Value>,
    positions: HashMap<String, usize>,
}

type Cluster = Arc<Mutex<BTreeMap<String, MemoryIndex>>>;

/// In-process document store.
///
/// Indexes opened from the same store share one cluster, keep insertion
/// order and upsert by id.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    cluster: Cluster,
    index: String,
    page_size: usize,
    max_items_bulk: usize,
    accept_limit: Option<usize>,
}

impl MemoryStore {
    /// Create a store holding a single empty index.
    pub fn new(index: impl Into<String>) -> Self {
        let store = Self {
            cluster: Arc::new(Mutex::new(BTreeMap::new())),
            index: index.into(),
            page_size: 100,
            max_items_bulk: 1000,
            accept_limit: None,
        };
        if let Ok(mut cluster) = store.cluster.lock() {
            cluster.entry(store.index.clone()).or_default();
        }
        store
    }

    /// Set the number of documents returned per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the bulk limit reported to writers.
    pub fn with_max_items_bulk(mut self, max_items_bulk: usize) -> Self {
        self.max_items_bulk = max_items_bulk.max(1);
        self
    }

    /// Accept at most `limit` documents per bulk call and drop the rest.
    pub fn with_accept_limit(mut self, limit: usize) -> Self {
        self.accept_limit = Some(limit);
        self
    }

    /// Name of the index this handle points at.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Snapshot of every document in the index, in insertion order.
    pub fn documents(&self) -> Result<Vec<Value>> {
        let cluster = self.lock()?;
        Ok(cluster
            .get(&self.index)
            .map(|index| index.documents.clone())
            .unwrap_or_default())
    }

    /// Document stored under `id`.
    pub fn get(&self, id: &str) -> Result<Option<Value>> {
        let cluster = self.lock()?;
        Ok(cluster.get(&self.index).and_then(|index| {
            index
                .positions
                .get(id)
                .map(|position| index.documents[*position].clone())
        }))
    }

    /// Handle to another index of the same cluster.
    pub fn sibling(&self, index: &str) -> Self {
        let sibling = Self {
            cluster: Arc::clone(&self.cluster),
            index: index.to_string(),
            page_size: self.page_size,
            max_items_bulk: self.max_items_bulk,
            accept_limit: self.accept_limit,
        };
        if let Ok(mut cluster) = sibling.cluster.lock() {
            cluster.entry(sibling.index.clone()).or_default();
        }
        sibling
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, MemoryIndex>>> {
        self.cluster
            .lock()
            .map_err(|_| CocomError::Store("memory store lock poisoned".to_string()))
    }
}

impl DocumentStore for MemoryStore {
    fn describe(&self) -> String {
        format!("memory://{}", self.index)
    }

    fn fetch_page(&self, cursor: Option<String>) -> Result<FetchPage> {
        let start = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| CocomError::Store(format!("invalid cursor: {cursor}")))?,
            None => 0,
        };
        let cluster = self.lock()?;
        let documents = cluster
            .get(&self.index)
            .map(|index| index.documents.as_slice())
            .unwrap_or_default();
        let end = (start + self.page_size).min(documents.len());
        let items = documents.get(start..end).unwrap_or_default().to_vec();
        let cursor = (end < documents.len()).then(|| end.to_string());
        Ok(FetchPage { items, cursor })
    }

    fn bulk_upload(&self, items: &[Value], id_field: &str) -> Result<usize> {
        let accepted = self
            .accept_limit
            .map_or(items.len(), |limit| limit.min(items.len()));
        let mut cluster = self.lock()?;
        let index = cluster.entry(self.index.clone()).or_default();

        for item in &items[..accepted] {
            let id = match item.get(id_field) {
                Some(Value::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => {
                    return Err(CocomError::Store(format!(
                        "document missing id field {id_field}"
                    )));
                }
            };
            match index.positions.get(&id) {
                Some(position) => index.documents[*position] = item.clone(),
                None => {
                    index.positions.insert(id, index.documents.len());
                    index.documents.push(item.clone());
                }
            }
        }

        Ok(accepted)
    }

    fn max_items_bulk(&self) -> usize {
        self.max_items_bulk
    }

    fn open_index(&self, index: &str) -> Result<Box<dyn DocumentStore>> {
        Ok(Box::new(self.sibling(index)))
    }
}
