//! In-memory image store.
//!
//! Holds raw files-collection documents next to their content, so enumeration goes through
//! the same [`decode_record`] path as GridFS. Downloads and deletes can be made to fail per
//! object id. Everything is lost when the store is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use parking_lot::RwLock;

use super::{ImageStore, RecordStream, decode_record};
use crate::errors::{Error, Result};

#[derive(Default)]
struct Inner {
    /// Files documents in insertion order
    documents: Vec<Document>,
    content: HashMap<ObjectId, Vec<u8>>,
    failing_downloads: HashSet<ObjectId>,
    failing_deletes: HashSet<ObjectId>,
}

/// In-memory implementation of the ImageStore trait.
///
/// # Example
/// ```ignore
/// let store = InMemoryImageStore::new();
/// let id = store.insert("Apple_AB12?555-1234?Like new?Box+charger", b"jpeg bytes".to_vec());
/// store.fail_deletes_for(id);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryImageStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under a fresh id.
    pub fn insert(&self, filename: &str, content: Vec<u8>) -> ObjectId {
        let id = ObjectId::new();
        self.insert_with_id(id, filename, content);
        id
    }

    pub fn insert_with_id(&self, id: ObjectId, filename: &str, content: Vec<u8>) {
        let mut inner = self.inner.write();
        inner.documents.push(doc! {
            "_id": id,
            "filename": filename,
            "length": content.len() as i64,
        });
        inner.content.insert(id, content);
    }

    /// Store a raw files document with no content, e.g. one missing its filename.
    pub fn insert_document(&self, document: Document) {
        self.inner.write().documents.push(document);
    }

    pub fn fail_downloads_for(&self, id: ObjectId) {
        self.inner.write().failing_downloads.insert(id);
    }

    pub fn fail_deletes_for(&self, id: ObjectId) {
        self.inner.write().failing_deletes.insert(id);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.write();
        inner.failing_downloads.clear();
        inner.failing_deletes.clear();
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner
            .read()
            .documents
            .iter()
            .any(|document| document.get("_id") == Some(&Bson::ObjectId(id)))
    }

    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn records(&self) -> Result<RecordStream> {
        // Snapshot at query time; later inserts are not observed by this stream
        let documents = self.inner.read().documents.clone();
        let records = futures::stream::iter(documents).map(|document| decode_record(&document));
        Ok(records.boxed())
    }

    async fn download(&self, id: ObjectId) -> Result<Vec<u8>> {
        let inner = self.inner.read();

        if inner.failing_downloads.contains(&id) {
            return Err(Error::Download {
                id: id.to_hex(),
                source: anyhow::anyhow!("injected download failure"),
            });
        }

        inner.content.get(&id).cloned().ok_or_else(|| Error::Download {
            id: id.to_hex(),
            source: anyhow::anyhow!("file not found"),
        })
    }

    async fn delete(&self, id: ObjectId) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.failing_deletes.contains(&id) {
            return Err(Error::DeleteObject {
                id: id.to_hex(),
                source: anyhow::anyhow!("injected delete failure"),
            });
        }

        let before = inner.documents.len();
        inner
            .documents
            .retain(|document| document.get("_id") != Some(&Bson::ObjectId(id)));
        inner.content.remove(&id);

        if inner.documents.len() == before {
            return Err(Error::DeleteObject {
                id: id.to_hex(),
                source: anyhow::anyhow!("file not found"),
            });
        }

        Ok(())
    }
}
