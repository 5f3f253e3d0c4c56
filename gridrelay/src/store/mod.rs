//! Binary-object storage the relay drains.
//!
//! [`ImageStore`] is the seam between the relay and the document store. Production runs use
//! [`gridfs::GridFsImageStore`]; tests and local dry runs use [`in_memory::InMemoryImageStore`].
//! Both decode raw file documents through [`decode_record`], so malformed documents fail the
//! same way regardless of backend.

use async_trait::async_trait;
use futures::stream::BoxStream;
use mongodb::bson::{Bson, Document, oid::ObjectId};

use crate::errors::{Error, Result};

pub mod gridfs;
pub mod in_memory;

/// A stored image as listed in the files collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImageRecord {
    pub id: ObjectId,
    pub filename: String,
}

impl StoredImageRecord {
    /// Local filename for this record: `<filename>_<hex id>.<extension>`.
    ///
    /// The id suffix keeps two records with the same declared filename apart.
    pub fn unique_filename(&self, extension: &str) -> String {
        format!("{}_{}.{}", self.filename, self.id.to_hex(), extension)
    }
}

/// Lazy, single-pass sequence of records. An `Err` item ends the useful part of the sequence
/// for callers that abort on failure.
pub type RecordStream = BoxStream<'static, Result<StoredImageRecord>>;

/// Trait for binary-object storage backends
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Query every record currently in the collection.
    async fn records(&self) -> Result<RecordStream>;

    /// Fetch the full content of one object into memory.
    async fn download(&self, id: ObjectId) -> Result<Vec<u8>>;

    /// Remove an object (metadata and content) from the store.
    async fn delete(&self, id: ObjectId) -> Result<()>;
}

/// Extract the record identity from a raw files-collection document.
///
/// `_id` must be an ObjectId and `filename` a string; anything else is a [`Error::Decode`].
pub fn decode_record(document: &Document) -> Result<StoredImageRecord> {
    let id = match document.get("_id") {
        Some(Bson::ObjectId(id)) => *id,
        Some(other) => {
            return Err(Error::Decode {
                message: format!("_id is a {:?}, expected an ObjectId", other.element_type()),
            });
        }
        None => {
            return Err(Error::Decode {
                message: "document has no _id".to_string(),
            });
        }
    };

    let filename = match document.get("filename") {
        Some(Bson::String(filename)) => filename.clone(),
        Some(other) => {
            return Err(Error::Decode {
                message: format!("filename of {id} is a {:?}, expected a string", other.element_type()),
            });
        }
        None => {
            return Err(Error::Decode {
                message: format!("document {id} has no filename"),
            });
        }
    };

    Ok(StoredImageRecord { id, filename })
}
