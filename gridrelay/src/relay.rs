//! Per-record relay: download, stage, announce, delete.
//!
//! ```text
//! Relay::run()
//!   └─ for each record in store.records():       // lazy, one record at a time
//!        └─ relay_record()
//!             ├─ reject filenames that are not a plain file name
//!             ├─ store.download(id)               // whole object in memory
//!             ├─ write <filename>_<hex id>.<ext>  // temp file, created with relay.file_mode
//!             ├─ ListingMetadata::from_filename()
//!             ├─ messenger.send_text()
//!             ├─ read temp file, messenger.send_photo()
//!             ├─ store.delete(id)
//!             └─ remove temp file
//! ```
//!
//! Nothing is rolled back. A failure after the temp file is written leaves it on disk, and a
//! failure after the sends leaves the object in the store, so a later run sends the same listing
//! again.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use mongodb::bson::oid::ObjectId;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use crate::config::{FailurePolicy, RelayConfig};
use crate::errors::{Error, ErrorKind, Result};
use crate::listing::ListingMetadata;
use crate::messenger::Messenger;
use crate::store::{ImageStore, StoredImageRecord};

/// A record the run gave up on under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// `None` when the document could not even be decoded into a record
    pub id: Option<ObjectId>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub relayed: usize,
    pub skipped: Vec<SkippedRecord>,
}

pub struct Relay {
    store: Arc<dyn ImageStore>,
    messenger: Arc<dyn Messenger>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(store: Arc<dyn ImageStore>, messenger: Arc<dyn Messenger>, config: RelayConfig) -> Self {
        Self {
            store,
            messenger,
            config,
        }
    }

    /// Drain the store, relaying records strictly in sequence.
    ///
    /// Under [`FailurePolicy::Abort`] the first error is returned as is. Under
    /// [`FailurePolicy::Skip`] record-scoped errors are collected into the summary and the run
    /// moves on; store connection failures still end the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut records = self.store.records().await?;
        let mut summary = RunSummary::default();

        while let Some(next) = records.next().await {
            let (id, result) = match next {
                Ok(record) => (Some(record.id), self.relay_record(&record).await.map(|_| ())),
                Err(e) => (None, Err(e)),
            };

            match result {
                Ok(()) => summary.relayed += 1,
                Err(e) if self.config.on_record_error == FailurePolicy::Skip && e.kind().is_record_scoped() => {
                    tracing::warn!(
                        id = ?id.map(|id| id.to_hex()),
                        kind = %e.kind(),
                        error = %e,
                        "Skipping record that could not be relayed"
                    );
                    summary.skipped.push(SkippedRecord {
                        id,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            relayed = summary.relayed,
            skipped = summary.skipped.len(),
            "Relay run finished"
        );

        Ok(summary)
    }

    /// Relay a single record and return the listing it announced.
    pub async fn relay_record(&self, record: &StoredImageRecord) -> Result<ListingMetadata> {
        let span = tracing::info_span!("relay_record", id = %record.id.to_hex());
        self.relay_record_inner(record).instrument(span).await
    }

    async fn relay_record_inner(&self, record: &StoredImageRecord) -> Result<ListingMetadata> {
        let unique_filename = record.unique_filename(&self.config.file_extension);
        let path = staging_path(&self.config.work_dir, &unique_filename)?;
        tracing::debug!(filename = %record.filename, "Relaying record");

        let content = self.store.download(record.id).await?;
        write_temp_file(&path, &content, self.config.file_mode).await?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "Wrote temp file");

        let metadata = ListingMetadata::from_filename(&unique_filename)?;

        self.messenger.send_text(&metadata.message_text()).await?;

        let photo = tokio::fs::read(&path).await.map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;
        self.messenger.send_photo(photo, &unique_filename).await?;

        self.store.delete(record.id).await?;

        tokio::fs::remove_file(&path).await.map_err(|source| Error::RemoveTempFile {
            path: path.clone(),
            source,
        })?;

        tracing::info!(brand = %metadata.brand, web_id = %metadata.web_id, "Relayed listing");
        Ok(metadata)
    }

    /// Where the temp file for `record` is staged.
    pub fn temp_path(&self, record: &StoredImageRecord) -> Result<PathBuf> {
        staging_path(&self.config.work_dir, &record.unique_filename(&self.config.file_extension))
    }
}

/// Join `filename` onto `work_dir`, refusing anything but a single plain file name. Stored
/// filenames are untrusted and must not reach outside the working directory.
fn staging_path(work_dir: &Path, filename: &str) -> Result<PathBuf> {
    let mut components = Path::new(filename).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if !plain || filename.contains('\\') {
        return Err(Error::MetadataFormat {
            filename: filename.to_string(),
            reason: "stored filename must be a plain file name".to_string(),
        });
    }

    Ok(work_dir.join(filename))
}

/// Create or truncate `path` and write `content` to it. `mode` applies only when the file is
/// created.
async fn write_temp_file(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let write_error = |source: std::io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).await.map_err(write_error)?;
    file.write_all(content).await.map_err(write_error)?;
    file.flush().await.map_err(write_error)?;

    Ok(())
}
