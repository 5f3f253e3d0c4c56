use async_trait::async_trait;
use futures::io::AsyncReadExt;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use mongodb::options::{ClientOptions, GridFsBucketOptions};
use mongodb::{Client, Collection, Database, gridfs::GridFsBucket};

use super::{ImageStore, RecordStream, decode_record};
use crate::config::StoreConfig;
use crate::errors::{Error, Result};

/// MongoDB GridFS backend.
///
/// Records are listed from the bucket's `<bucket>.files` collection as raw documents, so
/// mis-typed entries reach [`decode_record`] instead of failing inside the driver.
pub struct GridFsImageStore {
    files: Collection<Document>,
    bucket: GridFsBucket,
}

impl GridFsImageStore {
    /// Connect to the store and confirm it answers a ping.
    ///
    /// `store.connect_timeout` bounds the whole handshake: URI parsing (which may resolve SRV
    /// records), client construction and the ping. It is not set on the client options, so later
    /// downloads and deletes run under the driver's own defaults.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        match tokio::time::timeout(config.connect_timeout, Self::handshake(config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Connection {
                target: url_hosts(&config.url),
                message: format!("no response within {:?}", config.connect_timeout),
            }),
        }
    }

    async fn handshake(config: &StoreConfig) -> Result<Self> {
        let options = ClientOptions::parse(config.url.as_str()).await.map_err(|e| Error::Connection {
            target: url_hosts(&config.url),
            message: e.to_string(),
        })?;

        let target = options.hosts.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let connection_error = |message: String| Error::Connection {
            target: target.clone(),
            message,
        };

        let client = Client::with_options(options).map_err(|e| connection_error(e.to_string()))?;
        let database = client.database(&config.database);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        tracing::info!(
            hosts = %target,
            database = %config.database,
            bucket = %config.bucket,
            "Connected to document store"
        );

        Ok(Self::from_database(&database, &config.bucket))
    }

    fn from_database(database: &Database, bucket_name: &str) -> Self {
        let files = database.collection::<Document>(&format!("{bucket_name}.files"));
        let bucket = database.gridfs_bucket(GridFsBucketOptions::builder().bucket_name(bucket_name.to_string()).build());
        Self { files, bucket }
    }
}

/// Host list of a connection string, without credentials, path or options.
fn url_hosts(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let rest = rest.rsplit_once('@').map_or(rest, |(_, hosts)| hosts);
    rest.split(['/', '?']).next().unwrap_or_default().to_string()
}

#[async_trait]
impl ImageStore for GridFsImageStore {
    async fn records(&self) -> Result<RecordStream> {
        let cursor = self.files.find(doc! {}).await.map_err(|e| Error::Cursor { source: e.into() })?;

        let records = cursor
            .map_err(|e| Error::Cursor { source: e.into() })
            .map(|document| document.and_then(|document| decode_record(&document)));

        Ok(records.boxed())
    }

    #[tracing::instrument(skip_all, fields(id = %id))]
    async fn download(&self, id: ObjectId) -> Result<Vec<u8>> {
        let download_error = |source: anyhow::Error| Error::Download {
            id: id.to_hex(),
            source,
        };

        let mut stream = self
            .bucket
            .open_download_stream(Bson::ObjectId(id))
            .await
            .map_err(|e| download_error(e.into()))?;

        let mut content = Vec::new();
        stream.read_to_end(&mut content).await.map_err(|e| download_error(e.into()))?;

        tracing::debug!(bytes = content.len(), "Downloaded object");
        Ok(content)
    }

    #[tracing::instrument(skip_all, fields(id = %id))]
    async fn delete(&self, id: ObjectId) -> Result<()> {
        self.bucket.delete(Bson::ObjectId(id)).await.map_err(|e| Error::DeleteObject {
            id: id.to_hex(),
            source: e.into(),
        })?;

        tracing::debug!("Deleted object from store");
        Ok(())
    }
}
