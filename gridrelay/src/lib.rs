//! # gridrelay: GridFS to Telegram photo relay
//!
//! `gridrelay` drains a MongoDB GridFS bucket of listing photos. For every stored image it
//! decodes the listing fields packed into the filename, posts a text message and the photo to a
//! single Telegram chat, then deletes the object from the store and removes its local copy.
//!
//! ## Overview
//!
//! A run is one sequential pass over the bucket's files collection:
//!
//! 1. [`Application::new`] connects to the store (bounded by `store.connect_timeout`) and builds
//!    the Telegram client from configuration.
//! 2. [`Application::run`] hands both to a [`Relay`], which enumerates records lazily and relays
//!    them one at a time. Nothing runs concurrently.
//! 3. The run ends when the cursor is exhausted, or at the first error unless
//!    `relay.on_record_error` is `skip`.
//!
//! Listing filenames look like `<brand>_<web id>?<phone number>?<description>?<complications>`;
//! see [`listing`] for the exact decoding rules.
//!
//! ## Delivery semantics
//!
//! Relaying is not idempotent. The object is deleted only after both messages were accepted, so
//! a crash or error between sending and deleting leaves the object in place and the next run
//! sends the same listing again.
//!
//! ## Modules
//!
//! - [`config`]: YAML + environment configuration with validation
//! - [`store`]: the [`ImageStore`] seam, GridFS and in-memory backends
//! - [`messenger`]: the [`Messenger`] seam, Telegram and recording implementations
//! - [`relay`]: the per-record transaction and the run loop
//! - [`telemetry`]: tracing subscriber and optional OTLP export

use std::sync::Arc;

use tracing::info;

pub mod config;
pub mod errors;
pub mod listing;
pub mod messenger;
pub mod relay;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod test;

pub use config::Config;
pub use messenger::Messenger;
pub use relay::{Relay, RunSummary};
pub use store::ImageStore;

use messenger::telegram::TelegramMessenger;
use store::gridfs::GridFsImageStore;

/// Main application handle: configured collaborators ready for a single run.
pub struct Application {
    relay: Relay,
}

impl Application {
    /// Connect to the document store and set up the Telegram client.
    ///
    /// A failure here ends the process, so it is logged and telemetry is flushed before
    /// returning.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting relay with configuration: {:#?}", config);

        let result = Self::connect(config).await;
        if let Err(e) = &result {
            tracing::error!("Relay startup failed: {e:#}");
            finish_telemetry();
        }
        result
    }

    async fn connect(config: Config) -> anyhow::Result<Self> {
        let store = GridFsImageStore::connect(&config.store).await?;
        let messenger = TelegramMessenger::new(&config.telegram)?;

        Ok(Self::with_collaborators(Arc::new(store), Arc::new(messenger), config))
    }

    /// Build an application around existing collaborators.
    pub fn with_collaborators(store: Arc<dyn ImageStore>, messenger: Arc<dyn Messenger>, config: Config) -> Self {
        Self {
            relay: Relay::new(store, messenger, config.relay),
        }
    }

    /// Relay every record currently in the store.
    pub async fn run(self) -> anyhow::Result<RunSummary> {
        let result = self.relay.run().await;
        if let Err(e) = &result {
            tracing::error!(kind = %e.kind(), "Relay run failed: {e}");
        }

        finish_telemetry();
        Ok(result?)
    }
}

fn finish_telemetry() {
    info!("Shutting down telemetry...");
    telemetry::shutdown_telemetry();
}
