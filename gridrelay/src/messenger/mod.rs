//! Outbound chat messaging.
//!
//! This module defines the `Messenger` trait so the relay can be exercised without a live
//! bot. Implementations are bound to a single destination chat when constructed.

use async_trait::async_trait;

use crate::errors::Result;

pub mod mock;
pub mod telegram;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message to the destination chat.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Send an image as a photo attachment, shown under `display_name`.
    async fn send_photo(&self, photo: Vec<u8>, display_name: &str) -> Result<()>;
}
