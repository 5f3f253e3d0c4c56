use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Messenger;
use crate::errors::{Error, Result};

/// A message accepted by [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text(String),
    Photo { display_name: String, bytes: Vec<u8> },
}

/// Mock messenger for testing.
///
/// Records every successful send in order. Text or photo sends can be switched to fail, in
/// which case nothing is recorded for that call.
#[derive(Clone, Default)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail_text: Arc<Mutex<bool>>,
    fail_photo: Arc<Mutex<bool>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_text(&self, fail: bool) {
        *self.fail_text.lock() = fail;
    }

    pub fn fail_photo(&self, fail: bool) {
        *self.fail_photo.lock() = fail;
    }

    /// Get all messages sent so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, text: &str) -> Result<()> {
        if *self.fail_text.lock() {
            return Err(Error::Send {
                operation: "send text message".to_string(),
                message: "injected send failure".to_string(),
            });
        }

        self.sent.lock().push(SentMessage::Text(text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, photo: Vec<u8>, display_name: &str) -> Result<()> {
        if *self.fail_photo.lock() {
            return Err(Error::Send {
                operation: "send photo".to_string(),
                message: "injected send failure".to_string(),
            });
        }

        self.sent.lock().push(SentMessage::Photo {
            display_name: display_name.to_string(),
            bytes: photo,
        });
        Ok(())
    }
}
