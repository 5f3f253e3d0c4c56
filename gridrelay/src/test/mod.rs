//! End-to-end relay runs against the in-memory store and the recording messenger.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use mongodb::bson::{doc, oid::ObjectId};
use tempfile::TempDir;

use crate::config::{Config, FailurePolicy};
use crate::errors::ErrorKind;
use crate::messenger::mock::{RecordingMessenger, SentMessage};
use crate::store::in_memory::InMemoryImageStore;
use crate::{Application, Relay};

const PHOTO: &[u8] = b"\xff\xd8\xff\xe0 fake jpeg";

struct Harness {
    dir: TempDir,
    store: InMemoryImageStore,
    messenger: RecordingMessenger,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            store: InMemoryImageStore::new(),
            messenger: RecordingMessenger::new(),
        }
    }

    fn config(&self, policy: FailurePolicy) -> Config {
        let mut config = Config::default();
        config.relay.work_dir = self.dir.path().to_path_buf();
        config.relay.on_record_error = policy;
        config
    }

    fn application(&self, policy: FailurePolicy) -> Application {
        Application::with_collaborators(
            Arc::new(self.store.clone()),
            Arc::new(self.messenger.clone()),
            self.config(policy),
        )
    }

    fn relay(&self, policy: FailurePolicy) -> Relay {
        Relay::new(
            Arc::new(self.store.clone()),
            Arc::new(self.messenger.clone()),
            self.config(policy).relay,
        )
    }

    fn work_dir(&self) -> &Path {
        self.dir.path()
    }

    fn staged_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.work_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn oid(hex: &str) -> ObjectId {
    ObjectId::from_str(hex).unwrap()
}

fn texts(sent: &[SentMessage]) -> Vec<&str> {
    sent.iter()
        .filter_map(|message| match message {
            SentMessage::Text(text) => Some(text.as_str()),
            SentMessage::Photo { .. } => None,
        })
        .collect()
}

#[test_log::test(tokio::test)]
async fn test_single_record_is_relayed_and_removed() {
    let harness = Harness::new();
    let id = oid("507f1f77bcf86cd799439011");
    harness
        .store
        .insert_with_id(id, "Apple_AB12?555-1234?Like new?Box+charger", PHOTO.to_vec());

    let summary = harness.application(FailurePolicy::Abort).run().await.unwrap();

    assert_eq!(summary.relayed, 1);
    assert!(summary.skipped.is_empty());
    assert_eq!(
        harness.messenger.sent(),
        vec![
            SentMessage::Text(
                "Марка: Apple\nWeb ID: AB12\nНомер телефона: 555-1234\nОписание: Like new\nКомплектация: Box+charger"
                    .to_string()
            ),
            SentMessage::Photo {
                display_name: "Apple_AB12?555-1234?Like new?Box+charger_507f1f77bcf86cd799439011.jpg".to_string(),
                bytes: PHOTO.to_vec(),
            },
        ]
    );
    assert!(!harness.store.contains(id));
    assert!(harness.staged_files().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_malformed_filename_aborts_before_sending() {
    let harness = Harness::new();
    let id = oid("507f1f77bcf86cd799439011");
    harness.store.insert_with_id(id, "NoSeparatorHere", PHOTO.to_vec());

    let err = harness.application(FailurePolicy::Abort).run().await.unwrap_err();
    let err = err.downcast::<crate::errors::Error>().unwrap();

    assert_eq!(err.kind(), ErrorKind::MetadataFormat);
    assert_eq!(harness.messenger.sent_count(), 0);
    assert!(harness.store.contains(id));
    // The temp file was written before decoding and is not cleaned up
    assert_eq!(
        harness.staged_files(),
        vec!["NoSeparatorHere_507f1f77bcf86cd799439011.jpg".to_string()]
    );
    assert_eq!(
        std::fs::read(harness.work_dir().join("NoSeparatorHere_507f1f77bcf86cd799439011.jpg")).unwrap(),
        PHOTO
    );
}

#[test_log::test(tokio::test)]
async fn test_unreachable_store_fails_startup_with_connection_error() {
    let mut config = Config::default();
    config.store.url = "mongodb://127.0.0.1:9".to_string();
    config.store.connect_timeout = std::time::Duration::from_millis(300);
    config.telegram.bot_token = Some("123:abc".to_string());
    config.telegram.chat_id = 42;

    let err = match Application::new(config).await {
        Ok(_) => panic!("nothing listens on port 9"),
        Err(e) => e,
    };
    let err = err.downcast::<crate::errors::Error>().unwrap();

    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[test_log::test(tokio::test)]
async fn test_empty_store_completes_without_work() {
    let harness = Harness::new();

    let summary = harness.application(FailurePolicy::Abort).run().await.unwrap();

    assert_eq!(summary.relayed, 0);
    assert!(summary.skipped.is_empty());
    assert_eq!(harness.messenger.sent_count(), 0);
    assert!(harness.staged_files().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_delete_failure_after_sending() {
    let harness = Harness::new();
    let id = oid("507f1f77bcf86cd799439011");
    harness.store.insert_with_id(id, "Apple_AB12?555-1234?Like new?Box+charger", PHOTO.to_vec());
    harness.store.fail_deletes_for(id);

    let err = harness.application(FailurePolicy::Abort).run().await.unwrap_err();
    let err = err.downcast::<crate::errors::Error>().unwrap();

    assert_eq!(err.kind(), ErrorKind::Delete);
    // Both messages went out before the delete was attempted
    assert_eq!(harness.messenger.sent_count(), 2);
    assert!(harness.store.contains(id));
    // Local removal comes after the remote delete, so the temp file is still there
    assert_eq!(
        harness.staged_files(),
        vec!["Apple_AB12?555-1234?Like new?Box+charger_507f1f77bcf86cd799439011.jpg".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn test_rerun_after_failed_delete_sends_duplicates() {
    let harness = Harness::new();
    let id = harness.store.insert("Apple_AB12?555-1234?Like new?Box+charger", PHOTO.to_vec());
    harness.store.fail_deletes_for(id);

    assert!(harness.relay(FailurePolicy::Abort).run().await.is_err());
    assert_eq!(harness.messenger.sent_count(), 2);

    harness.store.clear_failures();
    let summary = harness.relay(FailurePolicy::Abort).run().await.unwrap();
    assert_eq!(summary.relayed, 1);

    // The listing was announced twice: relaying is not idempotent
    let sent = harness.messenger.sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0], sent[2]);
    assert_eq!(sent[1], sent[3]);
    assert!(!harness.store.contains(id));
    assert!(harness.staged_files().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_abort_policy_stops_at_first_bad_record() {
    let harness = Harness::new();
    let bad = harness.store.insert("NoSeparatorHere", PHOTO.to_vec());
    let good = harness.store.insert("Apple_AB12?555-1234?Like new?Box+charger", PHOTO.to_vec());

    let err = harness.relay(FailurePolicy::Abort).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MetadataFormat);
    assert!(harness.store.contains(bad));
    assert!(harness.store.contains(good));
    assert_eq!(harness.messenger.sent_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_undecodable_document_aborts_enumeration() {
    let harness = Harness::new();
    harness.store.insert_document(doc! { "_id": ObjectId::new(), "filename": 7 });
    let good = harness.store.insert("Apple_AB12?555-1234?Like new?Box+charger", PHOTO.to_vec());

    let err = harness.relay(FailurePolicy::Abort).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(harness.store.contains(good));
    assert_eq!(harness.messenger.sent_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_skip_policy_continues_past_bad_records() {
    let harness = Harness::new();
    let bad = harness.store.insert("NoSeparatorHere", PHOTO.to_vec());
    harness.store.insert_document(doc! { "_id": ObjectId::new() });
    let good = harness.store.insert("Samsung_S1?+79991234567?Screen cracked?None", PHOTO.to_vec());

    let summary = harness.relay(FailurePolicy::Skip).run().await.unwrap();

    assert_eq!(summary.relayed, 1);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.skipped[0].id, Some(bad));
    assert_eq!(summary.skipped[0].kind, ErrorKind::MetadataFormat);
    assert_eq!(summary.skipped[1].id, None);
    assert_eq!(summary.skipped[1].kind, ErrorKind::Decode);

    assert!(harness.store.contains(bad));
    assert!(!harness.store.contains(good));
    assert_eq!(
        texts(&harness.messenger.sent()),
        vec!["Марка: Samsung\nWeb ID: S1\nНомер телефона: +79991234567\nОписание: Screen cracked\nКомплектация: None"]
    );
    // Only the skipped record's temp file is left behind
    assert_eq!(harness.staged_files(), vec![format!("NoSeparatorHere_{}.jpg", bad.to_hex())]);
}

#[test_log::test(tokio::test)]
async fn test_skip_policy_continues_past_send_failure() {
    let harness = Harness::new();
    harness.messenger.fail_text(true);
    let first = harness.store.insert("Apple_A?1?2?3", PHOTO.to_vec());
    let second = harness.store.insert("Apple_B?1?2?3", PHOTO.to_vec());

    let summary = harness.relay(FailurePolicy::Skip).run().await.unwrap();

    assert_eq!(summary.relayed, 0);
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary.skipped.iter().all(|skipped| skipped.kind == ErrorKind::Send));
    assert!(harness.store.contains(first));
    assert!(harness.store.contains(second));
}

#[test_log::test(tokio::test)]
async fn test_same_filename_different_ids_do_not_collide() {
    let harness = Harness::new();
    let first = harness.store.insert("Apple_AB12?555-1234?Like new?Box+charger", b"first".to_vec());
    let second = harness.store.insert("Apple_AB12?555-1234?Like new?Box+charger", b"second".to_vec());

    let summary = harness.relay(FailurePolicy::Abort).run().await.unwrap();
    assert_eq!(summary.relayed, 2);

    let photos: Vec<(String, Vec<u8>)> = harness
        .messenger
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            SentMessage::Photo { display_name, bytes } => Some((display_name, bytes)),
            SentMessage::Text(_) => None,
        })
        .collect();

    assert_eq!(
        photos,
        vec![
            (
                format!("Apple_AB12?555-1234?Like new?Box+charger_{}.jpg", first.to_hex()),
                b"first".to_vec()
            ),
            (
                format!("Apple_AB12?555-1234?Like new?Box+charger_{}.jpg", second.to_hex()),
                b"second".to_vec()
            ),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_filename_with_directories_stays_out_of_the_filesystem() {
    let harness = Harness::new();
    let outside = tempfile::tempdir().unwrap();
    let escaping = format!("{}/Apple_AB12?1?2?3", outside.path().display());
    let id = harness.store.insert(&escaping, PHOTO.to_vec());
    harness.store.fail_deletes_for(id);

    let err = harness.relay(FailurePolicy::Abort).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MetadataFormat);
    assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    assert!(harness.staged_files().is_empty());
    assert_eq!(harness.messenger.sent_count(), 0);
    assert!(harness.store.contains(id));
}

#[test_log::test(tokio::test)]
async fn test_skip_policy_skips_parent_directory_filenames() {
    let harness = Harness::new();
    let escaping = harness.store.insert("../Apple_AB12?1?2?3", PHOTO.to_vec());
    let good = harness.store.insert("Apple_CD34?1?2?3", PHOTO.to_vec());

    let summary = harness.relay(FailurePolicy::Skip).run().await.unwrap();

    assert_eq!(summary.relayed, 1);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].id, Some(escaping));
    assert_eq!(summary.skipped[0].kind, ErrorKind::MetadataFormat);
    assert!(harness.store.contains(escaping));
    assert!(!harness.store.contains(good));
    assert!(harness.staged_files().is_empty());
    assert_eq!(harness.messenger.sent_count(), 2);
}

#[cfg(unix)]
#[test_log::test(tokio::test)]
async fn test_temp_file_uses_configured_mode() {
    use std::os::unix::fs::PermissionsExt;

    let harness = Harness::new();
    let id = harness.store.insert("Apple_AB12?1?2?3", PHOTO.to_vec());
    harness.store.fail_deletes_for(id);

    assert!(harness.relay(FailurePolicy::Abort).run().await.is_err());

    let path = harness.work_dir().join(format!("Apple_AB12?1?2?3_{}.jpg", id.to_hex()));
    let mode = std::fs::metadata(path).unwrap().permissions().mode();
    // 0o644 before the process umask is applied
    assert_eq!(mode & 0o700, 0o600);
    assert_eq!(mode & 0o133, 0);
}
