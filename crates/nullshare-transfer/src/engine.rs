//! Transfer engine: the send and receive flows
//!
//! Send:    encrypt → upload `{id}.enc` → publish record → compose link →
//!          remove local plaintext (optional, best-effort)
//! Receive: parse link → read record (gated) → download → decrypt →
//!          persist (optional) → count the download
//!
//! Each flow is a single chain of awaits. Nothing is retried here and
//! nothing is rolled back: an upload followed by a failed publish leaves an
//! orphaned blob that the lifecycle policy of the bucket has to clean up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use nullshare_core::{NewTransfer, TransferError, TransferId, TransferRecord, TransferResult};
use nullshare_crypto::cipher::{decrypt_with_key, encrypt_with_key};
use nullshare_crypto::{Iv, TransferKey};
use nullshare_storage::{BlobStore, MetadataStore};

use crate::link::TransferLink;

/// MIME type used when none is given and content sniffing finds nothing
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Stage callback type
pub type StageFn = Box<dyn Fn(TransferStage) + Send + Sync>;

/// Milestones reported to a `StageFn` while a flow runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Encrypting,
    Uploading,
    Publishing,
    FetchingMetadata,
    Downloading,
    Decrypting,
    Saving,
    Done,
}

impl TransferStage {
    pub fn describe(self) -> &'static str {
        match self {
            TransferStage::Encrypting => "encrypting",
            TransferStage::Uploading => "uploading ciphertext",
            TransferStage::Publishing => "publishing transfer record",
            TransferStage::FetchingMetadata => "fetching transfer record",
            TransferStage::Downloading => "downloading ciphertext",
            TransferStage::Decrypting => "decrypting",
            TransferStage::Saving => "saving file",
            TransferStage::Done => "done",
        }
    }
}

/// Result of a successful send
#[derive(Debug, Clone)]
pub struct SentTransfer {
    pub transfer_id: TransferId,
    /// Contains the key. Hand it to the recipient; never log it.
    pub link: TransferLink,
    pub record: TransferRecord,
}

/// A decrypted file held in memory
#[derive(Clone)]
pub struct ReceivedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub file_type: String,
}

impl std::fmt::Debug for ReceivedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedFile")
            .field("bytes", &self.bytes.len())
            .field("file_name", &self.file_name)
            .field("file_type", &self.file_type)
            .finish()
    }
}

/// Sniff a MIME type from content, falling back to `application/octet-stream`.
pub fn detect_file_type(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string())
}

fn report(progress: Option<&StageFn>, stage: TransferStage) {
    debug!(stage = stage.describe(), "transfer stage");
    if let Some(cb) = progress {
        cb(stage);
    }
}

/// Orchestrates the cipher, the blob store and the metadata store.
#[derive(Clone)]
pub struct TransferEngine {
    metadata: MetadataStore,
    blobs: Arc<dyn BlobStore>,
}

impl TransferEngine {
    pub fn new(metadata: MetadataStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Encrypt `bytes` under a fresh key, upload the ciphertext, publish the
    /// record and return the share link.
    ///
    /// `size` must equal `bytes.len()`.
    pub async fn send_file(
        &self,
        bytes: &[u8],
        file_name: &str,
        file_type: &str,
        size: u64,
        progress: Option<&StageFn>,
    ) -> TransferResult<SentTransfer> {
        if size != bytes.len() as u64 {
            return Err(TransferError::InvalidInput(format!(
                "declared size {size} does not match {} bytes of content",
                bytes.len()
            )));
        }

        report(progress, TransferStage::Encrypting);
        let key = TransferKey::generate();
        let sealed = encrypt_with_key(bytes, &key);

        let transfer_id = TransferId::new();
        let blob_name = format!("{transfer_id}.enc");

        report(progress, TransferStage::Uploading);
        let storage_pointer = self.blobs.upload(&blob_name, &sealed.ciphertext).await?;

        report(progress, TransferStage::Publishing);
        let new = NewTransfer {
            storage_pointer: storage_pointer.clone(),
            iv: sealed.iv,
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            size,
        };
        let record = match self.metadata.create(&transfer_id, new).await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    transfer_id = %transfer_id,
                    pointer = %storage_pointer,
                    error = %e,
                    "record publish failed; uploaded blob is orphaned"
                );
                return Err(e);
            }
        };

        report(progress, TransferStage::Done);
        info!(
            transfer_id = %transfer_id,
            file_name = %record.file_name,
            bytes = size,
            expires_at = %record.expires_at,
            "transfer sent"
        );

        Ok(SentTransfer {
            transfer_id,
            link: TransferLink::new(transfer_id, key),
            record,
        })
    }

    /// Send a local file. Without `file_type`, the type is sniffed from the
    /// content.
    ///
    /// With `remove_source`, the plaintext file is deleted once the record is
    /// published. Deletion is best-effort: a failure is logged, never
    /// returned, and a failed send leaves the file in place.
    pub async fn send_path(
        &self,
        path: &Path,
        file_type: Option<&str>,
        remove_source: bool,
        progress: Option<&StageFn>,
    ) -> TransferResult<SentTransfer> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidInput(format!("not a file path: {}", path.display()))
            })?;

        let bytes = tokio::fs::read(path).await?;
        let file_type = match file_type {
            Some(t) => t.to_string(),
            None => detect_file_type(&bytes),
        };

        let sent = self
            .send_file(&bytes, &file_name, &file_type, bytes.len() as u64, progress)
            .await?;

        if remove_source {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!(
                    transfer_id = %sent.transfer_id,
                    local = %path.display(),
                    "local plaintext removed"
                ),
                Err(e) => warn!(
                    transfer_id = %sent.transfer_id,
                    local = %path.display(),
                    error = %e,
                    "failed to remove local plaintext"
                ),
            }
        }

        Ok(sent)
    }

    /// Fetch and decrypt a transfer, then count the download.
    pub async fn receive_file(
        &self,
        transfer_id: &TransferId,
        key_hex: &str,
        progress: Option<&StageFn>,
    ) -> TransferResult<ReceivedFile> {
        let key = TransferKey::from_hex(key_hex)
            .map_err(|e| TransferError::Crypto(e.to_string()))?;

        let file = self.fetch_and_decrypt(transfer_id, &key, progress).await?;
        self.metadata.increment_download_count(transfer_id).await;

        report(progress, TransferStage::Done);
        Ok(file)
    }

    pub async fn receive_link(
        &self,
        link: &TransferLink,
        progress: Option<&StageFn>,
    ) -> TransferResult<ReceivedFile> {
        let file = self
            .fetch_and_decrypt(&link.transfer_id, link.key(), progress)
            .await?;
        self.metadata
            .increment_download_count(&link.transfer_id)
            .await;

        report(progress, TransferStage::Done);
        Ok(file)
    }

    /// Receive into `dir` and return the written path.
    ///
    /// The plaintext goes to a temp file that is renamed into place, and the
    /// download is counted only after the rename.
    pub async fn receive_to_dir(
        &self,
        link: &TransferLink,
        dir: &Path,
        progress: Option<&StageFn>,
    ) -> TransferResult<PathBuf> {
        let file = self
            .fetch_and_decrypt(&link.transfer_id, link.key(), progress)
            .await?;

        report(progress, TransferStage::Saving);
        let name = local_file_name(&file.file_name, &link.transfer_id);
        let dest = dir.join(&name);
        let tmp = dir.join(format!(".{name}.part"));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&tmp, &file.bytes).await?;
        tokio::fs::rename(&tmp, &dest).await?;

        info!(
            transfer_id = %link.transfer_id,
            local = %dest.display(),
            bytes = file.bytes.len(),
            "transfer saved"
        );

        self.metadata
            .increment_download_count(&link.transfer_id)
            .await;

        report(progress, TransferStage::Done);
        Ok(dest)
    }

    async fn fetch_and_decrypt(
        &self,
        transfer_id: &TransferId,
        key: &TransferKey,
        progress: Option<&StageFn>,
    ) -> TransferResult<ReceivedFile> {
        report(progress, TransferStage::FetchingMetadata);
        let record = self.metadata.read(transfer_id).await?;

        report(progress, TransferStage::Downloading);
        let ciphertext = self.blobs.download(&record.storage_pointer).await?;

        report(progress, TransferStage::Decrypting);
        let plaintext = Iv::from_hex(&record.iv)
            .ok()
            .and_then(|iv| decrypt_with_key(&ciphertext, key, &iv))
            // padding alone lets roughly 1 in 256 wrong keys through
            .filter(|bytes| bytes.len() as u64 == record.size)
            .ok_or(TransferError::DecryptFailure)?;

        info!(
            transfer_id = %transfer_id,
            file_name = %record.file_name,
            bytes = plaintext.len(),
            "transfer decrypted"
        );

        Ok(ReceivedFile {
            bytes: plaintext,
            file_name: record.file_name,
            file_type: record.file_type,
        })
    }
}

/// Final path component of a sender-supplied name, or `{id}.bin` when
/// nothing usable is left.
fn local_file_name(file_name: &str, transfer_id: &TransferId) -> String {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => format!("{transfer_id}.bin"),
        name => name.to_string(),
    }
}
