//! Ciphertext blob store
//!
//! The cipher produces base64 text; storage holds raw bytes. Conversion
//! happens here, strictly (standard alphabet, padded, no whitespace), because
//! a corrupted byte looks exactly like a wrong key to the receiver.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opendal::Operator;
use tracing::{debug, info};

use nullshare_core::{TransferError, TransferResult};

/// Upload-by-name / download-by-pointer over opaque ciphertext.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `ciphertext_b64` (decoded to bytes) under `name` and return a
    /// pointer for later retrieval. Existing objects are overwritten.
    async fn upload(&self, name: &str, ciphertext_b64: &str) -> TransferResult<String>;

    /// Fetch the bytes behind `pointer`, re-encoded as base64.
    async fn download(&self, pointer: &str) -> TransferResult<String>;
}

/// Where a pointer leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobLocation {
    /// Object key readable through the operator
    Key(String),
    /// Foreign URL fetched over HTTP
    Url(String),
}

/// `BlobStore` over an OpenDAL operator.
///
/// Objects live at `{prefix}/{name}`. With a public base URL configured, the
/// returned pointer is `{public_url}/{prefix}/{name}`; otherwise it is the
/// object key itself.
#[derive(Clone)]
pub struct OperatorBlobStore {
    op: Operator,
    prefix: String,
    public_url: Option<String>,
    http: reqwest::Client,
}

impl OperatorBlobStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
            public_url: None,
            http: reqwest::Client::new(),
        }
    }

    /// Hand out public URLs instead of object keys. Empty input is ignored.
    pub fn with_public_url(mut self, public_url: &str) -> Self {
        let trimmed = public_url.trim_end_matches('/');
        self.public_url = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    fn object_key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prefix)
        }
    }

    fn pointer_for(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{base}/{key}"),
            None => key.to_string(),
        }
    }

    /// Map a pointer back to an object key or a foreign URL.
    pub fn locate(&self, pointer: &str) -> BlobLocation {
        if let Some(base) = &self.public_url {
            if let Some(key) = pointer
                .strip_prefix(base.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return BlobLocation::Key(key.to_string());
            }
        }
        if pointer.starts_with("http://") || pointer.starts_with("https://") {
            BlobLocation::Url(pointer.to_string())
        } else {
            BlobLocation::Key(pointer.to_string())
        }
    }

    async fn read_key(&self, key: &str) -> TransferResult<Vec<u8>> {
        match self.op.read(key).await {
            Ok(buf) => Ok(buf.to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                Err(TransferError::Storage(format!("blob not found: {key}")))
            }
            Err(e) => Err(TransferError::Storage(format!("reading blob {key}: {e}"))),
        }
    }

    async fn fetch_url(&self, url: &str) -> TransferResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TransferError::Storage(format!("fetching {url}: {e}")))?;
        let response = response
            .error_for_status()
            .map_err(|e| TransferError::Storage(format!("fetching {url}: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransferError::Storage(format!("reading body of {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

fn validate_name(name: &str) -> TransferResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(TransferError::InvalidInput(format!(
            "invalid blob name: {name:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for OperatorBlobStore {
    async fn upload(&self, name: &str, ciphertext_b64: &str) -> TransferResult<String> {
        validate_name(name)?;
        let bytes = STANDARD
            .decode(ciphertext_b64)
            .map_err(|e| TransferError::Crypto(format!("ciphertext is not valid base64: {e}")))?;

        let key = self.object_key(name);
        let len = bytes.len();
        self.op
            .write(&key, bytes)
            .await
            .map_err(|e| TransferError::Storage(format!("uploading {key}: {e}")))?;

        let pointer = self.pointer_for(&key);
        info!(key = %key, bytes = len, "blob uploaded");
        Ok(pointer)
    }

    async fn download(&self, pointer: &str) -> TransferResult<String> {
        let bytes = match self.locate(pointer) {
            BlobLocation::Key(key) => {
                debug!(key = %key, "downloading blob from storage");
                self.read_key(&key).await?
            }
            BlobLocation::Url(url) => {
                debug!(url = %url, "downloading blob over HTTP");
                self.fetch_url(&url).await?
            }
        };
        info!(bytes = bytes.len(), "blob downloaded");
        Ok(STANDARD.encode(bytes))
    }
}
