//! OpenDAL Operator factory for nullshare storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;

use nullshare_core::config::{StorageBackend, StorageConfig};

/// S3 access credentials
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

/// Minimal settings needed to build an S3 operator
/// (full config lives in nullshare-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub credentials: S3Credentials,
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Path-style addressing (the opendal 0.55 default) is kept so that MinIO and
/// SeaweedFS work without extra settings.
pub fn build_s3_operator(cfg: &S3Settings) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.credentials.access_key_id)
        .secret_access_key(cfg.credentials.secret_access_key.expose_secret());

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator rooted at a local directory.
pub fn build_fs_operator(root: &Path) -> Result<Operator> {
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());

    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();

    Ok(op)
}

/// Build an in-process memory operator. Contents vanish with the process.
pub fn build_memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Build an operator from nullshare-core config.
///
/// `credentials` is required for the s3 backend and ignored otherwise. If
/// `enforce_tls` is true and the S3 endpoint uses HTTP, this returns an error;
/// otherwise a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &StorageConfig,
    credentials: Option<S3Credentials>,
) -> Result<Operator> {
    match storage.backend {
        StorageBackend::S3 => {
            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials and ciphertext travel unencrypted. \
                     Set storage.enforce_tls = true and use HTTPS in production."
                );
            }
            let credentials = credentials.context("S3 backend selected but no credentials provided")?;

            build_s3_operator(&S3Settings {
                endpoint: storage.endpoint.clone(),
                region: storage.region.clone(),
                bucket: storage.bucket.clone(),
                credentials,
            })
        }
        StorageBackend::Fs => build_fs_operator(&storage.root),
        StorageBackend::Memory => build_memory_operator(),
    }
}
