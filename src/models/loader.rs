//! Model bundle persistence
//!
//! A bundle file is a JSON envelope `{format_version, checksum, bundle}`.
//! The checksum is the hex SHA-256 of the exact bundle bytes in the file.
//! Saving writes a temporary file next to the destination and renames it
//! into place, so readers see either the old bundle or the new one.

use super::bundle::ModelBundle;
use crate::error::BundleLoadError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Current on-disk format
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<'a> {
    format_version: u32,
    checksum: String,
    #[serde(borrow)]
    bundle: &'a RawValue,
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Atomically write `bundle` to `path`
pub fn save_bundle<P: AsRef<Path>>(bundle: &ModelBundle, path: P) -> Result<()> {
    let path = path.as_ref();
    let body = serde_json::to_string(bundle).context("Failed to serialize model bundle")?;
    let digest = checksum(body.as_bytes());
    let raw = RawValue::from_string(body).context("Serialized bundle is not valid JSON")?;
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        checksum: digest.clone(),
        bundle: &raw,
    };
    let bytes = serde_json::to_vec(&envelope).context("Failed to serialize bundle envelope")?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("bundle");
    let temp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    if let Err(e) = write_synced(&temp, &bytes).and_then(|_| {
        fs::rename(&temp, path)
            .with_context(|| format!("Failed to move bundle into place at {}", path.display()))
    }) {
        if let Err(cleanup) = fs::remove_file(&temp) {
            warn!(path = %temp.display(), error = %cleanup, "Failed to remove temporary bundle file");
        }
        return Err(e);
    }

    info!(
        path = %path.display(),
        bundle_id = %bundle.bundle_id,
        checksum = %digest,
        bytes = bytes.len(),
        "Model bundle saved"
    );
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

/// Read, verify and validate a bundle file
pub fn load_bundle<P: AsRef<Path>>(path: P) -> Result<ModelBundle, BundleLoadError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading model bundle");

    let text = fs::read_to_string(path).map_err(|source| BundleLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let envelope: Envelope<'_> =
        serde_json::from_str(&text).map_err(|source| BundleLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if envelope.format_version != FORMAT_VERSION {
        return Err(BundleLoadError::UnsupportedVersion {
            found: envelope.format_version,
            supported: FORMAT_VERSION,
        });
    }

    let computed = checksum(envelope.bundle.get().as_bytes());
    if !computed.eq_ignore_ascii_case(&envelope.checksum) {
        return Err(BundleLoadError::Checksum {
            recorded: envelope.checksum,
            computed,
        });
    }

    let bundle: ModelBundle =
        serde_json::from_str(envelope.bundle.get()).map_err(|source| BundleLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    bundle.validate()?;

    info!(
        bundle_id = %bundle.bundle_id,
        trained_at = %bundle.trained_at,
        features = bundle.preprocessor.feature_count(),
        trees = bundle.model.trees().len(),
        "Model bundle loaded"
    );
    Ok(bundle)
}
