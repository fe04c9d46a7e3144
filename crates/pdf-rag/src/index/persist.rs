//! Data-only on-disk format for a [`VectorIndex`](super::VectorIndex)
//!
//! ```text
//! <dir>/manifest.json   format version, embedder, shape, payload checksums
//! <dir>/vectors.bin     count x dimension little-endian f32, row-major
//! <dir>/docstore.json   slot -> id list and id -> page map
//! ```
//!
//! Nothing in the directory is executable; a load only ever parses numbers and
//! JSON records. The checksums catch truncation and accidental edits, not a
//! deliberate forger with write access to the directory.

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::PageDocument;

use super::flat::FlatL2Index;

/// Bumped whenever the layout below changes
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";
const DOCSTORE_FILE: &str = "docstore.json";

/// Header describing a persisted index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub format_version: u32,
    /// Name of the embedder that produced the vectors
    pub embedder: String,
    pub dimension: usize,
    pub count: usize,
    pub vectors_sha256: String,
    pub docstore_sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocstoreFile {
    pub index_to_docstore_id: Vec<String>,
    pub docstore: HashMap<String, PageDocument>,
}

/// Everything read back from disk, already verified
pub(crate) struct LoadedParts {
    pub manifest: Manifest,
    pub flat: FlatL2Index,
    pub docstore: DocstoreFile,
}

/// Whether `dir` looks like a persisted index
pub fn exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn encode_vectors(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.put_f32_le(*v);
    }
    buf
}

fn decode_vectors(mut bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::unsafe_index(format!(
            "{} is {} bytes, not a whole number of f32 values",
            VECTORS_FILE,
            bytes.len()
        )));
    }
    let mut values = Vec::with_capacity(bytes.len() / 4);
    while bytes.has_remaining() {
        values.push(bytes.get_f32_le());
    }
    Ok(values)
}

fn staging_dir(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| Error::index(format!("invalid index path {}", target.display())))?
        .to_string_lossy();
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4())))
}

/// Write an index into `dir`, replacing whatever was there.
///
/// Files are staged in a sibling directory and renamed into place, so readers
/// see either the old index or the new one.
pub(crate) fn save(
    dir: &Path,
    embedder: &str,
    flat: &FlatL2Index,
    docstore: &DocstoreFile,
) -> Result<Manifest> {
    let vectors = encode_vectors(flat.as_slice());
    let docs = serde_json::to_vec(docstore)?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        embedder: embedder.to_string(),
        dimension: flat.dimension(),
        count: flat.len(),
        vectors_sha256: sha256_hex(&vectors),
        docstore_sha256: sha256_hex(&docs),
        created_at: Utc::now(),
    };

    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_dir(dir)?;
    fs::create_dir_all(&staging)?;

    let written = (|| -> Result<()> {
        fs::write(staging.join(VECTORS_FILE), &vectors)?;
        fs::write(staging.join(DOCSTORE_FILE), &docs)?;
        // Manifest last: its presence marks a complete directory.
        fs::write(
            staging.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::rename(&staging, dir)?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    tracing::info!(
        "Saved index to {} ({} vectors, {} dimensions)",
        dir.display(),
        manifest.count,
        manifest.dimension
    );

    Ok(manifest)
}

/// Read and verify a persisted index
pub(crate) fn load(dir: &Path, expected_embedder: &str) -> Result<LoadedParts> {
    let manifest: Manifest = serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)
        .map_err(|e| Error::unsafe_index(format!("unreadable manifest: {}", e)))?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(Error::unsafe_index(format!(
            "format version {} is not supported (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }
    if manifest.embedder != expected_embedder {
        return Err(Error::unsafe_index(format!(
            "index was built with embedder '{}' but '{}' is running; rebuild with --reindex",
            manifest.embedder, expected_embedder
        )));
    }

    let vectors = fs::read(dir.join(VECTORS_FILE))?;
    if sha256_hex(&vectors) != manifest.vectors_sha256 {
        return Err(Error::unsafe_index(format!("{} checksum mismatch", VECTORS_FILE)));
    }
    let docs = fs::read(dir.join(DOCSTORE_FILE))?;
    if sha256_hex(&docs) != manifest.docstore_sha256 {
        return Err(Error::unsafe_index(format!("{} checksum mismatch", DOCSTORE_FILE)));
    }

    let expected = manifest
        .count
        .checked_mul(manifest.dimension)
        .ok_or_else(|| {
            Error::unsafe_index(format!(
                "manifest shape {} x {} is out of range",
                manifest.count, manifest.dimension
            ))
        })?;
    let values = decode_vectors(&vectors)?;
    if values.len() != expected {
        return Err(Error::unsafe_index(format!(
            "expected {} x {} values, found {}",
            manifest.count,
            manifest.dimension,
            values.len()
        )));
    }
    let flat = FlatL2Index::from_raw(manifest.dimension, values)
        .map_err(|e| Error::unsafe_index(e.to_string()))?;

    let docstore: DocstoreFile = serde_json::from_slice(&docs)
        .map_err(|e| Error::unsafe_index(format!("unreadable docstore: {}", e)))?;

    if docstore.index_to_docstore_id.len() != manifest.count {
        return Err(Error::unsafe_index(format!(
            "docstore maps {} slots but {} vectors are stored",
            docstore.index_to_docstore_id.len(),
            manifest.count
        )));
    }
    if let Some(missing) = docstore
        .index_to_docstore_id
        .iter()
        .find(|id| !docstore.docstore.contains_key(*id))
    {
        return Err(Error::unsafe_index(format!(
            "slot refers to unknown document id {}",
            missing
        )));
    }

    Ok(LoadedParts {
        manifest,
        flat,
        docstore,
    })
}
