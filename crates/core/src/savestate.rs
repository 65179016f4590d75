//! Save state container format.
//!
//! Wraps a core's serialized state in a small header so blobs written by one
//! core are never fed to another. Payloads are bincode-serialized and
//! deflate-compressed.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "SKST"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Core id length   |  u8
//! +------------------+
//! | Core id          |  UTF-8, `length` bytes
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

/// Magic bytes identifying a savekeep state blob.
const MAGIC: &[u8; 4] = b"SKST";
/// Current container format version.
const FORMAT_VERSION: u32 = 1;
/// Magic + version + core id length.
const HEADER_LEN: usize = 9;

/// Encode `state` into a container tagged with `core_id`.
pub fn encode<T: Serialize>(state: &T, core_id: &str) -> Result<Vec<u8>, CoreError> {
    if core_id.len() > u8::MAX as usize {
        return Err(CoreError::Corrupt(format!("core id too long: {}", core_id)));
    }
    let payload = bincode::serialize(state)
        .map_err(|e| CoreError::Corrupt(format!("serialize error: {}", e)))?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + core_id.len() + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(core_id.len() as u8);
    out.extend_from_slice(core_id.as_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a container, verifying magic, version and core id.
pub fn decode<T: DeserializeOwned>(data: &[u8], expected_core_id: &str) -> Result<T, CoreError> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::Corrupt("file too small".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(CoreError::Corrupt("bad magic".into()));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(CoreError::Corrupt(format!(
            "unsupported version {} (expected {})", version, FORMAT_VERSION)));
    }
    let id_len = data[8] as usize;
    let id_end = HEADER_LEN + id_len;
    if data.len() < id_end {
        return Err(CoreError::Corrupt("truncated header".into()));
    }
    let core_id = String::from_utf8_lossy(&data[HEADER_LEN..id_end]);
    if core_id != expected_core_id {
        return Err(CoreError::Incompatible {
            expected: expected_core_id.to_string(),
            found: core_id.into_owned(),
        });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[id_end..])
        .map_err(|e| CoreError::Corrupt(format!("decompress error: {:?}", e)))?;
    bincode::deserialize(&decompressed)
        .map_err(|e| CoreError::Corrupt(format!("deserialize error: {}", e)))
}

/// Write `state` to `path`.
pub fn save_to_file<T: Serialize>(state: &T, core_id: &str, path: &Path) -> Result<(), CoreError> {
    let out = encode(state, core_id)?;
    std::fs::write(path, out)?;
    Ok(())
}

/// Read a state from `path`. A missing file is reported as
/// [`CoreError::DoesNotExist`], distinct from other I/O failures.
pub fn load_from_file<T: DeserializeOwned>(path: &Path, core_id: &str) -> Result<T, CoreError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CoreError::DoesNotExist(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    decode(&data, core_id)
}
