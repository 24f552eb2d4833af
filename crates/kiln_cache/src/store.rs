//! Versioned on-disk store of compiled scripts.
//!
//! Records live at `<root>/<runtime-version><profile-suffix>/<key>.rec`. Each
//! file starts with a length-prefixed header holding magic bytes, the record
//! format version, the runtime version, the optimization profile, the source
//! identity, and a checksum of the payload. Anything that does not validate is
//! a miss. Old records are left in place; pruning the store is an external
//! maintenance task.

use std::io::Write;
use std::path::{Path, PathBuf};

use kiln_common::{CompiledUnits, ContentHash};
use kiln_source::SourceFingerprint;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::key::{CacheKey, OptimizationProfile};
use crate::record::StoredRecord;

/// Magic bytes identifying a kiln record.
const RECORD_MAGIC: [u8; 4] = *b"KILN";

/// Current record layout version. Increment on breaking changes to the
/// header or payload layout.
const RECORD_FORMAT_VERSION: u32 = 1;

/// File extension of record files.
const RECORD_EXT: &str = "rec";

/// Record kind used for whole-script compilations.
const SCRIPT_KIND: &str = "script";

/// Header prepended to every record for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordHeader {
    magic: [u8; 4],
    format_version: u32,
    runtime_version: String,
    profile: OptimizationProfile,
    source_identity: ContentHash,
    strict: bool,
    checksum: ContentHash,
}

/// On-disk cache of compiled scripts for one runtime version and profile.
pub struct PersistentStore {
    dir: PathBuf,
    runtime_version: String,
    profile: OptimizationProfile,
    min_size: usize,
}

impl PersistentStore {
    /// Opens (creating if needed) the store family for `runtime_version` and
    /// `profile` under `root`.
    ///
    /// Sources shorter than `min_size` bytes are not eligible for persistence.
    pub fn open(
        root: &Path,
        runtime_version: &str,
        profile: OptimizationProfile,
        min_size: usize,
    ) -> Result<Self, CacheError> {
        let dir = root.join(format!(
            "{}{}",
            sanitize_version(runtime_version),
            profile.dir_suffix()
        ));
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self {
            dir,
            runtime_version: runtime_version.to_string(),
            profile,
            min_size,
        })
    }

    /// Directory holding this store's records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The optimization profile of this store.
    pub fn profile(&self) -> OptimizationProfile {
        self.profile
    }

    /// Returns `true` if a source is large enough to be worth persisting.
    pub fn is_eligible(&self, fingerprint: &SourceFingerprint) -> bool {
        fingerprint.length() >= self.min_size
    }

    /// Derives the key of the whole-script record for a source.
    pub fn cache_key(&self, fingerprint: &SourceFingerprint) -> CacheKey {
        CacheKey::derive(SCRIPT_KIND, fingerprint, &self.runtime_version, self.profile)
    }

    /// Returns the file path of the record with the given key.
    pub fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXT}"))
    }

    /// Writes a record and returns its path.
    ///
    /// The record is written to a temporary file in the store directory and
    /// then renamed into place, so readers see either the old record or the
    /// complete new one.
    pub fn store(
        &self,
        key: &CacheKey,
        fingerprint: &SourceFingerprint,
        units: &CompiledUnits,
        compilation_id: u64,
    ) -> Result<PathBuf, CacheError> {
        let record = StoredRecord {
            cache_key: key.to_string(),
            units: units.clone(),
            compilation_id,
        };
        let payload = bincode::serde::encode_to_vec(&record, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: RECORD_FORMAT_VERSION,
            runtime_version: self.runtime_version.clone(),
            profile: self.profile,
            source_identity: fingerprint.identity(),
            strict: fingerprint.is_strict(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // Layout: 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        let path = self.record_path(key);
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&output).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        debug!(key = %key, bytes = output.len(), "persisted compiled script");
        Ok(path)
    }

    /// Loads the record for `key`, treating every failure as a miss.
    ///
    /// Stale records (other version, profile or layout) are logged at debug
    /// level; corrupt ones at warn level. Neither is reported to the caller.
    pub fn load(&self, fingerprint: &SourceFingerprint, key: &CacheKey) -> Option<StoredRecord> {
        match self.try_load(fingerprint, key) {
            Ok(Some(record)) => {
                debug!(key = %key, "persistent store hit");
                Some(record)
            }
            Ok(None) => {
                debug!(key = %key, "persistent store miss");
                None
            }
            Err(err) if err.is_stale() => {
                debug!(key = %key, error = %err, "ignoring stale persisted record");
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "ignoring unreadable persisted record");
                None
            }
        }
    }

    /// Loads and validates the record for `key`.
    ///
    /// Returns `Ok(None)` if no record exists.
    pub fn try_load(
        &self,
        fingerprint: &SourceFingerprint,
        key: &CacheKey,
    ) -> Result<Option<StoredRecord>, CacheError> {
        let path = self.record_path(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };

        if raw.len() < 4 {
            return Err(CacheError::InvalidHeader {
                path,
                reason: "file shorter than header length prefix".to_string(),
            });
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + header_len {
            return Err(CacheError::InvalidHeader {
                path,
                reason: "truncated header".to_string(),
            });
        }

        let (header, _): (RecordHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| CacheError::InvalidHeader {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

        if header.magic != RECORD_MAGIC {
            return Err(CacheError::InvalidHeader {
                path,
                reason: "bad magic bytes".to_string(),
            });
        }
        if header.format_version != RECORD_FORMAT_VERSION {
            return Err(CacheError::FormatMismatch {
                path,
                expected: RECORD_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        if header.runtime_version != self.runtime_version {
            return Err(CacheError::VersionMismatch {
                path,
                expected: self.runtime_version.clone(),
                actual: header.runtime_version,
            });
        }
        if header.profile != self.profile {
            return Err(CacheError::ProfileMismatch {
                path,
                expected: self.profile.to_string(),
                actual: header.profile.to_string(),
            });
        }
        if header.source_identity != fingerprint.identity()
            || header.strict != fingerprint.is_strict()
        {
            return Err(CacheError::SourceMismatch { path });
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        let (record, _): (StoredRecord, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(
                |e| CacheError::Serialization {
                    reason: e.to_string(),
                },
            )?;
        if record.cache_key != key.as_str() {
            return Err(CacheError::SourceMismatch { path });
        }

        Ok(Some(record))
    }
}

/// Maps a version string to a safe directory name.
fn sanitize_version(version: &str) -> String {
    version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
