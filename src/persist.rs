//! Activation snapshot persistence
//!
//! Activation windows live in volatile memory against a monotonic clock
//! that restarts with the process. To survive restarts, the coordinator
//! serializes every open window into a single snapshot blob at shutdown and
//! replays it against a fresh clock base at startup.
//!
//! # File Format
//!
//! The snapshot file uses little-endian binary encoding:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Header (24 bytes)                   │
//! │  magic, version, created, crc,      │
//! │  record count                       │
//! ├─────────────────────────────────────┤
//! │ Activation records (45 bytes each)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! The blob is written and read wholesale; it is never appended to.

use std::io::{Read, Write};
use std::path::Path;

use crate::config::{ActivationKind, ConfigId, ConfigKey, ElapsedNs, MatcherId, MetricId, OwnerId};
use crate::error::PersistError;

/// Magic bytes for activation snapshot files
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"MPAS";

/// Current snapshot format version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Header size: magic (4) + version (4) + created (8) + checksum (4) +
/// record count (4)
pub const SNAPSHOT_HEADER_SIZE: usize = 24;

/// Serialized size of one activation record
pub const SNAPSHOT_RECORD_SIZE: usize = 45;

/// One persisted activation window
///
/// `remaining_ns` is the window time left at shutdown for `Active`
/// triggers; boot-pending triggers persist their full ttl (a fresh window
/// opens at restart). `ttl_ns` records the ttl the window was saved with,
/// for diagnostics; the load path applies the live trigger's ttl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRecord {
    /// Owner identity of the configuration
    pub owner: OwnerId,
    /// Configuration id
    pub config_id: ConfigId,
    /// Metric the trigger belongs to
    pub metric_id: MetricId,
    /// Triggering matcher id
    pub matcher_id: MatcherId,
    /// Window length the trigger was saved with
    pub ttl_ns: i64,
    /// Window time left at shutdown, clamped non-negative
    pub remaining_ns: i64,
    /// Activation kind of the trigger
    pub kind: ActivationKind,
}

impl ActivationRecord {
    /// Configuration key of this record
    pub fn config_key(&self) -> ConfigKey {
        ConfigKey::new(self.owner, self.config_id)
    }

    /// Serialize to bytes (little-endian, `SNAPSHOT_RECORD_SIZE` bytes)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SNAPSHOT_RECORD_SIZE);
        bytes.extend_from_slice(&self.owner.to_le_bytes());
        bytes.extend_from_slice(&self.config_id.to_le_bytes());
        bytes.extend_from_slice(&self.metric_id.to_le_bytes());
        bytes.extend_from_slice(&self.matcher_id.to_le_bytes());
        bytes.extend_from_slice(&self.ttl_ns.to_le_bytes());
        bytes.extend_from_slice(&self.remaining_ns.to_le_bytes());
        bytes.push(self.kind as u8);
        bytes
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, PersistError> {
        if data.len() < SNAPSHOT_RECORD_SIZE {
            return Err(PersistError::BufferTooShort {
                needed: SNAPSHOT_RECORD_SIZE,
                available: data.len(),
            });
        }

        let owner = OwnerId::from_le_bytes(data[0..4].try_into().unwrap());
        let config_id = ConfigId::from_le_bytes(data[4..12].try_into().unwrap());
        let metric_id = MetricId::from_le_bytes(data[12..20].try_into().unwrap());
        let matcher_id = MatcherId::from_le_bytes(data[20..28].try_into().unwrap());
        let ttl_ns = i64::from_le_bytes(data[28..36].try_into().unwrap());
        let remaining_ns = i64::from_le_bytes(data[36..44].try_into().unwrap());
        let kind = ActivationKind::from_u8(data[44]).ok_or(PersistError::UnknownActivationKind(data[44]))?;

        Ok(Self {
            owner,
            config_id,
            metric_id,
            matcher_id,
            ttl_ns,
            remaining_ns,
            kind,
        })
    }
}

/// A full activation snapshot: every open window across all configurations
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Elapsed timestamp the snapshot was taken at (shutdown time)
    pub created_ns: ElapsedNs,
    /// Persisted activation windows; `NotActive` triggers are omitted
    pub records: Vec<ActivationRecord>,
}

impl ActivationSnapshot {
    /// Create an empty snapshot taken at `created_ns`
    pub fn new(created_ns: ElapsedNs) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_ns,
            records: Vec::new(),
        }
    }

    /// Serialize the snapshot to bytes
    ///
    /// The CRC32 checksum covers everything except its own field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(SNAPSHOT_HEADER_SIZE + self.records.len() * SNAPSHOT_RECORD_SIZE);

        bytes.extend_from_slice(&SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&self.format_version.to_le_bytes());
        bytes.extend_from_slice(&self.created_ns.to_le_bytes());

        // Checksum placeholder, filled once the body is complete
        let checksum_offset = bytes.len();
        bytes.extend_from_slice(&[0u8; 4]);

        bytes.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        for record in &self.records {
            bytes.extend_from_slice(&record.to_bytes());
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes[..checksum_offset]);
        hasher.update(&bytes[checksum_offset + 4..]);
        let checksum = hasher.finalize();
        bytes[checksum_offset..checksum_offset + 4].copy_from_slice(&checksum.to_le_bytes());

        bytes
    }

    /// Deserialize a snapshot from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, PersistError> {
        if data.len() < SNAPSHOT_HEADER_SIZE {
            return Err(PersistError::BufferTooShort {
                needed: SNAPSHOT_HEADER_SIZE,
                available: data.len(),
            });
        }

        if data[0..4] != SNAPSHOT_MAGIC {
            return Err(PersistError::BadMagic);
        }

        let format_version = u32::from_le_bytes(data[4..8].try_into().unwrap());
        if format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion(format_version));
        }

        let created_ns = i64::from_le_bytes(data[8..16].try_into().unwrap());
        let stored_checksum = u32::from_le_bytes(data[16..20].try_into().unwrap());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..16]);
        hasher.update(&data[20..]);
        let computed_checksum = hasher.finalize();
        if stored_checksum != computed_checksum {
            return Err(PersistError::ChecksumMismatch {
                expected: stored_checksum,
                actual: computed_checksum,
            });
        }

        let record_count = u32::from_le_bytes(data[20..24].try_into().unwrap()) as usize;

        // The declared count must account for the body exactly; this also
        // bounds the allocation below by the actual input size.
        let needed = SNAPSHOT_HEADER_SIZE + record_count * SNAPSHOT_RECORD_SIZE;
        if needed != data.len() {
            return Err(PersistError::BufferTooShort {
                needed,
                available: data.len(),
            });
        }

        let mut records = Vec::with_capacity(record_count);
        let mut offset = SNAPSHOT_HEADER_SIZE;
        for _ in 0..record_count {
            let record = ActivationRecord::from_bytes(&data[offset..])?;
            records.push(record);
            offset += SNAPSHOT_RECORD_SIZE;
        }

        Ok(Self {
            format_version,
            created_ns,
            records,
        })
    }

    /// Write the snapshot to a file, replacing any previous snapshot
    pub fn save_to_file(&self, path: &Path) -> Result<(), PersistError> {
        let bytes = self.to_bytes();
        let mut file = std::fs::File::create(path).map_err(|e| PersistError::Io {
            reason: format!("Failed to create snapshot file: {}", e),
        })?;
        file.write_all(&bytes).map_err(|e| PersistError::Io {
            reason: format!("Failed to write snapshot file: {}", e),
        })?;
        Ok(())
    }

    /// Read a snapshot from a file
    pub fn load_from_file(path: &Path) -> Result<Self, PersistError> {
        let mut file = std::fs::File::open(path).map_err(|e| PersistError::Io {
            reason: format!("Failed to open snapshot file: {}", e),
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| PersistError::Io {
            reason: format!("Failed to read snapshot file: {}", e),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Number of persisted records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ActivationRecord {
        ActivationRecord {
            owner: 1000,
            config_id: 12345,
            metric_id: 1,
            matcher_id: 20,
            ttl_ns: 100_000_000_000,
            remaining_ns: 40_000_000_000,
            kind: ActivationKind::Immediate,
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample_record();
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), SNAPSHOT_RECORD_SIZE);

        let restored = ActivationRecord::from_bytes(&bytes).unwrap();
        assert_eq!(record, restored);
        assert_eq!(restored.config_key(), ConfigKey::new(1000, 12345));
    }

    #[test]
    fn test_record_rejects_unknown_kind() {
        let mut bytes = sample_record().to_bytes();
        bytes[44] = 0xFF;
        assert_eq!(
            ActivationRecord::from_bytes(&bytes),
            Err(PersistError::UnknownActivationKind(0xFF))
        );
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut snapshot = ActivationSnapshot::new(987_654_321);
        snapshot.records.push(sample_record());
        snapshot.records.push(ActivationRecord {
            owner: 2000,
            config_id: 6789,
            metric_id: 4,
            matcher_id: 21,
            ttl_ns: 200_000_000_000,
            remaining_ns: 200_000_000_000,
            kind: ActivationKind::OnBoot,
        });

        let bytes = snapshot.to_bytes();
        let restored = ActivationSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn test_empty_snapshot_roundtrip() {
        let snapshot = ActivationSnapshot::new(0);
        let restored = ActivationSnapshot::from_bytes(&snapshot.to_bytes()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.len(), 0);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = ActivationSnapshot::new(0).to_bytes();
        bytes[0..4].copy_from_slice(b"NOPE");
        assert_eq!(
            ActivationSnapshot::from_bytes(&bytes),
            Err(PersistError::BadMagic)
        );
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = ActivationSnapshot::new(0).to_bytes();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(
            ActivationSnapshot::from_bytes(&bytes),
            Err(PersistError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_corrupted_body_fails_checksum() {
        let mut snapshot = ActivationSnapshot::new(5);
        snapshot.records.push(sample_record());
        let mut bytes = snapshot.to_bytes();

        // Flip a byte inside the record section
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(
            ActivationSnapshot::from_bytes(&bytes),
            Err(PersistError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_record_count_must_match_body_length() {
        // Inflate the count field and refresh the checksum, so only the
        // count itself is inconsistent with the (empty) body
        let mut bytes = ActivationSnapshot::new(0).to_bytes();
        bytes[20..24].copy_from_slice(&1_000_000u32.to_le_bytes());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes[..16]);
        hasher.update(&bytes[20..]);
        bytes[16..20].copy_from_slice(&hasher.finalize().to_le_bytes());

        assert!(matches!(
            ActivationSnapshot::from_bytes(&bytes),
            Err(PersistError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_truncated_buffer() {
        let bytes = ActivationSnapshot::new(0).to_bytes();
        assert_eq!(
            ActivationSnapshot::from_bytes(&bytes[..10]),
            Err(PersistError::BufferTooShort {
                needed: SNAPSHOT_HEADER_SIZE,
                available: 10,
            })
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activations.mpas");

        let mut snapshot = ActivationSnapshot::new(42);
        snapshot.records.push(sample_record());
        snapshot.save_to_file(&path).unwrap();

        let restored = ActivationSnapshot::load_from_file(&path).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.mpas");
        assert!(matches!(
            ActivationSnapshot::load_from_file(&path),
            Err(PersistError::Io { .. })
        ));
    }
}
