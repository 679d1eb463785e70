//! Idempotent appliers for the three WAL update kinds.
//!
//! These are free functions rather than methods on `RefCounter`: they act
//! purely on the path named inside the update, so the same code path
//! applies updates both from a live `create_and_apply_transaction` call and
//! from WAL crash replay at startup.

use crate::codec::{self, WalUpdate};
use crate::refcounter::permissions::RefCounterPermissions;
use crate::Error;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

/// Applies a single update to disk. Safe to call twice with the same
/// update: re-writing the same bytes, re-truncating to the same length,
/// and re-deleting an already-absent file are all no-ops.
pub(crate) fn apply_update(update: &WalUpdate, perms: &RefCounterPermissions) -> Result<(), Error> {
    match update {
        WalUpdate::WriteAt {
            path,
            sector_index,
            value,
        } => {
            let _ = perms;
            let mut file = OpenOptions::new().write(true).open(path)?;
            file.seek(SeekFrom::Start(codec::sector_offset(*sector_index)))?;
            file.write_all(&codec::encode_counter(*value))?;
            file.sync_all()?;
            Ok(())
        }
        WalUpdate::Truncate {
            path,
            new_num_sectors,
        } => {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(codec::sector_offset(*new_num_sectors))?;
            file.sync_all()?;
            Ok(())
        }
        WalUpdate::Delete { path } => match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                crate::log_debug!("delete replay for already-absent file {path}, treating as success");
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    }
}

/// Drains and applies every transaction the WAL still holds as uncommitted,
/// then acknowledges each one. Called once at startup before any
/// `RefCounter` in the process is trusted to reflect its WAL.
pub fn recover_pending(
    wal: &dyn crate::wal::Wal,
    perms: &RefCounterPermissions,
) -> Result<usize, Error> {
    let pending = wal.recover_pending()?;
    if !pending.is_empty() {
        crate::log_warn!("replaying {} uncommitted WAL transaction(s) after restart", pending.len());
    }
    let mut applied = 0usize;
    for (handle, updates) in pending {
        for update in &updates {
            apply_update(update, perms)?;
            applied += 1;
        }
        wal.signal_applied(handle)?;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{InMemoryWal, Wal};
    use tempfile::NamedTempFile;

    #[test]
    fn double_apply_write_at_is_idempotent() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 12]).unwrap();
        let update = WalUpdate::WriteAt {
            path: file.path().to_str().unwrap().to_string(),
            sector_index: 1,
            value: 9,
        };
        let perms = RefCounterPermissions::default();
        apply_update(&update, &perms).unwrap();
        apply_update(&update, &perms).unwrap();
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(u16::from_le_bytes([bytes[10], bytes[11]]), 9);
    }

    #[test]
    fn double_apply_delete_is_idempotent() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        drop(file);
        std::fs::write(&path, vec![0u8; 8]).unwrap();
        let update = WalUpdate::Delete {
            path: path.to_str().unwrap().to_string(),
        };
        let perms = RefCounterPermissions::default();
        apply_update(&update, &perms).unwrap();
        apply_update(&update, &perms).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn recover_pending_applies_and_acks_every_transaction() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 10]).unwrap();
        let wal = InMemoryWal::new();
        let path = file.path().to_str().unwrap().to_string();
        wal.begin_transaction(vec![WalUpdate::WriteAt {
            path,
            sector_index: 0,
            value: 3,
        }])
        .unwrap();

        let perms = RefCounterPermissions::default();
        let applied = recover_pending(&wal, &perms).unwrap();
        assert_eq!(applied, 1);
        assert!(wal.recover_pending().unwrap().is_empty());

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 3);
    }
}
