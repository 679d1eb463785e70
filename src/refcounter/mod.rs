//! Crash-safe, persistent, per-sector reference counter for a single
//! file-contract's stored sectors.

mod applier;
mod permissions;

pub use applier::recover_pending;
pub use permissions::RefCounterPermissions;

use crate::codec::{self, WalUpdate};
use crate::wal::{Wal, WalTransactionHandle};
use crate::Error;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The three states an update session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Open,
    Deleted,
}

/// A persistent reference counter over one counter file.
///
/// Mutating operations are modeled with `&mut self`: this type is mutated
/// only by its single owner thread and is never designed to be mutated from
/// one thread while read from another. Requiring `&mut self` makes the
/// borrow checker enforce that instead of leaving it as a convention.
pub struct RefCounter {
    path: PathBuf,
    num_sectors: u64,
    wal: Arc<dyn Wal>,
    perms: RefCounterPermissions,
    update_in_progress: bool,
    deleted: bool,
    new_sector_counts: HashMap<u64, u16>,
}

impl RefCounter {
    /// Creates a fresh counter file at `path` with `num_sectors` counters,
    /// each initialized to 1, and returns the in-memory handle.
    pub fn new_ref_counter(
        path: impl AsRef<Path>,
        num_sectors: u64,
        wal: Arc<dyn Wal>,
    ) -> Result<Self, Error> {
        Self::new_ref_counter_with_permissions(path, num_sectors, wal, RefCounterPermissions::default())
    }

    pub fn new_ref_counter_with_permissions(
        path: impl AsRef<Path>,
        num_sectors: u64,
        wal: Arc<dyn Wal>,
        perms: RefCounterPermissions,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                permissions::create_dir_all(parent, &perms)?;
            }
        }

        let mut file = permissions::open_options_for_create(&perms).open(&path)?;
        let mut buf = Vec::with_capacity((codec::HEADER_SIZE + codec::COUNTER_SIZE * num_sectors) as usize);
        buf.extend_from_slice(&codec::encode_header());
        for _ in 0..num_sectors {
            buf.extend_from_slice(&codec::encode_counter(1));
        }
        use std::io::Write;
        file.write_all(&buf)?;
        file.sync_all()?;

        Ok(Self {
            path,
            num_sectors,
            wal,
            perms,
            update_in_progress: false,
            deleted: false,
            new_sector_counts: HashMap::new(),
        })
    }

    /// Reopens an existing counter file, validating its header.
    ///
    /// Fails with `Error::NotFound` if the file does not exist, with an
    /// I/O end-of-file error if the header is truncated, and with
    /// `Error::InvalidVersion` if the header tag is unrecognized.
    pub fn load_ref_counter(path: impl AsRef<Path>, wal: Arc<dyn Wal>) -> Result<Self, Error> {
        Self::load_ref_counter_with_permissions(path, wal, RefCounterPermissions::default())
    }

    pub fn load_ref_counter_with_permissions(
        path: impl AsRef<Path>,
        wal: Arc<dyn Wal>,
        perms: RefCounterPermissions,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file_len = file.metadata()?.len();
        if file_len < codec::HEADER_SIZE {
            return Err(Error::IOError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "counter file header truncated",
            )));
        }
        let mut header = vec![0u8; codec::HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        codec::decode_header(&header)?;

        let num_sectors = (file_len - codec::HEADER_SIZE) / codec::COUNTER_SIZE;

        Ok(Self {
            path,
            num_sectors,
            wal,
            perms,
            update_in_progress: false,
            deleted: false,
            new_sector_counts: HashMap::new(),
        })
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        if self.deleted {
            SessionState::Deleted
        } else if self.update_in_progress {
            SessionState::Open
        } else {
            SessionState::Idle
        }
    }

    /// Number of sectors currently tracked.
    pub fn num_sectors(&self) -> u64 {
        self.num_sectors
    }

    /// Absolute path of the counter file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens an update session. Mutating operations are only legal while a
    /// session is open.
    pub fn start_update(&mut self) -> Result<(), Error> {
        if self.deleted {
            return Err(Error::UpdateAfterDelete);
        }
        self.update_in_progress = true;
        Ok(())
    }

    /// Closes the update session opened by `start_update`, following a
    /// successful `create_and_apply_transaction`.
    pub fn update_applied(&mut self) -> Result<(), Error> {
        self.update_in_progress = false;
        Ok(())
    }

    fn require_open_session(&self) -> Result<(), Error> {
        if self.deleted {
            return Err(Error::UpdateAfterDelete);
        }
        if !self.update_in_progress {
            return Err(Error::UpdateWithoutUpdateSession);
        }
        Ok(())
    }

    fn require_valid_index(&self, index: u64) -> Result<(), Error> {
        if index >= self.num_sectors {
            return Err(Error::InvalidSectorNumber {
                index,
                num_sectors: self.num_sectors,
            });
        }
        Ok(())
    }

    /// Reads the on-disk counter for sector `index`, bypassing any pending
    /// in-session override.
    fn read_count_from_disk(&self, index: u64) -> Result<u16, Error> {
        let mut file = File::open(&self.path)?;
        let mut buf = [0u8; codec::COUNTER_SIZE as usize];
        use std::io::{Read as _, Seek, SeekFrom};
        file.seek(SeekFrom::Start(codec::sector_offset(index)))?;
        file.read_exact(&mut buf)?;
        codec::decode_counter(&buf)
    }

    /// Current value of sector `index`: the pending staged value if one
    /// exists in this session, otherwise the on-disk value.
    pub fn count(&self, index: u64) -> Result<u16, Error> {
        self.require_valid_index(index)?;
        if let Some(v) = self.new_sector_counts.get(&index) {
            return Ok(*v);
        }
        self.read_count_from_disk(index)
    }

    /// Increments sector `index`'s counter by one.
    pub fn increment(&mut self, index: u64) -> Result<WalUpdate, Error> {
        self.require_open_session()?;
        self.require_valid_index(index)?;
        let current = self.count(index)?;
        if current == u16::MAX {
            return Err(Error::CounterOverflow { index });
        }
        let new_value = current + 1;
        self.new_sector_counts.insert(index, new_value);
        Ok(WalUpdate::WriteAt {
            path: self.path_string(),
            sector_index: index,
            value: new_value,
        })
    }

    /// Decrements sector `index`'s counter by one.
    pub fn decrement(&mut self, index: u64) -> Result<WalUpdate, Error> {
        self.require_open_session()?;
        self.require_valid_index(index)?;
        let current = self.count(index)?;
        if current == 0 {
            return Err(Error::CounterUnderflow { index });
        }
        let new_value = current - 1;
        self.new_sector_counts.insert(index, new_value);
        Ok(WalUpdate::WriteAt {
            path: self.path_string(),
            sector_index: index,
            value: new_value,
        })
    }

    /// Appends a new sector, initialized to 1.
    pub fn append(&mut self) -> Result<WalUpdate, Error> {
        self.require_open_session()?;
        let new_index = self.num_sectors;
        self.new_sector_counts.insert(new_index, 1);
        self.num_sectors += 1;
        Ok(WalUpdate::WriteAt {
            path: self.path_string(),
            sector_index: new_index,
            value: 1,
        })
    }

    /// Drops the last `n` sectors.
    pub fn drop_sectors(&mut self, n: u64) -> Result<WalUpdate, Error> {
        self.require_open_session()?;
        if n > self.num_sectors {
            return Err(Error::InvalidSectorNumber {
                index: n,
                num_sectors: self.num_sectors,
            });
        }
        let new_len = self.num_sectors - n;
        self.new_sector_counts.retain(|&index, _| index < new_len);
        self.num_sectors = new_len;
        Ok(WalUpdate::Truncate {
            path: self.path_string(),
            new_num_sectors: new_len,
        })
    }

    /// Exchanges the pending values of sectors `i` and `j`.
    ///
    /// Its own inverse: swapping the same pair twice leaves every counter
    /// unchanged.
    pub fn swap(&mut self, i: u64, j: u64) -> Result<[WalUpdate; 2], Error> {
        self.require_open_session()?;
        self.require_valid_index(i)?;
        self.require_valid_index(j)?;
        let vi = self.count(i)?;
        let vj = self.count(j)?;
        self.new_sector_counts.insert(i, vj);
        self.new_sector_counts.insert(j, vi);
        Ok([
            WalUpdate::WriteAt {
                path: self.path_string(),
                sector_index: i,
                value: vj,
            },
            WalUpdate::WriteAt {
                path: self.path_string(),
                sector_index: j,
                value: vi,
            },
        ])
    }

    /// Marks this counter for deletion. Further mutations in this session
    /// fail with `Error::UpdateAfterDelete`.
    pub fn delete_ref_counter(&mut self) -> Result<WalUpdate, Error> {
        self.require_open_session()?;
        self.deleted = true;
        Ok(WalUpdate::Delete {
            path: self.path_string(),
        })
    }

    /// Commits `updates` through the WAL and applies each one in order.
    ///
    /// The caller must still call `update_applied` to close the session
    /// afterward.
    pub fn create_and_apply_transaction(&self, updates: Vec<WalUpdate>) -> Result<(), Error> {
        if self.deleted {
            return Err(Error::UpdateAfterDelete);
        }
        if !self.update_in_progress {
            return Err(Error::UpdateWithoutUpdateSession);
        }
        let handle: WalTransactionHandle = self.wal.begin_transaction(updates.clone())?;
        for update in &updates {
            applier::apply_update(update, &self.perms)?;
        }
        self.wal.signal_applied(handle)?;
        Ok(())
    }

    fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::InMemoryWal;
    use tempfile::tempdir;

    fn new_counter(dir: &tempfile::TempDir, num_sectors: u64) -> (RefCounter, Arc<InMemoryWal>) {
        let wal = Arc::new(InMemoryWal::new());
        let path = dir.path().join("contract.rc");
        let rc = RefCounter::new_ref_counter(path, num_sectors, wal.clone()).unwrap();
        (rc, wal)
    }

    #[test]
    fn new_counter_initializes_every_sector_to_one() {
        let dir = tempdir().unwrap();
        let (rc, _wal) = new_counter(&dir, 5);
        for i in 0..5 {
            assert_eq!(rc.count(i).unwrap(), 1);
        }
        let len = std::fs::metadata(rc.path()).unwrap().len();
        assert_eq!(len, 8 + 2 * 5);
    }

    #[test]
    fn append_grows_file_and_sector_count() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 5);
        rc.start_update().unwrap();
        let update = rc.append().unwrap();
        rc.create_and_apply_transaction(vec![update]).unwrap();
        rc.update_applied().unwrap();

        assert_eq!(std::fs::metadata(rc.path()).unwrap().len(), 8 + 2 * 6);
        assert_eq!(rc.count(5).unwrap(), 1);
    }

    #[test]
    fn decrement_to_zero() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 5);
        rc.start_update().unwrap();
        let update = rc.decrement(3).unwrap();
        rc.create_and_apply_transaction(vec![update]).unwrap();
        rc.update_applied().unwrap();
        assert_eq!(rc.count(3).unwrap(), 0);
    }

    #[test]
    fn swap_semantics() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 5);
        rc.start_update().unwrap();
        let inc = rc.increment(4).unwrap();
        let swaps = rc.swap(3, 4).unwrap();
        rc.create_and_apply_transaction(vec![inc, swaps[0].clone(), swaps[1].clone()])
            .unwrap();
        rc.update_applied().unwrap();
        assert_eq!(rc.count(3).unwrap(), 2);
        assert_eq!(rc.count(4).unwrap(), 1);
    }

    #[test]
    fn delete_terminality() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 5);
        rc.start_update().unwrap();
        let delete = rc.delete_ref_counter().unwrap();
        let err = rc.increment(0).unwrap_err();
        assert!(matches!(err, Error::UpdateAfterDelete));

        rc.create_and_apply_transaction(vec![delete]).unwrap();
        assert!(!rc.path().exists());

        let err = rc.start_update().unwrap_err();
        assert!(matches!(err, Error::UpdateAfterDelete));
    }

    #[test]
    fn header_validation() {
        let dir = tempdir().unwrap();
        let wal: Arc<dyn Wal> = Arc::new(InMemoryWal::new());

        let short_path = dir.path().join("short.rc");
        std::fs::write(&short_path, [1, 2, 3, 4]).unwrap();
        let err = RefCounter::load_ref_counter(&short_path, wal.clone()).unwrap_err();
        assert!(matches!(err, Error::IOError(_)));

        let bad_version_path = dir.path().join("bad_version.rc");
        let mut bytes = vec![0xffu8; 16];
        bytes[0..8].copy_from_slice(b"NOTREAL!");
        std::fs::write(&bad_version_path, bytes).unwrap();
        let err = RefCounter::load_ref_counter(&bad_version_path, wal).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion));
    }

    #[test]
    fn load_of_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let wal: Arc<dyn Wal> = Arc::new(InMemoryWal::new());
        let err = RefCounter::load_ref_counter(dir.path().join("nope.rc"), wal).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn mutation_without_session_fails() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 2);
        let err = rc.increment(0).unwrap_err();
        assert!(matches!(err, Error::UpdateWithoutUpdateSession));
    }

    #[test]
    fn increment_then_decrement_is_identity() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 2);
        rc.start_update().unwrap();
        let inc = rc.increment(0).unwrap();
        let dec = rc.decrement(0).unwrap();
        rc.create_and_apply_transaction(vec![inc, dec]).unwrap();
        rc.update_applied().unwrap();
        assert_eq!(rc.count(0).unwrap(), 1);
    }

    #[test]
    fn increment_overflow_is_an_error() {
        let dir = tempdir().unwrap();
        let wal = Arc::new(InMemoryWal::new());
        let path = dir.path().join("c.rc");
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .unwrap();
        use std::io::Write;
        file.write_all(&codec::encode_header()).unwrap();
        file.write_all(&codec::encode_counter(u16::MAX)).unwrap();
        drop(file);

        let mut rc = RefCounter::load_ref_counter(&path, wal).unwrap();
        rc.start_update().unwrap();
        let err = rc.increment(0).unwrap_err();
        assert!(matches!(err, Error::CounterOverflow { .. }));
    }

    #[test]
    fn decrement_underflow_is_an_error() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 1);
        rc.start_update().unwrap();
        let dec = rc.decrement(0).unwrap();
        rc.create_and_apply_transaction(vec![dec]).unwrap();
        rc.update_applied().unwrap();

        rc.start_update().unwrap();
        let err = rc.decrement(0).unwrap_err();
        assert!(matches!(err, Error::CounterUnderflow { .. }));
    }

    #[test]
    fn drop_sectors_shrinks_and_invalidates_indices() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 5);
        rc.start_update().unwrap();
        let update = rc.drop_sectors(2).unwrap();
        rc.create_and_apply_transaction(vec![update]).unwrap();
        rc.update_applied().unwrap();

        assert_eq!(std::fs::metadata(rc.path()).unwrap().len(), 8 + 2 * 3);
        let err = rc.count(3).unwrap_err();
        assert!(matches!(err, Error::InvalidSectorNumber { .. }));
    }

    #[test]
    fn double_swap_is_its_own_inverse() {
        let dir = tempdir().unwrap();
        let (mut rc, _wal) = new_counter(&dir, 3);
        rc.start_update().unwrap();
        let before = (rc.count(0).unwrap(), rc.count(1).unwrap());
        let first = rc.swap(0, 1).unwrap();
        let second = rc.swap(0, 1).unwrap();
        rc.create_and_apply_transaction(vec![
            first[0].clone(),
            first[1].clone(),
            second[0].clone(),
            second[1].clone(),
        ])
        .unwrap();
        rc.update_applied().unwrap();
        assert_eq!((rc.count(0).unwrap(), rc.count(1).unwrap()), before);
    }
}
