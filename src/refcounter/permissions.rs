//! File and directory permission policy, passed in rather than hard-coded.

/// Permissions used when `RefCounter` creates counter files and any missing
/// parent directories.
#[derive(Debug, Clone, Copy)]
pub struct RefCounterPermissions {
    /// Unix mode bits for a newly created counter file. Ignored on
    /// non-unix targets, where the platform default applies.
    pub file_mode: u32,
    /// Unix mode bits for a newly created parent directory.
    pub dir_mode: u32,
}

impl Default for RefCounterPermissions {
    fn default() -> Self {
        Self {
            file_mode: 0o644,
            dir_mode: 0o755,
        }
    }
}

#[cfg(unix)]
pub(crate) fn open_options_for_create(
    perms: &RefCounterPermissions,
) -> std::fs::OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = std::fs::OpenOptions::new();
    options
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(perms.file_mode);
    options
}

#[cfg(not(unix))]
pub(crate) fn open_options_for_create(
    _perms: &RefCounterPermissions,
) -> std::fs::OpenOptions {
    let mut options = std::fs::OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);
    options
}

#[cfg(unix)]
pub(crate) fn create_dir_all(
    path: &std::path::Path,
    perms: &RefCounterPermissions,
) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(perms.dir_mode)
        .create(path)
}

#[cfg(not(unix))]
pub(crate) fn create_dir_all(
    path: &std::path::Path,
    _perms: &RefCounterPermissions,
) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}
