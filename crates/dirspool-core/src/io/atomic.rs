//! Atomic filesystem primitives used by the queue directories
//!
//! Every queue state transition is exactly one call into this module:
//! publishing a temp file, locking and unlocking are all no-replace renames.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

#[cfg(any(target_os = "linux", target_os = "macos"))]
use std::ffi::CString;

/// Rename `from` to `to`, failing with `AlreadyExists` instead of replacing `to`
///
/// # Platform Support
///
/// - **Linux**: `renameat2(AT_FDCWD, from, AT_FDCWD, to, RENAME_NOREPLACE)` (kernel 3.15+).
///   Filesystems without `RENAME_NOREPLACE` support fall back to a checked rename.
/// - **macOS**: `renamex_np(from, to, RENAME_EXCL)` (macOS 10.12+)
/// - **Others**: existence check followed by `rename`
///
/// The source side is always atomic: when two callers race to rename the
/// same `from`, exactly one succeeds and the other gets `NotFound`.
pub fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        linux_rename_noreplace(from, to)
    }

    #[cfg(target_os = "macos")]
    {
        macos_rename_noreplace(from, to)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        checked_rename(from, to)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn c_path(path: &Path) -> io::Result<CString> {
    use std::os::unix::ffi::OsStrExt;

    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path contains a NUL byte: {}", path.display()),
        )
    })
}

#[cfg(target_os = "linux")]
fn linux_rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    use libc::{c_char, c_int, c_uint, AT_FDCWD};

    // renameat2 flags
    const RENAME_NOREPLACE: c_uint = 1 << 0;

    unsafe extern "C" {
        fn renameat2(
            olddirfd: c_int,
            oldpath: *const c_char,
            newdirfd: c_int,
            newpath: *const c_char,
            flags: c_uint,
        ) -> c_int;
    }

    let from_cstr = c_path(from)?;
    let to_cstr = c_path(to)?;

    let result = unsafe {
        renameat2(
            AT_FDCWD,
            from_cstr.as_ptr(),
            AT_FDCWD,
            to_cstr.as_ptr(),
            RENAME_NOREPLACE,
        )
    };

    if result == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        // Filesystem (or kernel) without RENAME_NOREPLACE
        Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP) => {
            checked_rename(from, to)
        }
        _ => Err(err),
    }
}

#[cfg(target_os = "macos")]
fn macos_rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    use libc::{c_char, c_int, c_uint};

    // renamex_np flags
    const RENAME_EXCL: c_uint = 0x00000004;

    unsafe extern "C" {
        fn renamex_np(from: *const c_char, to: *const c_char, flags: c_uint) -> c_int;
    }

    let from_cstr = c_path(from)?;
    let to_cstr = c_path(to)?;

    let result = unsafe { renamex_np(from_cstr.as_ptr(), to_cstr.as_ptr(), RENAME_EXCL) };

    if result == 0 {
        Ok(())
    } else {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOTSUP) => checked_rename(from, to),
            _ => Err(err),
        }
    }
}

/// Best-effort no-replace rename: only safe because element names are unique.
fn checked_rename(from: &Path, to: &Path) -> io::Result<()> {
    match fs::symlink_metadata(to) {
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("rename target exists: {}", to.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::rename(from, to),
        Err(e) => Err(e),
    }
}

/// Create `path` exclusively, write `data` and fsync it
///
/// Fails with `AlreadyExists` if the path is taken; the file is never
/// truncated or shared with another writer.
pub fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Flush directory metadata so a completed rename survives a power loss.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}

/// Set the mtime of `path` to now.
pub fn touch(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_rename_noreplace_basic() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("from");
        let to = temp_dir.path().join("to");
        fs::write(&from, b"content").unwrap();

        rename_noreplace(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"content");
    }

    #[test]
    fn test_rename_noreplace_refuses_existing_target() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("from");
        let to = temp_dir.path().join("to");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = rename_noreplace(&from, &to).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
    }

    #[test]
    fn test_rename_noreplace_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("gone");
        let to = temp_dir.path().join("to");

        let err = rename_noreplace(&from, &to).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_write_synced_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.tmp");

        write_synced(&path, b"first").unwrap();
        let err = write_synced(&path, b"second").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn test_touch_refreshes_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file");
        fs::write(&path, b"x").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        touch(&path).unwrap();

        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(modified > old + Duration::from_secs(3000));
        assert_eq!(fs::read(&path).unwrap(), b"x");
    }

    #[test]
    fn test_sync_dir() {
        let temp_dir = TempDir::new().unwrap();
        sync_dir(temp_dir.path()).unwrap();
    }
}
