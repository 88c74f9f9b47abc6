//! Advisory file locks via POSIX `fcntl`.
//!
//! UNIX generally has two independent locking facilities, `fcntl` and
//! `flock`; on some systems they are completely independent and on others
//! they interact (see the NOTES section of `man 2 flock`). Everything here
//! is `fcntl`-based: whole-file exclusive write locks, which are
//! *per-process* (a process never conflicts with locks it already holds)
//! and are released once every descriptor the process holds for the file is
//! closed.

use std::fs::File;
use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;

use rustix::fs::{AtFlags, CWD, Mode, OFlags};
use rustix::io::Errno;

use crate::trace::debug;

/// Locking failures.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process holds a conflicting lock.
    ///
    /// `pid` is the holder reported by the kernel when it could be
    /// discovered; 0 means unknown.
    #[error("conflicting lock (pid={pid})")]
    Conflict { pid: i32 },
    /// The underlying syscall failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LockError {
    /// True for the conflicting-lock case, as opposed to an I/O failure.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<Errno> for LockError {
    fn from(err: Errno) -> Self {
        Self::Io(err.into())
    }
}

/// Takes an exclusive whole-file lock, blocking until it is granted.
///
/// Interrupted waits (`EINTR`) are retried.
///
/// # Errors
///
/// [`LockError::Io`] if the syscall fails for a reason other than a
/// conflicting lock.
pub fn lock(file: impl AsFd) -> Result<(), LockError> {
    set_lock(file.as_fd().as_raw_fd(), libc::F_SETLKW)
}

/// Takes an exclusive whole-file lock, failing immediately if any other
/// process holds a conflicting one.
///
/// # Errors
///
/// [`LockError::Conflict`] when another process holds the lock,
/// [`LockError::Io`] on any other syscall failure.
pub fn try_lock(file: impl AsFd) -> Result<(), LockError> {
    set_lock(file.as_fd().as_raw_fd(), libc::F_SETLK)
}

/// Releases a previously taken whole-file lock.
///
/// # Errors
///
/// [`LockError::Io`] if the syscall fails.
pub fn unlock(file: impl AsFd) -> Result<(), LockError> {
    let lk = whole_file(libc::F_UNLCK);
    // SAFETY: the descriptor is valid for the duration of the call (borrowed
    // via AsFd) and `lk` is a properly initialized flock.
    let rc = unsafe { libc::fcntl(file.as_fd().as_raw_fd(), libc::F_SETLK, &lk) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error().into())
    }
}

/// Non-destructive probe: would [`try_lock`] succeed right now?
///
/// No lock is taken either way.
///
/// # Errors
///
/// [`LockError::Conflict`] with the holder's pid if the lock would be
/// denied, [`LockError::Io`] if the probe itself fails.
pub fn check(file: impl AsFd) -> Result<(), LockError> {
    let mut lk = whole_file(libc::F_WRLCK);
    // SAFETY: valid borrowed descriptor; the kernel writes the conflicting
    // lock description back into `lk`.
    let rc = unsafe { libc::fcntl(file.as_fd().as_raw_fd(), libc::F_GETLK, &mut lk) };
    if rc != 0 {
        return Err(io::Error::last_os_error().into());
    }
    if lk.l_type == libc::F_UNLCK as libc::c_short {
        Ok(())
    } else {
        Err(LockError::Conflict {
            pid: lk.l_pid as i32,
        })
    }
}

/// Creates `path` already holding an exclusive lock.
///
/// The file is materialized as an unnamed `O_TMPFILE` in `path`'s
/// directory, locked, and only then linked into place; there is no instant
/// at which it exists on disk unlocked. Fails if `path` already exists.
///
/// # Errors
///
/// [`LockError::Io`] on open/link failure (including an already-existing
/// path); [`LockError::Conflict`] is structurally impossible for a file no
/// other process can reach yet but is propagated for form's sake.
pub fn create_locked(path: impl AsRef<Path>, mode: Mode) -> Result<File, LockError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let fd = rustix::fs::open(dir, OFlags::TMPFILE | OFlags::RDWR | OFlags::CLOEXEC, mode)?;
    let file = File::from(fd);
    try_lock(&file)?;
    link_into_place(&file, path)?;
    debug!(path = %path.display(), "created locked file");
    Ok(file)
}

/// Publishes an `O_TMPFILE` descriptor at `path`.
fn link_into_place(file: &File, path: &Path) -> Result<(), LockError> {
    match rustix::fs::linkat(file, "", CWD, path, AtFlags::EMPTY_PATH) {
        Ok(()) => Ok(()),
        // AT_EMPTY_PATH needs CAP_DAC_READ_SEARCH on older kernels; the
        // procfs spelling of the same link is unprivileged.
        Err(Errno::NOENT | Errno::ACCESS | Errno::PERM) => {
            let via_proc = format!("/proc/self/fd/{}", file.as_raw_fd());
            rustix::fs::linkat(CWD, via_proc.as_str(), CWD, path, AtFlags::SYMLINK_FOLLOW)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn set_lock(raw: RawFd, cmd: libc::c_int) -> Result<(), LockError> {
    let lk = whole_file(libc::F_WRLCK);
    loop {
        // SAFETY: `raw` is a valid open descriptor for the duration of the
        // call and `lk` is a properly initialized flock.
        let rc = unsafe { libc::fcntl(raw, cmd, &lk) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EACCES | libc::EAGAIN) => {
                return Err(LockError::Conflict {
                    pid: conflict_holder(raw),
                });
            }
            Some(libc::EINTR) => continue,
            _ => return Err(err.into()),
        }
    }
}

/// Best-effort discovery of the pid holding the conflicting lock.
///
/// `F_SETLK` does not report the holder, only `F_GETLK` does; 0 when even
/// the probe cannot name one.
fn conflict_holder(raw: RawFd) -> i32 {
    let mut lk = whole_file(libc::F_WRLCK);
    // SAFETY: valid descriptor; the kernel writes the conflicting lock
    // description back into `lk`.
    let rc = unsafe { libc::fcntl(raw, libc::F_GETLK, &mut lk) };
    if rc == 0 && lk.l_type != libc::F_UNLCK as libc::c_short {
        lk.l_pid as i32
    } else {
        0
    }
}

fn whole_file(kind: libc::c_int) -> libc::flock {
    // zeroed: struct flock carries platform-private padding fields
    let mut lk: libc::flock = unsafe { mem::zeroed() };
    lk.l_type = kind as libc::c_short;
    lk.l_whence = libc::SEEK_SET as libc::c_short;
    // l_start = 0 with l_len = 0 covers the whole file
    lk
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn lock_then_unlock_round_trip() {
        let file = tempfile::tempfile().unwrap();
        lock(&file).unwrap();
        unlock(&file).unwrap();
    }

    #[test]
    fn check_reports_unlocked_file_as_free() {
        let file = tempfile::tempfile().unwrap();
        check(&file).unwrap();
    }

    #[test]
    fn relocking_within_one_process_succeeds() {
        // fcntl locks are per-process: a second lock from the same process
        // converts the first rather than conflicting with it.
        let file = tempfile::tempfile().unwrap();
        try_lock(&file).unwrap();
        try_lock(&file).unwrap();
        lock(&file).unwrap();
    }

    #[test]
    fn conflict_error_shape() {
        let err = LockError::Conflict { pid: 1234 };
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "conflicting lock (pid=1234)");

        let io_err = LockError::from(io::Error::other("boom"));
        assert!(!io_err.is_conflict());
    }

    #[test]
    fn create_locked_materializes_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pidfile");

        let mut file = create_locked(&path, Mode::from_raw_mode(0o600)).unwrap();
        assert!(path.exists());

        file.write_all(b"held").unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }

    #[test]
    fn create_locked_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pidfile");

        let _held = create_locked(&path, Mode::from_raw_mode(0o600)).unwrap();
        let err = create_locked(&path, Mode::from_raw_mode(0o600)).unwrap_err();
        assert!(!err.is_conflict(), "expected an EEXIST-style I/O error");
    }
}
