//! # Child spawner: re-exec the current binary with the listener at fd 3.
//!
//! Forking a child is a two-step affair:
//! - [`stage`]: duplicate the listener fd, build the [`ListenerDescriptor`]
//!   and the child's command line (same executable, same argv, cwd next to the
//!   binary, parent env plus the encoded descriptor);
//! - spawn: launch the staged command with the listener placed at
//!   [`LISTENER_FD`] via `dup2` between fork and exec.
//!
//! The split keeps the descriptor payload and fd layout testable without
//! executing a process.
//!
//! The returned child is never waited on: the spawn is a hand-off, not the
//! start of a supervision hierarchy. The parent only logs the child's pid.

use std::ffi::OsString;
use std::io;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command};

use crate::config::Config;
use crate::error::SpawnError;
use crate::listener::{ListenerDescriptor, LISTENER_FD};

/// Everything needed to launch a child, short of actually spawning it.
///
/// Holds a duplicated listener handle so the underlying socket stays open
/// until the child has inherited it.
pub(crate) struct StagedChild {
    pub descriptor: ListenerDescriptor,
    pub exe: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub listener: TcpListener,
}

/// Prepares the descriptor and command line for a child process.
pub(crate) fn stage(listener: &TcpListener, cfg: &Config) -> Result<StagedChild, SpawnError> {
    // Duplicate the fd so the child gets its own reference to the socket;
    // the parent's handle becoming invalid after exit is then irrelevant.
    let dup = listener.try_clone().map_err(SpawnError::Stage)?;
    let filename = dup
        .local_addr()
        .map(|addr| addr.to_string())
        .map_err(SpawnError::Stage)?;

    let descriptor = ListenerDescriptor {
        address: cfg.bind_address().to_string(),
        fd: LISTENER_FD,
        filename,
    };
    let exe = std::env::current_exe().map_err(SpawnError::ExecutableResolution)?;
    let cwd = exe
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    Ok(StagedChild {
        descriptor,
        exe,
        args,
        cwd,
        listener: dup,
    })
}

/// Places `raw` at `slot` with close-on-exec cleared, so the fd survives exec.
///
/// `dup2` produces a non-cloexec duplicate, but is a no-op when both fds are
/// already equal; `try_clone` creates its duplicate cloexec, so that case must
/// clear the flag on the fd itself or the child would lose the listener.
fn pin_fd(raw: RawFd, slot: RawFd) -> io::Result<()> {
    if raw == slot {
        if unsafe { libc::fcntl(raw, libc::F_SETFD, 0) } < 0 {
            return Err(io::Error::last_os_error());
        }
    } else if unsafe { libc::dup2(raw, slot) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Spawns a child process that inherits the current listener.
///
/// The child's fd table is exactly 0 stdin, 1 stdout, 2 stderr, 3 listener,
/// the layout the descriptor's fixed `fd` slot assumes. Environment is the
/// parent's plus the encoded descriptor under `cfg.env_key`.
pub(crate) fn fork_child(
    listener: Option<&TcpListener>,
    cfg: &Config,
) -> Result<Child, SpawnError> {
    let listener = listener.ok_or(SpawnError::NilListener)?;
    let staged = stage(listener, cfg)?;
    // Encoding a well-formed descriptor cannot fail structurally; treat a
    // serializer error as a stage failure all the same.
    let payload = staged
        .descriptor
        .encode()
        .map_err(|e| SpawnError::Stage(io::Error::other(e)))?;

    let raw = staged.listener.as_raw_fd();
    let mut cmd = Command::new(&staged.exe);
    cmd.args(&staged.args)
        .current_dir(&staged.cwd)
        .env(cfg.env_key.as_ref(), &payload);
    // Between fork and exec: pin the duplicated listener to the fixed slot.
    unsafe {
        cmd.pre_exec(move || pin_fd(raw, LISTENER_FD));
    }

    // `staged.listener` stays alive until after spawn returns, keeping the
    // source fd valid for the dup2.
    let child = cmd.spawn().map_err(SpawnError::Spawn)?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(address: &str) -> Config {
        Config {
            address: address.into(),
            ..Config::default()
        }
    }

    #[test]
    fn nil_listener_is_rejected() {
        assert!(matches!(
            fork_child(None, &cfg("127.0.0.1:8008")),
            Err(SpawnError::NilListener)
        ));
    }

    #[test]
    fn stage_pins_descriptor_to_slot_three() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let staged = stage(&listener, &cfg("127.0.0.1:8008")).unwrap();

        assert_eq!(staged.descriptor.fd, LISTENER_FD);
        assert_eq!(staged.descriptor.address, "127.0.0.1:8008");
        assert_eq!(
            staged.descriptor.filename,
            listener.local_addr().unwrap().to_string()
        );
    }

    #[test]
    fn staged_descriptor_round_trips_through_env_form() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let staged = stage(&listener, &cfg("127.0.0.1:8008")).unwrap();

        let payload = staged.descriptor.encode().unwrap();
        let decoded = ListenerDescriptor::decode(&payload).unwrap();
        assert_eq!(decoded, staged.descriptor);
    }

    #[test]
    fn stage_duplicates_the_listener_fd() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let staged = stage(&listener, &cfg("127.0.0.1:8008")).unwrap();

        assert_ne!(staged.listener.as_raw_fd(), listener.as_raw_fd());
        assert_eq!(
            staged.listener.local_addr().unwrap(),
            listener.local_addr().unwrap()
        );
    }

    #[test]
    fn pin_clears_cloexec_when_fd_is_already_in_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dup = listener.try_clone().unwrap();
        let fd = dup.as_raw_fd();
        let before = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_ne!(before & libc::FD_CLOEXEC, 0, "try_clone marks the fd cloexec");

        pin_fd(fd, fd).unwrap();
        let after = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_eq!(after & libc::FD_CLOEXEC, 0);
    }

    #[test]
    fn pin_duplicates_into_a_distinct_slot_without_cloexec() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let raw = listener.as_raw_fd();
        // Target slot stays owned by a live handle so no other thread can
        // claim the fd number while the test runs.
        let placeholder = listener.try_clone().unwrap();
        let slot = placeholder.as_raw_fd();

        pin_fd(raw, slot).unwrap();
        let flags = unsafe { libc::fcntl(slot, libc::F_GETFD) };
        assert!(flags >= 0);
        assert_eq!(flags & libc::FD_CLOEXEC, 0);
    }

    #[test]
    fn stage_resolves_the_running_executable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let staged = stage(&listener, &cfg("127.0.0.1:8008")).unwrap();

        assert!(staged.exe.is_absolute());
        assert!(staged.cwd.is_dir());
    }
}
