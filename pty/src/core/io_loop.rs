//! Byte relays between the controlling terminal and the PTY.

use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::gate::HookGate;

const GATE_RECHECK: Duration = Duration::from_millis(10);
const STDIN_POLL_MS: u16 = 50;

/// Copies shell output to the terminal until the shell goes away.
///
/// Linux reports a closed slave as `EIO` on the master; that and a zero-length
/// read both count as a clean end of the session.
pub fn forward_output<R, W>(mut reader: R, mut stdout: W) -> io::Result<()>
where
    R: Read,
    W: Write,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                stdout.write_all(&buf[..n])?;
                stdout.flush()?;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                debug!("pty closed");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Copies keystrokes to the shell while the gate is idle.
///
/// Reads go straight to the descriptor so bytes typed during an interaction
/// stay queued for the menu instead of landing in a userspace buffer.
pub fn forward_input<F, W>(stdin: F, mut writer: W, gate: HookGate, cancel: CancellationToken)
where
    F: AsFd,
    W: Write,
{
    let mut buf = [0u8; 1024];

    while !cancel.is_cancelled() {
        if !gate.is_forwarding() {
            thread::sleep(GATE_RECHECK);
            continue;
        }

        let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(STDIN_POLL_MS)) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(err) => {
                debug!(error = %err, "stdin poll failed");
                return;
            }
        }

        // An interaction may have started while we were polling
        if !gate.is_forwarding() {
            continue;
        }

        let n = match nix::unistd::read(stdin.as_fd(), &mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(Errno::EINTR | Errno::EAGAIN) => continue,
            Err(err) => {
                debug!(error = %err, "stdin read failed");
                return;
            }
        };

        if writer.write_all(&buf[..n]).and_then(|_| writer.flush()).is_err() {
            return;
        }
    }
}
