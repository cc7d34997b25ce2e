use std::io;
use std::os::fd::AsFd;
use std::sync::{Arc, Mutex, PoisonError};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::ioctl_read_bad;
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg, Termios};
use portable_pty::PtySize;
use tracing::warn;

use crate::core::TerminalModeError;

ioctl_read_bad!(get_winsize, nix::libc::TIOCGWINSZ, nix::libc::winsize);

/// Current size of the controlling terminal, 24x80 when it cannot be read.
pub fn terminal_size() -> PtySize {
    use nix::libc::{winsize, STDOUT_FILENO};

    let mut size = winsize {
        ws_row: 24,
        ws_col: 80,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCGWINSZ only writes into the winsize struct we own.
    let result = unsafe { get_winsize(STDOUT_FILENO, &mut size) };
    if result.is_err() || size.ws_row == 0 || size.ws_col == 0 {
        return PtySize::default();
    }

    PtySize {
        rows: size.ws_row,
        cols: size.ws_col,
        pixel_width: size.ws_xpixel,
        pixel_height: size.ws_ypixel,
    }
}

/// Switches the controlling terminal between raw and its original mode.
pub trait TerminalMode: Send + Sync {
    fn enter_raw(&self) -> Result<(), TerminalModeError>;
    fn restore(&self) -> Result<(), TerminalModeError>;
}

/// Termios of stdin as it was when the session started.
pub struct TerminalModes {
    original: Mutex<Termios>,
}

impl TerminalModes {
    pub fn capture() -> Result<Self, TerminalModeError> {
        let original = tcgetattr(io::stdin())?;
        Ok(Self {
            original: Mutex::new(original),
        })
    }

    fn original(&self) -> Termios {
        self.original
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TerminalMode for TerminalModes {
    fn enter_raw(&self) -> Result<(), TerminalModeError> {
        let mut raw = self.original();
        cfmakeraw(&mut raw);
        tcsetattr(io::stdin(), SetArg::TCSANOW, &raw)?;
        Ok(())
    }

    fn restore(&self) -> Result<(), TerminalModeError> {
        tcsetattr(io::stdin(), SetArg::TCSANOW, &self.original())?;
        Ok(())
    }
}

/// Enters raw mode and restores the original mode on drop.
pub fn raw_guard(modes: Arc<dyn TerminalMode>) -> Result<RawModeGuard, TerminalModeError> {
    modes.enter_raw()?;
    Ok(RawModeGuard { modes })
}

pub struct RawModeGuard {
    modes: Arc<dyn TerminalMode>,
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.modes.restore() {
            warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

pub fn set_blocking(fd: impl AsFd) -> nix::Result<()> {
    let flags = fcntl(fd.as_fd(), FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.remove(OFlag::O_NONBLOCK);
    fcntl(fd.as_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}
