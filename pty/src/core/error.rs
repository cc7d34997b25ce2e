use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop (or refuse to start) a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn shell: {0}")]
    Spawn(String),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error(transparent)]
    TerminalMode(#[from] TerminalModeError),

    #[error("failed to write startup script {path}: {source}")]
    Hook {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("already running inside an xsh session")]
    NestedSession,

    #[error("PTY I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Failures of the request/response channel.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("failed to create pipe {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("pipe I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("no reader on response pipe")]
    NoReader,
}

#[derive(Debug, Error)]
#[error("terminal mode change failed: {0}")]
pub struct TerminalModeError(#[from] pub nix::Error);

#[derive(Debug, Error)]
#[error("selection menu failed: {0}")]
pub struct PickerError(pub String);
