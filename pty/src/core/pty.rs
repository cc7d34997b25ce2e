use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use tracing::debug;

use super::error::SessionError;
use super::resize::ResizeTarget;

/// Master side of the PTY. Shared with the resize forwarder.
pub struct PtyMaster {
    master: Mutex<Box<dyn MasterPty + Send>>,
}

impl ResizeTarget for PtyMaster {
    fn resize(&self, size: PtySize) -> anyhow::Result<()> {
        self.master
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(size)
    }
}

/// The child shell attached to a fresh PTY.
pub struct PtySession {
    master: Arc<PtyMaster>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtySession {
    pub fn start(command: CommandBuilder, size: PtySize) -> Result<Self, SessionError> {
        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| SessionError::Spawn(e.to_string()))?;
        debug!(pid = ?child.process_id(), rows = size.rows, cols = size.cols, "spawned shell");

        // Slave isn't needed, so it can be dropped
        drop(pair.slave);

        Ok(Self {
            master: Arc::new(PtyMaster {
                master: Mutex::new(pair.master),
            }),
            child,
        })
    }

    pub fn reader(&self) -> Result<Box<dyn Read + Send>, SessionError> {
        self.lock_master()
            .try_clone_reader()
            .map_err(|e| SessionError::Io(io::Error::other(e)))
    }

    /// Can only be taken once.
    pub fn writer(&self) -> Result<Box<dyn Write + Send>, SessionError> {
        self.lock_master()
            .take_writer()
            .map_err(|e| SessionError::Io(io::Error::other(e)))
    }

    pub fn master(&self) -> Arc<PtyMaster> {
        self.master.clone()
    }

    pub fn killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        self.child.clone_killer()
    }

    /// Closes the master and reaps the shell.
    ///
    /// Must run after every other holder of the master has finished.
    pub fn finish(self) -> io::Result<ExitStatus> {
        let Self { master, mut child } = self;
        drop(master);
        let status = child.wait()?;
        debug!(?status, "shell exited");
        Ok(status)
    }

    /// Kills the shell, then reaps it. For startup failures after spawning.
    pub fn abort(mut self) -> io::Result<ExitStatus> {
        if let Err(err) = self.child.kill() {
            debug!(error = %err, "failed to kill shell");
        }
        self.finish()
    }

    fn lock_master(&self) -> std::sync::MutexGuard<'_, Box<dyn MasterPty + Send>> {
        self.master
            .master
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
