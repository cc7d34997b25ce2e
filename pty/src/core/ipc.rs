//! Request/response channel between the shell hook and xsh.
//!
//! The hook writes the current command-line buffer into the request pipe and
//! blocks reading the response pipe. xsh answers every request exactly once,
//! possibly with an empty payload, so the shell never stays blocked.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::PipeError;
use super::interaction::InteractionController;
use crate::utils::set_blocking;

const RETRY_BACKOFF: Duration = Duration::from_millis(100);
const REPLY_POLL: Duration = Duration::from_millis(10);
const REPLY_WAIT: Duration = Duration::from_secs(2);

/// Single-slot blocking mailbox. At most one request is outstanding at a time.
pub trait Mailbox: Send + Sync {
    /// Blocks until a request arrives and returns its payload.
    fn receive(&self) -> Result<Vec<u8>, PipeError>;

    fn reply(&self, payload: &[u8]) -> Result<(), PipeError>;

    /// Unblocks a pending `receive` during shutdown.
    fn wake(&self) {}
}

/// Mailbox over two named pipes in a private temporary directory.
pub struct FifoMailbox {
    /// Removed, pipes included, when the mailbox drops
    _dir: TempDir,
    request: PathBuf,
    response: PathBuf,
}

impl FifoMailbox {
    pub fn create(dir: TempDir) -> Result<Self, PipeError> {
        let request = dir.path().join("prompt_pipe");
        let response = dir.path().join("result_pipe");

        for path in [&request, &response] {
            mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|source| PipeError::Create {
                path: path.clone(),
                source,
            })?;
        }
        debug!(dir = %dir.path().display(), "created ipc pipes");

        Ok(Self {
            _dir: dir,
            request,
            response,
        })
    }

    pub fn request_path(&self) -> &Path {
        &self.request
    }

    pub fn response_path(&self) -> &Path {
        &self.response
    }

    fn open_nonblocking_writer(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
    }
}

impl Mailbox for FifoMailbox {
    fn receive(&self) -> Result<Vec<u8>, PipeError> {
        // Opening blocks until the hook opens its end for writing
        let mut file = File::open(&self.request)?;
        let mut payload = Vec::new();
        file.read_to_end(&mut payload)?;
        Ok(payload)
    }

    fn reply(&self, payload: &[u8]) -> Result<(), PipeError> {
        let deadline = Instant::now() + REPLY_WAIT;
        let mut file = loop {
            match Self::open_nonblocking_writer(&self.response) {
                Ok(file) => break file,
                Err(err) if err.raw_os_error() == Some(libc::ENXIO) => {
                    if Instant::now() >= deadline {
                        return Err(PipeError::NoReader);
                    }
                    thread::sleep(REPLY_POLL);
                }
                Err(err) => return Err(err.into()),
            }
        };

        set_blocking(&file).map_err(io::Error::from)?;
        file.write_all(payload)?;
        Ok(())
    }

    fn wake(&self) {
        // A reader blocked in open() counts as present, so this succeeds
        // exactly when `receive` is waiting.
        if let Ok(file) = Self::open_nonblocking_writer(&self.request) {
            drop(file);
        }
    }
}

/// Serves hook requests until the session is cancelled.
pub struct CommandServer {
    mailbox: Arc<dyn Mailbox>,
    controller: Arc<InteractionController>,
    cancel: CancellationToken,
}

impl CommandServer {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        controller: Arc<InteractionController>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            mailbox,
            controller,
            cancel,
        }
    }

    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let mailbox = self.mailbox.clone();
            let received = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.mailbox.wake();
                    break;
                }
                joined = tokio::task::spawn_blocking(move || mailbox.receive()) => {
                    joined.unwrap_or_else(|err| Err(PipeError::Io(io::Error::other(err))))
                }
            };

            let payload = match received {
                Ok(payload) => payload,
                Err(err) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    warn!(error = %err, "failed to receive hook request");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_BACKOFF) => continue,
                    }
                }
            };

            if self.cancel.is_cancelled() {
                break;
            }

            let snapshot = String::from_utf8_lossy(&payload).into_owned();
            debug!(len = snapshot.len(), "hook request");
            let result = self.controller.handle(&snapshot).await;

            let mailbox = self.mailbox.clone();
            let replied = tokio::task::spawn_blocking(move || mailbox.reply(result.as_bytes()))
                .await
                .unwrap_or_else(|err| Err(PipeError::Io(io::Error::other(err))));
            if let Err(err) = replied {
                warn!(error = %err, "dropped hook reply");
            }
        }
        debug!("command server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::HookGate;
    use crate::core::test_support::{
        channel_mailbox, controller, RecordingTerminal, ScriptedAssistant, ScriptedPicker,
    };
    use std::fs;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    use xsh_core::Assistant;

    fn fifo_mailbox() -> FifoMailbox {
        let dir = tempfile::Builder::new().prefix("xsh-ipc").tempdir().unwrap();
        FifoMailbox::create(dir).unwrap()
    }

    #[test]
    fn test_fifos_are_private() {
        let mailbox = fifo_mailbox();
        for path in [mailbox.request_path(), mailbox.response_path()] {
            let meta = fs::metadata(path).unwrap();
            assert!(meta.file_type().is_fifo());
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn test_fifo_round_trip() {
        let mailbox = fifo_mailbox();
        let request = mailbox.request_path().to_path_buf();
        let response = mailbox.response_path().to_path_buf();

        // Plays the zsh widget: write the buffer, then block on the answer
        let shell = thread::spawn(move || {
            fs::write(&request, b"list file").unwrap();
            fs::read(&response).unwrap()
        });

        assert_eq!(mailbox.receive().unwrap(), b"list file");
        mailbox.reply(b"ls -la").unwrap();
        assert_eq!(shell.join().unwrap(), b"ls -la");
    }

    #[test]
    fn test_empty_reply_unblocks_reader() {
        let mailbox = fifo_mailbox();
        let response = mailbox.response_path().to_path_buf();
        let shell = thread::spawn(move || fs::read(&response).unwrap());

        mailbox.reply(b"").unwrap();
        assert!(shell.join().unwrap().is_empty());
    }

    #[test]
    fn test_reply_without_reader_gives_up() {
        let mailbox = fifo_mailbox();
        let started = Instant::now();
        assert!(matches!(mailbox.reply(b"ls"), Err(PipeError::NoReader)));
        assert!(started.elapsed() >= REPLY_WAIT);
    }

    #[test]
    fn test_wake_releases_pending_receive() {
        let mailbox = Arc::new(fifo_mailbox());
        let waiting = mailbox.clone();
        let receiver = thread::spawn(move || waiting.receive());

        // Keep waking until the receiver is parked in open() and released
        while !receiver.is_finished() {
            mailbox.wake();
            thread::sleep(Duration::from_millis(10));
        }
        assert!(receiver.join().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_create_in_removed_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        fs::remove_dir(&path).unwrap();
        // TempDir::drop tolerates the missing directory
        assert!(matches!(FifoMailbox::create(dir), Err(PipeError::Create { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_server_answers_consecutive_requests() {
        let assistant = Arc::new(
            ScriptedAssistant::with_models(&["modelA", "modelB"], "modelA")
                .respond("USER_MESSAGE:\nLists files.\nSHELL_COMMANDS:\nls -la"),
        );
        let picker = Arc::new(ScriptedPicker::new(vec![Ok(None), Ok(None), Ok(Some(1))]));
        let terminal = Arc::new(RecordingTerminal::default());
        let gate = HookGate::new();
        let (controller, _output) =
            controller(assistant.clone(), picker.clone(), terminal.clone(), gate.clone());

        let (mailbox, shell) = channel_mailbox();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(
            CommandServer::new(Arc::new(mailbox), Arc::new(controller), cancel.clone()).run(),
        );

        let replies = tokio::task::spawn_blocking(move || {
            let replies = vec![
                shell.request(b""),
                shell.request(b""),
                shell.request(b"list file"),
            ];
            (replies, shell)
        })
        .await
        .unwrap();
        let (replies, shell) = replies;

        assert_eq!(replies, vec!["", "", "ls -la"]);
        assert_eq!(assistant.queries(), vec!["list file"]);
        assert!(gate.is_forwarding());

        cancel.cancel();
        drop(shell);
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_server_retries_after_receive_error() {
        let assistant = Arc::new(ScriptedAssistant::with_models(&["m"], "m"));
        let picker = Arc::new(ScriptedPicker::new(vec![Ok(None)]));
        let terminal = Arc::new(RecordingTerminal::default());
        let (controller, _output) =
            controller(assistant, picker.clone(), terminal, HookGate::new());

        let (mailbox, shell) = channel_mailbox();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(
            CommandServer::new(Arc::new(mailbox), Arc::new(controller), cancel.clone()).run(),
        );

        let shell = tokio::task::spawn_blocking(move || {
            shell.fail_next();
            assert_eq!(shell.request(b""), "");
            shell
        })
        .await
        .unwrap();

        assert_eq!(picker.calls().len(), 1);
        cancel.cancel();
        drop(shell);
        server.await.unwrap();
    }

    /// Open descriptors pointing into `dir`.
    fn descriptors_under(dir: &Path) -> usize {
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
            .filter(|target| target.starts_with(dir))
            .count()
    }

    /// Releases a receive still parked in open() so the runtime can shut down.
    async fn release_pending_receive(mailbox: Arc<FifoMailbox>) {
        tokio::task::spawn_blocking(move || {
            for _ in 0..50 {
                mailbox.wake();
                thread::sleep(Duration::from_millis(10));
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fifo_server_answers_without_leaking_descriptors() {
        let assistant = Arc::new(
            ScriptedAssistant::with_models(&["modelA", "modelB"], "modelA")
                .respond("USER_MESSAGE:\nLists files.\nSHELL_COMMANDS:\nls -la"),
        );
        let picker = Arc::new(ScriptedPicker::new(vec![
            Ok(Some(1)),
            Ok(None),
            Ok(Some(1)),
        ]));
        let terminal = Arc::new(RecordingTerminal::default());
        let gate = HookGate::new();
        let (controller, _output) =
            controller(assistant.clone(), picker.clone(), terminal, gate.clone());

        let mailbox = Arc::new(fifo_mailbox());
        let dir = mailbox.request_path().parent().unwrap().to_path_buf();
        let request = mailbox.request_path().to_path_buf();
        let response = mailbox.response_path().to_path_buf();

        let cancel = CancellationToken::new();
        let server = tokio::spawn(
            CommandServer::new(mailbox.clone(), Arc::new(controller), cancel.clone()).run(),
        );

        let payloads: [&[u8]; 3] = [b"", b"", b"list file"];
        let replies = tokio::task::spawn_blocking(move || {
            payloads
                .into_iter()
                .map(|payload| {
                    fs::write(&request, payload).unwrap();
                    String::from_utf8(fs::read(&response).unwrap()).unwrap()
                })
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();

        assert_eq!(replies, vec!["", "", "ls -la"]);
        assert_eq!(assistant.current_model().unwrap().name, "modelB");
        assert_eq!(picker.calls().len(), 3);
        assert!(gate.is_forwarding());
        assert_eq!(descriptors_under(&dir), 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server did not stop")
            .unwrap();
        release_pending_receive(mailbox).await;
    }

    #[tokio::test]
    async fn test_server_exits_when_cancelled_while_waiting() {
        let assistant = Arc::new(ScriptedAssistant::with_models(&["m"], "m"));
        let picker = Arc::new(ScriptedPicker::new(Vec::new()));
        let terminal = Arc::new(RecordingTerminal::default());
        let (controller, _output) = controller(assistant, picker, terminal, HookGate::new());

        let mailbox = Arc::new(fifo_mailbox());
        let cancel = CancellationToken::new();
        let server = tokio::spawn(
            CommandServer::new(mailbox.clone(), Arc::new(controller), cancel.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server did not stop")
            .unwrap();

        release_pending_receive(mailbox).await;
    }
}
