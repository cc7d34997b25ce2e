//! Wires the PTY, relays, hook and command server into one session.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use portable_pty::CommandBuilder;
use tokio::signal::unix::SignalKind;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xsh_core::{Assistant, Config};

use super::error::SessionError;
use super::gate::HookGate;
use super::hook::{self, HookContext, ShellKind};
use super::interaction::{InquirePicker, InteractionController};
use super::io_loop::{forward_input, forward_output};
use super::ipc::{CommandServer, FifoMailbox};
use super::output_handler::OutputHandler;
use super::pty::PtySession;
use super::resize::{forward_resizes, signal_notifications, window_changes};
use crate::utils::{raw_guard, terminal_size, RawModeGuard, TerminalMode, TerminalModes};

/// Set in the child's environment so a nested xsh can refuse to start.
pub const SESSION_MARKER: &str = "XSH_SESSION";

pub struct Session {
    config: Config,
    assistant: Arc<dyn Assistant>,
}

impl Session {
    pub fn new(config: Config, assistant: Arc<dyn Assistant>) -> Result<Self, SessionError> {
        ensure_not_nested(std::env::var_os(SESSION_MARKER))?;
        Ok(Self { config, assistant })
    }

    /// Runs until the shell exits or the process is told to stop.
    ///
    /// Returns the output relay's result: clean end-of-stream is success.
    pub async fn run(self) -> Result<(), SessionError> {
        let shell = self.config.shell.path.clone();
        let kind = ShellKind::detect(&shell);

        let ipc_dir = tempfile::Builder::new().prefix("xsh-ipc").tempdir()?;
        let mailbox = Arc::new(FifoMailbox::create(ipc_dir)?);

        let profile_dir = tempfile::Builder::new().prefix("xsh-profile").tempdir()?;
        let context = HookContext {
            home: dirs::home_dir().unwrap_or_default(),
            request_pipe: mailbox.request_path().to_path_buf(),
            response_pipe: mailbox.response_path().to_path_buf(),
            key: self.config.shell.hook_key.clone(),
        };
        let rc_file = hook::install(kind, &context, profile_dir.path())?;
        info!(%shell, ?kind, rc_file = ?rc_file, "starting session");

        let modes: Arc<dyn TerminalMode> = Arc::new(TerminalModes::capture()?);

        let pty = PtySession::start(shell_command(kind, &shell, profile_dir.path()), terminal_size())?;
        let (reader, writer, raw) = match attach(&pty, &modes) {
            Ok(attached) => attached,
            Err(err) => {
                match tokio::task::spawn_blocking(move || pty.abort()).await {
                    Ok(Ok(status)) => debug!(?status, "shell stopped after failed startup"),
                    Ok(Err(reap)) => warn!(error = %reap, "failed to reap shell"),
                    Err(join) => warn!(error = %join, "failed to reap shell"),
                }
                return Err(err);
            }
        };
        let mut killer = pty.killer();

        // Registered before any task runs so no signal falls through to the
        // default disposition.
        let terminate = listen(SignalKind::terminate());
        let hangup = listen(SignalKind::hangup());
        let interrupt = listen(SignalKind::interrupt());

        let cancel = CancellationToken::new();
        let gate = HookGate::new();

        let mut output = tokio::task::spawn_blocking(move || forward_output(reader, io::stdout()));

        let input = {
            let (gate, cancel) = (gate.clone(), cancel.clone());
            tokio::task::spawn_blocking(move || forward_input(io::stdin(), writer, gate, cancel))
        };

        let resize = match window_changes() {
            Ok(changes) => Some(tokio::spawn(forward_resizes(
                pty.master(),
                terminal_size,
                changes,
                cancel.clone(),
            ))),
            Err(err) => {
                warn!(error = %err, "resize notifications unavailable");
                None
            }
        };

        let controller = Arc::new(InteractionController::new(
            self.assistant.clone(),
            Arc::new(InquirePicker),
            modes,
            gate.clone(),
            OutputHandler::stdout(),
        ));
        let signals = tokio::spawn(route_signals(
            terminate,
            hangup,
            interrupt,
            gate,
            controller.interrupts(),
            cancel.clone(),
        ));

        let server = tokio::spawn(CommandServer::new(mailbox.clone(), controller, cancel.clone()).run());

        let joined = tokio::select! {
            joined = &mut output => joined,
            _ = cancel.cancelled() => {
                debug!("session cancelled, stopping shell");
                if let Err(err) = killer.kill() {
                    debug!(error = %err, "failed to kill shell");
                }
                (&mut output).await
            }
        };
        let result = joined.unwrap_or_else(|err| Err(io::Error::other(err)));

        cancel.cancel();
        if let Err(err) = input.await {
            debug!(error = %err, "input relay panicked");
        }
        if let Some(resize) = resize {
            let _ = resize.await;
        }
        let _ = server.await;
        let _ = signals.await;

        drop(raw);

        match tokio::task::spawn_blocking(move || pty.finish()).await {
            Ok(Ok(status)) => info!(?status, "session ended"),
            Ok(Err(err)) => warn!(error = %err, "failed to reap shell"),
            Err(err) => warn!(error = %err, "failed to reap shell"),
        }

        drop(mailbox);
        drop(profile_dir);

        result.map_err(SessionError::Io)
    }
}

fn ensure_not_nested(marker: Option<OsString>) -> Result<(), SessionError> {
    match marker {
        Some(_) => Err(SessionError::NestedSession),
        None => Ok(()),
    }
}

fn shell_command(kind: ShellKind, shell: &str, profile_dir: &Path) -> CommandBuilder {
    let mut command = kind.generator().command(shell, profile_dir);
    command.env(SESSION_MARKER, "1");
    if let Ok(cwd) = std::env::current_dir() {
        command.cwd(cwd);
    }
    command
}

type ShellIo = (Box<dyn Read + Send>, Box<dyn Write + Send>, RawModeGuard);

fn attach(pty: &PtySession, modes: &Arc<dyn TerminalMode>) -> Result<ShellIo, SessionError> {
    let reader = pty.reader()?;
    let writer = pty.writer()?;
    let raw = raw_guard(modes.clone())?;
    Ok((reader, writer, raw))
}

/// A stream of deliveries of `kind`, or an empty one if the handler could not
/// be installed.
fn listen(kind: SignalKind) -> futures::stream::BoxStream<'static, ()> {
    match signal_notifications(kind) {
        Ok(stream) => stream.boxed(),
        Err(err) => {
            warn!(error = %err, ?kind, "failed to install signal handler");
            futures::stream::empty().boxed()
        }
    }
}

/// Cancels the session on SIGTERM or SIGHUP.
///
/// SIGINT during an interaction aborts the pending assistant call instead.
/// While the shell owns the terminal it is in raw mode, so an interrupt can
/// only come from outside and is treated like SIGTERM.
async fn route_signals<T, H, I>(
    terminate: T,
    hangup: H,
    interrupt: I,
    gate: HookGate,
    interrupts: Arc<Notify>,
    cancel: CancellationToken,
) where
    T: Stream<Item = ()>,
    H: Stream<Item = ()>,
    I: Stream<Item = ()>,
{
    let mut terminate = pin!(terminate);
    let mut hangup = pin!(hangup);
    let mut interrupt = pin!(interrupt);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(()) = terminate.next() => {
                info!("received SIGTERM");
                cancel.cancel();
                break;
            }
            Some(()) = hangup.next() => {
                info!("received SIGHUP");
                cancel.cancel();
                break;
            }
            Some(()) = interrupt.next() => {
                if gate.is_forwarding() {
                    info!("received SIGINT");
                    cancel.cancel();
                    break;
                }
                debug!("SIGINT during interaction");
                interrupts.notify_waiters();
            }
            else => break,
        }
    }
}
