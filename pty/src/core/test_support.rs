//! Fakes shared by the unit tests of the session components.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portable_pty::PtySize;
use xsh_core::{Assistant, ModelInfo, ProviderError, ProviderKind};

use super::error::{PickerError, PipeError, TerminalModeError};
use super::gate::HookGate;
use super::interaction::{InteractionController, Picker};
use super::ipc::Mailbox;
use super::output_handler::OutputHandler;
use super::resize::ResizeTarget;
use crate::utils::{TerminalMode, Theme};

/// Records mode switches instead of touching a real terminal.
#[derive(Default)]
pub struct RecordingTerminal {
    calls: Mutex<Vec<&'static str>>,
    failing: bool,
}

impl RecordingTerminal {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            failing: true,
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), TerminalModeError> {
        self.calls.lock().unwrap().push(call);
        if self.failing {
            return Err(TerminalModeError(nix::Error::ENOTTY));
        }
        Ok(())
    }
}

impl TerminalMode for RecordingTerminal {
    fn enter_raw(&self) -> Result<(), TerminalModeError> {
        self.record("raw")
    }

    fn restore(&self) -> Result<(), TerminalModeError> {
        self.record("restore")
    }
}

/// In-memory stdout that stays readable after being handed out.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Assistant with canned answers and an in-memory model list.
pub struct ScriptedAssistant {
    models: Vec<ModelInfo>,
    current: Mutex<Option<ModelInfo>>,
    response: String,
    failure: Mutex<Option<ProviderError>>,
    listing_fails: bool,
    hangs: bool,
    queries: Mutex<Vec<String>>,
}

impl ScriptedAssistant {
    pub fn with_models(names: &[&str], current: &str) -> Self {
        let models: Vec<ModelInfo> = names
            .iter()
            .map(|name| ModelInfo::new("ollama", *name, ProviderKind::Ollama))
            .collect();
        let current = models.iter().find(|m| m.name == current).cloned();

        Self {
            models,
            current: Mutex::new(current),
            response: String::new(),
            failure: Mutex::new(None),
            listing_fails: false,
            hangs: false,
            queries: Mutex::default(),
        }
    }

    pub fn respond(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// The next query fails with `err`.
    pub fn fail(self, err: ProviderError) -> Self {
        *self.failure.lock().unwrap() = Some(err);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Queries never complete.
    pub fn hanging(mut self) -> Self {
        self.hangs = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn query(&self, prompt: &str) -> Result<String, ProviderError> {
        self.queries.lock().unwrap().push(prompt.to_string());
        if self.hangs {
            std::future::pending::<()>().await;
        }
        match self.failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(self.response.clone()),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        if self.listing_fails {
            return Err(ProviderError::Other("listing failed".into()));
        }
        Ok(self.models.clone())
    }

    async fn switch_model(&self, model: &ModelInfo) -> Result<(), ProviderError> {
        let known = self
            .models
            .iter()
            .find(|m| m.same_model(model))
            .cloned()
            .ok_or_else(|| ProviderError::UnknownModel(model.name.clone()))?;
        *self.current.lock().unwrap() = Some(known);
        Ok(())
    }

    fn current_model(&self) -> Option<ModelInfo> {
        self.current.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct PickerCall {
    pub label: String,
    pub items: Vec<String>,
    pub cursor: usize,
}

/// Replays queued selections; an exhausted queue behaves like Esc.
pub struct ScriptedPicker {
    picks: Mutex<VecDeque<Result<Option<usize>, PickerError>>>,
    calls: Mutex<Vec<PickerCall>>,
}

impl ScriptedPicker {
    pub fn new(picks: Vec<Result<Option<usize>, PickerError>>) -> Self {
        Self {
            picks: Mutex::new(picks.into()),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<PickerCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Picker for ScriptedPicker {
    fn select(
        &self,
        label: &str,
        items: &[String],
        cursor: usize,
    ) -> Result<Option<usize>, PickerError> {
        self.calls.lock().unwrap().push(PickerCall {
            label: label.to_string(),
            items: items.to_vec(),
            cursor,
        });
        self.picks.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// Records every size it is asked to apply, failing or not.
#[derive(Default)]
pub struct RecordingResize {
    sizes: Mutex<Vec<PtySize>>,
    failing: bool,
}

impl RecordingResize {
    pub fn failing() -> Self {
        Self {
            sizes: Mutex::default(),
            failing: true,
        }
    }

    pub fn sizes(&self) -> Vec<PtySize> {
        self.sizes.lock().unwrap().clone()
    }
}

impl ResizeTarget for RecordingResize {
    fn resize(&self, size: PtySize) -> anyhow::Result<()> {
        self.sizes.lock().unwrap().push(size);
        if self.failing {
            anyhow::bail!("ioctl failed");
        }
        Ok(())
    }
}

/// Mailbox over in-process channels. `None` on the request channel injects a
/// receive error.
pub struct ChannelMailbox {
    requests: Mutex<Receiver<Option<Vec<u8>>>>,
    replies: Mutex<Sender<Vec<u8>>>,
}

/// The hook's side of a [`ChannelMailbox`].
pub struct ShellEnd {
    requests: Sender<Option<Vec<u8>>>,
    replies: Receiver<Vec<u8>>,
}

impl ShellEnd {
    /// Sends a buffer snapshot and blocks for the answer.
    pub fn request(&self, payload: &[u8]) -> String {
        self.requests.send(Some(payload.to_vec())).unwrap();
        String::from_utf8(self.replies.recv().unwrap()).unwrap()
    }

    pub fn fail_next(&self) {
        self.requests.send(None).unwrap();
    }
}

pub fn channel_mailbox() -> (ChannelMailbox, ShellEnd) {
    let (request_tx, request_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    (
        ChannelMailbox {
            requests: Mutex::new(request_rx),
            replies: Mutex::new(reply_tx),
        },
        ShellEnd {
            requests: request_tx,
            replies: reply_rx,
        },
    )
}

impl Mailbox for ChannelMailbox {
    fn receive(&self) -> Result<Vec<u8>, PipeError> {
        match self.requests.lock().unwrap().recv() {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => Err(PipeError::Io(io::Error::other("injected failure"))),
            Err(_) => Err(PipeError::Io(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn reply(&self, payload: &[u8]) -> Result<(), PipeError> {
        self.replies
            .lock()
            .unwrap()
            .send(payload.to_vec())
            .map_err(|_| PipeError::Io(io::ErrorKind::BrokenPipe.into()))
    }
}

/// Controller writing plain text into a buffer the test can inspect.
pub fn controller(
    assistant: Arc<ScriptedAssistant>,
    picker: Arc<ScriptedPicker>,
    terminal: Arc<RecordingTerminal>,
    gate: HookGate,
) -> (InteractionController, SharedBuffer) {
    let output = SharedBuffer::default();
    let handler = OutputHandler::with_theme(Box::new(output.clone()), Theme::plain());
    (
        InteractionController::new(assistant, picker, terminal, gate, handler),
        output,
    )
}
