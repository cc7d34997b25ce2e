//! Out-of-band interactions triggered from the shell's key binding.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use inquire::error::InquireError;
use inquire::Select;
use tokio::sync::Notify;
use tracing::{debug, warn};
use xsh_core::Assistant;

use super::error::PickerError;
use super::gate::HookGate;
use super::output_handler::OutputHandler;
use super::suggestion;
use crate::utils::TerminalMode;

const PAGE_SIZE: usize = 10;
const CANCEL_ITEM: &str = "[ Cancel ]";
const MODEL_LABEL: &str = "Select AI Model";
const COMMAND_LABEL: &str = "Do you want to execute one of these commands?";
const INTERRUPTED: &str = "Interrupted.";

/// Arrow-key single-select menu.
pub trait Picker: Send + Sync {
    /// Returns the chosen index, or `None` when the user backs out.
    fn select(
        &self,
        label: &str,
        items: &[String],
        cursor: usize,
    ) -> Result<Option<usize>, PickerError>;
}

pub struct InquirePicker;

impl Picker for InquirePicker {
    fn select(
        &self,
        label: &str,
        items: &[String],
        cursor: usize,
    ) -> Result<Option<usize>, PickerError> {
        let cursor = cursor.min(items.len().saturating_sub(1));
        let result = Select::new(label, items.to_vec())
            .with_starting_cursor(cursor)
            .with_page_size(PAGE_SIZE)
            .raw_prompt();

        match result {
            Ok(choice) => Ok(Some(choice.index)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
            Err(err) => Err(PickerError(err.to_string())),
        }
    }
}

/// Runs one interaction per hook request while owning the terminal.
pub struct InteractionController {
    assistant: Arc<dyn Assistant>,
    picker: Arc<dyn Picker>,
    terminal: Arc<dyn TerminalMode>,
    gate: HookGate,
    output: Mutex<OutputHandler>,
    interrupts: Arc<Notify>,
}

impl InteractionController {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        picker: Arc<dyn Picker>,
        terminal: Arc<dyn TerminalMode>,
        gate: HookGate,
        output: OutputHandler,
    ) -> Self {
        Self {
            assistant,
            picker,
            terminal,
            gate,
            output: Mutex::new(output),
            interrupts: Arc::new(Notify::new()),
        }
    }

    /// Notified on `^C` while an interaction owns the terminal. Aborts a
    /// pending assistant call.
    pub fn interrupts(&self) -> Arc<Notify> {
        self.interrupts.clone()
    }

    /// Handles one request and returns the command to inject ("" for none).
    ///
    /// An empty snapshot opens the model picker; anything else is sent to the
    /// assistant as a request for commands.
    pub async fn handle(&self, snapshot: &str) -> String {
        let Some(_suspension) = self.gate.suspend(self.terminal.clone()) else {
            return String::new();
        };

        if snapshot.is_empty() {
            self.select_model().await;
            String::new()
        } else {
            self.suggest_command(snapshot).await
        }
    }

    async fn select_model(&self) {
        let Some(listed) = self.interruptible(self.assistant.list_models()).await else {
            return;
        };
        let models = match listed {
            Ok(models) => models,
            Err(err) => {
                self.show(|out| out.render_error(&format!("Failed to list models: {err}")));
                return;
            }
        };

        if models.is_empty() {
            self.show(|out| out.render_warning("No models available."));
            return;
        }

        let cursor = self
            .assistant
            .current_model()
            .and_then(|current| models.iter().position(|m| m.same_model(&current)))
            .unwrap_or(0);
        let items = models.iter().map(ToString::to_string).collect();

        let chosen = match self.pick(MODEL_LABEL, items, cursor).await {
            Ok(Some(index)) => models.get(index),
            Ok(None) => None,
            Err(err) => {
                self.show(|out| out.render_error(&err.to_string()));
                None
            }
        };
        let Some(chosen) = chosen else {
            return;
        };

        match self.assistant.switch_model(chosen).await {
            Ok(()) => self.show(|out| out.render_success(&format!("Switched to model: {chosen}"))),
            Err(err) => self.show(|out| out.render_error(&format!("Failed to switch model: {err}"))),
        }
    }

    async fn suggest_command(&self, request: &str) -> String {
        self.show(|out| {
            out.render_newline()?;
            out.render_info(&format!("Asking AI for: {request}"))
        });

        let Some(answered) = self.interruptible(self.assistant.query(request)).await else {
            return String::new();
        };
        let response = match answered {
            Ok(response) => response,
            Err(err) => {
                self.show(|out| out.render_error(&format!("AI error: {err}")));
                return String::new();
            }
        };

        let suggestion = match suggestion::parse(&response) {
            Ok(suggestion) if !suggestion.commands.is_empty() => suggestion,
            parsed => {
                debug!(?parsed, "response carried no commands");
                self.show(|out| out.render_text(&format!("AI: {response}")));
                return String::new();
            }
        };

        if let Some(message) = &suggestion.message {
            self.show(|out| out.render_warning(message));
        }

        let mut items = Vec::with_capacity(suggestion.commands.len() + 1);
        items.push(CANCEL_ITEM.to_string());
        items.extend(suggestion.commands.iter().cloned());

        match self.pick(COMMAND_LABEL, items, 0).await {
            Ok(Some(index)) if index > 0 => suggestion
                .commands
                .get(index - 1)
                .cloned()
                .unwrap_or_default(),
            Ok(_) => String::new(),
            Err(err) => {
                self.show(|out| out.render_error(&err.to_string()));
                String::new()
            }
        }
    }

    /// Runs `work` unless `^C` arrives first.
    async fn interruptible<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            output = work => Some(output),
            _ = self.interrupts.notified() => {
                debug!("assistant call interrupted");
                self.show(|out| out.render_warning(INTERRUPTED));
                None
            }
        }
    }

    async fn pick(
        &self,
        label: &str,
        items: Vec<String>,
        cursor: usize,
    ) -> Result<Option<usize>, PickerError> {
        let picker = self.picker.clone();
        let label = label.to_string();
        tokio::task::spawn_blocking(move || picker.select(&label, &items, cursor))
            .await
            .map_err(|err| PickerError(err.to_string()))?
    }

    fn show<F>(&self, render: F)
    where
        F: FnOnce(&mut OutputHandler) -> io::Result<()>,
    {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = render(&mut output) {
            warn!(error = %err, "failed to write to terminal");
        }
    }
}
