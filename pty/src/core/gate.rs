//! Arbitration of stdin between the PTY and an interactive menu.
//!
//! The gate moves `Idle → Suspending → Active → Resuming → Idle`. Only the
//! interaction controller drives it; the input loop only reads it and stops
//! forwarding keystrokes whenever the gate is not `Idle`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::utils::TerminalMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatePhase {
    Idle = 0,
    Suspending = 1,
    Active = 2,
    Resuming = 3,
}

impl GatePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GatePhase::Suspending,
            2 => GatePhase::Active,
            3 => GatePhase::Resuming,
            _ => GatePhase::Idle,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HookGate {
    phase: Arc<AtomicU8>,
}

impl HookGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GatePhase {
        GatePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// True only while idle; keystrokes go to the PTY.
    pub fn is_forwarding(&self) -> bool {
        self.phase() == GatePhase::Idle
    }

    fn transition(&self, from: GatePhase, to: GatePhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Stops forwarding and hands the terminal back to cooked mode.
    ///
    /// Returns `None` when an interaction is already in progress. The returned
    /// guard resumes forwarding in raw mode when dropped.
    pub fn suspend(&self, terminal: Arc<dyn TerminalMode>) -> Option<Suspension> {
        if !self.transition(GatePhase::Idle, GatePhase::Suspending) {
            warn!(phase = ?self.phase(), "interaction refused, gate busy");
            return None;
        }

        if let Err(err) = terminal.restore() {
            warn!(error = %err, "failed to restore cooked mode");
        }
        self.phase.store(GatePhase::Active as u8, Ordering::SeqCst);
        debug!("gate active");

        Some(Suspension {
            gate: self.clone(),
            terminal,
        })
    }
}

/// Held while an interaction owns the terminal.
pub struct Suspension {
    gate: HookGate,
    terminal: Arc<dyn TerminalMode>,
}

impl Drop for Suspension {
    fn drop(&mut self) {
        self.gate
            .phase
            .store(GatePhase::Resuming as u8, Ordering::SeqCst);
        if let Err(err) = self.terminal.enter_raw() {
            warn!(error = %err, "failed to re-enter raw mode");
        }
        self.gate.phase.store(GatePhase::Idle as u8, Ordering::SeqCst);
        debug!("gate idle");
    }
}
