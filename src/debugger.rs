//! Debugger instrumentation.
//!
//! The interpreter calls [`Debugger::intercept`] on entering and leaving
//! every block, and once with [`StopReason::Finish`] after the root chain
//! completes. An interception may suspend for as long as it likes; only the
//! script being debugged waits for it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::block::Block;
use crate::context::Context;
use crate::error::ScriptError;

/// Point in a block's evaluation at which the debugger is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// Before the block's own evaluation.
    Enter,
    /// After the block's own evaluation, before its `next`.
    Leave,
    /// After the root chain completed, once per run.
    Finish,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::Enter => "Enter",
            StopReason::Leave => "Leave",
            StopReason::Finish => "Finish",
        };
        f.write_str(name)
    }
}

/// Observer that can pause, step or abort a running script.
#[async_trait]
pub trait Debugger: Send + Sync {
    /// Called at every stop point. Returning an error ends the run with it.
    async fn intercept(
        &self,
        block: &Block,
        context: &Context,
        reason: StopReason,
    ) -> Result<(), ScriptError>;

    /// Called once when the run is over; `None` means it succeeded.
    fn script_finished(&self, _error: Option<&ScriptError>) {}
}

/// Where a [`Stepper`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    /// Id of the block, if it has one.
    pub block_id: Option<String>,
    /// Kind of the block.
    pub kind: String,
    /// Stop point.
    pub reason: StopReason,
    /// Number of live scope frames at the stop.
    pub depth: usize,
}

/// Events published by a [`Stepper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// The script is waiting at a stop point (or passed `Finish`).
    Stopped(StopEvent),
    /// The run is over; carries the error text of a failed run.
    Finished {
        /// Display text of the failure, `None` on success.
        error: Option<String>,
    },
}

/// Commands understood by a [`Stepper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCommand {
    /// Run to the next stop point.
    Step,
    /// Run to the end without stopping again.
    Continue,
    /// Fail the pending interception with [`ScriptError::Aborted`].
    Abort,
}

/// Channel-driven debugger that pauses at every `Enter` and `Leave`.
///
/// `Finish` is published without waiting. If the controlling
/// [`StepperHandle`] is dropped, the script continues freely.
pub struct Stepper {
    events: mpsc::UnboundedSender<DebugEvent>,
    commands: Mutex<mpsc::UnboundedReceiver<StepCommand>>,
    running_free: AtomicBool,
}

/// Controller side of a [`Stepper`].
pub struct StepperHandle {
    events: mpsc::UnboundedReceiver<DebugEvent>,
    commands: mpsc::UnboundedSender<StepCommand>,
}

impl Stepper {
    /// Create a stepper and its controller.
    pub fn new() -> (Stepper, StepperHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let stepper = Stepper {
            events: event_tx,
            commands: Mutex::new(command_rx),
            running_free: AtomicBool::new(false),
        };
        let handle = StepperHandle {
            events: event_rx,
            commands: command_tx,
        };
        (stepper, handle)
    }

    fn publish(&self, event: DebugEvent) {
        // A controller that went away just stops listening.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Debugger for Stepper {
    async fn intercept(
        &self,
        block: &Block,
        context: &Context,
        reason: StopReason,
    ) -> Result<(), ScriptError> {
        let event = StopEvent {
            block_id: block.id().map(str::to_string),
            kind: block.kind().to_string(),
            reason,
            depth: context.depth(),
        };
        if reason == StopReason::Finish {
            self.publish(DebugEvent::Stopped(event));
            return Ok(());
        }
        if self.running_free.load(Ordering::Acquire) {
            return Ok(());
        }
        self.publish(DebugEvent::Stopped(event));

        let command = self.commands.lock().await.recv().await;
        match command {
            Some(StepCommand::Step) => Ok(()),
            Some(StepCommand::Continue) | None => {
                debug!("stepper released, continuing without stops");
                self.running_free.store(true, Ordering::Release);
                Ok(())
            }
            Some(StepCommand::Abort) => Err(ScriptError::Aborted),
        }
    }

    fn script_finished(&self, error: Option<&ScriptError>) {
        self.publish(DebugEvent::Finished {
            error: error.map(ToString::to_string),
        });
    }
}

impl StepperHandle {
    /// Wait for the next event; `None` once the stepper is dropped.
    pub async fn next_event(&mut self) -> Option<DebugEvent> {
        self.events.recv().await
    }

    /// Let the script run to the next stop point.
    pub fn step(&self) {
        let _ = self.commands.send(StepCommand::Step);
    }

    /// Let the script run to completion.
    pub fn resume(&self) {
        let _ = self.commands.send(StepCommand::Continue);
    }

    /// Abort the script at its current stop point.
    pub fn abort(&self) {
        let _ = self.commands.send(StepCommand::Abort);
    }
}
