//! FIFO command queue with a single-consumer completion channel.
//!
//! Workers report through [`CommandQueue::complete`]. Results are only
//! attached to their commands when the tick drains the channel, and only the
//! head of the queue is ever finalized: a command that finishes early waits
//! for everything issued before it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::command::{Command, CommandId, CommandOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CommandState {
    Pending,
    Executing,
    Completed,
    Cancelled,
}

/// A command taken off the head of the queue.
#[derive(Debug)]
pub enum Finished {
    Completed(Command, CommandOutcome),
    Cancelled(Command),
}

struct Entry {
    command: Command,
    state: CommandState,
    outcome: Option<CommandOutcome>,
}

struct Completion {
    id: CommandId,
    outcome: CommandOutcome,
}

pub struct CommandQueue {
    entries: Mutex<VecDeque<Entry>>,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: Mutex<mpsc::UnboundedReceiver<Completion>>,
    wake: Notify,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            entries: Mutex::new(VecDeque::new()),
            sender,
            receiver: Mutex::new(receiver),
            wake: Notify::new(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().expect("command queue lock poisoned")
    }

    pub fn push(&self, command: Command) -> CommandId {
        let id = command.id;
        self.entries().push_back(Entry { command, state: CommandState::Pending, outcome: None });
        id
    }

    /// Mark a command as handed to its worker.
    pub fn start(&self, id: CommandId) {
        if let Some(entry) = self.entries().iter_mut().find(|e| e.command.id == id) {
            entry.state = CommandState::Executing;
        }
    }

    /// Report a worker's result. Safe to call from any task.
    pub fn complete(&self, id: CommandId, outcome: CommandOutcome) {
        if self.sender.send(Completion { id, outcome }).is_err() {
            debug!(%id, "completion channel closed");
        }
        self.wake.notify_one();
    }

    /// Flag a queued command as cancelled. Returns `false` if it is no
    /// longer queued.
    pub fn cancel(&self, id: CommandId) -> bool {
        let found = match self.entries().iter().find(|e| e.command.id == id) {
            Some(entry) => {
                entry.command.cancel_token().cancel();
                true
            }
            None => false,
        };
        if found {
            self.wake.notify_one();
        }
        found
    }

    pub fn state_of(&self, id: CommandId) -> Option<CommandState> {
        self.entries().iter().find(|e| e.command.id == id).map(|e| {
            if e.command.is_cancelled() {
                CommandState::Cancelled
            } else {
                e.state
            }
        })
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.entries().iter().any(|e| e.command.id == id)
    }

    /// Queued commands in FIFO order.
    pub fn pending(&self) -> Vec<(CommandId, &'static str)> {
        self.entries().iter().map(|e| (e.command.id, e.command.operation.name())).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Resolves after the next completion or cancellation.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Drain the completion channel, then take the head if it is done or
    /// cancelled. At most one command per call.
    pub fn pop_finished(&self) -> Option<Finished> {
        let mut entries = self.entries();
        self.drain(&mut entries);

        let head = entries.front()?;
        if head.command.is_cancelled() {
            let entry = entries.pop_front()?;
            return Some(Finished::Cancelled(entry.command));
        }
        head.outcome.as_ref()?;
        let Entry { command, outcome, .. } = entries.pop_front()?;
        outcome.map(|outcome| Finished::Completed(command, outcome))
    }

    fn drain(&self, entries: &mut VecDeque<Entry>) {
        let mut receiver = self.receiver.lock().expect("command queue receiver poisoned");
        while let Ok(Completion { id, outcome }) = receiver.try_recv() {
            match entries.iter_mut().find(|e| e.command.id == id) {
                Some(entry) => {
                    entry.state = CommandState::Completed;
                    entry.outcome = Some(outcome);
                }
                None => debug!(%id, "discarding result of a command that is no longer queued"),
            }
        }
    }
}
