//! Recording collaborators.
//!
//! Each one stores what it was asked to do so tests can assert on the
//! interaction rather than on downstream behavior.

use crate::error::PortResult;
use crate::ports::{CommandExecutor, MaintainerNotifier, Messenger};
use crate::types::{CommandResult, Dispatchable, MaintainerNotice};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Notifier that records `(channel, notice)` pairs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, MaintainerNotice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(String, MaintainerNotice)> {
        self.notices.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MaintainerNotifier for RecordingNotifier {
    async fn notify_admins(&self, channel: &str, notice: MaintainerNotice) -> PortResult<()> {
        self.notices.lock().push((channel.to_string(), notice));
        Ok(())
    }
}

/// Executor that records every dispatchable and answers with a fixed result.
#[derive(Debug)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Dispatchable>>,
    result: CommandResult,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::returning(CommandResult::noop())
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(result: CommandResult) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            result,
        }
    }

    pub fn calls(&self) -> Vec<Dispatchable> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, dispatchable: &Dispatchable) -> PortResult<CommandResult> {
        self.calls.lock().push(dispatchable.clone());
        Ok(self.result.clone())
    }
}

/// Messenger that records each result it was asked to fan out.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    dispatched: Mutex<Vec<(CommandResult, Dispatchable)>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<(CommandResult, Dispatchable)> {
        self.dispatched.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.dispatched.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn dispatch(
        &self,
        result: CommandResult,
        dispatchable: &Dispatchable,
    ) -> PortResult<()> {
        self.dispatched.lock().push((result, dispatchable.clone()));
        Ok(())
    }
}
