//! Commands, result callbacks and ordered commit batches.

use crate::error::{CoreError, CoreResult, ResultCode};
use crate::ordering::CommitOrder;
use log::{debug, error, info};

/// Receives the outcome of a commit, undo or setting command.
pub trait ResultCallback {
    fn on_command_result(&self, code: ResultCode, message: &str);
}

impl<F> ResultCallback for F
where
    F: Fn(ResultCode, &str),
{
    fn on_command_result(&self, code: ResultCode, message: &str) {
        self(code, message)
    }
}

/// Callback that discards every result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResultCallback;

impl ResultCallback for NullResultCallback {
    fn on_command_result(&self, _code: ResultCode, _message: &str) {}
}

/// Delivers `result` to `callback` as a code plus diagnostic string.
pub fn report_result<T>(callback: &dyn ResultCallback, result: &CoreResult<T>) {
    match result {
        Ok(_) => callback.on_command_result(ResultCode::Success, ResultCode::Success.as_str()),
        Err(err) => callback.on_command_result(err.code(), &err.to_string()),
    }
}

/// A unit of commit-time work executed against a context `C`.
///
/// A command that fails must leave no partial effects behind: whatever it
/// applied before the failure is reverted before `execute` returns.
pub trait Command<C: ?Sized> {
    fn commit_order(&self) -> CommitOrder {
        CommitOrder::Unordered
    }

    /// Short human-readable description used in logs and diagnostics.
    fn describe(&self) -> String;

    fn execute(&mut self, ctx: &mut C) -> CoreResult<()>;

    /// True once the command has executed and holds a memento to revert.
    fn is_undoable(&self) -> bool {
        false
    }

    fn undo(&mut self, _ctx: &mut C) -> CoreResult<()> {
        Err(CoreError::command_not_undoable(self.describe()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Staged,
    Committed,
    RolledBack,
    Undone,
}

/// A mixed batch of commands executed in ordering-key order.
///
/// Commands with equal keys keep their insertion order.
pub struct CommitBatch<C: ?Sized> {
    commands: Vec<Box<dyn Command<C>>>,
    state: BatchState,
}

impl<C: ?Sized> CommitBatch<C> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: BatchState::Staged,
        }
    }

    pub fn push<T>(&mut self, command: T)
    where
        T: Command<C> + 'static,
    {
        self.commands.push(Box::new(command));
    }

    pub fn push_boxed(&mut self, command: Box<dyn Command<C>>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Ordering keys and descriptions in the order `commit` will run them.
    pub fn execution_plan(&self) -> Vec<(CommitOrder, String)> {
        let mut plan: Vec<_> = self
            .commands
            .iter()
            .map(|cmd| (cmd.commit_order(), cmd.describe()))
            .collect();
        plan.sort_by_key(|(order, _)| *order);
        plan
    }

    /// Executes every command in non-decreasing ordering-key order.
    ///
    /// On the first failure, already executed commands are undone in reverse
    /// order and `Fail` is reported.
    pub fn commit(&mut self, ctx: &mut C, callback: &dyn ResultCallback) -> CoreResult<()> {
        if self.state != BatchState::Staged {
            let result = Err(CoreError::fail("batch has already been committed"));
            report_result(callback, &result);
            return result;
        }

        self.commands.sort_by_key(|cmd| cmd.commit_order());

        for index in 0..self.commands.len() {
            let command = &mut self.commands[index];
            debug!("executing [{}] {}", command.commit_order(), command.describe());
            if let Err(err) = command.execute(ctx) {
                let description = command.describe();
                error!("commit failed at {}: {}", description, err);
                if let Err(revert_err) = self.revert(ctx, index) {
                    error!("rollback incomplete: {}", revert_err);
                }
                self.state = BatchState::RolledBack;
                let result = Err(CoreError::fail(format!(
                    "commit failed at {}: {}",
                    description, err
                )));
                report_result(callback, &result);
                return result;
            }
        }

        info!("committed batch of {} commands", self.commands.len());
        self.state = BatchState::Committed;
        let result = Ok(());
        report_result(callback, &result);
        result
    }

    /// Reverts a committed batch in reverse execution order.
    ///
    /// Undo is best effort: a failing command is logged and the rest are
    /// still reverted; the first failure is reported as `Fail`.
    pub fn undo(&mut self, ctx: &mut C, callback: &dyn ResultCallback) -> CoreResult<()> {
        if self.state != BatchState::Committed {
            let result = Err(CoreError::command_not_undoable(format!(
                "batch in state {:?}",
                self.state
            )));
            report_result(callback, &result);
            return result;
        }

        let result = self
            .revert(ctx, self.commands.len())
            .map_err(|err| CoreError::fail(format!("undo incomplete: {}", err)));
        self.state = BatchState::Undone;
        if result.is_ok() {
            info!("undid batch of {} commands", self.commands.len());
        }
        report_result(callback, &result);
        result
    }

    fn revert(&mut self, ctx: &mut C, executed: usize) -> CoreResult<()> {
        let mut first_error = None;
        for command in self.commands[..executed].iter_mut().rev() {
            if !command.is_undoable() {
                debug!("skipping non-undoable {}", command.describe());
                continue;
            }
            if let Err(err) = command.undo(ctx) {
                error!("failed to undo {}: {}", command.describe(), err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<C: ?Sized> Default for CommitBatch<C> {
    fn default() -> Self {
        Self::new()
    }
}
