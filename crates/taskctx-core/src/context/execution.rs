//! ExecutionContext - callback が受け取る per-run のビュー
//!
//! # 学習ポイント
//! - 取消は協調的: token を poll するのは callback の責任
//! - state は callback が読んだ時点で初めて作られる（投入時には作らない）

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use super::state::LazyState;
use super::task::TaskHandle;
use crate::domain::{Cancelled, TaskId};

/// ExecutionContext は callback の唯一の引数
///
/// # 使用例
/// ```ignore
/// factory.submit_with_state(|task| open_cursor(task.id()), TaskOptions::new(), |ctx| async move {
///     while let Some(row) = ctx.state_cached().next_row() {
///         ctx.check_cancelled()?;
///         process(row);
///     }
///     Ok::<_, BoxError>(())
/// })?;
/// ```
pub struct ExecutionContext<S> {
    handle: TaskHandle,
    token: CancellationToken,
    state: LazyState<S>,
    cached: OnceLock<S>,
}

impl<S> ExecutionContext<S> {
    pub(crate) fn new(handle: TaskHandle, state: LazyState<S>) -> Self {
        Self {
            token: handle.cancellation_token(),
            handle,
            state,
            cached: OnceLock::new(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.id()
    }

    /// The owning task, as seen by the state factory.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Cancelled)` once cancellation was requested.
    ///
    /// Returning that error from the callback ends the task as `Cancelled`.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Run the state factory and return a fresh value.
    ///
    /// Every call re-runs the factory. See [`LazyState`].
    pub fn state(&self) -> S {
        self.state.get()
    }

    /// Run the state factory on first use, then return the same value.
    pub fn state_cached(&self) -> &S {
        self.cached.get_or_init(|| self.state.get())
    }
}

impl<S> std::fmt::Debug for ExecutionContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.handle.id())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
