//! Errors - エラー型と分類
//!
//! # 分類
//! - **投入時エラー** (`SubmitError`): 呼び出し元に同期的に返す。スケジューリング前に検出。
//! - **実行時エラー** (`TaskError`): task の fault channel に積まれ、`result()` で観測する。
//! - **集約エラー** (`AggregateError`): ForAll が集めたエラー（`aggregate` モジュール）。

use thiserror::Error;

/// Callback が返す任意のエラー
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cancelled は「取消を観測して抜けた」ことを示すマーカー
///
/// `ExecutionContext::check_cancelled()` が返します。callback がこれを
/// そのまま返し、かつ token が取消済みであれば task は `Cancelled` で終わります。
/// token が取消されていないのにこれを返した場合は通常の fault 扱いです。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// SchedulerError はスケジューラが work を受け付けられない場合のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler '{0}' is closed")]
    Closed(String),

    #[error("no tokio runtime is available: {0}")]
    NoRuntime(String),

    #[error("failed to build scheduler runtime: {0}")]
    Build(String),
}

/// SubmitError は投入 API が同期的に返すエラー
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid task options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// TaskError は task の終端状態が成功でなかったことを表す
#[derive(Debug, Error)]
pub enum TaskError {
    /// Callback returned an error.
    #[error("task faulted: {0}")]
    Faulted(#[source] BoxError),

    /// Callback panicked; the payload message is kept when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Cancellation was requested and acknowledged.
    #[error("task was cancelled")]
    Cancelled,

    /// The scheduler dropped the work without running it.
    #[error("task was dropped by its scheduler before completing")]
    Abandoned,

    /// `start()` on a task that is already started.
    #[error("task has already been started")]
    AlreadyStarted,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, TaskError::Faulted(_) | TaskError::Panicked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn faulted_keeps_source() {
        let err = TaskError::Faulted("disk full".into());
        assert!(err.is_faulted());
        assert_eq!(err.to_string(), "task faulted: disk full");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
    }

    #[test]
    fn submit_error_wraps_scheduler_error() {
        let err: SubmitError = SchedulerError::Closed("pool".to_string()).into();
        assert_eq!(err.to_string(), "scheduler 'pool' is closed");
    }

    #[test]
    fn cancelled_marker_downcasts_from_box_error() {
        let boxed: BoxError = Box::new(Cancelled);
        assert!(boxed.is::<Cancelled>());
    }
}
