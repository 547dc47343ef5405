//! State - task のライフサイクル
//!
//! 状態遷移:
//! - Created -> Scheduled -> Running -> Succeeded
//! - Created -> Scheduled -> Running -> Faulted
//! - Created -> Scheduled -> Running -> Cancelled (callback が取消を観測して抜けた)
//! - Created -> Scheduled -> Cancelled (dispatch 前に取消要求があった)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// TaskState は `TaskContext` の状態
///
/// 投入 API は生成直後に start するので、`Created` はほぼ観測されません。
/// scheduler に拒否された投入は `SubmitError` になり、task は返りません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Wrapped but not yet handed to a scheduler.
    Created,

    /// Accepted by the scheduler, waiting to be dispatched.
    Scheduled,

    /// The callback is executing.
    Running,

    /// The callback returned a value.
    Succeeded,

    /// The callback returned an error or panicked.
    Faulted,

    /// Cancellation was requested and acknowledged.
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Faulted | TaskState::Cancelled
        )
    }
}

/// Timeline は task の時刻記録
///
/// 時刻は `Clock` port から取るので、テストでは `FixedClock` で固定できます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub submitted_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Timeline {
    pub fn new(submitted_at: DateTime<Utc>) -> Self {
        Self {
            submitted_at,
            started_at: None,
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::created(TaskState::Created, false)]
    #[case::scheduled(TaskState::Scheduled, false)]
    #[case::running(TaskState::Running, false)]
    #[case::succeeded(TaskState::Succeeded, true)]
    #[case::faulted(TaskState::Faulted, true)]
    #[case::cancelled(TaskState::Cancelled, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }

    #[test]
    fn state_serializes_as_snake_case() {
        let s = serde_json::to_string(&TaskState::Succeeded).unwrap();
        assert_eq!(s, "\"succeeded\"");
    }

    #[test]
    fn fresh_timeline_only_has_submission() {
        let now = Utc::now();
        let timeline = Timeline::new(now);
        assert_eq!(timeline.submitted_at, now);
        assert!(timeline.started_at.is_none());
        assert!(timeline.finished_at.is_none());
    }
}
