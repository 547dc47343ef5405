//! Contexts - タスクと一括走査の実行コンテキスト
//!
//! - **task**: 非同期タスクの投入（`TaskFactory`）と観測（`TaskContext` / `TaskHandle`）
//! - **execution**: callback が受け取る `ExecutionContext`
//! - **for_all**: 同期的な一括走査 `ForAll`
//! - **item**: 走査の 1 ステップ分の `ItemContext`
//! - **state**: state factory（遅延 thunk / item ごとの factory）

pub mod execution;
pub mod for_all;
pub mod item;
pub mod state;
pub mod task;

pub use self::execution::ExecutionContext;
pub use self::for_all::{BatchReport, ForAll, WalkEnd, for_all, for_all_with_state};
pub use self::item::{Flow, ItemContext};
pub use self::state::{ItemStateFactory, LazyState, NoState};
pub use self::task::{TaskContext, TaskFactory, TaskHandle, TaskOptions};
