//! Impls - ports の実装
//!
//! - `TokioScheduler` / `ThreadPoolScheduler`: 本番用
//! - `ManualScheduler`: テスト・組み込み用（実行タイミングを呼び出し側が決める）

pub mod manual_scheduler;
pub mod tokio_scheduler;

pub use self::manual_scheduler::ManualScheduler;
pub use self::tokio_scheduler::{ThreadPoolScheduler, TokioScheduler};
