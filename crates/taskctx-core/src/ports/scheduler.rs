//! Scheduler port - work を実行する側の抽象化
//!
//! # 学習ポイント
//! - Object-safe trait（`Arc<dyn Scheduler>` で持ち回す）
//! - Future の型消去（`Pin<Box<dyn Future>>`）
//! - 受付失敗は同期的に `Result` で返す

use std::future::Future;
use std::pin::Pin;

use crate::domain::SchedulerError;

/// スケジューラに渡す非同期の work
pub type BoxWork = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// スケジューラに渡すブロッキングの work
pub type BlockingWork = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler は work を受け取り、いずれ実行する
///
/// work の結果は work 自身が `TaskContext` に報告するので、
/// スケジューラは完了を追跡する必要がありません。
///
/// # 受付の契約
/// - `Ok(())` を返したら、その work はいずれ実行されるか、実行されずに drop される
/// - drop された場合、task は `TaskError::Abandoned` で観測される
/// - 受け付けられない場合は work を実行せず `Err` を返す
pub trait Scheduler: Send + Sync {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    fn schedule(&self, work: BoxWork) -> Result<(), SchedulerError>;

    /// Run a callback that may block the thread it runs on.
    fn schedule_blocking(&self, work: BlockingWork) -> Result<(), SchedulerError>;
}
