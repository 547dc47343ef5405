//! taskctx-core
//!
//! Task execution contexts and a batch iteration driver.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, errors, aggregate）
//! - **ports**: 抽象化レイヤー（Scheduler, Clock, IdGenerator）
//! - **impls**: 実装（TokioScheduler, ThreadPoolScheduler, ManualScheduler）
//! - **context**: 実行コンテキスト（TaskFactory, ExecutionContext, ForAll, ItemContext）
//! - **config**: 既定 scheduler の設定
//!
//! # 学習ポイント
//! - 既定 scheduler はグローバルではなく `TaskFactory::new` に明示的に渡す
//! - 取消は協調的（token を見るのは callback 側）
//! - 走査のエラーは集めて最後に `AggregateError` で返す

pub mod config;
pub mod context;
pub mod domain;
pub mod impls;
pub mod ports;

pub use config::{ConfigError, SchedulerConfig};
pub use context::{
    BatchReport, ExecutionContext, Flow, ForAll, ItemContext, TaskContext, TaskFactory,
    TaskHandle, TaskOptions, WalkEnd, for_all, for_all_with_state,
};
pub use domain::{
    AggregateError, BoxError, CapturedError, Cancelled, SubmitError, TaskError, TaskId,
    TaskState,
};
