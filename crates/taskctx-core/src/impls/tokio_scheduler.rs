//! TokioScheduler / ThreadPoolScheduler - tokio 上のスケジューラ
//!
//! - **TokioScheduler**: 既存 runtime の `Handle` に work を流す
//! - **ThreadPoolScheduler**: 自前の multi-thread runtime を持つ既定スケジューラ
//!
//! # 既定スケジューラの扱い
//! ambient な既定値を途中で探しにいくことはしません。
//! 起動時に `ThreadPoolScheduler::new(&config)` を 1 回呼び、
//! `Arc<dyn Scheduler>` として `TaskFactory` に渡します。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::SchedulerConfig;
use crate::domain::SchedulerError;
use crate::ports::{BlockingWork, BoxWork, Scheduler};

/// TokioScheduler は tokio の `Handle` に work を spawn する
///
/// `JoinHandle` は捨てます（結果は work 自身が報告する）。
/// runtime が落ちていた場合 work は drop され、task は `Abandoned` になります。
pub struct TokioScheduler {
    name: String,
    handle: Handle,
    closed: AtomicBool,
}

impl TokioScheduler {
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            name: "tokio".to_string(),
            handle,
            closed: AtomicBool::new(false),
        }
    }

    /// Bind to the runtime the caller is running in.
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| SchedulerError::NoRuntime(e.to_string()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Refuse further work. Work already accepted keeps running.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), SchedulerError> {
        if self.is_closed() {
            return Err(SchedulerError::Closed(self.name.clone()));
        }
        Ok(())
    }
}

impl Scheduler for TokioScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, work: BoxWork) -> Result<(), SchedulerError> {
        self.ensure_open()?;
        drop(self.handle.spawn(work));
        Ok(())
    }

    fn schedule_blocking(&self, work: BlockingWork) -> Result<(), SchedulerError> {
        self.ensure_open()?;
        drop(self.handle.spawn_blocking(work));
        Ok(())
    }
}

/// ThreadPoolScheduler は自前の runtime を所有する
///
/// # 注意
/// - runtime を所有するので、async context の中で drop しないこと
///   （tokio が panic する）。async 側から止めるなら `shutdown()` を使う。
pub struct ThreadPoolScheduler {
    inner: TokioScheduler,
    runtime: Mutex<Option<Runtime>>,
}

impl ThreadPoolScheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        config
            .validate()
            .map_err(|e| SchedulerError::Build(e.to_string()))?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| SchedulerError::Build(e.to_string()))?;

        tracing::debug!(
            worker_threads = config.worker_threads,
            max_blocking_threads = config.max_blocking_threads,
            thread_name = %config.thread_name,
            "thread pool scheduler started"
        );

        let inner = TokioScheduler::from_handle(runtime.handle().clone())
            .with_name(config.thread_name.clone());
        Ok(Self {
            inner,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    pub fn handle(&self) -> &Handle {
        self.inner.handle()
    }

    /// Drive `future` to completion on the pool from a non-async thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.inner.handle().block_on(future)
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close, then stop the runtime, waiting at most `timeout` for blocking work.
    ///
    /// Work accepted but not finished may still run to completion (queued
    /// blocking work is drained by the blocking threads) or be dropped, in
    /// which case its task ends as `Abandoned`.
    pub fn shutdown(&self, timeout: Duration) {
        self.close();
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            tracing::debug!(scheduler = %self.inner.name(), "thread pool scheduler shutting down");
            runtime.shutdown_timeout(timeout);
        }
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schedule(&self, work: BoxWork) -> Result<(), SchedulerError> {
        self.inner.schedule(work)
    }

    fn schedule_blocking(&self, work: BlockingWork) -> Result<(), SchedulerError> {
        self.inner.schedule_blocking(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn current_runs_async_work() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = oneshot::channel();
        scheduler
            .schedule(Box::pin(async move {
                let _ = tx.send(7);
            }))
            .unwrap();
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn current_runs_blocking_work() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = oneshot::channel();
        scheduler
            .schedule_blocking(Box::new(move || {
                let _ = tx.send("blocking");
            }))
            .unwrap();
        assert_eq!(rx.await.unwrap(), "blocking");
    }

    #[test]
    fn current_without_runtime_fails() {
        let err = TokioScheduler::current().err().unwrap();
        assert!(matches!(err, SchedulerError::NoRuntime(_)));
    }

    #[tokio::test]
    async fn closed_scheduler_refuses_work() {
        let scheduler = TokioScheduler::current().unwrap().with_name("io");
        scheduler.close();
        let err = scheduler.schedule(Box::pin(async {})).unwrap_err();
        assert_eq!(err, SchedulerError::Closed("io".to_string()));
    }

    #[test]
    fn thread_pool_runs_work_and_shuts_down() {
        let config = SchedulerConfig {
            worker_threads: 2,
            ..SchedulerConfig::default()
        };
        let pool = ThreadPoolScheduler::new(&config).unwrap();
        assert_eq!(pool.name(), "taskctx-worker");

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let c = Arc::clone(&counter);
        pool.schedule(Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        }))
        .unwrap();

        pool.block_on(rx).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        pool.shutdown(Duration::from_secs(1));
        assert!(pool.is_closed());
        assert!(pool.schedule(Box::pin(async {})).is_err());
    }

    #[test]
    fn invalid_config_is_a_build_error() {
        let config = SchedulerConfig {
            thread_name: String::new(),
            ..SchedulerConfig::default()
        };
        let err = ThreadPoolScheduler::new(&config).err().unwrap();
        assert!(matches!(err, SchedulerError::Build(_)));
    }
}
