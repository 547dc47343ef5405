//! ManualScheduler - 呼び出し側が実行タイミングを決めるスケジューラ
//!
//! # 学習ポイント
//! - 「投入済みだがまだ動いていない」状態を決定的に作れる
//! - lock を持ったまま await しない（pop してから lock を離して実行）
//!
//! テストや、イベントループを自前で回す組み込み用途向けです。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::SchedulerError;
use crate::ports::{BlockingWork, BoxWork, Scheduler};

enum Job {
    Async(BoxWork),
    Blocking(BlockingWork),
}

/// ManualScheduler は work を FIFO に溜め、`run_next` / `run_pending` で実行する
///
/// # 使用例
/// ```ignore
/// let scheduler = Arc::new(ManualScheduler::new());
/// let factory = TaskFactory::new(scheduler.clone());
/// let task = factory.submit(|_ctx| async { Ok::<_, BoxError>(1) })?;
/// assert_eq!(scheduler.pending(), 1);
/// scheduler.run_pending().await;
/// ```
pub struct ManualScheduler {
    name: String,
    queue: Mutex<VecDeque<Job>>,
    closed: AtomicBool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::named("manual")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Run the oldest queued work. Returns false when nothing was queued.
    pub async fn run_next(&self) -> bool {
        let job = self.lock().pop_front();
        match job {
            Some(Job::Async(work)) => {
                work.await;
                true
            }
            Some(Job::Blocking(work)) => {
                work();
                true
            }
            None => false,
        }
    }

    /// Run until the queue is empty, including work queued while running.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next().await {
            ran += 1;
        }
        ran
    }

    /// Drop every queued work without running it.
    pub fn discard_pending(&self) -> usize {
        let drained: Vec<Job> = self.lock().drain(..).collect();
        drained.len()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, job: Job) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed(self.name.clone()));
        }
        self.lock().push_back(job);
        Ok(())
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, work: BoxWork) -> Result<(), SchedulerError> {
        self.push(Job::Async(work))
    }

    fn schedule_blocking(&self, work: BlockingWork) -> Result<(), SchedulerError> {
        self.push(Job::Blocking(work))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_in_fifo_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        scheduler
            .schedule(Box::pin(async move { l.lock().unwrap().push("a") }))
            .unwrap();
        let l = Arc::clone(&log);
        scheduler
            .schedule_blocking(Box::new(move || l.lock().unwrap().push("b")))
            .unwrap();

        assert_eq!(scheduler.pending(), 2);
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(scheduler.run_pending().await, 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert!(!scheduler.run_next().await);
    }

    #[tokio::test]
    async fn discard_drops_without_running() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        scheduler
            .schedule(Box::pin(async move { r.store(true, Ordering::SeqCst) }))
            .unwrap();

        assert_eq!(scheduler.discard_pending(), 1);
        assert_eq!(scheduler.run_pending().await, 0);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn closed_scheduler_refuses_work() {
        let scheduler = ManualScheduler::named("test");
        scheduler.close();
        let err = scheduler.schedule_blocking(Box::new(|| {})).unwrap_err();
        assert_eq!(err, SchedulerError::Closed("test".to_string()));
    }
}
