//! TaskContext - 投入された 1 件の work のハンドル
//!
//! # 流れ
//! 1. `TaskFactory::submit*` が cancellation source を新規に作る
//! 2. callback を包んだ work を作り、その場で start（scheduler に渡す）
//! 3. scheduler が work を dispatch した時点で ExecutionContext を作り callback を呼ぶ
//! 4. 結果を終端状態（Succeeded / Faulted / Cancelled）に分類して報告
//!
//! # 学習ポイント
//! - 状態は `watch`、結果は `oneshot` で報告（scheduler は完了を追跡しない）
//! - Drop guard で「実行されずに捨てられた work」も必ず終端させる
//! - panic は `catch_unwind` で fault に変換

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::execution::ExecutionContext;
use super::state::LazyState;
use crate::domain::{BoxError, Cancelled, SubmitError, TaskError, TaskId, TaskState, Timeline};
use crate::ports::{
    BlockingWork, BoxWork, Clock, IdGenerator, Scheduler, SystemClock, UlidGenerator,
};

// ========================================
// TaskHandle
// ========================================

struct TaskShared {
    id: TaskId,
    name: Option<String>,
    scheduler_name: String,
    source: CancellationToken,
    status: watch::Sender<TaskState>,
    timeline: Mutex<Timeline>,
    clock: Arc<dyn Clock>,
    /// The scheduler took the work.
    accepted: AtomicBool,
    /// Cancellation requested when the task reached its terminal state.
    cancelled_at_finish: AtomicBool,
}

/// TaskHandle は task の共有ビュー
///
/// state factory はこれを受け取ります。clone しても同じ task を指します。
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskShared>,
}

impl TaskHandle {
    fn new(
        id: TaskId,
        name: Option<String>,
        scheduler_name: String,
        source: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(TaskState::Created);
        let timeline = Timeline::new(clock.now());
        Self {
            inner: Arc::new(TaskShared {
                id,
                name,
                scheduler_name,
                source,
                status,
                timeline: Mutex::new(timeline),
                clock,
                accepted: AtomicBool::new(false),
                cancelled_at_finish: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn scheduler_name(&self) -> &str {
        &self.inner.scheduler_name
    }

    /// Request cooperative cancellation. Idempotent, no-op once terminal.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.inner.source.cancel();
    }

    /// Whether cancellation was requested. Frozen once the task is terminal,
    /// so a parent cancelled after completion does not show up here.
    pub fn is_cancellation_requested(&self) -> bool {
        if self.state().is_terminal() {
            return self.inner.cancelled_at_finish.load(Ordering::SeqCst);
        }
        self.inner.source.is_cancelled()
    }

    /// A token observing this task's cancellation source.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.source.clone()
    }

    pub fn state(&self) -> TaskState {
        *self.inner.status.borrow()
    }

    pub fn timeline(&self) -> Timeline {
        self.lock_timeline().clone()
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.inner.status.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // sender lives in `inner`, which `self` keeps alive
            Err(_) => self.state(),
        }
    }

    fn lock_timeline(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.inner
            .timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_scheduled(&self) {
        self.inner.status.send_if_modified(|state| {
            if *state == TaskState::Created {
                *state = TaskState::Scheduled;
                true
            } else {
                false
            }
        });
    }

    fn mark_running(&self) {
        self.lock_timeline().started_at = Some(self.inner.clock.now());
        self.inner.status.send_replace(TaskState::Running);
    }

    fn mark_accepted(&self) {
        self.inner.accepted.store(true, Ordering::SeqCst);
    }

    fn is_accepted(&self) -> bool {
        self.inner.accepted.load(Ordering::SeqCst)
    }

    fn mark_finished(&self, state: TaskState) {
        self.lock_timeline().finished_at = Some(self.inner.clock.now());
        self.inner
            .cancelled_at_finish
            .store(self.inner.source.is_cancelled(), Ordering::SeqCst);
        self.inner.status.send_replace(state);
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("scheduler", &self.inner.scheduler_name)
            .field("state", &self.state())
            .finish()
    }
}

// ========================================
// Completion (work 側の報告口)
// ========================================

/// Completion は work が結果を 1 回だけ報告するための guard
///
/// 報告せずに drop された場合（scheduler が work を捨てた、runtime が落ちた）は
/// `TaskError::Abandoned` を報告します。
/// scheduler が受け付ける前に drop された場合（投入が `Err` になった）はログを出しません。
struct Completion<R> {
    handle: TaskHandle,
    tx: Option<oneshot::Sender<Result<R, TaskError>>>,
}

impl<R> Completion<R> {
    fn new(handle: TaskHandle, tx: oneshot::Sender<Result<R, TaskError>>) -> Self {
        Self {
            handle,
            tx: Some(tx),
        }
    }

    /// Move to Running, or settle as Cancelled if cancellation came first.
    fn begin(&mut self) -> bool {
        if self.handle.is_cancellation_requested() {
            tracing::debug!("cancellation requested before dispatch, skipping callback");
            self.settle(Err(TaskError::Cancelled));
            return false;
        }
        self.handle.mark_running();
        tracing::debug!("task running");
        true
    }

    fn finish(mut self, outcome: Result<R, TaskError>) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Result<R, TaskError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let state = match &outcome {
            Ok(_) => TaskState::Succeeded,
            Err(TaskError::Cancelled) => TaskState::Cancelled,
            Err(_) => TaskState::Faulted,
        };
        match &outcome {
            Ok(_) | Err(TaskError::Cancelled) => tracing::debug!(?state, "task finished"),
            Err(err) => tracing::warn!(?state, error = %err, "task finished"),
        }
        // state first, so a caller woken by the result sees a terminal state
        self.handle.mark_finished(state);
        let _ = tx.send(outcome);
    }
}

impl<R> Drop for Completion<R> {
    fn drop(&mut self) {
        if self.tx.is_none() {
            return;
        }
        if self.handle.is_accepted() {
            self.settle(Err(TaskError::Abandoned));
        } else {
            // rejected at submission: the caller gets `SubmitError` instead
            self.tx = None;
            self.handle.mark_finished(TaskState::Faulted);
        }
    }
}

fn classify<R, E>(
    outcome: Result<Result<R, E>, Box<dyn Any + Send>>,
    token: &CancellationToken,
) -> Result<R, TaskError>
where
    E: Into<BoxError>,
{
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            let err: BoxError = err.into();
            if err.is::<Cancelled>() && token.is_cancelled() {
                Err(TaskError::Cancelled)
            } else {
                Err(TaskError::Faulted(err))
            }
        }
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ========================================
// TaskContext
// ========================================

enum PendingWork {
    Async(BoxWork),
    Blocking(BlockingWork),
}

/// TaskContext は投入者が持つハンドル
///
/// - cancellation source を排他的に所有（投入ごとに新規作成）
/// - scheduler との結び付きを保持
/// - `R` は callback の戻り値（fire-and-forget なら `()`）
///
/// 投入 API は生成直後に start するので、呼び出し側が work を
/// 実行前にいじれるのは `cancel()` だけです。
pub struct TaskContext<R = ()> {
    handle: TaskHandle,
    scheduler: Arc<dyn Scheduler>,
    outcome: oneshot::Receiver<Result<R, TaskError>>,
}

impl<R> TaskContext<R> {
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Request cooperative cancellation. Idempotent, no-op once terminal.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.handle.is_cancellation_requested()
    }

    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    pub fn timeline(&self) -> Timeline {
        self.handle.timeline()
    }

    /// Tasks are started at submission, so this always fails with
    /// `TaskError::AlreadyStarted`.
    pub fn start(&self) -> Result<(), TaskError> {
        Err(TaskError::AlreadyStarted)
    }

    pub async fn wait(&self) -> TaskState {
        self.handle.wait().await
    }

    /// Wait for the callback's value.
    ///
    /// Fails with the fault, `Cancelled`, or `Abandoned` when the task did
    /// not succeed.
    pub async fn result(self) -> Result<R, TaskError> {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::Abandoned),
        }
    }
}

impl<R> std::fmt::Debug for TaskContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ========================================
// TaskOptions / TaskFactory
// ========================================

/// TaskOptions は投入ごとの設定
///
/// 未指定の項目は `TaskFactory` の既定値で埋めます。
#[derive(Clone, Default)]
pub struct TaskOptions {
    name: Option<String>,
    parent: Option<CancellationToken>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in logs and spans. Must not be blank.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Cancelling `parent` also cancels the task. The task's own source stays
    /// private: cancelling the task never cancels `parent`.
    pub fn parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Run on `scheduler` instead of the factory's.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    fn or(self, defaults: &TaskOptions) -> Self {
        Self {
            name: self.name.or_else(|| defaults.name.clone()),
            parent: self.parent.or_else(|| defaults.parent.clone()),
            scheduler: self.scheduler.or_else(|| defaults.scheduler.clone()),
        }
    }

    fn validate(&self) -> Result<(), SubmitError> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(SubmitError::InvalidOptions(
                "task name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOptions")
            .field("name", &self.name)
            .field("has_parent", &self.parent.is_some())
            .field("scheduler", &self.scheduler.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

/// TaskFactory は投入 API
///
/// scheduler は明示的に渡します（ambient な既定値は探さない）。
///
/// # 使用例
/// ```ignore
/// let pool: Arc<dyn Scheduler> = Arc::new(ThreadPoolScheduler::new(&config)?);
/// let factory = TaskFactory::new(pool);
/// let task = factory.submit(|ctx| async move {
///     ctx.check_cancelled()?;
///     Ok::<_, BoxError>(42)
/// })?;
/// assert_eq!(task.result().await?, 42);
/// ```
pub struct TaskFactory {
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    defaults: TaskOptions,
}

impl TaskFactory {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            defaults: TaskOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Options applied to every submission that leaves them unset.
    pub fn with_defaults(mut self, defaults: TaskOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Submit an async callback without per-run state.
    pub fn submit<R, E, F, Fut>(&self, callback: F) -> Result<TaskContext<R>, SubmitError>
    where
        F: FnOnce(ExecutionContext<()>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Into<BoxError>,
        R: Send + 'static,
    {
        self.submit_with_state(|_| (), TaskOptions::default(), callback)
    }

    /// Submit an async callback whose state comes from `state_factory`.
    ///
    /// `state_factory` runs only when the callback reads the state, never at
    /// submission time.
    pub fn submit_with_state<S, SF, R, E, F, Fut>(
        &self,
        state_factory: SF,
        options: TaskOptions,
        callback: F,
    ) -> Result<TaskContext<R>, SubmitError>
    where
        S: Send + Sync + 'static,
        SF: Fn(&TaskHandle) -> S + Send + Sync + 'static,
        F: FnOnce(ExecutionContext<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Into<BoxError>,
        R: Send + 'static,
    {
        self.prepare(state_factory, options, move |handle, state, mut completion| {
            let span = tracing::debug_span!(
                "task",
                task_id = %handle.id(),
                name = handle.name().unwrap_or_default()
            );
            let token = handle.cancellation_token();
            let work = async move {
                if !completion.begin() {
                    return;
                }
                let ctx = ExecutionContext::new(handle, state);
                let outcome = AssertUnwindSafe(async move { callback(ctx).await })
                    .catch_unwind()
                    .await;
                completion.finish(classify(outcome, &token));
            };
            PendingWork::Async(Box::pin(work.instrument(span)))
        })
    }

    /// Submit a callback that may block its thread.
    pub fn submit_blocking<R, E, F>(&self, callback: F) -> Result<TaskContext<R>, SubmitError>
    where
        F: FnOnce(ExecutionContext<()>) -> Result<R, E> + Send + 'static,
        E: Into<BoxError>,
        R: Send + 'static,
    {
        self.submit_blocking_with_state(|_| (), TaskOptions::default(), callback)
    }

    pub fn submit_blocking_with_state<S, SF, R, E, F>(
        &self,
        state_factory: SF,
        options: TaskOptions,
        callback: F,
    ) -> Result<TaskContext<R>, SubmitError>
    where
        S: Send + Sync + 'static,
        SF: Fn(&TaskHandle) -> S + Send + Sync + 'static,
        F: FnOnce(ExecutionContext<S>) -> Result<R, E> + Send + 'static,
        E: Into<BoxError>,
        R: Send + 'static,
    {
        self.prepare(state_factory, options, move |handle, state, mut completion| {
            let span = tracing::debug_span!(
                "task",
                task_id = %handle.id(),
                name = handle.name().unwrap_or_default(),
                blocking = true
            );
            let token = handle.cancellation_token();
            PendingWork::Blocking(Box::new(move || {
                let _entered = span.enter();
                if !completion.begin() {
                    return;
                }
                let ctx = ExecutionContext::new(handle, state);
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(move || callback(ctx)));
                completion.finish(classify(outcome, &token));
            }))
        })
    }

    fn prepare<S, SF, R, B>(
        &self,
        state_factory: SF,
        options: TaskOptions,
        build: B,
    ) -> Result<TaskContext<R>, SubmitError>
    where
        S: 'static,
        SF: Fn(&TaskHandle) -> S + Send + Sync + 'static,
        B: FnOnce(TaskHandle, LazyState<S>, Completion<R>) -> PendingWork,
    {
        let options = options.or(&self.defaults);
        options.validate()?;

        let scheduler = options
            .scheduler
            .unwrap_or_else(|| Arc::clone(&self.scheduler));
        let source = match &options.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let handle = TaskHandle::new(
            self.ids.generate_task_id(),
            options.name,
            scheduler.name().to_string(),
            source,
            Arc::clone(&self.clock),
        );

        let factory_handle = handle.clone();
        let state = LazyState::new(move || state_factory(&factory_handle));

        let (tx, rx) = oneshot::channel();
        let work = build(handle.clone(), state, Completion::new(handle.clone(), tx));

        // before scheduling: the work may move the state to Running at once
        handle.mark_scheduled();
        match work {
            PendingWork::Async(work) => scheduler.schedule(work)?,
            PendingWork::Blocking(work) => scheduler.schedule_blocking(work)?,
        }
        handle.mark_accepted();
        tracing::debug!(
            task_id = %handle.id(),
            scheduler = %scheduler.name(),
            "task scheduled"
        );

        Ok(TaskContext {
            handle,
            scheduler,
            outcome: rx,
        })
    }
}
