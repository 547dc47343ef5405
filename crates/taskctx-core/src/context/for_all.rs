//! ForAll - 同期的な一括走査ドライバ
//!
//! # アルゴリズム
//! 1. sequence から item を 1 つずつ取り出す（index は 0 から連番、失敗しても飛ばさない）
//! 2. item ごとに state を 1 回作り、新しい ItemContext で callback を呼ぶ
//! 3. callback の `Err` は集めて先へ進む（`continue_on_error` が false ならその場で止める）
//! 4. callback 後に `cancel` が立っていれば止める
//! 5. sequence 自体の失敗（`try_run` の `Err` item）も集めて止める
//! 6. 集めたエラーは発生順に `AggregateError` にまとめる
//!
//! 走査は呼び出し元のスレッドで 1 件ずつ進みます。並行性はありません。
//! callback の panic はエラーではないので、そのまま伝播します。

use serde::Serialize;

use super::item::{Flow, ItemContext};
use super::state::{ItemStateFactory, NoState};
use crate::domain::{AggregateError, CapturedError, WalkId};
use crate::ports::IdGenerator;

/// WalkEnd は走査が止まった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkEnd {
    /// The sequence ran out.
    Exhausted,
    /// A callback set `cancel` or returned `Flow::Break`.
    Cancelled,
    /// A callback failed with `continue_on_error` cleared.
    StoppedOnError,
    /// The sequence itself failed while advancing.
    AdvanceFailed,
}

/// BatchReport は 1 回の走査の結果
#[derive(Debug)]
pub struct BatchReport<E> {
    pub walk_id: WalkId,
    /// Number of items handed to the callback.
    pub processed: usize,
    pub end: WalkEnd,
    pub failures: Option<AggregateError<E>>,
}

impl<E> BatchReport<E> {
    pub fn is_success(&self) -> bool {
        self.failures.is_none()
    }

    /// `Err` when failures exist and `throw_exceptions` is set, `Ok(Some)`
    /// when they exist and it is not, `Ok(None)` otherwise.
    pub fn into_result(
        self,
        throw_exceptions: bool,
    ) -> Result<Option<AggregateError<E>>, AggregateError<E>> {
        match self.failures {
            Some(failures) if throw_exceptions => Err(failures),
            failures => Ok(failures),
        }
    }
}

/// ForAll は sequence を走査して item ごとに callback を呼ぶ
///
/// # 使用例
/// ```ignore
/// let failures = ForAll::new(paths)
///     .with_state(|path: &PathBuf, _index| File::open(path))
///     .throw_exceptions(false)
///     .run(|ctx| {
///         let file = ctx.state().as_ref().map_err(|e| e.to_string())?;
///         import(file).map_err(|e| e.to_string())?;
///         Ok(Flow::Continue)
///     })?;
/// ```
pub struct ForAll<I, SF = NoState> {
    iter: I,
    state_factory: SF,
    throw_exceptions: bool,
    walk_id: WalkId,
}

impl<I: Iterator> ForAll<I, NoState> {
    pub fn new<Seq>(sequence: Seq) -> Self
    where
        Seq: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: sequence.into_iter(),
            state_factory: NoState,
            throw_exceptions: true,
            walk_id: WalkId::generate(),
        }
    }
}

impl<I, SF> ForAll<I, SF> {
    /// Build each item's state with `factory(item, index)` just before its callback.
    pub fn with_state<F>(self, factory: F) -> ForAll<I, F> {
        ForAll {
            iter: self.iter,
            state_factory: factory,
            throw_exceptions: self.throw_exceptions,
            walk_id: self.walk_id,
        }
    }

    /// Return failures as `Ok(Some(..))` instead of `Err(..)`. Defaults to true.
    pub fn throw_exceptions(mut self, throw_exceptions: bool) -> Self {
        self.throw_exceptions = throw_exceptions;
        self
    }

    pub fn walk_id(mut self, walk_id: WalkId) -> Self {
        self.walk_id = walk_id;
        self
    }

    /// Take the walk id from `ids` instead of the system clock.
    pub fn with_id_generator(self, ids: &dyn IdGenerator) -> Self {
        self.walk_id(ids.generate_walk_id())
    }
}

impl<I, SF> ForAll<I, SF>
where
    I: Iterator,
    SF: ItemStateFactory<I::Item>,
{
    pub fn run<E, C>(self, callback: C) -> Result<Option<AggregateError<E>>, AggregateError<E>>
    where
        C: FnMut(&mut ItemContext<'_, I::Item, SF::State>) -> Result<Flow, E>,
    {
        let throw_exceptions = self.throw_exceptions;
        self.run_report(callback).into_result(throw_exceptions)
    }

    pub fn run_report<E, C>(self, callback: C) -> BatchReport<E>
    where
        C: FnMut(&mut ItemContext<'_, I::Item, SF::State>) -> Result<Flow, E>,
    {
        walk(
            self.walk_id,
            self.iter.map(Ok::<I::Item, E>),
            self.state_factory,
            callback,
        )
    }
}

impl<I, SF, T, E> ForAll<I, SF>
where
    I: Iterator<Item = Result<T, E>>,
    SF: ItemStateFactory<T>,
{
    /// Walk a fallible sequence. An `Err` from the sequence is captured after
    /// every earlier item error and ends the walk.
    pub fn try_run<C>(self, callback: C) -> Result<Option<AggregateError<E>>, AggregateError<E>>
    where
        C: FnMut(&mut ItemContext<'_, T, SF::State>) -> Result<Flow, E>,
    {
        let throw_exceptions = self.throw_exceptions;
        self.try_run_report(callback).into_result(throw_exceptions)
    }

    pub fn try_run_report<C>(self, callback: C) -> BatchReport<E>
    where
        C: FnMut(&mut ItemContext<'_, T, SF::State>) -> Result<Flow, E>,
    {
        walk(self.walk_id, self.iter, self.state_factory, callback)
    }
}

/// Walk `sequence`, raising collected failures as `Err`.
pub fn for_all<Seq, E, C>(sequence: Seq, callback: C) -> Result<(), AggregateError<E>>
where
    Seq: IntoIterator,
    C: FnMut(&mut ItemContext<'_, Seq::Item, ()>) -> Result<Flow, E>,
{
    ForAll::new(sequence).run(callback).map(|_| ())
}

/// Same as [`for_all`], with per-item state from `state_factory`.
pub fn for_all_with_state<Seq, SF, E, C>(
    sequence: Seq,
    state_factory: SF,
    callback: C,
) -> Result<(), AggregateError<E>>
where
    Seq: IntoIterator,
    SF: ItemStateFactory<Seq::Item>,
    C: FnMut(&mut ItemContext<'_, Seq::Item, SF::State>) -> Result<Flow, E>,
{
    ForAll::new(sequence)
        .with_state(state_factory)
        .run(callback)
        .map(|_| ())
}

fn walk<T, E, It, SF, C>(
    walk_id: WalkId,
    sequence: It,
    mut state_factory: SF,
    mut callback: C,
) -> BatchReport<E>
where
    It: Iterator<Item = Result<T, E>>,
    SF: ItemStateFactory<T>,
    C: FnMut(&mut ItemContext<'_, T, SF::State>) -> Result<Flow, E>,
{
    let span = tracing::debug_span!("for_all", walk_id = %walk_id);
    let _entered = span.enter();

    let mut captured = Vec::new();
    let mut last_index: Option<usize> = None;
    let mut end = WalkEnd::Exhausted;

    for next in sequence {
        let item = match next {
            Ok(item) => item,
            Err(error) => {
                tracing::debug!(after_index = ?last_index, "sequence failed while advancing");
                captured.push(CapturedError::Advance {
                    after_index: last_index,
                    error,
                });
                end = WalkEnd::AdvanceFailed;
                break;
            }
        };

        let index = last_index.map_or(0, |i| i + 1);
        last_index = Some(index);

        let state = state_factory.create(&item, index);
        let mut ctx = ItemContext::new(index, &item, state);

        match callback(&mut ctx) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Break) => ctx.cancel(),
            Err(error) => {
                tracing::debug!(index, "item callback failed");
                captured.push(CapturedError::Item { index, error });
                if !ctx.continue_on_error() {
                    end = WalkEnd::StoppedOnError;
                    break;
                }
            }
        }

        if ctx.is_cancelled() {
            end = WalkEnd::Cancelled;
            break;
        }
    }

    let processed = last_index.map_or(0, |i| i + 1);
    tracing::debug!(processed, ?end, failures = captured.len(), "walk finished");

    BatchReport {
        walk_id,
        processed,
        end,
        failures: AggregateError::from_captured(captured),
    }
}
