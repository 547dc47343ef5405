//! State suppliers shared by task and item contexts.
//!
//! - `LazyState<S>`: task 用。読むたびに factory を呼び直す thunk
//! - `ItemStateFactory<T>`: ForAll 用。item ごとに 1 回だけ呼ばれる factory

/// LazyState は per-run state を遅延して作る thunk
///
/// # 再評価について
/// `get()` は **呼ぶたびに factory を再実行します**（memoize しない）。
/// 副作用のある factory は読むたびに副作用が起きます。
/// 1 回だけ評価したい場合は `ExecutionContext::state_cached()` を使ってください。
pub struct LazyState<S> {
    thunk: Box<dyn Fn() -> S + Send + Sync>,
}

impl<S> LazyState<S> {
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            thunk: Box::new(thunk),
        }
    }

    pub fn get(&self) -> S {
        (self.thunk)()
    }
}

impl<S> std::fmt::Debug for LazyState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LazyState(..)")
    }
}

/// ItemStateFactory は `(item, index)` から per-item state を作る
///
/// `FnMut(&T, usize) -> S` なクロージャはそのまま使えます。
/// state が要らない場合は `NoState`。
pub trait ItemStateFactory<T> {
    type State;

    fn create(&mut self, item: &T, index: usize) -> Self::State;
}

impl<T, S, F> ItemStateFactory<T> for F
where
    F: FnMut(&T, usize) -> S,
{
    type State = S;

    fn create(&mut self, item: &T, index: usize) -> S {
        self(item, index)
    }
}

/// 何も作らない factory（state は `()`）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoState;

impl<T> ItemStateFactory<T> for NoState {
    type State = ();

    fn create(&mut self, _item: &T, _index: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lazy_state_reinvokes_on_every_read() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let state = LazyState::new(move || c.fetch_add(1, Ordering::SeqCst) + 1);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.get(), 1);
        assert_eq!(state.get(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closures_are_item_factories() {
        let mut factory = |item: &&str, index: usize| format!("{index}:{item}");
        assert_eq!(factory.create(&"a", 3), "3:a");
    }

    #[test]
    fn no_state_yields_unit() {
        let mut factory = NoState;
        let () = ItemStateFactory::<u8>::create(&mut factory, &1, 0);
    }
}
