//! ItemContext - ForAll が item ごとに作るコンテキスト

/// Flow は callback が返す「次に進むか」の判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Go on with the next item.
    #[default]
    Continue,

    /// Stop after this item. Same as calling `ItemContext::cancel()`.
    Break,
}

/// ItemContext は現在の item のビュー
///
/// 走査の 1 ステップだけが所有し、ステップが終わると捨てられます。
///
/// # フラグ
/// - `cancel`: 立てると、この item の callback が終わった後で走査を止める
/// - `continue_on_error`: 既定は true。false にしてから `Err` を返すと、その場で走査を止める
#[derive(Debug)]
pub struct ItemContext<'a, T, S = ()> {
    index: usize,
    item: &'a T,
    state: S,
    cancel: bool,
    continue_on_error: bool,
}

impl<'a, T, S> ItemContext<'a, T, S> {
    pub(crate) fn new(index: usize, item: &'a T, state: S) -> Self {
        Self {
            index,
            item,
            state,
            cancel: false,
            continue_on_error: true,
        }
    }

    /// Zero-based position in the sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn item(&self) -> &'a T {
        self.item
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn cancel(&mut self) {
        self.cancel = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
    }

    pub fn set_continue_on_error(&mut self, continue_on_error: bool) {
        self.continue_on_error = continue_on_error;
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_defaults() {
        let item = "x";
        let ctx = ItemContext::new(4, &item, 10u32);
        assert_eq!(ctx.index(), 4);
        assert_eq!(*ctx.item(), "x");
        assert_eq!(*ctx.state(), 10);
        assert!(!ctx.is_cancelled());
        assert!(ctx.continue_on_error());
    }

    #[test]
    fn flags_are_settable() {
        let item = 1;
        let mut ctx = ItemContext::new(0, &item, ());
        ctx.cancel();
        ctx.set_continue_on_error(false);
        assert!(ctx.is_cancelled());
        assert!(!ctx.continue_on_error());
    }

    #[test]
    fn default_flow_continues() {
        assert_eq!(Flow::default(), Flow::Continue);
    }
}
