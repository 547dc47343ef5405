//! AggregateError - 走査中に集めたエラーの順序付きコンテナ
//!
//! ForAll は callback の失敗をその場で投げずに集め、走査の終わりに 1 つの
//! 失敗として返します。順序は発生順（item のエラー → 列挙の失敗）です。

use std::fmt;

/// 1 件の捕捉されたエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedError<E> {
    /// The callback failed for the item at `index`.
    Item { index: usize, error: E },

    /// The sequence failed while advancing. `after_index` is the last item
    /// handed to the callback, `None` if the failure happened before the first.
    Advance {
        after_index: Option<usize>,
        error: E,
    },
}

impl<E> CapturedError<E> {
    pub fn error(&self) -> &E {
        match self {
            CapturedError::Item { error, .. } | CapturedError::Advance { error, .. } => error,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            CapturedError::Item { error, .. } | CapturedError::Advance { error, .. } => error,
        }
    }

    /// Index of the failing item, `None` for an advance failure.
    pub fn index(&self) -> Option<usize> {
        match self {
            CapturedError::Item { index, .. } => Some(*index),
            CapturedError::Advance { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CapturedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedError::Item { index, error } => write!(f, "item {index}: {error}"),
            CapturedError::Advance {
                after_index: Some(index),
                error,
            } => write!(f, "sequence failed after item {index}: {error}"),
            CapturedError::Advance {
                after_index: None,
                error,
            } => write!(f, "sequence failed before the first item: {error}"),
        }
    }
}

/// AggregateError は 1 件以上のエラーを保持する
///
/// 空の AggregateError は作れません（失敗がなければ `None` を返すため）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError<E> {
    errors: Vec<CapturedError<E>>,
}

impl<E> AggregateError<E> {
    /// `None` when `errors` is empty.
    pub fn from_captured(errors: Vec<CapturedError<E>>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CapturedError<E>] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.errors.iter().map(CapturedError::error)
    }

    pub fn first(&self) -> &CapturedError<E> {
        &self.errors[0]
    }

    /// Indices of the items whose callback failed, in encounter order.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.errors.iter().filter_map(CapturedError::index).collect()
    }

    pub fn into_captured(self) -> Vec<CapturedError<E>> {
        self.errors
    }

    pub fn into_errors(self) -> Vec<E> {
        self.errors.into_iter().map(CapturedError::into_error).collect()
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred", self.errors.len())?;
        for captured in &self.errors {
            write!(f, "; {captured}")?;
        }
        Ok(())
    }
}

impl<E> std::error::Error for AggregateError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.first().error())
    }
}

impl<E> IntoIterator for AggregateError<E> {
    type Item = CapturedError<E>;
    type IntoIter = std::vec::IntoIter<CapturedError<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("boom {0}")]
    struct Boom(u32);

    #[test]
    fn empty_list_is_no_aggregate() {
        assert!(AggregateError::<Boom>::from_captured(vec![]).is_none());
    }

    #[test]
    fn keeps_encounter_order() {
        let agg = AggregateError::from_captured(vec![
            CapturedError::Item {
                index: 0,
                error: Boom(1),
            },
            CapturedError::Item {
                index: 2,
                error: Boom(3),
            },
            CapturedError::Advance {
                after_index: Some(2),
                error: Boom(9),
            },
        ])
        .unwrap();

        assert_eq!(agg.len(), 3);
        assert_eq!(agg.failed_indices(), vec![0, 2]);
        assert_eq!(agg.into_errors(), vec![Boom(1), Boom(3), Boom(9)]);
    }

    #[test]
    fn display_lists_every_error() {
        let agg = AggregateError::from_captured(vec![
            CapturedError::Item {
                index: 1,
                error: Boom(2),
            },
            CapturedError::Advance {
                after_index: None,
                error: Boom(5),
            },
        ])
        .unwrap();

        assert_eq!(
            agg.to_string(),
            "2 error(s) occurred; item 1: boom 2; sequence failed before the first item: boom 5"
        );
        assert_eq!(agg.source().unwrap().to_string(), "boom 2");
    }
}
