//! Result paging.

/// A window over an ordered result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Number of leading results to skip.
    pub first: Option<usize>,
    /// Maximum number of results to return.
    pub max: Option<usize>,
}

impl Page {
    /// Every result.
    pub const ALL: Self = Self {
        first: None,
        max: None,
    };

    /// A window of at most `max` results after skipping `first`.
    #[must_use]
    pub const fn new(first: usize, max: usize) -> Self {
        Self {
            first: Some(first),
            max: Some(max),
        }
    }

    /// Applies the window to an iterator.
    pub fn apply<I: Iterator>(self, iter: I) -> impl Iterator<Item = I::Item> {
        iter.skip(self.first.unwrap_or(0))
            .take(self.max.unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows() {
        let all: Vec<_> = Page::ALL.apply(0..5).collect();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);

        let mid: Vec<_> = Page::new(1, 2).apply(0..5).collect();
        assert_eq!(mid, vec![1, 2]);

        let past_end: Vec<_> = Page::new(10, 2).apply(0..5).collect();
        assert!(past_end.is_empty());
    }
}
