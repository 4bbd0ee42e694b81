/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::VecDeque;
use std::iter::FromIterator;

/// A queue of recorded events consumed while replaying.
///
/// Besides being an [Iterator] it can look ahead: [`ReplayCursor::peek`] for
/// the next item, [`ReplayCursor::position`] for the first item matching a
/// predicate, and [`ReplayCursor::take_nth`] to pull an item from further
/// ahead out of order.
#[derive(Debug)]
pub struct ReplayCursor<T> {
    inner_data: VecDeque<T>,
    consumed: usize,
}

impl<T> ReplayCursor<T> {
    /// peeks the following nth element from the top of the cursor
    pub fn peek_nth(&self, index: usize) -> Option<&T> {
        self.inner_data.get(index)
    }

    /// peeks the following item from the top of the cursor
    pub fn peek(&self) -> Option<&T> {
        self.peek_nth(0)
    }

    /// Index of the first remaining item matching `pred`.
    pub fn position(&self, pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.inner_data.iter().position(pred)
    }

    /// Remove and return the item `index` places ahead.
    pub fn take_nth(&mut self, index: usize) -> Option<T> {
        let item = self.inner_data.remove(index)?;
        self.consumed += 1;
        Some(item)
    }

    pub fn remaining(&self) -> usize {
        self.inner_data.len()
    }

    /// Items handed out so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner_data.is_empty()
    }
}

impl<T> Iterator for ReplayCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.take_nth(0)
    }
}

impl<T> FromIterator<T> for ReplayCursor<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner_data: iter.into_iter().collect(),
            consumed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn cursor(items: &[(usize, char)]) -> ReplayCursor<(usize, char)> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_peek() {
        let c = cursor(&[(0, 'a'), (1, 'b')]);
        assert_eq!(c.peek(), Some(&(0, 'a')));
        assert_eq!(c.peek_nth(1), Some(&(1, 'b')));
        assert_eq!(c.peek_nth(2), None);
        assert_eq!(c.peek(), Some(&(0, 'a')));
    }

    #[test]
    fn test_peek_empty() {
        let c = cursor(&[]);
        assert_eq!(c.peek(), None);
        assert!(c.is_exhausted());
    }

    #[test]
    fn test_next_counts() {
        let mut c = cursor(&[(0, 'a'), (1, 'b'), (0, 'c')]);
        let result = vec![c.next(), c.next(), c.next(), c.next()];
        assert_eq!(
            result,
            vec![Some((0, 'a')), Some((1, 'b')), Some((0, 'c')), None]
        );
        assert_eq!(c.consumed(), 3);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_take_ahead() {
        let mut c = cursor(&[(0, 'a'), (1, 'b'), (1, 'c'), (0, 'd')]);
        let ix = c.position(|(p, _)| *p == 1).unwrap();
        assert_eq!(ix, 1);
        assert_eq!(c.take_nth(ix), Some((1, 'b')));
        assert_eq!(c.position(|(p, _)| *p == 1), Some(1));
        assert_eq!(c.position(|(p, _)| *p == 2), None);
        assert_eq!(c.take_nth(9), None);
        assert_eq!(c.remaining(), 3);
        assert_eq!(c.consumed(), 1);
    }
}
