//! Merge selection strategies.

use std::cmp::Ordering;

use crate::sort::SortError;

/// Selection strategy interface.
/// Chooses the stream the merger emits the next record from.
pub trait SelectionStrategy {
    /// Returns the index of the stream holding the smallest record.
    ///
    /// # Arguments
    /// * `candidates` - Stream indices along with their pending records
    fn select<'a, I>(&self, candidates: I) -> Result<usize, SortError>
    where
        I: IntoIterator<Item = (usize, &'a [u8])>;
}

/// Linear scan selection.
///
/// Compares every candidate against the smallest record seen so far. Ties are broken in favor
/// of the lowest stream index, which keeps the merge stable when blocks are numbered in input order.
/// Time complexity is *n* per selection where *n* is the number of candidates.
#[derive(Clone, Copy)]
pub struct MinSelection<F> {
    compare: F,
}

impl<F> MinSelection<F>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    pub fn new(compare: F) -> Self {
        MinSelection { compare }
    }
}

impl<F> SelectionStrategy for MinSelection<F>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    fn select<'a, I>(&self, candidates: I) -> Result<usize, SortError>
    where
        I: IntoIterator<Item = (usize, &'a [u8])>,
    {
        let mut min: Option<(usize, &[u8])> = None;

        for (idx, record) in candidates {
            let smaller = match min {
                None => true,
                Some((min_idx, min_record)) => match (self.compare)(record, min_record) {
                    Ordering::Less => true,
                    Ordering::Equal => idx < min_idx,
                    Ordering::Greater => false,
                },
            };

            // record and index are always updated together
            if smaller {
                min = Some((idx, record));
            }
        }

        return min.map(|(idx, _)| idx).ok_or(SortError::NoActiveStreams);
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{MinSelection, SelectionStrategy};
    use crate::sort::SortError;

    fn natural(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[rstest]
    #[case(vec![(0, "b"), (1, "a"), (2, "c")], 1)]
    #[case(vec![(0, "a"), (1, "c"), (2, "b")], 0)]
    #[case(vec![(0, "c"), (1, "b"), (2, "d")], 1)]
    #[case(vec![(3, "x")], 3)]
    #[case(vec![(0, "apple"), (1, "apple")], 0)]
    #[case(vec![(4, "apple"), (1, "apple"), (2, "banana")], 1)]
    #[case(vec![(2, "b"), (5, "a"), (7, "a"), (9, "b")], 5)]
    fn test_min_selection(#[case] candidates: Vec<(usize, &str)>, #[case] expected: usize) {
        let selection = MinSelection::new(natural);
        let candidates = candidates.into_iter().map(|(idx, record)| (idx, record.as_bytes()));

        assert_eq!(selection.select(candidates).unwrap(), expected);
    }

    #[test]
    fn test_min_selection_is_deterministic() {
        let selection = MinSelection::new(natural);
        let candidates = vec![(0, &b"apple\n"[..]), (1, &b"apple\n"[..])];

        for _ in 0..10 {
            assert_eq!(selection.select(candidates.clone()).unwrap(), 0);
        }
    }

    #[test]
    fn test_min_selection_custom_order() {
        let selection = MinSelection::new(|a: &[u8], b: &[u8]| a.cmp(b).reverse());
        let candidates = vec![(0, &b"a"[..]), (1, &b"c"[..]), (2, &b"b"[..])];

        assert_eq!(selection.select(candidates).unwrap(), 1);
    }

    #[test]
    fn test_no_active_streams() {
        let selection = MinSelection::new(natural);

        assert!(matches!(
            selection.select(Vec::<(usize, &[u8])>::new()),
            Err(SortError::NoActiveStreams)
        ));
    }
}
