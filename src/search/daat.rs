use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::time::Instant;

use crate::core::error::Result;
use crate::search::cursor::ScoredCursor;
use crate::search::topk::{SearchResults, TopK};

/// Document-at-a-time traversal.
///
/// A min-heap orders cursors by their current document; all cursors
/// positioned at the minimum document are scored together, so each
/// document is scored exactly once.
pub fn daat(
    mut cursors: Vec<ScoredCursor>,
    k: usize,
    deadline: Option<Instant>,
) -> Result<SearchResults> {
    let mut top = TopK::new(k);
    let mut heap = BinaryHeap::new();
    for (index, cursor) in cursors.iter_mut().enumerate() {
        if !cursor.is_end() {
            heap.push(Reverse((cursor.document()?, index)));
        }
    }

    while let Some(Reverse((document, _))) = heap.peek().copied() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(SearchResults::cancelled(top));
        }
        let mut score = 0.0f32;
        while let Some(Reverse((current, index))) = heap.peek().copied() {
            if current != document {
                break;
            }
            heap.pop();
            let cursor = &mut cursors[index];
            score += cursor.score()?;
            cursor.next();
            if !cursor.is_end() {
                heap.push(Reverse((cursor.document()?, index)));
            }
        }
        top.push(document, score);
    }
    Ok(SearchResults::complete(top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::{fixture, make_lists};

    #[test]
    fn test_two_term_query() {
        // A = [(0,1), (1,2)], B = [(1,3), (2,1)]; top-2 is (1,5), (0,1).
        let fixture = fixture(&[&[(0, 1), (1, 2)], &[(1, 3), (2, 1)]]);
        let lists = make_lists(&fixture);
        let results = daat(lists.iter().map(|list| list.cursor()).collect(), 2, None).unwrap();

        assert!(!results.cancelled);
        let ranked: Vec<(u32, f32)> = results
            .iter()
            .map(|(_, document, score)| (document.0, score))
            .collect();
        assert_eq!(ranked, vec![(1, 5.0), (0, 1.0)]);
    }

    #[test]
    fn test_empty_query() {
        let results = daat(Vec::new(), 5, None).unwrap();
        assert!(results.results.is_empty());
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let fixture = fixture(&[&[(0, 1), (1, 2)]]);
        let lists = make_lists(&fixture);
        let deadline = Some(Instant::now() - std::time::Duration::from_millis(1));
        let results = daat(lists.iter().map(|list| list.cursor()).collect(), 2, deadline).unwrap();
        assert!(results.cancelled);
    }
}
