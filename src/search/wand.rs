use std::time::Instant;

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::search::cursor::ScoredCursor;
use crate::search::topk::{SearchResults, TopK};

/// WAND dynamic pruning.
///
/// Cursors are kept ordered by current document. Each round accumulates
/// weighted term maxima in that order until the sum reaches the top-k
/// threshold; the last term of that prefix is the pivot. If the first
/// cursor already sits on the pivot document it is fully scored,
/// otherwise every cursor in the prefix skips forward to it.
pub fn wand<'a>(
    mut cursors: Vec<ScoredCursor<'a, 'a>>,
    k: usize,
    deadline: Option<Instant>,
) -> Result<SearchResults> {
    let mut top = TopK::new(k);

    // Live cursor indices with their cached current documents.
    let mut documents = vec![DocId(0); cursors.len()];
    let mut live = Vec::with_capacity(cursors.len());
    for (index, cursor) in cursors.iter_mut().enumerate() {
        if !cursor.is_end() {
            documents[index] = cursor.document()?;
            live.push(index);
        }
    }

    while !live.is_empty() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(SearchResults::cancelled(top));
        }
        live.sort_by_key(|&index| documents[index]);

        // Pivot selection: smallest prefix whose cumulative maxima can
        // reach the threshold.
        let mut accumulated = 0.0f32;
        let mut pivot = None;
        for (position, &index) in live.iter().enumerate() {
            accumulated += cursors[index].max_score();
            if accumulated >= top.threshold() {
                pivot = Some(position);
                break;
            }
        }
        let Some(pivot) = pivot else {
            // Even the sum of all maxima cannot beat the threshold.
            break;
        };
        let pivot_document = documents[live[pivot]];

        if documents[live[0]] == pivot_document {
            // Score the pivot document fully and advance every cursor
            // positioned at it.
            let mut score = 0.0f32;
            let mut exhausted = Vec::new();
            for &index in &live {
                if documents[index] != pivot_document {
                    break;
                }
                let cursor = &mut cursors[index];
                score += cursor.score()?;
                cursor.next();
                if cursor.is_end() {
                    exhausted.push(index);
                } else {
                    documents[index] = cursor.document()?;
                }
            }
            top.push(pivot_document, score);
            live.retain(|index| !exhausted.contains(index));
        } else {
            // Skip every lagging cursor in the prefix to the pivot.
            let mut exhausted = Vec::new();
            for &index in &live[..=pivot] {
                if documents[index] < pivot_document {
                    let cursor = &mut cursors[index];
                    cursor.advance_to(pivot_document)?;
                    if cursor.is_end() {
                        exhausted.push(index);
                    } else {
                        documents[index] = cursor.document()?;
                    }
                }
            }
            live.retain(|index| !exhausted.contains(index));
        }
    }
    Ok(SearchResults::complete(top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::daat::daat;
    use crate::search::testing::{fixture, make_lists};

    #[test]
    fn test_matches_daat() {
        let lists_data: &[&[(u32, u32)]] = &[
            &[(0, 1), (1, 2), (5, 9), (9, 1)],
            &[(1, 3), (2, 1), (5, 2), (8, 8)],
            &[(0, 2), (7, 4), (9, 4)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        for k in [1, 2, 3, 10] {
            let expected =
                daat(lists.iter().map(|list| list.cursor()).collect(), k, None).unwrap();
            let actual =
                wand(lists.iter().map(|list| list.cursor()).collect(), k, None).unwrap();
            assert_eq!(expected.results, actual.results, "k = {}", k);
        }
    }

    #[test]
    fn test_skips_hopeless_candidates() {
        // One dominant term; the weak term alone can never reach the
        // threshold once the heap is full, so its solo documents are
        // skipped yet the result still matches DAAT.
        let lists_data: &[&[(u32, u32)]] = &[
            &[(0, 100), (10, 100)],
            &[(1, 1), (2, 1), (3, 1), (4, 1), (10, 1)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        let expected = daat(lists.iter().map(|list| list.cursor()).collect(), 2, None).unwrap();
        let actual = wand(lists.iter().map(|list| list.cursor()).collect(), 2, None).unwrap();
        assert_eq!(expected.results, actual.results);
        assert_eq!(actual.results[0].document, DocId(10));
    }
}
