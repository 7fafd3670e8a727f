use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::core::error::Result;
use crate::core::types::{DocId, Score};
use crate::search::cursor::ScoredCursor;
use crate::search::topk::{SearchResults, TopK};

/// Fagin's threshold algorithm.
///
/// Lists are walked in decreasing-score order in lock-step; every newly
/// seen document is finalized immediately through random-access lookups
/// across all lists. The walk stops once the top-k heap is full and the
/// best possible unseen score (the sum of the current scores of all
/// active lists) cannot beat the current k-th score.
pub fn threshold_algorithm(
    cursors: Vec<ScoredCursor>,
    k: usize,
    deadline: Option<Instant>,
) -> Result<SearchResults> {
    // Impact-ordered copies plus random-access score maps.
    let mut lists = Vec::with_capacity(cursors.len());
    let mut maps: Vec<HashMap<DocId, Score>> = Vec::with_capacity(cursors.len());
    for mut cursor in cursors {
        let postings = cursor.drain()?;
        maps.push(postings.iter().copied().collect());
        let mut sorted = postings;
        sorted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .expect("scores are totally ordered")
                .then_with(|| a.0.cmp(&b.0))
        });
        lists.push(sorted);
    }

    let mut top = TopK::new(k);
    let mut seen = HashSet::new();
    let mut depth = 0usize;
    loop {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(SearchResults::cancelled(top));
        }
        let mut best_unseen = 0.0f32;
        let mut any_active = false;
        for list in &lists {
            if let Some(&(_, score)) = list.get(depth) {
                best_unseen += score;
                any_active = true;
            }
        }
        if !any_active {
            break;
        }

        for list in &lists {
            let Some(&(document, _)) = list.get(depth) else {
                continue;
            };
            if !seen.insert(document) {
                continue;
            }
            let total: Score = maps
                .iter()
                .filter_map(|map| map.get(&document))
                .sum();
            top.push(document, total);
        }

        if top.is_full() && best_unseen <= top.threshold() {
            break;
        }
        depth += 1;
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
        for k in [1, 2, 5] {
            let expected =
                daat(lists.iter().map(|list| list.cursor()).collect(), k, None).unwrap();
            let actual = threshold_algorithm(
                lists.iter().map(|list| list.cursor()).collect(),
                k,
                None,
            )
            .unwrap();
            assert_eq!(expected.results, actual.results, "k = {}", k);
        }
    }

    #[test]
    fn test_stops_before_exhausting_lists() {
        // The top documents sit at the heads of both lists; the walk can
        // stop after the first rounds and still be exact.
        let lists_data: &[&[(u32, u32)]] = &[
            &[(0, 100), (1, 1), (2, 1), (3, 1)],
            &[(0, 90), (4, 1), (5, 1), (6, 1)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        let results = threshold_algorithm(
            lists.iter().map(|list| list.cursor()).collect(),
            1,
            None,
        )
        .unwrap();
        assert_eq!(results.results[0].document, DocId(0));
        assert_eq!(results.results[0].score, 190.0);
    }
}
