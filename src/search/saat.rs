use std::collections::BinaryHeap;
use std::time::Instant;

use crate::core::error::Result;
use crate::core::types::{DocId, Score};
use crate::search::cursor::ScoredCursor;
use crate::search::topk::{SearchResults, TopK};

/// How much of the postings a score-at-a-time run may consume.
#[derive(Debug, Clone, Copy)]
pub enum SaatBudget {
    /// Process everything (exact).
    All,
    /// Stop after this many postings.
    Postings(usize),
    /// Stop after this fraction of the total posting count.
    Fraction(f64),
}

/// Orders heap entries by descending score, ties by ascending document.
#[derive(PartialEq)]
struct ByScore(Score, DocId, usize);

impl Eq for ByScore {}

impl Ord for ByScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("scores are totally ordered")
            .then_with(|| other.1.cmp(&self.1))
    }
}

impl PartialOrd for ByScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Score-at-a-time traversal.
///
/// Postings are consumed in globally decreasing score order until the
/// budget runs out, accumulating into a term-at-a-time style array. The
/// stored lists are document-ordered, so each list is materialized and
/// re-sorted by impact first.
pub fn saat(
    cursors: Vec<ScoredCursor>,
    k: usize,
    collection_size: usize,
    budget: SaatBudget,
    deadline: Option<Instant>,
) -> Result<SearchResults> {
    // Impact-ordered copies of every list.
    let mut lists = Vec::with_capacity(cursors.len());
    let mut total_postings = 0usize;
    for mut cursor in cursors {
        let mut postings = cursor.drain()?;
        postings.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .expect("scores are totally ordered")
                .then_with(|| a.0.cmp(&b.0))
        });
        total_postings += postings.len();
        lists.push(postings);
    }

    let budget = match budget {
        SaatBudget::All => total_postings,
        SaatBudget::Postings(count) => count.min(total_postings),
        SaatBudget::Fraction(fraction) => {
            (total_postings as f64 * fraction.clamp(0.0, 1.0)).ceil() as usize
        }
    };

    // Max-heap of list heads by current score.
    let mut heads = vec![0usize; lists.len()];
    let mut heap = BinaryHeap::new();
    for (index, list) in lists.iter().enumerate() {
        if let Some(&(document, score)) = list.first() {
            heap.push(ByScore(score, document, index));
        }
    }

    let mut accumulators = vec![0.0f32; collection_size];
    let mut processed = 0usize;
    let mut cancelled = false;
    while processed < budget {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            cancelled = true;
            break;
        }
        let Some(ByScore(score, document, index)) = heap.pop() else {
            break;
        };
        accumulators[document.0 as usize] += score;
        processed += 1;
        heads[index] += 1;
        if let Some(&(next_document, next_score)) = lists[index].get(heads[index]) {
            heap.push(ByScore(next_score, next_document, index));
        }
    }

    let mut top = TopK::new(k);
    for (index, &score) in accumulators.iter().enumerate() {
        if score != 0.0 {
            top.push(DocId(index as u32), score);
        }
    }
    Ok(if cancelled {
        SearchResults::cancelled(top)
    } else {
        SearchResults::complete(top)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::taat::taat;
    use crate::search::testing::{fixture, make_lists};

    #[test]
    fn test_full_budget_matches_taat() {
        let lists_data: &[&[(u32, u32)]] = &[
            &[(0, 1), (1, 2), (5, 9)],
            &[(1, 3), (2, 1), (5, 2)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        let expected = taat(
            lists.iter().map(|list| list.cursor()).collect(),
            3,
            6,
            None,
        )
        .unwrap();
        let actual = saat(
            lists.iter().map(|list| list.cursor()).collect(),
            3,
            6,
            SaatBudget::All,
            None,
        )
        .unwrap();
        assert_eq!(expected.results, actual.results);
    }

    #[test]
    fn test_budget_processes_highest_impacts_first() {
        let lists_data: &[&[(u32, u32)]] = &[&[(0, 1), (3, 50)], &[(1, 2), (3, 40)]];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        // Only the two highest-impact postings fit the budget; both
        // belong to document 3.
        let results = saat(
            lists.iter().map(|list| list.cursor()).collect(),
            1,
            4,
            SaatBudget::Postings(2),
            None,
        )
        .unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].document, DocId(3));
        assert_eq!(results.results[0].score, 90.0);
    }
}
