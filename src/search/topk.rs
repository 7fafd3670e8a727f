use std::collections::BinaryHeap;
use std::cmp::{Ordering, Reverse};

use crate::core::types::{DocId, Score};

/// One entry of a result list: document and its accumulated score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedResult {
    pub document: DocId,
    pub score: Score,
}

/// Heap key ordering candidates by `(score, Reverse(document))`: the
/// minimum is the lowest-scored candidate, and among equal scores the
/// highest document, matching the tie-break rule (descending score,
/// ascending document).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    score: Score,
    document: DocId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Scores never hold NaN; they come from finite statistics.
        self.score
            .partial_cmp(&other.score)
            .expect("scores are totally ordered")
            .then_with(|| other.document.cmp(&self.document))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded min-heap of the k highest-scoring candidates seen so far.
///
/// The current threshold (k-th best score, or -inf while not yet full)
/// is exposed for engine pruning.
pub struct TopK {
    heap: BinaryHeap<Reverse<Candidate>>,
    k: usize,
    threshold: Score,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        TopK {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
            threshold: f32::NEG_INFINITY,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Current k-th best score; -inf until k candidates accumulated.
    pub fn threshold(&self) -> Score {
        self.threshold
    }

    pub fn push(&mut self, document: DocId, score: Score) {
        if self.k == 0 {
            return;
        }
        let candidate = Candidate { score, document };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            if self.heap.len() == self.k {
                self.threshold = self.heap.peek().expect("non-empty").0.score;
            }
        } else if candidate > self.heap.peek().expect("non-empty").0 {
            self.heap.pop();
            self.heap.push(Reverse(candidate));
            self.threshold = self.heap.peek().expect("non-empty").0.score;
        }
    }

    /// Results sorted by descending score; ties break by ascending
    /// document.
    pub fn into_sorted(self) -> Vec<RankedResult> {
        let mut results: Vec<Candidate> =
            self.heap.into_iter().map(|Reverse(entry)| entry).collect();
        results.sort_by(|a, b| b.cmp(a));
        results
            .into_iter()
            .map(|entry| RankedResult {
                document: entry.document,
                score: entry.score,
            })
            .collect()
    }
}

/// Results of one engine run; `cancelled` is set when a deadline cut the
/// traversal short, in which case `results` is a partial but correctly
/// ordered top-k.
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub results: Vec<RankedResult>,
    pub cancelled: bool,
}

impl SearchResults {
    pub fn complete(top: TopK) -> Self {
        SearchResults {
            results: top.into_sorted(),
            cancelled: false,
        }
    }

    pub fn cancelled(top: TopK) -> Self {
        SearchResults {
            results: top.into_sorted(),
            cancelled: true,
        }
    }

    /// Iterate results as `(rank, document, score)`, ranks starting at 0.
    pub fn iter(&self) -> impl Iterator<Item = (usize, DocId, Score)> + '_ {
        self.results
            .iter()
            .enumerate()
            .map(|(rank, entry)| (rank, entry.document, entry.score))
    }
}
