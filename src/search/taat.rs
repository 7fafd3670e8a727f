use std::time::Instant;

use crate::core::error::Result;
use crate::core::types::{DocId, Score};
use crate::search::cursor::ScoredCursor;
use crate::search::topk::{SearchResults, TopK};

/// Term-at-a-time engine with an accumulator array sized to the
/// collection.
///
/// The engine is reusable across queries on one thread: instead of
/// clearing the array between queries, each accumulator carries a small
/// query-epoch tag and a value whose tag differs from the current epoch
/// reads as zero. The array is only cleared when the epoch counter wraps.
///
/// Optionally, accumulators are grouped into blocks with a running
/// per-block maximum; final aggregation skips any block whose maximum is
/// below the current top-k threshold.
pub struct TaatEngine {
    values: Vec<Score>,
    epochs: Vec<u32>,
    epoch: u32,
    /// Accumulators per block; `None` disables the blocked aggregation.
    block_size: Option<usize>,
    block_max: Vec<Score>,
}

impl TaatEngine {
    pub fn new(collection_size: usize) -> Self {
        Self::with_accumulator_blocks(collection_size, None)
    }

    pub fn with_accumulator_blocks(collection_size: usize, block_size: Option<usize>) -> Self {
        let blocks = block_size.map_or(0, |size| (collection_size + size - 1) / size.max(1));
        TaatEngine {
            values: vec![0.0; collection_size],
            epochs: vec![0; collection_size],
            epoch: 0,
            block_size,
            block_max: vec![0.0; blocks],
        }
    }

    fn accumulate(&mut self, document: DocId, delta: Score) {
        let index = document.0 as usize;
        if self.epochs[index] != self.epoch {
            self.epochs[index] = self.epoch;
            self.values[index] = 0.0;
        }
        self.values[index] += delta;
        if let Some(size) = self.block_size {
            let block = index / size;
            self.block_max[block] = self.block_max[block].max(self.values[index]);
        }
    }

    fn value(&self, index: usize) -> Score {
        if self.epochs[index] == self.epoch {
            self.values[index]
        } else {
            0.0
        }
    }

    /// Advances to the next query epoch; clears only on wrap-around.
    fn next_query(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.values.fill(0.0);
            self.epochs.fill(0);
            self.epoch = 1;
        }
        self.block_max.fill(0.0);
    }

    /// Runs one query; accumulation order is term order, then posting
    /// order within each list, so floating-point sums are deterministic.
    pub fn run(
        &mut self,
        cursors: Vec<ScoredCursor>,
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<SearchResults> {
        self.next_query();
        for mut cursor in cursors {
            let mut in_block = 0usize;
            while !cursor.is_end() {
                // Deadline checks happen at posting-block granularity.
                if in_block == 0 && deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Ok(SearchResults::cancelled(self.aggregate(k)));
                }
                in_block = (in_block + 1) % 64;
                let document = cursor.document()?;
                let score = cursor.score()?;
                self.accumulate(document, score);
                cursor.next();
            }
        }
        Ok(SearchResults::complete(self.aggregate(k)))
    }

    /// Feeds every non-zero accumulator into a top-k accumulator.
    fn aggregate(&self, k: usize) -> TopK {
        let mut top = TopK::new(k);
        match self.block_size {
            Some(size) => {
                for block in 0..self.block_max.len() {
                    if top.is_full() && self.block_max[block] < top.threshold() {
                        continue;
                    }
                    let begin = block * size;
                    let end = (begin + size).min(self.values.len());
                    for index in begin..end {
                        let score = self.value(index);
                        if score != 0.0 {
                            top.push(DocId(index as u32), score);
                        }
                    }
                }
            }
            None => {
                for index in 0..self.values.len() {
                    let score = self.value(index);
                    if score != 0.0 {
                        top.push(DocId(index as u32), score);
                    }
                }
            }
        }
        top
    }
}

/// One-shot term-at-a-time traversal over a fresh accumulator array.
pub fn taat(
    cursors: Vec<ScoredCursor>,
    k: usize,
    collection_size: usize,
    deadline: Option<Instant>,
) -> Result<SearchResults> {
    TaatEngine::new(collection_size).run(cursors, k, deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::{fixture, make_lists};

    #[test]
    fn test_matches_expected_top_two() {
        let fixture = fixture(&[&[(0, 1), (1, 2)], &[(1, 3), (2, 1)]]);
        let lists = make_lists(&fixture);
        let results = taat(
            lists.iter().map(|list| list.cursor()).collect(),
            2,
            3,
            None,
        )
        .unwrap();
        let ranked: Vec<(u32, f32)> = results
            .iter()
            .map(|(_, document, score)| (document.0, score))
            .collect();
        assert_eq!(ranked, vec![(1, 5.0), (0, 1.0)]);
    }

    #[test]
    fn test_engine_reuse_does_not_leak_state() {
        let fixture_a = fixture(&[&[(0, 4)]]);
        let fixture_b = fixture(&[&[(1, 2)]]);
        let lists_a = make_lists(&fixture_a);
        let lists_b = make_lists(&fixture_b);

        let mut engine = TaatEngine::new(4);
        let first = engine
            .run(lists_a.iter().map(|list| list.cursor()).collect(), 4, None)
            .unwrap();
        assert_eq!(first.results.len(), 1);
        assert_eq!(first.results[0].document, DocId(0));

        // Document 0 must not survive into the next query's accumulators.
        let second = engine
            .run(lists_b.iter().map(|list| list.cursor()).collect(), 4, None)
            .unwrap();
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].document, DocId(1));
    }

    #[test]
    fn test_blocked_aggregation_matches_plain() {
        let lists_data: &[&[(u32, u32)]] = &[
            &[(0, 1), (3, 7), (9, 2), (11, 1)],
            &[(3, 2), (9, 9), (10, 4)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);

        let plain = taat(lists.iter().map(|list| list.cursor()).collect(), 3, 12, None).unwrap();
        let mut blocked_engine = TaatEngine::with_accumulator_blocks(12, Some(4));
        let blocked = blocked_engine
            .run(lists.iter().map(|list| list.cursor()).collect(), 3, None)
            .unwrap();
        assert_eq!(plain.results, blocked.results);
    }
}
