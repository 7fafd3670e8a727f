use crate::core::error::Result;
use crate::core::types::{DocId, Score};
use crate::index::posting::{PostingCursor, PostingListView};
use crate::index::view::IndexView;
use crate::scoring::scorer::TermScorer;

/// How a term list's payloads turn into scores.
pub enum ScoreSource<'v, 'a> {
    /// The payload already is the (quantized) score.
    Quantized,
    /// The payload is a raw frequency scored on the fly; document sizes
    /// come from the index view.
    Fly {
        scorer: TermScorer,
        view: &'v IndexView<'a>,
    },
}

/// One query term's posting list with everything needed to score it.
pub struct TermList<'v, 'a> {
    postings: PostingListView<'a>,
    source: ScoreSource<'v, 'a>,
    weight: Score,
    max_score: Score,
}

impl<'v, 'a> TermList<'v, 'a> {
    /// A list whose payloads are quantized scores; the maximum comes from
    /// the layer's max-score table.
    pub fn quantized(postings: PostingListView<'a>, max_score: u32, weight: Score) -> Self {
        TermList {
            postings,
            source: ScoreSource::Quantized,
            weight,
            max_score: max_score as Score * weight,
        }
    }

    /// A raw frequency list scored on the fly. The maximum posting score
    /// is computed once by scanning the list.
    pub fn on_the_fly(
        postings: PostingListView<'a>,
        scorer: TermScorer,
        view: &'v IndexView<'a>,
        weight: Score,
    ) -> Result<Self> {
        let mut max_score = 0.0f32;
        let mut cursor = postings.cursor();
        while !cursor.is_end() {
            let posting = cursor.get()?;
            let size = view.document_size(posting.document)?;
            max_score = max_score.max(scorer.score(posting.payload, size));
            cursor.next();
        }
        Ok(TermList {
            postings,
            source: ScoreSource::Fly { scorer, view },
            weight,
            max_score: max_score * weight,
        })
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Weighted upper bound of any posting score in this list.
    pub fn max_score(&self) -> Score {
        self.max_score
    }

    pub fn cursor(&self) -> ScoredCursor<'_, 'a> {
        ScoredCursor {
            cursor: self.postings.cursor(),
            list: self,
        }
    }
}

/// A posting cursor that yields weighted scores instead of raw payloads.
pub struct ScoredCursor<'l, 'a> {
    cursor: PostingCursor<'l, 'a>,
    list: &'l TermList<'l, 'a>,
}

impl Clone for ScoredCursor<'_, '_> {
    fn clone(&self) -> Self {
        ScoredCursor {
            cursor: self.cursor.clone(),
            list: self.list,
        }
    }
}

impl ScoredCursor<'_, '_> {
    pub fn is_end(&self) -> bool {
        self.cursor.is_end()
    }

    pub fn document(&mut self) -> Result<DocId> {
        self.cursor.document()
    }

    pub fn score(&mut self) -> Result<Score> {
        let posting = self.cursor.get()?;
        let score = match &self.list.source {
            ScoreSource::Quantized => posting.payload as Score,
            ScoreSource::Fly { scorer, view } => {
                let size = view.document_size(posting.document)?;
                scorer.score(posting.payload, size)
            }
        };
        Ok(score * self.list.weight)
    }

    pub fn next(&mut self) {
        self.cursor.next();
    }

    pub fn max_score(&self) -> Score {
        self.list.max_score()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Remaining `(document, score)` pairs from the current position.
    pub fn drain(&mut self) -> Result<Vec<(DocId, Score)>> {
        let mut postings = Vec::new();
        while !self.is_end() {
            postings.push((self.document()?, self.score()?));
            self.next();
        }
        Ok(postings)
    }
}

impl<'a> ScoredCursor<'a, 'a> {
    pub fn advance_to(&mut self, target: DocId) -> Result<()> {
        self.cursor.advance_to(target)
    }
}
