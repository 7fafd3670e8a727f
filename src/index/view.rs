use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Frequency, TermId};
use crate::index::block_list::{DocumentListView, PayloadListView};
use crate::index::compact_table::{CompactTable, FloatTable};
use crate::index::lexicon::Lexicon;
use crate::index::posting::{PostingListView, ZippedPostingListView};
use crate::index::source::IndexSource;
use crate::scoring::scorer::{Bm25Params, QlParams, ScoreTag, TermScorer};

/// One quantized score layer parsed from its source mappings.
pub struct ScoredLayerView<'a> {
    pub name: String,
    scores: &'a [u8],
    offsets: CompactTable<&'a [u8]>,
    max_scores: CompactTable<&'a [u8]>,
}

/// Per-scorer statistics tables (`max`, `mean`, `var`).
pub struct ScoreStatsView<'a> {
    pub name: String,
    pub max: FloatTable<&'a [u8]>,
    pub mean: FloatTable<&'a [u8]>,
    pub var: FloatTable<&'a [u8]>,
}

/// A scored posting list together with the term's maximum quantized score.
pub struct ScoredPostingList<'a> {
    pub postings: PostingListView<'a>,
    pub max_score: u32,
}

/// Read-only facade over one inverted index.
///
/// Thread-safe for reads; all state borrows from the immutable source.
pub struct IndexView<'a> {
    source: &'a IndexSource,
    term_map: Lexicon<'a>,
    title_map: Lexicon<'a>,
    document_offsets: CompactTable<&'a [u8]>,
    count_offsets: CompactTable<&'a [u8]>,
    document_frequencies: CompactTable<&'a [u8]>,
    term_occurrences: CompactTable<&'a [u8]>,
    document_sizes: CompactTable<&'a [u8]>,
    scored_layers: Vec<ScoredLayerView<'a>>,
    stats: Vec<ScoreStatsView<'a>>,
}

impl<'a> IndexView<'a> {
    pub fn open(source: &'a IndexSource) -> Result<Self> {
        let term_map = Lexicon::parse(source.term_map.data())?;
        let title_map = Lexicon::parse(source.title_map.data())?;
        let document_offsets = CompactTable::new(source.document_offsets.data())?;
        let count_offsets = CompactTable::new(source.count_offsets.data())?;
        let document_frequencies = CompactTable::new(source.document_frequencies.data())?;
        let term_occurrences = CompactTable::new(source.term_occurrences.data())?;
        let document_sizes = CompactTable::new(source.document_sizes.data())?;

        let term_count = term_map.len();
        for (what, len) in [
            ("doc.idoff", document_offsets.len()),
            ("doc.countoff", count_offsets.len()),
            ("terms.docfreq", document_frequencies.len()),
            ("terms.occurrences", term_occurrences.len()),
        ] {
            if len != term_count {
                return Err(Error::corruption(format!(
                    "{} has {} entries for {} terms",
                    what, len, term_count
                )));
            }
        }
        let document_count = source.properties.document_count as usize;
        if title_map.len() != document_count || document_sizes.len() != document_count {
            return Err(Error::corruption(format!(
                "document count {} disagrees with {} titles and {} sizes",
                document_count,
                title_map.len(),
                document_sizes.len()
            )));
        }

        let mut scored_layers = Vec::with_capacity(source.scored_layers.len());
        for layer in &source.scored_layers {
            let offsets = CompactTable::new(layer.offsets.data())?;
            let max_scores = CompactTable::new(layer.max_scores.data())?;
            if offsets.len() != term_count || max_scores.len() != term_count {
                return Err(Error::corruption(format!(
                    "score layer {} tables do not cover all {} terms",
                    layer.name, term_count
                )));
            }
            scored_layers.push(ScoredLayerView {
                name: layer.name.clone(),
                scores: layer.scores.data(),
                offsets,
                max_scores,
            });
        }

        let mut stats = Vec::with_capacity(source.stats.len());
        for stat in &source.stats {
            stats.push(ScoreStatsView {
                name: stat.name.clone(),
                max: FloatTable::new(stat.max.data())?,
                mean: FloatTable::new(stat.mean.data())?,
                var: FloatTable::new(stat.var.data())?,
            });
        }

        Ok(IndexView {
            source,
            term_map,
            title_map,
            document_offsets,
            count_offsets,
            document_frequencies,
            term_occurrences,
            document_sizes,
            scored_layers,
            stats,
        })
    }

    /// Directory this index was opened from.
    pub fn dir(&self) -> &std::path::Path {
        &self.source.dir
    }

    pub fn term_count(&self) -> usize {
        self.term_map.len()
    }

    pub fn collection_size(&self) -> u32 {
        self.source.properties.document_count
    }

    pub fn occurrences_count(&self) -> u64 {
        self.source.properties.occurrences_count
    }

    pub fn avg_document_size(&self) -> f64 {
        self.source.properties.avg_document_size
    }

    pub fn max_document_size(&self) -> u32 {
        self.source.properties.max_document_size
    }

    pub fn skip_block_size(&self) -> u32 {
        self.source.properties.skip_block_size
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.term_map.index_at(term).map(TermId)
    }

    pub fn term(&self, term_id: TermId) -> Result<String> {
        self.term_map.key_at(term_id.0)
    }

    pub fn terms(&self) -> &Lexicon<'a> {
        &self.term_map
    }

    pub fn titles(&self) -> &Lexicon<'a> {
        &self.title_map
    }

    pub fn title(&self, document: DocId) -> Result<String> {
        self.title_map.key_at(document.0)
    }

    /// Document frequency of the term.
    pub fn term_collection_frequency(&self, term_id: TermId) -> Result<Frequency> {
        Ok(self.document_frequencies.get(term_id.0 as usize)? as Frequency)
    }

    pub fn term_occurrences(&self, term_id: TermId) -> Result<Frequency> {
        Ok(self.term_occurrences.get(term_id.0 as usize)? as Frequency)
    }

    pub fn document_size(&self, document: DocId) -> Result<u32> {
        Ok(self.document_sizes.get(document.0 as usize)? as u32)
    }

    pub fn document_sizes(&self) -> &CompactTable<&'a [u8]> {
        &self.document_sizes
    }

    /// Byte range of one term's list within a posting file.
    fn posting_range(
        &self,
        term_id: TermId,
        offsets: &CompactTable<&'a [u8]>,
        data: &'a [u8],
    ) -> Result<&'a [u8]> {
        let index = term_id.0 as usize;
        let offset = offsets.get(index)? as usize;
        let end = if index + 1 < offsets.len() {
            offsets.get(index + 1)? as usize
        } else {
            data.len()
        };
        if offset > end || end > data.len() {
            return Err(Error::corruption(format!(
                "posting range {}..{} of term {} exceeds the file",
                offset, end, term_id.0
            )));
        }
        Ok(&data[offset..end])
    }

    pub fn documents(&self, term_id: TermId) -> Result<DocumentListView<'a>> {
        let length = self.term_collection_frequency(term_id)? as usize;
        let memory =
            self.posting_range(term_id, &self.document_offsets, self.source.documents.data())?;
        DocumentListView::parse(memory, length)
    }

    pub fn frequencies(&self, term_id: TermId) -> Result<PayloadListView<'a>> {
        let length = self.term_collection_frequency(term_id)? as usize;
        let memory =
            self.posting_range(term_id, &self.count_offsets, self.source.counts.data())?;
        PayloadListView::parse(memory, length)
    }

    /// Document list zipped with raw frequencies.
    pub fn postings(&self, term_id: TermId) -> Result<PostingListView<'a>> {
        PostingListView::new(self.documents(term_id)?, self.frequencies(term_id)?)
    }

    fn scored_layer(&self, name: &str) -> Result<&ScoredLayerView<'a>> {
        self.scored_layers
            .iter()
            .find(|layer| layer.name == name)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidArgument,
                    format!("score layer {} is not loaded", name),
                )
            })
    }

    /// Document list zipped with the quantized scores of layer `name`,
    /// along with the per-term maximum quantized score.
    pub fn scored_postings(&self, term_id: TermId, name: &str) -> Result<ScoredPostingList<'a>> {
        let layer = self.scored_layer(name)?;
        let length = self.term_collection_frequency(term_id)? as usize;
        let memory = self.posting_range(term_id, &layer.offsets, layer.scores)?;
        let postings = PostingListView::new(
            self.documents(term_id)?,
            PayloadListView::parse(memory, length)?,
        )?;
        let max_score = layer.max_scores.get(term_id.0 as usize)? as u32;
        Ok(ScoredPostingList {
            postings,
            max_score,
        })
    }

    /// Document list zipped with both the raw frequency and the quantized
    /// score of layer `name`.
    pub fn zipped_postings(
        &self,
        term_id: TermId,
        name: &str,
    ) -> Result<ZippedPostingListView<'a>> {
        let layer = self.scored_layer(name)?;
        let length = self.term_collection_frequency(term_id)? as usize;
        let scores = self.posting_range(term_id, &layer.offsets, layer.scores)?;
        ZippedPostingListView::new(
            self.documents(term_id)?,
            self.frequencies(term_id)?,
            PayloadListView::parse(scores, length)?,
        )
    }

    pub fn max_quantized_score(&self, term_id: TermId, name: &str) -> Result<u32> {
        let layer = self.scored_layer(name)?;
        Ok(layer.max_scores.get(term_id.0 as usize)? as u32)
    }

    /// On-the-fly scorer bound to this term's statistics.
    pub fn term_scorer(&self, term_id: TermId, tag: ScoreTag) -> Result<TermScorer> {
        match tag {
            ScoreTag::Bm25 => Ok(TermScorer::bm25(
                self.term_collection_frequency(term_id)?,
                self.collection_size(),
                self.avg_document_size() as f32,
                Bm25Params::default(),
            )),
            ScoreTag::Ql => Ok(TermScorer::ql(
                u64::from(self.term_occurrences(term_id)?),
                self.occurrences_count(),
                QlParams::default(),
            )),
        }
    }

    /// Score statistics of scorer `name`, if stored.
    pub fn score_stats(&self, name: &str) -> Option<&ScoreStatsView<'a>> {
        self.stats.iter().find(|stats| stats.name == name)
    }

    pub fn score_mean(&self, name: &str, term_id: TermId) -> Result<f32> {
        self.stat_value(name, term_id, |stats| &stats.mean)
    }

    pub fn score_var(&self, name: &str, term_id: TermId) -> Result<f32> {
        self.stat_value(name, term_id, |stats| &stats.var)
    }

    pub fn score_max(&self, name: &str, term_id: TermId) -> Result<f32> {
        self.stat_value(name, term_id, |stats| &stats.max)
    }

    fn stat_value(
        &self,
        name: &str,
        term_id: TermId,
        select: impl for<'s> Fn(&'s ScoreStatsView<'a>) -> &'s FloatTable<&'a [u8]>,
    ) -> Result<f32> {
        let stats = self.score_stats(name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("no score statistics stored for {}", name),
            )
        })?;
        select(stats).get(term_id.0 as usize)
    }
}
