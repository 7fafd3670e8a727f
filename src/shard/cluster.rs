use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::properties::Properties;
use crate::core::types::{DocId, ShardId, TermId};
use crate::index::compact_table::CompactTable;
use crate::index::layout;
use crate::index::lexicon::Lexicon;
use crate::index::source::{IndexSource, MmapFile};
use crate::index::view::IndexView;
use crate::scoring::scorer::{Bm25Params, QlParams, ScoreTag, ScorerSpec, TermScorer};
use crate::search::engine::{QueryEngine, TraversalType};
use crate::search::taily::{CollectionStats, FeatureStats, score_shards};

/// Owns the mappings of a whole cluster: one source per shard plus the
/// cluster-level global term tables.
pub struct ClusterSource {
    pub dir: PathBuf,
    pub properties: Properties,
    pub shards: Vec<IndexSource>,
    term_map: MmapFile,
    document_frequencies: MmapFile,
    term_occurrences: MmapFile,
}

impl ClusterSource {
    pub fn open(dir: &Path, scored: &[&str]) -> Result<Self> {
        let properties = Properties::load(&layout::properties_path(dir))?;
        let Some(shard_count) = properties.shard_count.filter(|&count| count > 0) else {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} is not a cluster directory", dir.display()),
            ));
        };
        let mut shards = Vec::with_capacity(shard_count as usize);
        for shard in 0..shard_count as usize {
            shards.push(IndexSource::open(&layout::shard_path(dir, shard), scored)?);
        }
        Ok(ClusterSource {
            dir: dir.to_path_buf(),
            properties,
            shards,
            term_map: MmapFile::open_read_only(&layout::term_map_path(dir))?,
            document_frequencies: MmapFile::open_read_only(&layout::term_doc_freq_path(dir))?,
            term_occurrences: MmapFile::open_read_only(&layout::term_occurrences_path(dir))?,
        })
    }
}

/// Treats a directory of shards as a single index: per-shard views plus
/// the global statistics needed to make shard scores comparable.
pub struct ClusterView<'a> {
    source: &'a ClusterSource,
    shards: Vec<IndexView<'a>>,
    term_map: Lexicon<'a>,
    document_frequencies: CompactTable<&'a [u8]>,
    term_occurrences: CompactTable<&'a [u8]>,
}

impl<'a> ClusterView<'a> {
    pub fn open(source: &'a ClusterSource) -> Result<Self> {
        let shards = source
            .shards
            .iter()
            .map(IndexView::open)
            .collect::<Result<Vec<_>>>()?;
        let view = ClusterView {
            source,
            shards,
            term_map: Lexicon::parse(source.term_map.data())?,
            document_frequencies: CompactTable::new(source.document_frequencies.data())?,
            term_occurrences: CompactTable::new(source.term_occurrences.data())?,
        };
        let total: u64 = view
            .shards
            .iter()
            .map(|shard| u64::from(shard.collection_size()))
            .sum();
        if total != u64::from(source.properties.document_count) {
            return Err(Error::corruption(format!(
                "cluster declares {} documents but shards hold {}",
                source.properties.document_count, total
            )));
        }
        Ok(view)
    }

    pub fn shards(&self) -> &[IndexView<'a>] {
        &self.shards
    }

    pub fn collection_size(&self) -> u32 {
        self.source.properties.document_count
    }

    pub fn occurrences_count(&self) -> u64 {
        self.source.properties.occurrences_count
    }

    /// Collection-wide average document length, weighted by shard sizes.
    pub fn avg_document_size(&self) -> f64 {
        let total: f64 = self
            .shards
            .iter()
            .map(|shard| shard.avg_document_size() * f64::from(shard.collection_size()))
            .sum();
        if self.collection_size() == 0 {
            0.0
        } else {
            total / f64::from(self.collection_size())
        }
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.term_map.index_at(term).map(TermId)
    }

    /// Global document frequency of the term.
    pub fn term_collection_frequency(&self, term_id: TermId) -> Result<u32> {
        Ok(self.document_frequencies.get(term_id.0 as usize)? as u32)
    }

    pub fn term_occurrences(&self, term_id: TermId) -> Result<u64> {
        self.term_occurrences.get(term_id.0 as usize)
    }

    /// A scorer built from global term statistics; document lengths come
    /// from the shard at scoring time, which keeps per-shard scores
    /// comparable across the cluster.
    pub fn term_scorer(&self, term_id: TermId, tag: ScoreTag) -> Result<TermScorer> {
        match tag {
            ScoreTag::Bm25 => Ok(TermScorer::bm25(
                self.term_collection_frequency(term_id)?,
                self.collection_size(),
                self.avg_document_size() as f32,
                Bm25Params::default(),
            )),
            ScoreTag::Ql => Ok(TermScorer::ql(
                self.term_occurrences(term_id)?,
                self.occurrences_count(),
                QlParams::default(),
            )),
        }
    }

    /// Taily statistics of a query against one shard, from the shard's
    /// statistics tables.
    pub fn shard_query_stats(
        &self,
        shard: usize,
        scorer: &str,
        terms: &[String],
    ) -> Result<CollectionStats> {
        CollectionStats::from_view(&self.shards[shard], scorer, terms)
    }

    /// Taily statistics of a query against the whole cluster, from the
    /// global tables: per-term mean and variance are the document-
    /// frequency-weighted combination of the shard statistics.
    pub fn global_query_stats(&self, scorer: &str, terms: &[String]) -> Result<CollectionStats> {
        let mut features = vec![FeatureStats::default(); terms.len()];
        for shard in &self.shards {
            for (index, term) in terms.iter().enumerate() {
                let stats = FeatureStats::from_view(shard, scorer, term)?;
                features[index].mean += stats.mean * stats.frequency;
                // E[X^2] accumulates so that the combined variance is
                // exact, not an average of variances.
                features[index].variance +=
                    (stats.variance + stats.mean * stats.mean) * stats.frequency;
                features[index].frequency += stats.frequency;
            }
        }
        for feature in &mut features {
            if feature.frequency > 0.0 {
                let mean = feature.mean / feature.frequency;
                feature.variance = (feature.variance / feature.frequency - mean * mean).max(0.0);
                feature.mean = mean;
            }
        }
        Ok(CollectionStats {
            features,
            size: u64::from(self.collection_size()),
        })
    }
}

/// One merged cluster result; documents are identified by their titles,
/// which are unique across shards.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResult {
    pub shard: ShardId,
    pub title: String,
    pub score: f32,
}

/// Which shards a query is sent to.
#[derive(Debug, Clone, Copy)]
pub enum ShardSelection {
    /// Broadcast to every shard.
    All,
    /// Send to the `count` shards ranked best by Taily for this query.
    Taily { count: usize },
}

/// Broadcasts queries across a cluster and merges per-shard top-k lists
/// into a global one.
pub struct ClusterDispatcher<'c, 'a> {
    cluster: &'c ClusterView<'a>,
    traversal: TraversalType,
    scorer: ScorerSpec,
    /// Rescore shard candidates against the global scorer before the
    /// merge, making scores exact across shards.
    rescore: bool,
}

impl<'c, 'a> ClusterDispatcher<'c, 'a> {
    pub fn new(cluster: &'c ClusterView<'a>, traversal: TraversalType, scorer: ScorerSpec) -> Self {
        ClusterDispatcher {
            cluster,
            traversal,
            scorer,
            rescore: false,
        }
    }

    pub fn with_rescoring(mut self) -> Self {
        self.rescore = true;
        self
    }

    fn select_shards(
        &self,
        terms: &[String],
        k: usize,
        selection: ShardSelection,
    ) -> Result<Vec<usize>> {
        match selection {
            ShardSelection::All => Ok((0..self.cluster.shards().len()).collect()),
            ShardSelection::Taily { count } => {
                let name = self.scorer.tag.name();
                let global = self.cluster.global_query_stats(name, terms)?;
                let shard_stats = (0..self.cluster.shards().len())
                    .map(|shard| self.cluster.shard_query_stats(shard, name, terms))
                    .collect::<Result<Vec<_>>>()?;
                let scores = score_shards(&global, &shard_stats, k);
                let mut order: Vec<usize> = (0..scores.len()).collect();
                order.sort_by(|&a, &b| {
                    scores[b]
                        .partial_cmp(&scores[a])
                        .expect("shard scores are totally ordered")
                        .then_with(|| a.cmp(&b))
                });
                order.truncate(count);
                debug!(?order, "taily shard selection");
                Ok(order)
            }
        }
    }

    /// Runs the query on the selected shards and merges the per-shard
    /// top-k lists; the result is sorted by descending score, ties by
    /// ascending title.
    pub fn run_query(
        &self,
        terms: &[String],
        k: usize,
        selection: ShardSelection,
    ) -> Result<Vec<ClusterResult>> {
        let mut merged = Vec::new();
        for shard in self.select_shards(terms, k, selection)? {
            let view = &self.cluster.shards()[shard];
            let engine = QueryEngine::new(view, self.traversal, self.scorer);
            let output = engine.run_query(terms, k)?;

            let mut candidates: Vec<(DocId, f32)> = output
                .results
                .iter()
                .map(|(_, document, score)| (document, score))
                .collect();
            if self.rescore {
                self.rescore_candidates(shard, terms, &mut candidates)?;
            }
            for (document, score) in candidates {
                merged.push(ClusterResult {
                    shard: ShardId(shard as u16),
                    title: view.title(document)?,
                    score,
                });
            }
        }
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .expect("scores are totally ordered")
                .then_with(|| a.title.cmp(&b.title))
        });
        merged.truncate(k);
        Ok(merged)
    }

    /// Replaces candidate scores with exact global-scorer sums: each
    /// query term's shard postings are advanced to the candidate and its
    /// contribution recomputed with global statistics.
    fn rescore_candidates(
        &self,
        shard: usize,
        terms: &[String],
        candidates: &mut [(DocId, f32)],
    ) -> Result<()> {
        let view = &self.cluster.shards()[shard];
        candidates.sort_by_key(|&(document, _)| document);
        for (_, score) in candidates.iter_mut() {
            *score = 0.0;
        }
        for term in terms {
            let Some(local_id) = view.term_id(term) else {
                continue;
            };
            let Some(global_id) = self.cluster.term_id(term) else {
                continue;
            };
            let scorer = self.cluster.term_scorer(global_id, self.scorer.tag)?;
            let postings = view.postings(local_id)?;
            let mut cursor = postings.cursor();
            for (document, score) in candidates.iter_mut() {
                cursor.advance_to(*document)?;
                if cursor.is_end() {
                    break;
                }
                let posting = cursor.get()?;
                if posting.document == *document {
                    let size = view.document_size(*document)?;
                    *score += scorer.score(posting.payload, size);
                }
            }
        }
        Ok(())
    }
}
