pub mod core;
pub mod compression;
pub mod index;
pub mod scoring;
pub mod search;
pub mod shard;

pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::properties::Properties;
pub use crate::core::types::{DocId, Frequency, Offset, Score, ShardId, TermId};
pub use crate::index::builder::{BuilderConfig, IndexBuilder};
pub use crate::index::source::IndexSource;
pub use crate::index::view::IndexView;
pub use crate::scoring::quantize::{score_index, score_stats};
pub use crate::scoring::scorer::{ScoreTag, ScorerSpec};
pub use crate::search::engine::{QueryEngine, QueryRequest, QueryResponse, TraversalType};
pub use crate::search::topk::{RankedResult, SearchResults};
pub use crate::shard::cluster::{ClusterDispatcher, ClusterSource, ClusterView, ShardSelection};
pub use crate::shard::partition::{PartitionConfig, partition};
pub use crate::shard::reorder::reorder;

/*
┌──────────────────────────────────────────────────────────────────────────┐
│                          KESTRIX DATA FLOW                               │
└──────────────────────────────────────────────────────────────────────────┘

  tokenized documents
        │
        ▼
  IndexBuilder ──(partial flush + k-way merge)──► on-disk layout
        │                                          properties.json
        │                                          terms.txt / terms.map
        ▼                                          doc.id / doc.idoff
  score_index / score_stats                        doc.count / doc.countoff
  (offline quantization,                           titles.txt / titles.map
   per-term statistics)                            doc.sizes, <S>.scores ...
        │
        ▼
  IndexSource (owns mmaps) ──► IndexView (borrowing facade)
        │                           │
        │                           ├── postings(term)        raw frequencies
        │                           ├── scored_postings(term) quantized layer
        │                           └── term_scorer(term)     BM25 / QL
        ▼                           ▼
  partition / reorder         QueryEngine ── taat / daat / wand /
  (new directories)                          maxscore / saat ──► top-k
        │
        ▼
  ClusterSource ──► ClusterView ──► ClusterDispatcher
  (shards 000, 001, ...)            (taily selection, rescore, merge)
*/
