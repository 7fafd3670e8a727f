use std::fs;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;
use tracing::info;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::properties::Properties;
use crate::core::types::{DocId, ShardId, TermId};
use crate::index::block_list::BlockListBuilder;
use crate::index::builder::PostingFilesWriter;
use crate::index::compact_table::{CompactTableBuilder, write_float_table};
use crate::index::layout;
use crate::index::lexicon::write_lexicon;
use crate::index::source::IndexSource;
use crate::index::view::IndexView;
use crate::scoring::scorer::ScoreTag;

/// What to split besides the raw postings.
#[derive(Debug, Clone, Default)]
pub struct PartitionConfig {
    /// Quantized layers to split into per-shard layers (e.g. `bm25-8`).
    pub scored_layers: Vec<String>,
    /// Scorers whose per-shard statistics tables are recomputed during
    /// the split (scored with global term statistics so that shard
    /// scores stay comparable).
    pub stat_scorers: Vec<ScoreTag>,
}

/// Splits an index into `shard_count` shards following `shard_map` and
/// writes a cluster directory: per-shard complete indexes under `000`,
/// `001`, ... plus cluster-level properties and global term tables.
///
/// Postings are processed in a single streaming pass over terms; every
/// shard keeps all terms (terms absent from a shard get empty lists), so
/// term IDs are identical across the cluster.
pub fn partition(
    input: &Path,
    output: &Path,
    shard_map: &[ShardId],
    shard_count: usize,
    config: &PartitionConfig,
) -> Result<()> {
    let layer_names: Vec<&str> = config.scored_layers.iter().map(String::as_str).collect();
    let source = IndexSource::open(input, &layer_names)?;
    let view = IndexView::open(&source)?;

    if shard_map.len() != view.collection_size() as usize {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!(
                "shard map covers {} documents, index has {}",
                shard_map.len(),
                view.collection_size()
            ),
        ));
    }
    if let Some(bad) = shard_map.iter().find(|shard| shard.0 as usize >= shard_count) {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("shard id {} out of range [0, {})", bad.0, shard_count),
        ));
    }
    info!(
        shards = shard_count,
        documents = shard_map.len(),
        terms = view.term_count(),
        "partitioning index"
    );

    // Global-to-local document map and the per-shard reverse arrays.
    let mut local_ids = vec![0u32; shard_map.len()];
    let mut shard_documents: Vec<Vec<u32>> = vec![Vec::new(); shard_count];
    for (global, shard) in shard_map.iter().enumerate() {
        let documents = &mut shard_documents[shard.0 as usize];
        local_ids[global] = documents.len() as u32;
        documents.push(global as u32);
    }

    let staging = tempfile::Builder::new()
        .prefix(".kestrix-partition-")
        .tempdir_in(output.parent().unwrap_or_else(|| Path::new(".")))?;
    let staging_dir = staging.path();
    for shard in 0..shard_count {
        fs::create_dir(layout::shard_path(staging_dir, shard))?;
    }

    write_shard_postings(&view, staging_dir, shard_map, &local_ids, shard_count, config)?;

    // Per-shard titles, sizes, reverse maps and properties. Sizes and
    // titles split cleanly per shard, so the shards aggregate in
    // parallel.
    let skip_block_size = view.skip_block_size();
    let shard_meta: Vec<(u64, u32)> = shard_documents
        .par_iter()
        .map(|documents| {
            let mut total = 0u64;
            let mut max = 0u32;
            for &global in documents {
                // Sizes were validated at open time; lookups cannot fail
                // here unless the mapping races with index mutation,
                // which the immutable source rules out.
                let size = view.document_size(DocId(global)).unwrap_or(0);
                total += u64::from(size);
                max = max.max(size);
            }
            (total, max)
        })
        .collect();

    for shard in 0..shard_count {
        let shard_dir = layout::shard_path(staging_dir, shard);
        let documents = &shard_documents[shard];

        let mut titles = Vec::with_capacity(documents.len());
        let mut sizes = Vec::with_capacity(documents.len());
        for &global in documents {
            titles.push(view.title(DocId(global))?);
            sizes.push(u64::from(view.document_size(DocId(global))?));
        }
        let mut titles_out = fs::File::create(layout::titles_path(&shard_dir))?;
        for title in &titles {
            writeln!(titles_out, "{}", title)?;
        }
        write_lexicon(
            titles.iter().map(String::as_str),
            view.titles().keys_per_block(),
            &layout::title_map_path(&shard_dir),
        )?;
        CompactTableBuilder::plain().write(&sizes, &layout::doc_sizes_path(&shard_dir))?;

        // Shard-local to global document map; ascending by construction.
        let reverse: Vec<u64> = documents.iter().map(|&global| u64::from(global)).collect();
        CompactTableBuilder::offsets().write(&reverse, &layout::reverse_map_path(&shard_dir))?;

        let (total, max) = shard_meta[shard];
        let properties = Properties {
            document_count: documents.len() as u32,
            occurrences_count: total,
            skip_block_size,
            avg_document_size: if documents.is_empty() {
                0.0
            } else {
                total as f64 / documents.len() as f64
            },
            max_document_size: max,
            shard_count: None,
        };
        properties.save(&layout::properties_path(&shard_dir))?;
    }

    // Cluster-level properties and global term tables.
    let cluster_properties = Properties {
        document_count: view.collection_size(),
        occurrences_count: view.occurrences_count(),
        skip_block_size,
        avg_document_size: view.avg_document_size(),
        max_document_size: view.max_document_size(),
        shard_count: Some(shard_count as u32),
    };
    cluster_properties.save(&layout::properties_path(staging_dir))?;
    for (from, to) in [
        (layout::terms_path(input), layout::terms_path(staging_dir)),
        (layout::term_map_path(input), layout::term_map_path(staging_dir)),
        (
            layout::term_doc_freq_path(input),
            layout::term_doc_freq_path(staging_dir),
        ),
        (
            layout::term_occurrences_path(input),
            layout::term_occurrences_path(staging_dir),
        ),
    ] {
        fs::copy(from, to)?;
    }
    for tag in &config.stat_scorers {
        let from = layout::stat_paths(input, tag.name());
        let to = layout::stat_paths(staging_dir, tag.name());
        if from.mean.exists() {
            fs::copy(&from.max, &to.max)?;
            fs::copy(&from.mean, &to.mean)?;
            fs::copy(&from.var, &to.var)?;
        }
    }

    if output.exists() {
        fs::remove_dir_all(output)?;
    }
    let staged = staging.keep();
    fs::rename(&staged, output)?;
    Ok(())
}

/// Per-shard writers for one quantized score layer.
struct ScoreLayerWriter {
    out: std::io::BufWriter<fs::File>,
    offset: u64,
    offsets: Vec<u64>,
    max_scores: Vec<u64>,
}

impl ScoreLayerWriter {
    fn create(dir: &Path, name: &str) -> Result<Self> {
        let paths = layout::score_paths(dir, name);
        Ok(ScoreLayerWriter {
            out: std::io::BufWriter::new(fs::File::create(&paths.scores)?),
            offset: 0,
            offsets: Vec::new(),
            max_scores: Vec::new(),
        })
    }

    fn push(&mut self, scores: &[u32], block_size: usize) -> Result<()> {
        self.offsets.push(self.offset);
        self.max_scores
            .push(scores.iter().copied().max().unwrap_or(0) as u64);
        let mut builder = BlockListBuilder::payloads(block_size);
        for &score in scores {
            builder.add(score);
        }
        let mut encoded = Vec::new();
        builder.write(&mut encoded)?;
        self.offset += encoded.len() as u64;
        self.out.write_all(&encoded)?;
        Ok(())
    }

    fn finish(mut self, dir: &Path, name: &str) -> Result<()> {
        self.out.flush()?;
        let paths = layout::score_paths(dir, name);
        CompactTableBuilder::offsets().write(&self.offsets, &paths.offsets)?;
        CompactTableBuilder::plain().write(&self.max_scores, &paths.max_scores)?;
        Ok(())
    }
}

/// Running statistics of one term's scores within one shard.
#[derive(Clone, Copy, Default)]
struct RunningStats {
    count: u64,
    sum: f64,
    sum_sq: f64,
    max: f64,
}

impl RunningStats {
    fn push(&mut self, score: f64) {
        self.count += 1;
        self.sum += score;
        self.sum_sq += score * score;
        self.max = if self.count == 1 {
            score
        } else {
            self.max.max(score)
        };
    }
}

/// The streaming pass over terms: distributes document, frequency and
/// score lists into per-shard builders and accumulates per-shard score
/// statistics. Peak memory is one term's postings per shard.
fn write_shard_postings(
    view: &IndexView,
    staging_dir: &Path,
    shard_map: &[ShardId],
    local_ids: &[u32],
    shard_count: usize,
    config: &PartitionConfig,
) -> Result<()> {
    let skip_block_size = view.skip_block_size() as usize;
    let term_count = view.term_count();

    let mut posting_writers = Vec::with_capacity(shard_count);
    let mut score_writers: Vec<Vec<ScoreLayerWriter>> = Vec::with_capacity(shard_count);
    for shard in 0..shard_count {
        let shard_dir = layout::shard_path(staging_dir, shard);
        posting_writers.push(PostingFilesWriter::create(&shard_dir, skip_block_size)?);
        let mut layer_writers = Vec::with_capacity(config.scored_layers.len());
        for name in &config.scored_layers {
            layer_writers.push(ScoreLayerWriter::create(&shard_dir, name)?);
        }
        score_writers.push(layer_writers);
    }
    // stats[scorer][shard][term] built up term by term.
    let mut stats: Vec<Vec<Vec<RunningStats>>> = config
        .stat_scorers
        .iter()
        .map(|_| vec![vec![RunningStats::default(); term_count]; shard_count])
        .collect();

    let mut shard_postings: Vec<Vec<(u32, u32)>> = vec![Vec::new(); shard_count];
    let mut shard_occurrences = vec![0u64; shard_count];
    let mut shard_scores: Vec<Vec<Vec<u32>>> =
        vec![vec![Vec::new(); config.scored_layers.len()]; shard_count];

    for index in 0..term_count {
        let term_id = TermId(index as u32);
        let term = view.term(term_id)?;
        for postings in &mut shard_postings {
            postings.clear();
        }
        shard_occurrences.fill(0);
        for scores in &mut shard_scores {
            for layer in scores.iter_mut() {
                layer.clear();
            }
        }

        // Documents and frequencies, remapped to shard-local IDs.
        let postings = view.postings(term_id)?;
        let mut cursor = postings.cursor();
        while !cursor.is_end() {
            let posting = cursor.get()?;
            let shard = shard_map[posting.document.0 as usize].0 as usize;
            let local = local_ids[posting.document.0 as usize];
            shard_postings[shard].push((local, posting.payload));
            shard_occurrences[shard] += u64::from(posting.payload);
            cursor.next();
        }

        // Quantized layers follow their documents.
        for (layer, name) in config.scored_layers.iter().enumerate() {
            let scored = view.scored_postings(term_id, name)?;
            let mut cursor = scored.postings.cursor();
            while !cursor.is_end() {
                let posting = cursor.get()?;
                let shard = shard_map[posting.document.0 as usize].0 as usize;
                shard_scores[shard][layer].push(posting.payload);
                cursor.next();
            }
        }

        // Global-scorer statistics per shard.
        for (scorer_index, tag) in config.stat_scorers.iter().enumerate() {
            let scorer = view.term_scorer(term_id, *tag)?;
            let postings = view.postings(term_id)?;
            let mut cursor = postings.cursor();
            while !cursor.is_end() {
                let posting = cursor.get()?;
                let shard = shard_map[posting.document.0 as usize].0 as usize;
                let size = view.document_size(posting.document)?;
                stats[scorer_index][shard][index]
                    .push(f64::from(scorer.score(posting.payload, size)));
                cursor.next();
            }
        }

        for shard in 0..shard_count {
            posting_writers[shard].push(
                &term,
                &shard_postings[shard],
                shard_occurrences[shard],
            )?;
            for (layer, writer) in score_writers[shard].iter_mut().enumerate() {
                writer.push(&shard_scores[shard][layer], skip_block_size)?;
            }
        }
    }

    for (shard, writer) in posting_writers.into_iter().enumerate() {
        writer.finish()?;
        let shard_dir = layout::shard_path(staging_dir, shard);
        for (layer, writer) in score_writers.remove(0).into_iter().enumerate() {
            writer.finish(&shard_dir, &config.scored_layers[layer])?;
        }
        // The per-shard term map equals the global one.
        fs::copy(
            layout::term_map_path(view.dir()),
            layout::term_map_path(&shard_dir),
        )?;
        for (scorer_index, tag) in config.stat_scorers.iter().enumerate() {
            let paths = layout::stat_paths(&shard_dir, tag.name());
            let shard_stats = &stats[scorer_index][shard];
            let max: Vec<f32> = shard_stats
                .iter()
                .map(|s| if s.count > 0 { s.max as f32 } else { 0.0 })
                .collect();
            let mean: Vec<f32> = shard_stats
                .iter()
                .map(|s| {
                    if s.count > 0 {
                        (s.sum / s.count as f64) as f32
                    } else {
                        0.0
                    }
                })
                .collect();
            let var: Vec<f32> = shard_stats
                .iter()
                .map(|s| {
                    if s.count > 0 {
                        let m = s.sum / s.count as f64;
                        ((s.sum_sq / s.count as f64 - m * m).max(0.0)) as f32
                    } else {
                        0.0
                    }
                })
                .collect();
            write_float_table(&max, &paths.max)?;
            write_float_table(&mean, &paths.mean)?;
            write_float_table(&var, &paths.var)?;
        }
    }
    Ok(())
}
