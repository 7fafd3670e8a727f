use std::path::Path;

use tracing::info;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::TermId;
use crate::index::block_list::BlockListBuilder;
use crate::index::compact_table::{CompactTableBuilder, write_float_table};
use crate::index::layout;
use crate::index::source::IndexSource;
use crate::index::view::IndexView;
use crate::scoring::scorer::ScoreTag;

/// Bit widths accepted for quantized score layers.
const SUPPORTED_BITS: [u32; 4] = [8, 16, 24, 32];

/// Exact scores of one term's posting list, in posting order.
fn term_scores(view: &IndexView, term_id: TermId, tag: ScoreTag) -> Result<Vec<f32>> {
    let scorer = view.term_scorer(term_id, tag)?;
    let postings = view.postings(term_id)?;
    let mut scores = Vec::with_capacity(postings.len());
    let mut cursor = postings.cursor();
    while !cursor.is_end() {
        let posting = cursor.get()?;
        let size = view.document_size(posting.document)?;
        scores.push(scorer.score(posting.payload, size));
        cursor.next();
    }
    Ok(scores)
}

/// Offline scoring pass: computes every posting's score under `tag`,
/// quantizes to `bits` bits against the global maximum, and writes the
/// `<tag>-<bits>.scores`, `.offsets` and `.maxscore` files next to the
/// raw postings. The original files are untouched.
pub fn score_index(dir: &Path, tag: ScoreTag, bits: u32) -> Result<String> {
    if !SUPPORTED_BITS.contains(&bits) {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("unsupported quantization width: {} bits", bits),
        ));
    }
    let source = IndexSource::open(dir, &[])?;
    let view = IndexView::open(&source)?;
    let name = format!("{}-{}", tag, bits);
    info!(scorer = %name, terms = view.term_count(), "quantizing scores");

    // First pass: global maximum across all postings.
    let mut global_max = 0.0f64;
    for index in 0..view.term_count() {
        for score in term_scores(&view, TermId(index as u32), tag)? {
            global_max = global_max.max(f64::from(score));
        }
    }

    let levels = (1u64 << bits) - 1;
    let scale = if global_max > 0.0 {
        levels as f64 / global_max
    } else {
        0.0
    };

    // Second pass: quantize and emit block lists per term.
    let block_size = view.skip_block_size() as usize;
    let mut score_data = Vec::new();
    let mut offsets = Vec::with_capacity(view.term_count());
    let mut max_scores = Vec::with_capacity(view.term_count());

    for index in 0..view.term_count() {
        let mut builder = BlockListBuilder::payloads(block_size);
        let mut term_max = 0u64;
        for score in term_scores(&view, TermId(index as u32), tag)? {
            // Negative scores clamp to zero before the linear map.
            let clamped = f64::from(score).max(0.0);
            let quantized = (clamped * scale).floor() as u64;
            term_max = term_max.max(quantized);
            builder.add(quantized as u32);
        }
        offsets.push(score_data.len() as u64);
        builder.write(&mut score_data)?;
        max_scores.push(term_max);
    }

    let paths = layout::score_paths(dir, &name);
    std::fs::write(&paths.scores, &score_data)?;
    CompactTableBuilder::offsets().write(&offsets, &paths.offsets)?;
    CompactTableBuilder::plain().write(&max_scores, &paths.max_scores)?;
    Ok(name)
}

/// Offline statistics pass: per-term max, mean and variance of the exact
/// floating-point scores, written as float tables named after the scorer
/// (`bm25.max`, `bm25.mean`, `bm25.var`).
pub fn score_stats(dir: &Path, tag: ScoreTag) -> Result<()> {
    let source = IndexSource::open(dir, &[])?;
    let view = IndexView::open(&source)?;
    info!(scorer = %tag, terms = view.term_count(), "computing score statistics");

    let mut max = vec![0.0f32; view.term_count()];
    let mut mean = vec![0.0f32; view.term_count()];
    let mut var = vec![0.0f32; view.term_count()];

    for index in 0..view.term_count() {
        let scores = term_scores(&view, TermId(index as u32), tag)?;
        if scores.is_empty() {
            continue;
        }
        let count = scores.len() as f64;
        let sum: f64 = scores.iter().map(|&s| f64::from(s)).sum();
        let sum_sq: f64 = scores.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        let m = sum / count;
        max[index] = scores.iter().cloned().fold(f32::MIN, f32::max);
        mean[index] = m as f32;
        var[index] = (sum_sq / count - m * m).max(0.0) as f32;
    }

    let paths = layout::stat_paths(dir, tag.name());
    write_float_table(&max, &paths.max)?;
    write_float_table(&mean, &paths.mean)?;
    write_float_table(&var, &paths.var)?;
    Ok(())
}
