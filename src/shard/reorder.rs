use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::core::error::Result;
use crate::core::properties::Properties;
use crate::core::types::{DocId, TermId};
use crate::index::builder::PostingFilesWriter;
use crate::index::compact_table::CompactTableBuilder;
use crate::index::layout;
use crate::index::lexicon::write_lexicon;
use crate::index::source::IndexSource;
use crate::index::view::IndexView;

/// Emits a new index whose document IDs follow the order of
/// `title_order`.
///
/// Documents absent from the sequence are dropped; titles unknown to the
/// index are ignored. The identity permutation of a deterministic build
/// reproduces the input byte for byte.
pub fn reorder(input: &Path, output: &Path, title_order: &[String]) -> Result<()> {
    let source = IndexSource::open(input, &[])?;
    let view = IndexView::open(&source)?;

    // perm[new_id] = old_id over the titles actually present.
    let mut perm = Vec::new();
    let mut titles = Vec::new();
    for title in title_order {
        if let Some(old) = view.titles().index_at(title) {
            perm.push(old);
            titles.push(title.as_str());
        }
    }
    info!(
        kept = perm.len(),
        dropped = view.collection_size() as usize - perm.len(),
        "reordering index"
    );

    // Inverse map: old document to new, None for dropped documents.
    let mut inverse: Vec<Option<u32>> = vec![None; view.collection_size() as usize];
    for (new, &old) in perm.iter().enumerate() {
        inverse[old as usize] = Some(new as u32);
    }

    let staging = tempfile::Builder::new()
        .prefix(".kestrix-reorder-")
        .tempdir_in(output.parent().unwrap_or_else(|| Path::new(".")))?;
    let dir = staging.path();

    let skip_block_size = view.skip_block_size() as usize;
    let mut writer = PostingFilesWriter::create(dir, skip_block_size)?;
    let mut remapped = Vec::new();
    for index in 0..view.term_count() {
        let term_id = TermId(index as u32);
        remapped.clear();
        let mut occurrences = 0u64;
        let postings = view.postings(term_id)?;
        let mut cursor = postings.cursor();
        while !cursor.is_end() {
            let posting = cursor.get()?;
            if let Some(new) = inverse[posting.document.0 as usize] {
                remapped.push((new, posting.payload));
                occurrences += u64::from(posting.payload);
            }
            cursor.next();
        }
        // Payloads follow their documents into the new order.
        remapped.sort_by_key(|&(document, _)| document);
        writer.push(&view.term(term_id)?, &remapped, occurrences)?;
    }
    writer.finish()?;

    let mut titles_out = fs::File::create(layout::titles_path(dir))?;
    for title in &titles {
        writeln!(titles_out, "{}", title)?;
    }
    write_lexicon(
        titles.iter().copied(),
        view.titles().keys_per_block(),
        &layout::title_map_path(dir),
    )?;
    write_lexicon(
        (0..view.term_count())
            .map(|index| view.term(TermId(index as u32)))
            .collect::<Result<Vec<_>>>()?
            .iter()
            .map(String::as_str),
        view.terms().keys_per_block(),
        &layout::term_map_path(dir),
    )?;

    let mut sizes = Vec::with_capacity(perm.len());
    for &old in &perm {
        sizes.push(u64::from(view.document_size(DocId(old))?));
    }
    CompactTableBuilder::plain().write(&sizes, &layout::doc_sizes_path(dir))?;

    let occurrences_count: u64 = sizes.iter().sum();
    let properties = Properties {
        document_count: perm.len() as u32,
        occurrences_count,
        skip_block_size: skip_block_size as u32,
        avg_document_size: if perm.is_empty() {
            0.0
        } else {
            occurrences_count as f64 / perm.len() as f64
        },
        max_document_size: sizes.iter().copied().max().unwrap_or(0) as u32,
        shard_count: None,
    };
    properties.save(&layout::properties_path(dir))?;

    if output.exists() {
        fs::remove_dir_all(output)?;
    }
    let staged = staging.keep();
    fs::rename(&staged, output)?;
    Ok(())
}
