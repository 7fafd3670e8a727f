use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::cmp::Reverse;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::properties::Properties;
use crate::core::types::DocId;
use crate::index::block_list::{BlockListBuilder, DocumentListView, PayloadListView};
use crate::index::compact_table::{CompactTable, CompactTableBuilder};
use crate::index::layout;
use crate::index::lexicon::write_lexicon;

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Postings per block in document and payload lists.
    pub skip_block_size: usize,
    /// Keys per block in the term and title lexicons.
    pub keys_per_block: u32,
    /// Rough in-memory posting budget in bytes; exceeding it flushes a
    /// partial index that is merged back at write time.
    pub memory_budget: Option<usize>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            skip_block_size: 64,
            keys_per_block: 16,
            memory_budget: None,
        }
    }
}

/// Accumulates postings from a tokenized document stream and writes the
/// full on-disk index layout.
///
/// Phase 1 accumulates in memory while documents are added; phase 2
/// (`write`) sorts terms and emits every file. Writing is all-or-nothing:
/// files land in a temporary directory that is renamed over the target on
/// success.
pub struct IndexBuilder {
    config: BuilderConfig,
    current: Option<u32>,
    titles: Vec<String>,
    sizes: Vec<u32>,
    term_map: HashMap<String, usize>,
    postings: Vec<Vec<(u32, u32)>>,
    occurrences: Vec<u64>,
    posting_bytes: usize,
    scratch: Option<TempDir>,
    partials: Vec<PartialHandle>,
    run_base: u32,
}

struct PartialHandle {
    dir: PathBuf,
    doc_base: u32,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    pub fn with_config(config: BuilderConfig) -> Self {
        IndexBuilder {
            config,
            current: None,
            titles: Vec::new(),
            sizes: Vec::new(),
            term_map: HashMap::new(),
            postings: Vec::new(),
            occurrences: Vec::new(),
            posting_bytes: 0,
            scratch: None,
            partials: Vec::new(),
            run_base: 0,
        }
    }

    pub fn document_count(&self) -> usize {
        self.titles.len()
    }

    /// Starts the next document; returns its ID.
    pub fn add_document(&mut self, title: &str) -> Result<DocId> {
        if let Some(budget) = self.config.memory_budget {
            if self.posting_bytes > budget {
                self.flush_partial()?;
            }
        }
        let id = self.titles.len() as u32;
        self.current = Some(id);
        self.titles.push(title.to_string());
        self.sizes.push(0);
        Ok(DocId(id))
    }

    /// Adds one term occurrence to the current document.
    pub fn add_term(&mut self, term: &str) -> Result<()> {
        let document = self.current.ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                "add_term called before add_document".to_string(),
            )
        })?;
        let local = document - self.run_base;
        self.sizes[document as usize] += 1;
        if let Some(&term_id) = self.term_map.get(term) {
            let list = &mut self.postings[term_id];
            match list.last_mut() {
                Some(last) if last.0 == local => last.1 += 1,
                _ => {
                    list.push((local, 1));
                    self.posting_bytes += 8;
                }
            }
            self.occurrences[term_id] += 1;
        } else {
            let term_id = self.term_map.len();
            self.term_map.insert(term.to_string(), term_id);
            self.postings.push(vec![(local, 1)]);
            self.occurrences.push(1);
            self.posting_bytes += 8 + term.len();
        }
        Ok(())
    }

    /// Reads a collection in the `title token token ...` line format.
    pub fn assemble<R: std::io::BufRead>(&mut self, input: R) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            let Some(title) = tokens.next() else {
                continue;
            };
            self.add_document(title)?;
            for token in tokens {
                self.add_term(token)?;
            }
        }
        Ok(())
    }

    /// Sorted term strings with their in-memory IDs.
    fn sorted_terms(&self) -> Vec<(String, usize)> {
        let mut terms: Vec<(String, usize)> = self
            .term_map
            .iter()
            .map(|(term, &id)| (term.clone(), id))
            .collect();
        terms.sort_by(|a, b| a.0.cmp(&b.0));
        terms
    }

    /// Writes the current in-memory run as a partial index and clears it.
    fn flush_partial(&mut self) -> Result<()> {
        if self.term_map.is_empty() {
            return Ok(());
        }
        if self.scratch.is_none() {
            self.scratch = Some(TempDir::new()?);
        }
        let scratch = self.scratch.as_ref().expect("scratch created above");
        let dir = scratch.path().join(format!("partial-{:05}", self.partials.len()));
        fs::create_dir(&dir)?;

        debug!(
            partial = self.partials.len(),
            terms = self.term_map.len(),
            "flushing partial index"
        );
        let terms = self.sorted_terms();
        let mut writer = PostingFilesWriter::create(&dir, self.config.skip_block_size)?;
        for (term, id) in &terms {
            writer.push(term, &self.postings[*id], self.occurrences[*id])?;
        }
        writer.finish()?;

        self.partials.push(PartialHandle {
            dir,
            doc_base: self.run_base,
        });
        self.term_map.clear();
        self.postings.clear();
        self.occurrences.clear();
        self.posting_bytes = 0;
        self.run_base = self.titles.len() as u32;
        Ok(())
    }

    /// Sorts terms and writes the complete index into `target`.
    pub fn write(mut self, target: &Path) -> Result<()> {
        info!(
            documents = self.titles.len(),
            terms = self.term_map.len(),
            partials = self.partials.len(),
            "writing index to {}",
            target.display()
        );
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".kestrix-build-")
            .tempdir_in(parent)?;

        self.write_into(staging.path())?;

        if target.exists() {
            fs::remove_dir_all(target)?;
        }
        let staged = staging.keep();
        fs::rename(&staged, target)?;
        Ok(())
    }

    fn write_into(&mut self, dir: &Path) -> Result<()> {
        if self.partials.is_empty() {
            let terms = self.sorted_terms();
            let mut writer = PostingFilesWriter::create(dir, self.config.skip_block_size)?;
            for (term, id) in &terms {
                writer.push(term, &self.postings[*id], self.occurrences[*id])?;
            }
            writer.finish()?;
        } else {
            // Flush the tail run and merge everything alphabetically.
            self.flush_partial()?;
            let readers = self
                .partials
                .iter()
                .map(|partial| PartialReader::open(&partial.dir, partial.doc_base))
                .collect::<Result<Vec<_>>>()?;
            merge_partials(dir, self.config.skip_block_size, readers)?;
        }

        // Lexicons and per-document tables come from phase 1.
        let mut titles_out = fs::File::create(layout::titles_path(dir))?;
        for title in &self.titles {
            writeln!(titles_out, "{}", title)?;
        }
        titles_out.sync_all()?;
        let mut sorted_titles: Vec<&str> = self.titles.iter().map(String::as_str).collect();
        sorted_titles.sort_unstable();
        if sorted_titles.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "document titles must be unique".to_string(),
            ));
        }
        // Title lexicon keyed by arrival order: title i maps to document
        // ID i regardless of how the titles sort.
        write_lexicon(
            self.titles.iter().map(String::as_str),
            self.config.keys_per_block,
            &layout::title_map_path(dir),
        )?;

        let sizes: Vec<u64> = self.sizes.iter().map(|&size| u64::from(size)).collect();
        CompactTableBuilder::plain().write(&sizes, &layout::doc_sizes_path(dir))?;

        let occurrences_count: u64 = sizes.iter().sum();
        let properties = Properties {
            document_count: self.titles.len() as u32,
            occurrences_count,
            skip_block_size: self.config.skip_block_size as u32,
            avg_document_size: if self.sizes.is_empty() {
                0.0
            } else {
                occurrences_count as f64 / self.sizes.len() as f64
            },
            max_document_size: self.sizes.iter().copied().max().unwrap_or(0),
            shard_count: None,
        };
        properties.save(&layout::properties_path(dir))?;

        // Term lexicon over the final sorted terms file.
        let terms_text = fs::read_to_string(layout::terms_path(dir))?;
        write_lexicon(
            terms_text.lines(),
            self.config.keys_per_block,
            &layout::term_map_path(dir),
        )?;
        Ok(())
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streams `terms.txt`, the block-encoded posting files, their offset
/// tables, and the document frequency and occurrence tables, one sorted
/// term at a time.
pub(crate) struct PostingFilesWriter {
    dir: PathBuf,
    skip_block_size: usize,
    terms_out: std::io::BufWriter<fs::File>,
    doc_out: std::io::BufWriter<fs::File>,
    count_out: std::io::BufWriter<fs::File>,
    doc_offset: u64,
    count_offset: u64,
    doc_offsets: Vec<u64>,
    count_offsets: Vec<u64>,
    frequencies: Vec<u64>,
    occurrences: Vec<u64>,
}

impl PostingFilesWriter {
    pub(crate) fn create(dir: &Path, skip_block_size: usize) -> Result<Self> {
        Ok(PostingFilesWriter {
            dir: dir.to_path_buf(),
            skip_block_size,
            terms_out: std::io::BufWriter::new(fs::File::create(layout::terms_path(dir))?),
            doc_out: std::io::BufWriter::new(fs::File::create(layout::doc_ids_path(dir))?),
            count_out: std::io::BufWriter::new(fs::File::create(layout::doc_counts_path(dir))?),
            doc_offset: 0,
            count_offset: 0,
            doc_offsets: Vec::new(),
            count_offsets: Vec::new(),
            frequencies: Vec::new(),
            occurrences: Vec::new(),
        })
    }

    /// Terms must arrive in sorted order, each with its full posting list.
    pub(crate) fn push(
        &mut self,
        term: &str,
        postings: &[(u32, u32)],
        occurrences: u64,
    ) -> Result<()> {
        writeln!(self.terms_out, "{}", term)?;
        self.doc_offsets.push(self.doc_offset);
        self.count_offsets.push(self.count_offset);

        let mut documents = BlockListBuilder::documents(self.skip_block_size);
        let mut counts = BlockListBuilder::payloads(self.skip_block_size);
        for &(document, frequency) in postings {
            documents.add(document);
            counts.add(frequency);
        }
        let mut encoded = Vec::new();
        self.doc_offset += documents.write(&mut encoded)? as u64;
        self.doc_out.write_all(&encoded)?;
        encoded.clear();
        self.count_offset += counts.write(&mut encoded)? as u64;
        self.count_out.write_all(&encoded)?;

        self.frequencies.push(postings.len() as u64);
        self.occurrences.push(occurrences);
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<()> {
        self.terms_out.flush()?;
        self.doc_out.flush()?;
        self.count_out.flush()?;
        let dir = self.dir;
        CompactTableBuilder::offsets().write(&self.doc_offsets, &layout::doc_ids_off_path(&dir))?;
        CompactTableBuilder::offsets()
            .write(&self.count_offsets, &layout::doc_counts_off_path(&dir))?;
        CompactTableBuilder::plain()
            .write(&self.frequencies, &layout::term_doc_freq_path(&dir))?;
        CompactTableBuilder::plain()
            .write(&self.occurrences, &layout::term_occurrences_path(&dir))?;
        Ok(())
    }
}

/// Reads one flushed partial index term by term, in sorted term order.
struct PartialReader {
    doc_base: u32,
    terms: Vec<String>,
    doc_data: Vec<u8>,
    count_data: Vec<u8>,
    doc_offsets: CompactTable<Vec<u8>>,
    count_offsets: CompactTable<Vec<u8>>,
    frequencies: CompactTable<Vec<u8>>,
    occurrences: CompactTable<Vec<u8>>,
    next: usize,
}

impl PartialReader {
    fn open(dir: &Path, doc_base: u32) -> Result<Self> {
        let terms = fs::read_to_string(layout::terms_path(dir))?
            .lines()
            .map(str::to_string)
            .collect();
        Ok(PartialReader {
            doc_base,
            terms,
            doc_data: fs::read(layout::doc_ids_path(dir))?,
            count_data: fs::read(layout::doc_counts_path(dir))?,
            doc_offsets: CompactTable::load(&layout::doc_ids_off_path(dir))?,
            count_offsets: CompactTable::load(&layout::doc_counts_off_path(dir))?,
            frequencies: CompactTable::load(&layout::term_doc_freq_path(dir))?,
            occurrences: CompactTable::load(&layout::term_occurrences_path(dir))?,
            next: 0,
        })
    }

    fn current_term(&self) -> Option<&str> {
        self.terms.get(self.next).map(String::as_str)
    }

    fn range<'d>(
        &self,
        data: &'d [u8],
        offsets: &CompactTable<Vec<u8>>,
        index: usize,
    ) -> Result<&'d [u8]> {
        let start = offsets.get(index)? as usize;
        let end = if index + 1 < offsets.len() {
            offsets.get(index + 1)? as usize
        } else {
            data.len()
        };
        Ok(&data[start..end])
    }

    /// Postings of the current term with document IDs rebased to global
    /// space; advances to the next term.
    fn take_postings(&mut self) -> Result<(Vec<(u32, u32)>, u64)> {
        let index = self.next;
        let length = self.frequencies.get(index)? as usize;
        let documents = DocumentListView::parse(
            self.range(&self.doc_data, &self.doc_offsets, index)?,
            length,
        )?;
        let counts = PayloadListView::parse(
            self.range(&self.count_data, &self.count_offsets, index)?,
            length,
        )?;

        let mut postings = Vec::with_capacity(length);
        let mut doc_cursor = documents.iter();
        let mut count_cursor = counts.iter();
        while !doc_cursor.is_end() {
            let document = doc_cursor.get()? + self.doc_base;
            count_cursor.align(&doc_cursor);
            postings.push((document, count_cursor.get()?));
            doc_cursor.next();
        }
        let occurrences = self.occurrences.get(index)?;
        self.next += 1;
        Ok((postings, occurrences))
    }
}

/// K-way merge of partial indexes, walking terms alphabetically.
///
/// Document ranges of different partials are disjoint by construction,
/// so per-term lists concatenate in partial order; document and
/// collection frequencies sum.
fn merge_partials(
    dir: &Path,
    skip_block_size: usize,
    mut readers: Vec<PartialReader>,
) -> Result<()> {
    let mut heap = BinaryHeap::new();
    for (index, reader) in readers.iter().enumerate() {
        if let Some(term) = reader.current_term() {
            heap.push(Reverse((term.to_string(), index)));
        }
    }

    let mut writer = PostingFilesWriter::create(dir, skip_block_size)?;
    while let Some(Reverse((term, first))) = heap.pop() {
        let mut sources = vec![first];
        while let Some(Reverse((other, index))) = heap.peek() {
            if *other == term {
                sources.push(*index);
                heap.pop();
            } else {
                break;
            }
        }
        // Partials were flushed in document order, so sorting sources by
        // doc_base keeps the concatenated list strictly ascending.
        sources.sort_by_key(|&index| readers[index].doc_base);

        let mut postings = Vec::new();
        let mut occurrences = 0u64;
        for index in sources {
            let (mut part, occ) = readers[index].take_postings()?;
            postings.append(&mut part);
            occurrences += occ;
            if let Some(next_term) = readers[index].current_term() {
                heap.push(Reverse((next_term.to_string(), index)));
            }
        }
        writer.push(&term, &postings, occurrences)?;
    }
    writer.finish()
}
