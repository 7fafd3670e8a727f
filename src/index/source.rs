use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::core::error::{Error, Result};
use crate::core::properties::Properties;
use crate::index::layout;

/// Read-only memory-mapped file.
#[derive(Debug)]
pub struct MmapFile {
    /// `None` for empty files, which cannot be mapped.
    mmap: Option<Mmap>,
}

impl MmapFile {
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing_file(path));
        }
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        let mmap = if len == 0 {
            None
        } else {
            Some(unsafe { MmapOptions::new().len(len).map(&file)? })
        };
        Ok(MmapFile { mmap })
    }

    pub fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

/// Mappings of one quantized score layer.
#[derive(Debug)]
pub struct ScoredLayerSource {
    pub name: String,
    pub scores: MmapFile,
    pub offsets: MmapFile,
    pub max_scores: MmapFile,
}

/// Float tables of per-term max/mean/variance for one scorer.
#[derive(Debug)]
pub struct StatSource {
    pub name: String,
    pub max: MmapFile,
    pub mean: MmapFile,
    pub var: MmapFile,
}

/// Owns the memory mappings of one inverted index.
///
/// The source is immutable after construction; index views borrow byte
/// ranges from it and must not outlive it.
#[derive(Debug)]
pub struct IndexSource {
    pub dir: PathBuf,
    pub properties: Properties,
    pub documents: MmapFile,
    pub counts: MmapFile,
    pub document_offsets: MmapFile,
    pub count_offsets: MmapFile,
    pub document_frequencies: MmapFile,
    pub term_occurrences: MmapFile,
    pub term_map: MmapFile,
    pub title_map: MmapFile,
    pub document_sizes: MmapFile,
    pub scored_layers: Vec<ScoredLayerSource>,
    pub stats: Vec<StatSource>,
}

impl IndexSource {
    /// Opens an index directory, mapping the quantized layers named in
    /// `scored` in addition to the raw postings.
    pub fn open(dir: &Path, scored: &[&str]) -> Result<Self> {
        let properties = Properties::load(&layout::properties_path(dir))?;

        let mut scored_layers = Vec::with_capacity(scored.len());
        for name in scored {
            let paths = layout::score_paths(dir, name);
            scored_layers.push(ScoredLayerSource {
                name: name.to_string(),
                scores: MmapFile::open_read_only(&paths.scores)?,
                offsets: MmapFile::open_read_only(&paths.offsets)?,
                max_scores: MmapFile::open_read_only(&paths.max_scores)?,
            });
        }

        // Statistics may also exist for scorers without a quantized layer.
        let mut stats = Vec::new();
        for tag in ["bm25", "ql"] {
            if let Some(source) = Self::open_stats(dir, tag)? {
                stats.push(source);
            }
        }

        Ok(IndexSource {
            dir: dir.to_path_buf(),
            properties,
            documents: MmapFile::open_read_only(&layout::doc_ids_path(dir))?,
            counts: MmapFile::open_read_only(&layout::doc_counts_path(dir))?,
            document_offsets: MmapFile::open_read_only(&layout::doc_ids_off_path(dir))?,
            count_offsets: MmapFile::open_read_only(&layout::doc_counts_off_path(dir))?,
            document_frequencies: MmapFile::open_read_only(&layout::term_doc_freq_path(dir))?,
            term_occurrences: MmapFile::open_read_only(&layout::term_occurrences_path(dir))?,
            term_map: MmapFile::open_read_only(&layout::term_map_path(dir))?,
            title_map: MmapFile::open_read_only(&layout::title_map_path(dir))?,
            document_sizes: MmapFile::open_read_only(&layout::doc_sizes_path(dir))?,
            scored_layers,
            stats,
        })
    }

    fn open_stats(dir: &Path, name: &str) -> Result<Option<StatSource>> {
        let paths = layout::stat_paths(dir, name);
        if !paths.mean.exists() {
            return Ok(None);
        }
        Ok(Some(StatSource {
            name: name.to_string(),
            max: MmapFile::open_read_only(&paths.max)?,
            mean: MmapFile::open_read_only(&paths.mean)?,
            var: MmapFile::open_read_only(&paths.var)?,
        }))
    }
}
