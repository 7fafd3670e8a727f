use std::path::{Path, PathBuf};

/// File names within an index directory.
pub fn properties_path(dir: &Path) -> PathBuf {
    dir.join("properties.json")
}

pub fn doc_ids_path(dir: &Path) -> PathBuf {
    dir.join("doc.id")
}

pub fn doc_ids_off_path(dir: &Path) -> PathBuf {
    dir.join("doc.idoff")
}

pub fn doc_counts_path(dir: &Path) -> PathBuf {
    dir.join("doc.count")
}

pub fn doc_counts_off_path(dir: &Path) -> PathBuf {
    dir.join("doc.countoff")
}

pub fn doc_sizes_path(dir: &Path) -> PathBuf {
    dir.join("doc.sizes")
}

pub fn terms_path(dir: &Path) -> PathBuf {
    dir.join("terms.txt")
}

pub fn term_map_path(dir: &Path) -> PathBuf {
    dir.join("terms.map")
}

pub fn term_doc_freq_path(dir: &Path) -> PathBuf {
    dir.join("terms.docfreq")
}

pub fn term_occurrences_path(dir: &Path) -> PathBuf {
    dir.join("terms.occurrences")
}

pub fn titles_path(dir: &Path) -> PathBuf {
    dir.join("titles.txt")
}

pub fn title_map_path(dir: &Path) -> PathBuf {
    dir.join("titles.map")
}

pub fn reverse_map_path(dir: &Path) -> PathBuf {
    dir.join("reverse.map")
}

/// Paths of one quantized score layer (e.g. `bm25-8`).
pub struct ScorePaths {
    pub scores: PathBuf,
    pub offsets: PathBuf,
    pub max_scores: PathBuf,
}

pub fn score_paths(dir: &Path, name: &str) -> ScorePaths {
    ScorePaths {
        scores: dir.join(format!("{}.scores", name)),
        offsets: dir.join(format!("{}.offsets", name)),
        max_scores: dir.join(format!("{}.maxscore", name)),
    }
}

/// Paths of the per-term score statistics of a scorer (e.g. `bm25`).
pub struct StatPaths {
    pub max: PathBuf,
    pub mean: PathBuf,
    pub var: PathBuf,
}

pub fn stat_paths(dir: &Path, name: &str) -> StatPaths {
    StatPaths {
        max: dir.join(format!("{}.max", name)),
        mean: dir.join(format!("{}.mean", name)),
        var: dir.join(format!("{}.var", name)),
    }
}

/// Shard subdirectory within a cluster: `000`, `001`, ...
pub fn shard_path(dir: &Path, shard: usize) -> PathBuf {
    dir.join(format!("{:03}", shard))
}
