use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Contents of `properties.json` at the root of an index directory.
///
/// `shard_count` is present (and positive) only for cluster directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Properties {
    pub document_count: u32,
    pub occurrences_count: u64,
    pub skip_block_size: u32,
    pub avg_document_size: f64,
    pub max_document_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<u32>,
}

impl Properties {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing_file(path));
        }
        let file = File::open(path)?;
        let properties = serde_json::from_reader(BufReader::new(file))?;
        Ok(properties)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn is_cluster(&self) -> bool {
        self.shard_count.map_or(false, |count| count > 0)
    }
}
