use std::fs;
use std::path::Path;

use fst::Map;

use crate::compression::vbyte::VByte;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::compact_table::{CompactTable, CompactTableBuilder};

const HEADER_SIZE: usize = 32;

/// Bidirectional map between string keys and dense integer IDs.
///
/// IDs are assigned by the caller in arrival order (for titles, the
/// document ID), so the keys themselves need not arrive sorted. Keys are
/// stored in lexicographic order in prefix-compressed blocks of
/// `keys_per_block` keys; an FST over the sorted keys resolves
/// string → ID, and a rank table (ID → lexicographic rank) locates the
/// block holding a given ID's key. When keys do arrive sorted, ID and
/// rank coincide and the map is monotone, as for the term lexicon.
///
/// Layout:
/// `{u32 key_count, u32 keys_per_block, u64 fst_size, u64 offsets_size,
/// u64 ranks_size}`, then the FST bytes, the block offsets compact
/// table, the rank compact table, and the string blocks.
pub struct Lexicon<'a> {
    key_count: u32,
    keys_per_block: u32,
    fst: Map<&'a [u8]>,
    offsets: CompactTable<&'a [u8]>,
    ranks: CompactTable<&'a [u8]>,
    blocks: &'a [u8],
}

impl<'a> Lexicon<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption("lexicon shorter than its header"));
        }
        let key_count = u32::from_le_bytes(data[0..4].try_into().expect("bounds checked"));
        let keys_per_block = u32::from_le_bytes(data[4..8].try_into().expect("bounds checked"));
        let fst_size =
            u64::from_le_bytes(data[8..16].try_into().expect("bounds checked")) as usize;
        let offsets_size =
            u64::from_le_bytes(data[16..24].try_into().expect("bounds checked")) as usize;
        let ranks_size =
            u64::from_le_bytes(data[24..32].try_into().expect("bounds checked")) as usize;
        if keys_per_block == 0 {
            return Err(Error::corruption("lexicon with keys_per_block 0"));
        }
        let offsets_start = HEADER_SIZE + fst_size;
        let ranks_start = offsets_start + offsets_size;
        let blocks_start = ranks_start + ranks_size;
        if blocks_start > data.len() {
            return Err(Error::corruption(format!(
                "lexicon sections exceed the buffer: {} > {}",
                blocks_start,
                data.len()
            )));
        }
        let fst = Map::new(&data[HEADER_SIZE..offsets_start])?;
        let offsets = CompactTable::new(&data[offsets_start..ranks_start])?;
        let ranks = CompactTable::new(&data[ranks_start..blocks_start])?;
        Ok(Lexicon {
            key_count,
            keys_per_block,
            fst,
            offsets,
            ranks,
            blocks: &data[blocks_start..],
        })
    }

    pub fn len(&self) -> usize {
        self.key_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    pub fn keys_per_block(&self) -> u32 {
        self.keys_per_block
    }

    /// Looks up the ID of `key`, or `None` if absent.
    pub fn index_at(&self, key: &str) -> Option<u32> {
        self.fst.get(key).map(|id| id as u32)
    }

    /// Returns the key with ID `id`.
    pub fn key_at(&self, id: u32) -> Result<String> {
        if id >= self.key_count {
            return Err(Error::new(
                ErrorKind::OutOfRange,
                format!("key id {} out of range [0, {})", id, self.key_count),
            ));
        }
        let rank = self.ranks.get(id as usize)? as u32;
        let block = rank / self.keys_per_block;
        let within = (rank % self.keys_per_block) as usize;
        let mut pos = self.offsets.get(block as usize)? as usize;

        let mut key = read_first_key(self.blocks, &mut pos)?;
        for _ in 0..within {
            advance_key(self.blocks, &mut pos, &mut key)?;
        }
        String::from_utf8(key)
            .map_err(|_| Error::corruption("lexicon key is not valid UTF-8"))
    }

    /// Restartable forward iteration over `(id, key)` pairs in ID order.
    pub fn iter(&self) -> LexiconIter<'_, 'a> {
        LexiconIter {
            lexicon: self,
            next_id: 0,
        }
    }
}

pub struct LexiconIter<'l, 'a> {
    lexicon: &'l Lexicon<'a>,
    next_id: u32,
}

impl Iterator for LexiconIter<'_, '_> {
    type Item = Result<(u32, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_id >= self.lexicon.key_count {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(self.lexicon.key_at(id).map(|key| (id, key)))
    }
}

fn read_first_key(blocks: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let len = VByte::decode(blocks, pos)? as usize;
    read_bytes(blocks, pos, len)
}

fn advance_key(blocks: &[u8], pos: &mut usize, key: &mut Vec<u8>) -> Result<()> {
    let common = VByte::decode(blocks, pos)? as usize;
    let suffix_len = VByte::decode(blocks, pos)? as usize;
    if common > key.len() {
        return Err(Error::corruption("lexicon prefix length exceeds previous key"));
    }
    let suffix = read_bytes(blocks, pos, suffix_len)?;
    key.truncate(common);
    key.extend_from_slice(&suffix);
    Ok(())
}

fn read_bytes(blocks: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>> {
    if *pos + len > blocks.len() {
        return Err(Error::new(
            ErrorKind::Decode,
            "lexicon block ended before end of key".to_string(),
        ));
    }
    let bytes = blocks[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(bytes)
}

/// Serializes a lexicon from unique keys given in ID order (key `i` of
/// the iteration gets ID `i`); the keys may arrive in any order.
pub fn build_lexicon<'k, I>(keys: I, keys_per_block: u32) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'k str>,
{
    if keys_per_block == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "keys_per_block must be positive".to_string(),
        ));
    }

    let keys: Vec<&'k str> = keys.into_iter().collect();
    let mut sorted: Vec<(u32, &str)> = keys
        .iter()
        .enumerate()
        .map(|(id, &key)| (id as u32, key))
        .collect();
    sorted.sort_by(|a, b| a.1.cmp(b.1));
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].1 == pair[1].1) {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("lexicon keys must be unique ({:?})", pair[0].1),
        ));
    }

    let mut fst_builder = fst::MapBuilder::memory();
    let mut blocks = Vec::new();
    let mut offsets = Vec::new();
    let mut ranks = vec![0u64; keys.len()];
    let mut previous: Option<&str> = None;

    for (rank, &(id, key)) in sorted.iter().enumerate() {
        ranks[id as usize] = rank as u64;
        fst_builder.insert(key.as_bytes(), u64::from(id))?;
        if rank as u32 % keys_per_block == 0 {
            offsets.push(blocks.len() as u64);
            VByte::encode(&mut blocks, key.len() as u64);
            blocks.extend_from_slice(key.as_bytes());
        } else {
            let previous = previous.expect("non-leader key has a predecessor");
            let common = common_prefix(previous.as_bytes(), key.as_bytes());
            VByte::encode(&mut blocks, common as u64);
            VByte::encode(&mut blocks, (key.len() - common) as u64);
            blocks.extend_from_slice(&key.as_bytes()[common..]);
        }
        previous = Some(key);
    }

    let fst_bytes = fst_builder.into_inner()?;
    let offset_bytes = CompactTableBuilder::offsets().build(&offsets)?;
    let rank_bytes = CompactTableBuilder::plain().build(&ranks)?;

    let mut data = Vec::with_capacity(
        HEADER_SIZE + fst_bytes.len() + offset_bytes.len() + rank_bytes.len() + blocks.len(),
    );
    data.extend_from_slice(&(keys.len() as u32).to_le_bytes());
    data.extend_from_slice(&keys_per_block.to_le_bytes());
    data.extend_from_slice(&(fst_bytes.len() as u64).to_le_bytes());
    data.extend_from_slice(&(offset_bytes.len() as u64).to_le_bytes());
    data.extend_from_slice(&(rank_bytes.len() as u64).to_le_bytes());
    data.extend_from_slice(&fst_bytes);
    data.extend_from_slice(&offset_bytes);
    data.extend_from_slice(&rank_bytes);
    data.extend_from_slice(&blocks);
    Ok(data)
}

pub fn write_lexicon<'k, I>(keys: I, keys_per_block: u32, path: &Path) -> Result<()>
where
    I: IntoIterator<Item = &'k str>,
{
    let data = build_lexicon(keys, keys_per_block)?;
    fs::write(path, data)?;
    Ok(())
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORTED_KEYS: [&str; 7] = [
        "aardvark", "aback", "abacus", "ipsum", "lorem", "zebra", "zebrafish",
    ];

    #[test]
    fn test_bidirectional_lookup_sorted_input() {
        let data = build_lexicon(SORTED_KEYS.iter().copied(), 3).unwrap();
        let lexicon = Lexicon::parse(&data).unwrap();

        assert_eq!(lexicon.len(), 7);
        assert_eq!(lexicon.keys_per_block(), 3);
        for (id, key) in SORTED_KEYS.iter().enumerate() {
            assert_eq!(lexicon.index_at(key), Some(id as u32));
            assert_eq!(lexicon.key_at(id as u32).unwrap(), *key);
        }
        assert_eq!(lexicon.index_at("missing"), None);
        assert!(lexicon.key_at(7).is_err());
    }

    #[test]
    fn test_keys_in_arbitrary_order_keep_their_ids() {
        // Arrival order is the ID order; no sortedness is required.
        let keys = ["lorem", "ipsum", "zebra", "aardvark", "aback"];
        let data = build_lexicon(keys.iter().copied(), 2).unwrap();
        let lexicon = Lexicon::parse(&data).unwrap();

        for (id, key) in keys.iter().enumerate() {
            assert_eq!(lexicon.index_at(key), Some(id as u32), "{}", key);
            assert_eq!(lexicon.key_at(id as u32).unwrap(), *key);
        }
        assert_eq!(lexicon.index_at("absent"), None);
    }

    #[test]
    fn test_iteration_is_restartable_and_in_id_order() {
        let keys = ["delta", "alpha", "charlie", "bravo"];
        let data = build_lexicon(keys.iter().copied(), 2).unwrap();
        let lexicon = Lexicon::parse(&data).unwrap();

        for _ in 0..2 {
            let entries: Vec<(u32, String)> =
                lexicon.iter().collect::<Result<Vec<_>>>().unwrap();
            let expected: Vec<(u32, String)> = keys
                .iter()
                .enumerate()
                .map(|(id, key)| (id as u32, key.to_string()))
                .collect();
            assert_eq!(entries, expected);
        }
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = build_lexicon(["b", "a", "b"], 4).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_empty_lexicon() {
        let data = build_lexicon([], 16).unwrap();
        let lexicon = Lexicon::parse(&data).unwrap();
        assert!(lexicon.is_empty());
        assert_eq!(lexicon.index_at("anything"), None);
        assert_eq!(lexicon.iter().count(), 0);
    }
}
