use std::fs;
use std::path::Path;

use crate::compression::delta::DeltaVByte;
use crate::compression::vbyte::VByte;
use crate::core::error::{Error, ErrorKind, Result};

const HEADER_SIZE: usize = 12;
const LEADER_SIZE: usize = 8;

/// Header flag bit 0: blocks are delta-encoded.
pub const FLAG_DELTA: u32 = 1;

/// Block-compressed random-access array of integers.
///
/// Layout: header `{u32 count, u32 block_size, u32 flags}` (little endian),
/// one leader record `{u32 first_index, u32 byte_offset}` per block, then
/// consecutive variable-byte blocks of up to `block_size` values each.
pub struct CompactTable<B: AsRef<[u8]>> {
    data: B,
    count: u32,
    block_size: u32,
    delta: bool,
}

impl<B: AsRef<[u8]>> CompactTable<B> {
    pub fn new(data: B) -> Result<Self> {
        let bytes = data.as_ref();
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corruption(format!(
                "compact table shorter than its header: {} bytes",
                bytes.len()
            )));
        }
        let count = read_u32(bytes, 0);
        let block_size = read_u32(bytes, 4);
        let flags = read_u32(bytes, 8);
        if count > 0 && block_size == 0 {
            return Err(Error::corruption("compact table with block_size 0"));
        }
        if count == 0 && bytes.len() > HEADER_SIZE {
            return Err(Error::corruption(
                "empty compact table with trailing bytes",
            ));
        }
        Ok(CompactTable {
            data,
            count,
            block_size,
            delta: flags & FLAG_DELTA != 0,
        })
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            (self.count as usize + self.block_size as usize - 1) / self.block_size as usize
        }
    }

    fn leader(&self, block: usize) -> (u32, u32) {
        let bytes = self.data.as_ref();
        let at = HEADER_SIZE + block * LEADER_SIZE;
        (read_u32(bytes, at), read_u32(bytes, at + 4))
    }

    /// Random-access lookup of the `index`-th value.
    pub fn get(&self, index: usize) -> Result<u64> {
        if index >= self.count as usize {
            return Err(Error::new(
                ErrorKind::OutOfRange,
                format!("index {} out of range [0, {})", index, self.count),
            ));
        }
        // Greatest leader with first_index <= index. Leaders are sorted by
        // first_index, and leader 0 starts at index 0.
        let block_count = self.block_count();
        let mut lo = 0usize;
        let mut hi = block_count;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.leader(mid).0 as usize <= index {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let (first_index, byte_offset) = self.leader(lo);

        let bytes = self.data.as_ref();
        let mut pos = byte_offset as usize;
        if pos > bytes.len() {
            return Err(Error::corruption(format!(
                "compact table leader points past the buffer: {}",
                pos
            )));
        }
        let take = index - first_index as usize + 1;
        let decoded = if self.delta {
            DeltaVByte::decode_n(bytes, &mut pos, take, 0)?
        } else {
            VByte::decode_n(bytes, &mut pos, take)?
        };
        Ok(*decoded.last().expect("take >= 1"))
    }

    /// Decode the entire table into a vector.
    pub fn to_vec(&self) -> Result<Vec<u64>> {
        let bytes = self.data.as_ref();
        let mut values = Vec::with_capacity(self.count as usize);
        for block in 0..self.block_count() {
            let (first_index, byte_offset) = self.leader(block);
            let in_block = (self.count as usize - first_index as usize)
                .min(self.block_size as usize);
            let mut pos = byte_offset as usize;
            let decoded = if self.delta {
                DeltaVByte::decode_n(bytes, &mut pos, in_block, 0)?
            } else {
                VByte::decode_n(bytes, &mut pos, in_block)?
            };
            values.extend(decoded);
        }
        Ok(values)
    }
}

impl CompactTable<Vec<u8>> {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing_file(path));
        }
        CompactTable::new(fs::read(path)?)
    }
}

/// Builds the serialized byte image of a compact table.
pub struct CompactTableBuilder {
    block_size: u32,
    delta: bool,
}

impl CompactTableBuilder {
    pub fn new(block_size: u32, delta: bool) -> Self {
        CompactTableBuilder { block_size, delta }
    }

    /// Plain table with the default block size.
    pub fn plain() -> Self {
        CompactTableBuilder::new(256, false)
    }

    /// Delta table for non-decreasing sequences (e.g. byte offsets).
    pub fn offsets() -> Self {
        CompactTableBuilder::new(256, true)
    }

    pub fn build(&self, values: &[u64]) -> Result<Vec<u8>> {
        let block_size = self.block_size as usize;
        let block_count = (values.len() + block_size - 1) / block_size;
        let data_offset = HEADER_SIZE + block_count * LEADER_SIZE;

        let mut blocks = Vec::new();
        let mut leaders = Vec::with_capacity(block_count);
        for block in 0..block_count {
            let begin = block * block_size;
            let end = (begin + block_size).min(values.len());
            leaders.push((begin as u32, (data_offset + blocks.len()) as u32));
            if self.delta {
                // Each block restarts the prefix sum from zero.
                DeltaVByte::encode(&mut blocks, &values[begin..end], 0)?;
            } else {
                for &value in &values[begin..end] {
                    VByte::encode(&mut blocks, value);
                }
            }
        }

        let mut data = Vec::with_capacity(data_offset + blocks.len());
        let flags = if self.delta { FLAG_DELTA } else { 0 };
        data.extend_from_slice(&(values.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.block_size.to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        for (first_index, byte_offset) in leaders {
            data.extend_from_slice(&first_index.to_le_bytes());
            data.extend_from_slice(&byte_offset.to_le_bytes());
        }
        data.extend_from_slice(&blocks);
        Ok(data)
    }

    pub fn write(&self, values: &[u64], path: &Path) -> Result<()> {
        let data = self.build(values)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Raw vector of little-endian f32 values, used for the per-term score
/// statistics files.
pub struct FloatTable<B: AsRef<[u8]>> {
    data: B,
}

impl<B: AsRef<[u8]>> FloatTable<B> {
    pub fn new(data: B) -> Result<Self> {
        if data.as_ref().len() % 4 != 0 {
            return Err(Error::corruption("float table size is not a multiple of 4"));
        }
        Ok(FloatTable { data })
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<f32> {
        if index >= self.len() {
            return Err(Error::new(
                ErrorKind::OutOfRange,
                format!("index {} out of range [0, {})", index, self.len()),
            ));
        }
        let bytes = self.data.as_ref();
        let at = index * 4;
        let raw: [u8; 4] = bytes[at..at + 4].try_into().expect("bounds checked");
        Ok(f32::from_le_bytes(raw))
    }
}

pub fn write_float_table(values: &[f32], path: &Path) -> Result<()> {
    let mut data = Vec::with_capacity(values.len() * 4);
    for &value in values {
        data.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, data)?;
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().expect("bounds checked"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_matches_source_values() {
        let values = [0u64, 10, 21, 35, 47, 60];
        let data = CompactTableBuilder::new(4, true).build(&values).unwrap();
        let table = CompactTable::new(data).unwrap();

        assert_eq!(table.len(), 6);
        for (index, &expected) in values.iter().enumerate() {
            assert_eq!(table.get(index).unwrap(), expected);
        }
        // Two blocks of 4: leader 0 covers index 0, leader 1 covers index 4.
        assert_eq!(table.leader(0).0, 0);
        assert_eq!(table.leader(1).0, 4);
        assert_eq!(table.block_count(), 2);
    }

    #[test]
    fn test_plain_table() {
        let values = [7u64, 3, 3, 1_000_000, 0];
        let data = CompactTableBuilder::new(2, false).build(&values).unwrap();
        let table = CompactTable::new(data).unwrap();
        assert_eq!(table.to_vec().unwrap(), values);
        assert_eq!(table.get(3).unwrap(), 1_000_000);
    }

    #[test]
    fn test_out_of_range_lookup() {
        let data = CompactTableBuilder::plain().build(&[1, 2]).unwrap();
        let table = CompactTable::new(data).unwrap();
        let err = table.get(2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn test_corrupt_header() {
        assert!(CompactTable::new(vec![0u8; 4]).is_err());

        // Non-empty count with zero block size
        let mut data = Vec::new();
        data.extend_from_slice(&5u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        assert!(CompactTable::new(data).is_err());
    }

    #[test]
    fn test_float_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bm25.mean");
        write_float_table(&[0.5, 1.25, -3.0], &path).unwrap();
        let data = std::fs::read(&path).unwrap();
        let table = FloatTable::new(data.as_slice()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1).unwrap(), 1.25);
        assert_eq!(table.get(2).unwrap(), -3.0);
    }
}
