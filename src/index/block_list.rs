use crate::compression::delta::DeltaVByte;
use crate::compression::vbyte::VByte;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;

/// A list of values split into fixed-size blocks that decode as a unit.
///
/// Delta and plain layouts differ only in how a block decodes; the cursor
/// below is generic over this trait instead of duplicating the traversal
/// logic per layout.
pub trait BlockList {
    /// Number of values in the list.
    fn length(&self) -> usize;

    fn block_size(&self) -> usize;

    fn block_count(&self) -> usize;

    /// Number of values in `block` (the last block may be short).
    fn block_len(&self, block: usize) -> usize {
        let remaining = self.length() - block * self.block_size();
        remaining.min(self.block_size())
    }

    /// Decodes the whole of `block` into `cache`.
    fn decode_block_into(&self, block: usize, cache: &mut Vec<u32>) -> Result<()>;
}

/// Shared header of both list layouts: `{byte_size, block_size, num_blocks}`
/// var-byte values followed by `num_blocks` delta-encoded leader offsets.
struct ListHeader {
    block_size: usize,
    /// Byte ranges of the encoded blocks within the list's memory.
    block_ranges: Vec<(usize, usize)>,
    /// Read position after the leader offsets.
    pos: usize,
}

fn parse_header(memory: &[u8], length: usize, what: &str) -> Result<ListHeader> {
    let mut pos = 0usize;
    let byte_size = VByte::decode(memory, &mut pos)? as usize;
    let block_size = VByte::decode(memory, &mut pos)? as usize;
    let num_blocks = VByte::decode(memory, &mut pos)? as usize;

    if byte_size != memory.len() {
        return Err(Error::corruption(format!(
            "{} list declares {} bytes but its memory view has {}",
            what,
            byte_size,
            memory.len()
        )));
    }
    if block_size == 0 && length > 0 {
        return Err(Error::corruption(format!("{} list with block size 0", what)));
    }
    let expected_blocks = if length == 0 {
        0
    } else {
        (length + block_size - 1) / block_size
    };
    if num_blocks != expected_blocks {
        return Err(Error::corruption(format!(
            "{} list of length {} declares {} blocks, expected {}",
            what, length, num_blocks, expected_blocks
        )));
    }

    let offsets = DeltaVByte::decode_n(memory, &mut pos, num_blocks, 0)?;
    Ok(ListHeader {
        block_size,
        block_ranges: offsets.iter().map(|&offset| (offset as usize, 0)).collect(),
        pos,
    })
}

/// Resolves the relative leader offsets against the start of the blocks
/// region and computes each block's byte length.
fn resolve_ranges(
    header: &mut ListHeader,
    blocks_start: usize,
    total: usize,
    what: &str,
) -> Result<()> {
    let ranges = &mut header.block_ranges;
    for index in 0..ranges.len() {
        let start = blocks_start + ranges[index].0;
        let end = if index + 1 < ranges.len() {
            blocks_start + ranges[index + 1].0
        } else {
            total
        };
        if start > end || end > total {
            return Err(Error::corruption(format!(
                "{} list block {} has invalid byte range {}..{}",
                what, index, start, end
            )));
        }
        ranges[index] = (start, end - start);
    }
    Ok(())
}

/// Delta-encoded document list with a per-block skip table of last
/// document IDs.
#[derive(Debug)]
pub struct DocumentListView<'a> {
    memory: &'a [u8],
    length: usize,
    block_size: usize,
    block_ranges: Vec<(usize, usize)>,
    last_documents: Vec<u32>,
}

impl<'a> DocumentListView<'a> {
    /// Parses a document list from `memory`; `length` is the number of
    /// postings, known from the term's document frequency.
    pub fn parse(memory: &'a [u8], length: usize) -> Result<Self> {
        let mut header = parse_header(memory, length, "document")?;
        let num_blocks = header.block_ranges.len();
        let last = DeltaVByte::decode_n(memory, &mut header.pos, num_blocks, 0)?;
        let mut last_documents = Vec::with_capacity(num_blocks);
        for value in last {
            last_documents.push(u32::try_from(value).map_err(|_| {
                Error::corruption("document list skip entry overflows u32")
            })?);
        }
        let blocks_start = header.pos;
        resolve_ranges(&mut header, blocks_start, memory.len(), "document")?;
        Ok(DocumentListView {
            memory,
            length,
            block_size: header.block_size,
            block_ranges: header.block_ranges,
            last_documents,
        })
    }

    /// Last document of `block`, from the skip table.
    pub fn last_document(&self, block: usize) -> u32 {
        self.last_documents[block]
    }

    pub fn iter(&self) -> BlockCursor<'_, Self> {
        BlockCursor::begin(self)
    }

    pub fn end(&self) -> BlockCursor<'_, Self> {
        BlockCursor::end_of(self)
    }
}

impl BlockList for DocumentListView<'_> {
    fn length(&self) -> usize {
        self.length
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_ranges.len()
    }

    fn decode_block_into(&self, block: usize, cache: &mut Vec<u32>) -> Result<()> {
        let (start, len) = self.block_ranges[block];
        let initial = if block > 0 {
            u64::from(self.last_documents[block - 1])
        } else {
            0
        };
        let mut pos = 0usize;
        let decoded = DeltaVByte::decode_n(
            &self.memory[start..start + len],
            &mut pos,
            self.block_len(block),
            initial,
        )?;
        cache.clear();
        for value in decoded {
            cache.push(u32::try_from(value).map_err(|_| {
                Error::corruption("document id overflows u32")
            })?);
        }
        let last = *cache.last().expect("blocks are never empty");
        if last != self.last_documents[block] {
            return Err(Error::corruption(format!(
                "block {} decodes to last document {} but the skip table says {}",
                block, last, self.last_documents[block]
            )));
        }
        Ok(())
    }
}

/// Plain-encoded payload list (frequencies or quantized scores); shares
/// block boundaries with its document list but has no skip table.
pub struct PayloadListView<'a> {
    memory: &'a [u8],
    length: usize,
    block_size: usize,
    block_ranges: Vec<(usize, usize)>,
}

impl<'a> PayloadListView<'a> {
    pub fn parse(memory: &'a [u8], length: usize) -> Result<Self> {
        let mut header = parse_header(memory, length, "payload")?;
        let blocks_start = header.pos;
        resolve_ranges(&mut header, blocks_start, memory.len(), "payload")?;
        Ok(PayloadListView {
            memory,
            length,
            block_size: header.block_size,
            block_ranges: header.block_ranges,
        })
    }

    pub fn iter(&self) -> BlockCursor<'_, Self> {
        BlockCursor::begin(self)
    }

    pub fn end(&self) -> BlockCursor<'_, Self> {
        BlockCursor::end_of(self)
    }
}

impl BlockList for PayloadListView<'_> {
    fn length(&self) -> usize {
        self.length
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_ranges.len()
    }

    fn decode_block_into(&self, block: usize, cache: &mut Vec<u32>) -> Result<()> {
        let (start, len) = self.block_ranges[block];
        let mut pos = 0usize;
        cache.clear();
        for _ in 0..self.block_len(block) {
            cache.push(VByte::decode_u32(&self.memory[start..start + len], &mut pos)?);
        }
        Ok(())
    }
}

/// Forward cursor over a block list.
///
/// State is `(block, pos)` plus at most one cached decoded block.
/// Dereferencing a position in an undecoded block decodes that whole
/// block; moving across a block boundary invalidates the cache.
pub struct BlockCursor<'a, L: BlockList> {
    list: &'a L,
    block: usize,
    pos: usize,
    cached_block: Option<usize>,
    cache: Vec<u32>,
}

impl<L: BlockList> Clone for BlockCursor<'_, L> {
    fn clone(&self) -> Self {
        BlockCursor {
            list: self.list,
            block: self.block,
            pos: self.pos,
            cached_block: self.cached_block,
            cache: self.cache.clone(),
        }
    }
}

impl<'a, L: BlockList> BlockCursor<'a, L> {
    pub fn begin(list: &'a L) -> Self {
        BlockCursor {
            list,
            block: 0,
            pos: 0,
            cached_block: None,
            cache: Vec::new(),
        }
    }

    pub fn end_of(list: &'a L) -> Self {
        let block_size = list.block_size().max(1);
        BlockCursor {
            list,
            block: list.length() / block_size,
            pos: list.length() % block_size,
            cached_block: None,
            cache: Vec::new(),
        }
    }

    pub fn block(&self) -> usize {
        self.block
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Absolute position in the list.
    pub fn position(&self) -> usize {
        self.block * self.list.block_size().max(1) + self.pos
    }

    pub fn is_end(&self) -> bool {
        self.position() >= self.list.length()
    }

    fn ensure_decoded(&mut self) -> Result<()> {
        if self.cached_block != Some(self.block) {
            self.list.decode_block_into(self.block, &mut self.cache)?;
            self.cached_block = Some(self.block);
        }
        Ok(())
    }

    /// Value at the current position.
    pub fn get(&mut self) -> Result<u32> {
        self.ensure_decoded()?;
        Ok(self.cache[self.pos])
    }

    /// Advance by one position.
    pub fn next(&mut self) {
        let block_size = self.list.block_size().max(1);
        self.block += (self.pos + 1) / block_size;
        self.pos = (self.pos + 1) % block_size;
    }

    /// Copies the position of another cursor; the lists must share length
    /// and block size, which posting views check at construction.
    pub fn align<M: BlockList>(&mut self, other: &BlockCursor<'_, M>) {
        self.block = other.block();
        self.pos = other.pos();
    }

    /// Moves past the last value.
    fn finish(&mut self) {
        let block_size = self.list.block_size().max(1);
        self.block = self.list.length() / block_size;
        self.pos = self.list.length() % block_size;
    }

    /// Decodes and returns every value from the current position up to
    /// (but excluding) `end`.
    pub fn fetch(&mut self, end: &BlockCursor<'_, L>) -> Result<Vec<u32>> {
        let mut values = Vec::new();
        let stop = end.position().min(self.list.length());
        while self.position() < stop {
            values.push(self.get()?);
            self.next();
        }
        Ok(values)
    }
}

impl<'a> BlockCursor<'a, DocumentListView<'a>> {
    /// Moves to the first document >= `target`, or to `end()` when every
    /// remaining document is smaller. Valid on delta-encoded lists only,
    /// which is enforced by this being defined for document cursors.
    pub fn advance_to(&mut self, target: DocId) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        let mut block = self.block;
        while block < self.list.block_count() && self.list.last_document(block) < target.0 {
            block += 1;
        }
        if block >= self.list.block_count() {
            self.finish();
            return Ok(());
        }
        if block != self.block {
            self.pos = 0;
            self.block = block;
        }
        self.ensure_decoded()?;
        // The skip table guarantees a value >= target in this block.
        while self.cache[self.pos] < target.0 {
            self.pos += 1;
        }
        Ok(())
    }

    /// Non-mutating variant of `advance_to`.
    pub fn next_ge(&self, target: DocId) -> Result<Self> {
        let mut next = self.clone();
        next.advance_to(target)?;
        Ok(next)
    }
}

/// Accumulates one term's values and writes the block list layout:
/// var-byte `{byte_size, block_size, num_blocks}`, delta-encoded leader
/// offsets, (for delta lists) delta-encoded block-last values, then the
/// encoded blocks.
pub struct BlockListBuilder {
    block_size: usize,
    delta: bool,
    values: Vec<u32>,
}

impl BlockListBuilder {
    pub fn documents(block_size: usize) -> Self {
        BlockListBuilder {
            block_size,
            delta: true,
            values: Vec::new(),
        }
    }

    pub fn payloads(block_size: usize) -> Self {
        BlockListBuilder {
            block_size,
            delta: false,
            values: Vec::new(),
        }
    }

    pub fn add(&mut self, value: u32) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Appends the encoded list to `out`; returns the number of bytes
    /// written (equal to the embedded `byte_size`).
    pub fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        let num_blocks = if self.values.is_empty() {
            0
        } else {
            (self.values.len() + self.block_size - 1) / self.block_size
        };

        let mut blocks = Vec::new();
        let mut offsets = Vec::with_capacity(num_blocks);
        let mut last_values = Vec::with_capacity(num_blocks);
        let mut previous = 0u64;
        for block in 0..num_blocks {
            offsets.push(blocks.len() as u64);
            let begin = block * self.block_size;
            let end = (begin + self.block_size).min(self.values.len());
            if self.delta {
                // The running delta continues across block boundaries.
                for &value in &self.values[begin..end] {
                    let value = u64::from(value);
                    if value < previous {
                        return Err(Error::new(
                            ErrorKind::InvalidArgument,
                            "document list must be non-decreasing".to_string(),
                        ));
                    }
                    VByte::encode(&mut blocks, value - previous);
                    previous = value;
                }
                last_values.push(u64::from(self.values[end - 1]));
            } else {
                for &value in &self.values[begin..end] {
                    VByte::encode_u32(&mut blocks, value);
                }
            }
        }

        let mut tail = Vec::new();
        VByte::encode(&mut tail, self.block_size as u64);
        VByte::encode(&mut tail, num_blocks as u64);
        DeltaVByte::encode(&mut tail, &offsets, 0)?;
        if self.delta {
            DeltaVByte::encode(&mut tail, &last_values, 0)?;
        }
        tail.extend_from_slice(&blocks);

        // byte_size covers the whole range including its own var-byte
        // width, so the width must be fixed before the value is known.
        let mut extra = 1usize;
        while tail.len() + extra >= 1 << (7 * extra) {
            extra += 1;
        }
        let byte_size = tail.len() + extra;

        let written_at = out.len();
        VByte::encode(out, byte_size as u64);
        out.extend_from_slice(&tail);
        debug_assert_eq!(out.len() - written_at, byte_size);
        Ok(byte_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_list(values: &[u32], block_size: usize) -> Vec<u8> {
        let mut builder = BlockListBuilder::documents(block_size);
        for &value in values {
            builder.add(value);
        }
        let mut out = Vec::new();
        builder.write(&mut out).unwrap();
        out
    }

    fn payload_list(values: &[u32], block_size: usize) -> Vec<u8> {
        let mut builder = BlockListBuilder::payloads(block_size);
        for &value in values {
            builder.add(value);
        }
        let mut out = Vec::new();
        builder.write(&mut out).unwrap();
        out
    }

    const DOCS: [u32; 8] = [1, 5, 6, 8, 12, 14, 20, 23];

    #[test]
    fn test_document_list_round_trip() {
        let data = document_list(&DOCS, 3);
        let list = DocumentListView::parse(&data, DOCS.len()).unwrap();
        assert_eq!(list.block_count(), 3);
        assert_eq!(list.last_document(0), 6);
        assert_eq!(list.last_document(1), 14);
        assert_eq!(list.last_document(2), 23);

        let mut cursor = list.iter();
        let end = list.end();
        assert_eq!(cursor.fetch(&end).unwrap(), DOCS);
        assert!(cursor.is_end());
    }

    #[test]
    fn test_advance_to() {
        let data = document_list(&DOCS, 3);
        let list = DocumentListView::parse(&data, DOCS.len()).unwrap();

        // From any starting position at or before 12, advance_to(9) lands
        // on 12.
        for start in 0..5 {
            let mut cursor = list.iter();
            for _ in 0..start {
                cursor.next();
            }
            cursor.advance_to(DocId(9)).unwrap();
            assert_eq!(cursor.get().unwrap(), 12);
        }

        let mut cursor = list.iter();
        cursor.advance_to(DocId(30)).unwrap();
        assert!(cursor.is_end());

        for start in 0..8 {
            let mut cursor = list.iter();
            for _ in 0..start {
                cursor.next();
            }
            cursor.advance_to(DocId(23)).unwrap();
            assert_eq!(cursor.get().unwrap(), 23);
        }
    }

    #[test]
    fn test_next_ge_does_not_move_the_cursor() {
        let data = document_list(&DOCS, 3);
        let list = DocumentListView::parse(&data, DOCS.len()).unwrap();
        let cursor = list.iter();
        let moved = cursor.next_ge(DocId(13)).unwrap();
        let mut moved = moved;
        assert_eq!(moved.get().unwrap(), 14);
        let mut cursor = cursor;
        assert_eq!(cursor.get().unwrap(), 1);
    }

    #[test]
    fn test_payload_alignment() {
        let payloads: [u32; 8] = [2, 1, 1, 3, 1, 2, 7, 1];
        let doc_data = document_list(&DOCS, 3);
        let pay_data = payload_list(&payloads, 3);
        let docs = DocumentListView::parse(&doc_data, 8).unwrap();
        let pays = PayloadListView::parse(&pay_data, 8).unwrap();

        let mut doc_cursor = docs.iter();
        doc_cursor.advance_to(DocId(14)).unwrap();
        let mut pay_cursor = pays.iter();
        pay_cursor.align(&doc_cursor);
        assert_eq!(doc_cursor.get().unwrap(), 14);
        assert_eq!(pay_cursor.get().unwrap(), 2);
    }

    #[test]
    fn test_byte_size_mismatch_is_corruption() {
        let mut data = document_list(&DOCS, 3);
        data.push(0); // Extra trailing byte
        let err = DocumentListView::parse(&data, DOCS.len()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corruption);
    }

    #[test]
    fn test_empty_list() {
        let data = document_list(&[], 3);
        let list = DocumentListView::parse(&data, 0).unwrap();
        assert!(list.iter().is_end());
        let mut cursor = list.iter();
        cursor.advance_to(DocId(5)).unwrap();
        assert!(cursor.is_end());
    }
}
