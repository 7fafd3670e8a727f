use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::block_list::{BlockCursor, BlockList, DocumentListView, PayloadListView};

/// One posting: a document and its payload (a raw frequency or a
/// quantized score, depending on the backing layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub document: DocId,
    pub payload: u32,
}

/// Zips a document list with a payload list into a forward-iterable,
/// skip-capable posting sequence.
pub struct PostingListView<'a> {
    documents: DocumentListView<'a>,
    payloads: PayloadListView<'a>,
}

impl<'a> PostingListView<'a> {
    pub fn new(documents: DocumentListView<'a>, payloads: PayloadListView<'a>) -> Result<Self> {
        if documents.length() != payloads.length()
            || documents.block_size() != payloads.block_size()
        {
            return Err(Error::new(
                ErrorKind::Corruption,
                format!(
                    "posting lists disagree: documents {}x{}, payloads {}x{}",
                    documents.length(),
                    documents.block_size(),
                    payloads.length(),
                    payloads.block_size()
                ),
            ));
        }
        Ok(PostingListView {
            documents,
            payloads,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn documents(&self) -> &DocumentListView<'a> {
        &self.documents
    }

    pub fn cursor(&self) -> PostingCursor<'_, 'a> {
        PostingCursor {
            documents: self.documents.iter(),
            payloads: self.payloads.iter(),
        }
    }

    /// Decodes the entire list; used by offline passes, not by engines.
    pub fn to_vec(&self) -> Result<Vec<Posting>> {
        let mut cursor = self.cursor();
        let mut postings = Vec::with_capacity(self.len());
        while !cursor.is_end() {
            postings.push(cursor.get()?);
            cursor.next();
        }
        Ok(postings)
    }
}

/// Cursor over a posting list; the payload cursor is kept positionally in
/// sync with the document cursor by copying `(block, pos)` rather than by
/// re-searching.
pub struct PostingCursor<'l, 'a> {
    documents: BlockCursor<'l, DocumentListView<'a>>,
    payloads: BlockCursor<'l, PayloadListView<'a>>,
}

impl Clone for PostingCursor<'_, '_> {
    fn clone(&self) -> Self {
        PostingCursor {
            documents: self.documents.clone(),
            payloads: self.payloads.clone(),
        }
    }
}

impl PostingCursor<'_, '_> {
    pub fn is_end(&self) -> bool {
        self.documents.is_end()
    }

    pub fn position(&self) -> usize {
        self.documents.position()
    }

    pub fn document(&mut self) -> Result<DocId> {
        Ok(DocId(self.documents.get()?))
    }

    pub fn payload(&mut self) -> Result<u32> {
        self.payloads.align(&self.documents);
        self.payloads.get()
    }

    pub fn get(&mut self) -> Result<Posting> {
        Ok(Posting {
            document: self.document()?,
            payload: self.payload()?,
        })
    }

    pub fn next(&mut self) {
        self.documents.next();
    }
}

impl<'a> PostingCursor<'a, 'a> {
    /// Moves to the first posting with document >= `target`.
    pub fn advance_to(&mut self, target: DocId) -> Result<()> {
        self.documents.advance_to(target)
    }
}

/// Zips a document list with two payload lists at once (e.g. raw
/// frequency plus a precomputed score layer).
pub struct ZippedPostingListView<'a> {
    documents: DocumentListView<'a>,
    first: PayloadListView<'a>,
    second: PayloadListView<'a>,
}

impl<'a> ZippedPostingListView<'a> {
    pub fn new(
        documents: DocumentListView<'a>,
        first: PayloadListView<'a>,
        second: PayloadListView<'a>,
    ) -> Result<Self> {
        for (length, block_size) in [
            (first.length(), first.block_size()),
            (second.length(), second.block_size()),
        ] {
            if length != documents.length() || block_size != documents.block_size() {
                return Err(Error::new(
                    ErrorKind::Corruption,
                    "zipped posting lists must share length and block size".to_string(),
                ));
            }
        }
        Ok(ZippedPostingListView {
            documents,
            first,
            second,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.length()
    }

    pub fn cursor(&self) -> ZippedPostingCursor<'_, 'a> {
        ZippedPostingCursor {
            documents: self.documents.iter(),
            first: self.first.iter(),
            second: self.second.iter(),
        }
    }
}

pub struct ZippedPostingCursor<'l, 'a> {
    documents: BlockCursor<'l, DocumentListView<'a>>,
    first: BlockCursor<'l, PayloadListView<'a>>,
    second: BlockCursor<'l, PayloadListView<'a>>,
}

impl ZippedPostingCursor<'_, '_> {
    pub fn is_end(&self) -> bool {
        self.documents.is_end()
    }

    pub fn get(&mut self) -> Result<(DocId, u32, u32)> {
        let document = DocId(self.documents.get()?);
        self.first.align(&self.documents);
        self.second.align(&self.documents);
        Ok((document, self.first.get()?, self.second.get()?))
    }

    pub fn next(&mut self) {
        self.documents.next();
    }
}

impl<'a> ZippedPostingCursor<'a, 'a> {
    pub fn advance_to(&mut self, target: DocId) -> Result<()> {
        self.documents.advance_to(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::block_list::BlockListBuilder;

    fn encode(values: &[u32], delta: bool, block_size: usize) -> Vec<u8> {
        let mut builder = if delta {
            BlockListBuilder::documents(block_size)
        } else {
            BlockListBuilder::payloads(block_size)
        };
        for &value in values {
            builder.add(value);
        }
        let mut out = Vec::new();
        builder.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_zip_and_skip() {
        let docs = [2u32, 4, 9, 10, 11, 30];
        let freqs = [1u32, 2, 1, 5, 1, 2];
        let doc_data = encode(&docs, true, 4);
        let freq_data = encode(&freqs, false, 4);

        let view = PostingListView::new(
            DocumentListView::parse(&doc_data, 6).unwrap(),
            PayloadListView::parse(&freq_data, 6).unwrap(),
        )
        .unwrap();

        let mut cursor = view.cursor();
        cursor.advance_to(DocId(10)).unwrap();
        assert_eq!(
            cursor.get().unwrap(),
            Posting {
                document: DocId(10),
                payload: 5
            }
        );
        cursor.next();
        assert_eq!(cursor.get().unwrap().payload, 1);

        let all = view.to_vec().unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[5].document, DocId(30));
        assert_eq!(all[5].payload, 2);
    }

    #[test]
    fn test_mismatched_lists_rejected() {
        let doc_data = encode(&[1, 2, 3], true, 4);
        let freq_data = encode(&[1, 1], false, 4);
        let result = PostingListView::new(
            DocumentListView::parse(&doc_data, 3).unwrap(),
            PayloadListView::parse(&freq_data, 2).unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zipped_two_payloads() {
        let docs = [1u32, 3, 5];
        let freqs = [2u32, 1, 1];
        let scores = [17u32, 9, 9];
        let doc_data = encode(&docs, true, 2);
        let freq_data = encode(&freqs, false, 2);
        let score_data = encode(&scores, false, 2);

        let view = ZippedPostingListView::new(
            DocumentListView::parse(&doc_data, 3).unwrap(),
            PayloadListView::parse(&freq_data, 3).unwrap(),
            PayloadListView::parse(&score_data, 3).unwrap(),
        )
        .unwrap();

        let mut cursor = view.cursor();
        cursor.advance_to(DocId(3)).unwrap();
        assert_eq!(cursor.get().unwrap(), (DocId(3), 1, 9));
    }
}
