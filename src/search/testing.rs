//! Small helpers for engine tests: build encoded posting lists in memory
//! and wrap them as scored term lists (payload = score, weight 1).

use crate::index::block_list::{BlockListBuilder, DocumentListView, PayloadListView};
use crate::index::posting::PostingListView;
use crate::search::cursor::TermList;

pub struct EncodedLists {
    documents: Vec<Vec<u8>>,
    payloads: Vec<Vec<u8>>,
    lengths: Vec<usize>,
    max_scores: Vec<u32>,
}

pub fn fixture(lists: &[&[(u32, u32)]]) -> EncodedLists {
    fixture_with_block_size(lists, 3)
}

pub fn fixture_with_block_size(lists: &[&[(u32, u32)]], block_size: usize) -> EncodedLists {
    let mut documents = Vec::new();
    let mut payloads = Vec::new();
    let mut lengths = Vec::new();
    let mut max_scores = Vec::new();
    for list in lists {
        let mut doc_builder = BlockListBuilder::documents(block_size);
        let mut payload_builder = BlockListBuilder::payloads(block_size);
        for &(document, payload) in *list {
            doc_builder.add(document);
            payload_builder.add(payload);
        }
        let mut doc_data = Vec::new();
        doc_builder.write(&mut doc_data).unwrap();
        let mut payload_data = Vec::new();
        payload_builder.write(&mut payload_data).unwrap();
        documents.push(doc_data);
        payloads.push(payload_data);
        lengths.push(list.len());
        max_scores.push(list.iter().map(|&(_, payload)| payload).max().unwrap_or(0));
    }
    EncodedLists {
        documents,
        payloads,
        lengths,
        max_scores,
    }
}

pub fn make_lists(fixture: &EncodedLists) -> Vec<TermList<'_, '_>> {
    (0..fixture.documents.len())
        .map(|index| {
            let postings = PostingListView::new(
                DocumentListView::parse(&fixture.documents[index], fixture.lengths[index])
                    .unwrap(),
                PayloadListView::parse(&fixture.payloads[index], fixture.lengths[index]).unwrap(),
            )
            .unwrap();
            TermList::quantized(postings, fixture.max_scores[index], 1.0)
        })
        .collect()
}
