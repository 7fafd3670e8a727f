use std::fs;
use std::path::Path;

use kestrix::core::types::{DocId, TermId};
use kestrix::index::builder::IndexBuilder;
use kestrix::index::source::IndexSource;
use kestrix::index::view::IndexView;
use kestrix::shard::reorder::reorder;

fn build(dir: &Path) {
    let mut builder = IndexBuilder::new();
    let input = "d0 ash oak ash\nd1 pine oak\nd2 ash\nd3 birch pine oak\n";
    builder.assemble(std::io::Cursor::new(input)).unwrap();
    builder.write(dir).unwrap();
}

fn file_bytes(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut entries: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                fs::read(entry.path()).unwrap(),
            )
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

#[test]
fn test_identity_permutation_is_byte_identical() {
    let scratch = tempfile::tempdir().unwrap();
    let input = scratch.path().join("index");
    let output = scratch.path().join("reordered");
    build(&input);

    let titles: Vec<String> = ["d0", "d1", "d2", "d3"]
        .iter()
        .map(|t| t.to_string())
        .collect();
    reorder(&input, &output, &titles).unwrap();

    assert_eq!(file_bytes(&input), file_bytes(&output));
}

#[test]
fn test_dropping_documents() {
    let scratch = tempfile::tempdir().unwrap();
    let input = scratch.path().join("index");
    let output = scratch.path().join("reordered");
    build(&input);

    // d1 is dropped; an unknown title is ignored.
    let titles: Vec<String> = ["d0", "d2", "d3", "d9"]
        .iter()
        .map(|t| t.to_string())
        .collect();
    reorder(&input, &output, &titles).unwrap();

    let source = IndexSource::open(&output, &[]).unwrap();
    let view = IndexView::open(&source).unwrap();
    assert_eq!(view.collection_size(), 3);
    assert_eq!(view.title(DocId(0)).unwrap(), "d0");
    assert_eq!(view.title(DocId(1)).unwrap(), "d2");
    assert_eq!(view.title(DocId(2)).unwrap(), "d3");
    assert_eq!(view.document_size(DocId(2)).unwrap(), 3);

    // oak appeared in d0, d1, d3; after the drop its list covers the
    // renumbered d0 and d3 only.
    let oak = view.term_id("oak").unwrap();
    let postings = view.postings(oak).unwrap().to_vec().unwrap();
    assert_eq!(
        postings
            .iter()
            .map(|posting| (posting.document.0, posting.payload))
            .collect::<Vec<_>>(),
        vec![(0, 1), (2, 1)]
    );

    // pine survives only in d3; its document frequency shrank with it.
    let pine = view.term_id("pine").unwrap();
    assert_eq!(view.term_collection_frequency(pine).unwrap(), 1);
    assert_eq!(view.term_occurrences(pine).unwrap(), 1);

    // Every list still satisfies the ordering invariant.
    for index in 0..view.term_count() {
        let documents = view.documents(TermId(index as u32)).unwrap();
        let mut cursor = documents.iter();
        let all = cursor.fetch(&documents.end()).unwrap();
        assert!(all.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn test_arbitrary_permutation() {
    let scratch = tempfile::tempdir().unwrap();
    let input = scratch.path().join("index");
    let output = scratch.path().join("reordered");
    build(&input);

    // New order d3, d1, d0, d2: perm[new] = old = [3, 1, 0, 2].
    let titles: Vec<String> = ["d3", "d1", "d0", "d2"]
        .iter()
        .map(|t| t.to_string())
        .collect();
    reorder(&input, &output, &titles).unwrap();

    let source = IndexSource::open(&output, &[]).unwrap();
    let view = IndexView::open(&source).unwrap();
    assert_eq!(view.collection_size(), 4);
    for (new, title) in ["d3", "d1", "d0", "d2"].iter().enumerate() {
        assert_eq!(view.title(DocId(new as u32)).unwrap(), *title);
        assert_eq!(view.titles().index_at(title), Some(new as u32));
    }
    // Sizes follow their documents into the new order.
    assert_eq!(view.document_size(DocId(0)).unwrap(), 3); // d3
    assert_eq!(view.document_size(DocId(1)).unwrap(), 2); // d1
    assert_eq!(view.document_size(DocId(2)).unwrap(), 3); // d0
    assert_eq!(view.document_size(DocId(3)).unwrap(), 1); // d2

    // oak was in d0, d1, d3 (new IDs 2, 1, 0); lists stay strictly
    // ascending in the new ID space.
    let oak = view.term_id("oak").unwrap();
    let postings = view.postings(oak).unwrap().to_vec().unwrap();
    assert_eq!(
        postings
            .iter()
            .map(|posting| (posting.document.0, posting.payload))
            .collect::<Vec<_>>(),
        vec![(0, 1), (1, 1), (2, 1)]
    );

    // ash: d0 twice and d2 once, now documents 2 and 3.
    let ash = view.term_id("ash").unwrap();
    let postings = view.postings(ash).unwrap().to_vec().unwrap();
    assert_eq!(
        postings
            .iter()
            .map(|posting| (posting.document.0, posting.payload))
            .collect::<Vec<_>>(),
        vec![(2, 2), (3, 1)]
    );

    // birch only appeared in d3, now document 0.
    let birch = view.term_id("birch").unwrap();
    let postings = view.postings(birch).unwrap().to_vec().unwrap();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].document, DocId(0));
}
