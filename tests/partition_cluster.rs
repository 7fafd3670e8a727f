use std::path::Path;

use kestrix::core::types::{DocId, ShardId, TermId};
use kestrix::index::builder::IndexBuilder;
use kestrix::index::compact_table::CompactTable;
use kestrix::index::source::IndexSource;
use kestrix::index::view::IndexView;
use kestrix::scoring::quantize::{score_index, score_stats};
use kestrix::scoring::scorer::ScoreTag;
use kestrix::search::engine::{QueryEngine, TraversalType};
use kestrix::shard::cluster::{ClusterDispatcher, ClusterSource, ClusterView, ShardSelection};
use kestrix::shard::partition::{PartitionConfig, partition};

fn build_corpus(dir: &Path, corpus: &str, scored: bool) {
    let mut builder = IndexBuilder::new();
    builder.assemble(std::io::Cursor::new(corpus)).unwrap();
    builder.write(dir).unwrap();
    if scored {
        score_index(dir, ScoreTag::Bm25, 8).unwrap();
        score_stats(dir, ScoreTag::Bm25).unwrap();
    }
}

#[test]
fn test_three_document_split() {
    let scratch = tempfile::tempdir().unwrap();
    let input = scratch.path().join("index");
    let cluster_dir = scratch.path().join("cluster");
    build_corpus(&input, "d0 ash oak\nd1 ash pine\nd2 oak oak\n", false);

    let shard_map = [ShardId(0), ShardId(1), ShardId(0)];
    partition(&input, &cluster_dir, &shard_map, 2, &PartitionConfig::default()).unwrap();

    // Shard 0 holds documents 0 and 2 under local IDs 0 and 1; shard 1
    // holds document 1 under local ID 0.
    let shard0 = IndexSource::open(&cluster_dir.join("000"), &[]).unwrap();
    let view0 = IndexView::open(&shard0).unwrap();
    assert_eq!(view0.collection_size(), 2);
    assert_eq!(view0.title(DocId(0)).unwrap(), "d0");
    assert_eq!(view0.title(DocId(1)).unwrap(), "d2");

    let shard1 = IndexSource::open(&cluster_dir.join("001"), &[]).unwrap();
    let view1 = IndexView::open(&shard1).unwrap();
    assert_eq!(view1.collection_size(), 1);
    assert_eq!(view1.title(DocId(0)).unwrap(), "d1");

    let oak0 = view0.term_id("oak").unwrap();
    let postings = view0.postings(oak0).unwrap().to_vec().unwrap();
    assert_eq!(
        postings
            .iter()
            .map(|posting| (posting.document.0, posting.payload))
            .collect::<Vec<_>>(),
        vec![(0, 1), (1, 2)]
    );

    // The reverse map round-trips shard-local IDs to global ones.
    let reverse = CompactTable::load(&cluster_dir.join("000").join("reverse.map")).unwrap();
    assert_eq!(reverse.to_vec().unwrap(), vec![0, 2]);
    let reverse = CompactTable::load(&cluster_dir.join("001").join("reverse.map")).unwrap();
    assert_eq!(reverse.to_vec().unwrap(), vec![1]);

    // Summed per-shard document frequencies reproduce the originals.
    let source = IndexSource::open(&input, &[]).unwrap();
    let original = IndexView::open(&source).unwrap();
    for index in 0..original.term_count() {
        let term_id = TermId(index as u32);
        let term = original.term(term_id).unwrap();
        let total: u32 = [&view0, &view1]
            .iter()
            .map(|view| {
                view.term_id(&term)
                    .map(|id| view.term_collection_frequency(id).unwrap())
                    .unwrap_or(0)
            })
            .sum();
        assert_eq!(total, original.term_collection_frequency(term_id).unwrap());
    }
}

#[test]
fn test_partition_rejects_bad_map() {
    let scratch = tempfile::tempdir().unwrap();
    let input = scratch.path().join("index");
    build_corpus(&input, "d0 ash\nd1 oak\n", false);

    let err = partition(
        &input,
        &scratch.path().join("cluster"),
        &[ShardId(0)],
        2,
        &PartitionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind, kestrix::ErrorKind::InvalidArgument);

    let err = partition(
        &input,
        &scratch.path().join("cluster"),
        &[ShardId(0), ShardId(5)],
        2,
        &PartitionConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind, kestrix::ErrorKind::InvalidArgument);
}

const CORPUS: &str = "\
Doc00 Lorem ipsum dolor sit amet, consectetur adipiscing elit.
Doc01 Proin ullamcorper nunc et odio suscipit, eu placerat metus vestibulum.
Doc02 Mauris non ipsum feugiat, aliquet libero eget, gravida dolor.
Doc03 Nullam non ipsum hendrerit, malesuada tellus sed, placerat ante.
Doc04 Donec aliquam sapien imperdiet libero semper bibendum.
Doc05 Nam lacinia libero at nunc tincidunt, in ullamcorper ipsum fermentum.
Doc06 Aliquam vel ante id dolor dignissim vehicula in at leo.
Doc07 Maecenas mollis mauris vitae enim pretium ultricies.
Doc08 Vivamus bibendum ligula sit amet urna scelerisque, eget dignissim felis gravida.
Doc09 Cras pulvinar ante in massa euismod tempor.
";

fn build_cluster(scratch: &Path) -> std::path::PathBuf {
    let input = scratch.join("index");
    let cluster_dir = scratch.join("cluster");
    build_corpus(&input, CORPUS, true);
    let shard_map: Vec<ShardId> = (0..10).map(|doc| ShardId((doc % 3) as u16)).collect();
    let config = PartitionConfig {
        scored_layers: vec!["bm25-8".to_string()],
        stat_scorers: vec![ScoreTag::Bm25],
    };
    partition(&input, &cluster_dir, &shard_map, 3, &config).unwrap();
    cluster_dir
}

#[test]
fn test_cluster_facade_aggregates_shards() {
    let scratch = tempfile::tempdir().unwrap();
    let cluster_dir = build_cluster(scratch.path());

    let source = ClusterSource::open(&cluster_dir, &["bm25-8"]).unwrap();
    let cluster = ClusterView::open(&source).unwrap();
    assert_eq!(cluster.shards().len(), 3);
    assert_eq!(cluster.collection_size(), 10);

    let ipsum = cluster.term_id("ipsum").unwrap();
    assert_eq!(cluster.term_collection_frequency(ipsum).unwrap(), 4);

    // Every shard keeps the full term set, so term IDs agree with the
    // global tables.
    for shard in cluster.shards() {
        assert_eq!(shard.term_id("ipsum"), Some(ipsum));
    }
}

#[test]
fn test_broadcast_matches_single_index_search() {
    let scratch = tempfile::tempdir().unwrap();
    let cluster_dir = build_cluster(scratch.path());
    let input = scratch.path().join("index");

    let source = IndexSource::open(&input, &[]).unwrap();
    let view = IndexView::open(&source).unwrap();
    let engine = QueryEngine::new(&view, TraversalType::Daat, "bm25".parse().unwrap());

    let cluster_source = ClusterSource::open(&cluster_dir, &["bm25-8"]).unwrap();
    let cluster = ClusterView::open(&cluster_source).unwrap();
    let dispatcher = ClusterDispatcher::new(
        &cluster,
        TraversalType::Daat,
        "bm25-8".parse().unwrap(),
    )
    .with_rescoring();

    for terms in [vec!["ipsum"], vec!["libero", "dolor"]] {
        let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        let expected: Vec<String> = engine
            .run_query(&terms, 3)
            .unwrap()
            .results
            .iter()
            .map(|(_, document, _)| view.title(document).unwrap())
            .collect();
        let merged = dispatcher
            .run_query(&terms, 3, ShardSelection::All)
            .unwrap();
        let titles: Vec<String> = merged.iter().map(|result| result.title.clone()).collect();
        assert_eq!(titles, expected, "query {:?}", terms);
    }
}

#[test]
fn test_taily_selection_prefers_matching_shards() {
    let scratch = tempfile::tempdir().unwrap();
    let cluster_dir = build_cluster(scratch.path());

    let source = ClusterSource::open(&cluster_dir, &["bm25-8"]).unwrap();
    let cluster = ClusterView::open(&source).unwrap();
    let dispatcher = ClusterDispatcher::new(
        &cluster,
        TraversalType::Daat,
        "bm25-8".parse().unwrap(),
    );

    // With the shard budget at the full cluster size, selection must not
    // lose results.
    let terms = vec!["ipsum".to_string()];
    let all = dispatcher
        .run_query(&terms, 4, ShardSelection::All)
        .unwrap();
    let selected = dispatcher
        .run_query(&terms, 4, ShardSelection::Taily { count: 3 })
        .unwrap();
    assert_eq!(all, selected);

    // A single-shard budget returns results from one shard only.
    let one = dispatcher
        .run_query(&terms, 4, ShardSelection::Taily { count: 1 })
        .unwrap();
    assert!(!one.is_empty());
    let shard = one[0].shard;
    assert!(one.iter().all(|result| result.shard == shard));
}
