use std::sync::Arc;
use tempfile::Builder;

use iris_truncate::index::attribute::MemoryAttributeIndexer;
use iris_truncate::index::inverted::dictionary::{InvertedIndexSegmentReader, InvertedIndexSegmentWriter};
use iris_truncate::index::inverted::patch::{PatchRecord, patch_file, read_patch, write_patch};
use iris_truncate::index::inverted::posting::{PostingData, PostingEntry};
use iris_truncate::index::inverted::truncate::bucket_map::{BucketMap, bucket_map_resource_name};
use iris_truncate::index::inverted::truncate::meta::TruncateMetaReader;
use iris_truncate::index::inverted::{TermIndexKind, index_dir};
use iris_truncate::index::task_resource::IndexTaskResourceManager;
use iris_truncate::schema::{HighFrequencyTermPostingType, ShardingType};
use iris_truncate::storage::file::FileStorageConfig;
use iris_truncate::storage::prefixed::PrefixedStorage;
use iris_truncate::{
    AttributeConfig, DictKeyInfo, DocMapper, FieldType, IndexSchema, InvertedIndexConfig, MergeOptions,
    SegmentMergePlan, SourceSegment, Storage, StorageConfig, StorageFactory, TargetSegment, TargetSplit,
    TruncateOptionConfig, TruncateProfileConfig, TruncateStrategy, merge_inverted_indexes,
};

fn write_index(storage: &Arc<dyn Storage>, index: &str, kind: TermIndexKind, terms: Vec<(DictKeyInfo, Vec<PostingEntry>)>) {
    let mut writer = InvertedIndexSegmentWriter::new(storage.clone(), index_dir(index), kind).unwrap();
    for (key, entries) in terms {
        writer.add_term(key, &PostingData::from_entries(entries).unwrap()).unwrap();
    }
    writer.close().unwrap();
}

fn read_index(storage: &dyn Storage, dir: &str, kind: TermIndexKind) -> Vec<(DictKeyInfo, Vec<(u32, u16)>)> {
    let Some(reader) = InvertedIndexSegmentReader::open(storage, dir, kind).unwrap() else {
        return Vec::new();
    };
    reader
        .terms()
        .iter()
        .map(|term| {
            let posting = reader.read_posting(term).unwrap();
            let docs = posting.entries().iter().map(|e| (e.doc_id, e.doc_payload)).collect();
            (term.key, docs)
        })
        .collect()
}

fn entries(docs: &[(u32, u16)]) -> Vec<PostingEntry> {
    docs.iter().map(|&(doc, payload)| PostingEntry::with_payload(doc, payload)).collect()
}

fn schema() -> IndexSchema {
    IndexSchema::new()
        .add_index(InvertedIndexConfig::new("title").with_truncate_profiles(Vec::<String>::new()))
        .add_index(InvertedIndexConfig::new("body").with_sharding(ShardingType::NeedSharding))
        .add_index(
            InvertedIndexConfig::new("tag").with_high_frequency_vocabulary(vec![7], HighFrequencyTermPostingType::Both),
        )
        .add_attribute(AttributeConfig::new("price", FieldType::Int64))
}

/// Two source segments in one file storage. Doc 1 of the first segment is
/// deleted. Merged ids: s0 {0->0, 2->1, 3->2, 4->3}, s1 {0->4, 1->5, 2->6, 3->7};
/// target 0 holds merged docs 0..4 and target 1 merged docs 4..8.
fn sources(root: &Arc<dyn Storage>) -> Vec<SourceSegment> {
    let k = DictKeyInfo::new;
    let first: Arc<dyn Storage> = Arc::new(PrefixedStorage::new("segment_0", root.clone()));
    write_index(
        &first,
        "title",
        TermIndexKind::Normal,
        vec![
            (k(1), entries(&[(0, 7), (1, 100), (2, 3), (3, 9), (4, 1)])),
            (k(2), entries(&[(2, 1)])),
        ],
    );
    write_index(&first, "tag", TermIndexKind::Normal, vec![(k(7), entries(&[(0, 0), (2, 0)]))]);
    write_index(
        &first,
        "tag",
        TermIndexKind::Bitmap,
        vec![(k(7), entries(&[(0, 0), (2, 0)])), (k(8), entries(&[(3, 0)]))],
    );
    write_patch(first.as_ref(), "title", &[PatchRecord::delete(k(1), 1)]).unwrap();

    let second: Arc<dyn Storage> = Arc::new(PrefixedStorage::new("segment_1", root.clone()));
    write_index(
        &second,
        "title",
        TermIndexKind::Normal,
        vec![
            (k(1), entries(&[(0, 8), (1, 2), (2, 6), (3, 4)])),
            (k(2), entries(&[(1, 1)])),
        ],
    );
    write_patch(second.as_ref(), "title", &[PatchRecord::add(k(5), 3)]).unwrap();

    let first_price = [10i64, 999, 30, 20, 50].map(Some);
    let second_price = [40i64, 5, 60, 15].map(Some);
    vec![
        SourceSegment::new(0, 5, first)
            .with_deleted(&[1])
            .with_attribute(
                "price",
                Arc::new(MemoryAttributeIndexer::from_values(FieldType::Int64, false, &first_price).unwrap()),
            ),
        SourceSegment::new(1, 4, second).with_attribute(
            "price",
            Arc::new(MemoryAttributeIndexer::from_values(FieldType::Int64, false, &second_price).unwrap()),
        ),
    ]
}

fn truncate_config(schema: &IndexSchema) -> TruncateOptionConfig {
    TruncateOptionConfig::build(
        vec![TruncateStrategy::new("top3", 3, 3), TruncateStrategy::new("top2", 3, 2)],
        vec![
            TruncateProfileConfig::new("price_desc", "-price", "top3"),
            TruncateProfileConfig::new("payload", "-DOC_PAYLOAD", "top2"),
        ],
        schema,
    )
    .unwrap()
}

#[test]
fn test_merge_builds_normal_and_truncate_indexes() {
    let dir = Builder::new().prefix("test_truncate_merge").tempdir().unwrap();
    let root = StorageFactory::create(StorageConfig::File(FileStorageConfig::new(dir.path()))).unwrap();
    let schema = Arc::new(schema());
    let sources = sources(&root);
    let mapper = Arc::new(DocMapper::build(&sources, TargetSplit::Even(2)).unwrap());
    let out_a: Arc<dyn Storage> = Arc::new(PrefixedStorage::new("segment_2", root.clone()));
    let out_b: Arc<dyn Storage> = Arc::new(PrefixedStorage::new("segment_3", root.clone()));
    let plan = SegmentMergePlan::new(
        sources,
        vec![TargetSegment::new(2, out_a.clone()), TargetSegment::new(3, out_b.clone())],
    )
    .with_doc_mapper(mapper);
    let options = MergeOptions::from_lookup(|name| (name == "TRUNCATE_THREAD_COUNT").then(|| "3".to_string()));
    let config = Arc::new(truncate_config(&schema));

    let results = merge_inverted_indexes(schema, Some(config), &plan, &options, None).unwrap();
    let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["title", "body", "tag"]);
    let title = &results[0].1;
    assert_eq!(title.normal_terms, vec![2, 2]);
    assert_eq!(
        title.truncate_indexes,
        vec!["title_price_desc".to_string(), "title_payload".to_string()]
    );
    assert_eq!(title.patch_records, 1);
    assert!(results[1].1.skipped);
    assert_eq!(results[2].1.bitmap_terms, 1);
    assert_eq!(results[2].1.dropped_bitmap_terms, 1);

    let k = DictKeyInfo::new;
    assert_eq!(
        read_index(out_a.as_ref(), "index/title", TermIndexKind::Normal),
        vec![(k(1), vec![(0, 7), (1, 3), (2, 9), (3, 1)]), (k(2), vec![(1, 1)])]
    );
    assert_eq!(
        read_index(out_b.as_ref(), "index/title", TermIndexKind::Normal),
        vec![(k(1), vec![(0, 8), (1, 2), (2, 6), (3, 4)]), (k(2), vec![(1, 1)])]
    );

    // price: merged 3 = 50, 4 = 40, 6 = 60 are the top three
    assert_eq!(
        read_index(out_a.as_ref(), "index/title_price_desc", TermIndexKind::Normal),
        vec![(k(1), vec![(3, 1)])]
    );
    assert_eq!(
        read_index(out_b.as_ref(), "index/title_price_desc", TermIndexKind::Normal),
        vec![(k(1), vec![(0, 8), (2, 6)])]
    );
    let meta = TruncateMetaReader::open(out_a.as_ref(), "title_price_desc", true).unwrap();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta.lookup(&k(1)), Some((40, i64::MAX)));

    // payload: merged 2 (9) and 4 (8)
    assert_eq!(
        read_index(out_a.as_ref(), "index/title_payload", TermIndexKind::Normal),
        vec![(k(1), vec![(2, 9)])]
    );
    assert_eq!(
        read_index(out_b.as_ref(), "index/title_payload", TermIndexKind::Normal),
        vec![(k(1), vec![(0, 8)])]
    );
    assert!(!out_a.file_exists("truncate_meta/title_payload"));

    assert!(!out_a.file_exists(&patch_file("title")));
    assert_eq!(
        read_patch(out_b.as_ref(), "title").unwrap().unwrap(),
        vec![PatchRecord::add(k(5), 3)]
    );

    assert!(read_index(out_a.as_ref(), "index/body", TermIndexKind::Normal).is_empty());
    assert_eq!(
        read_index(out_a.as_ref(), "index/tag", TermIndexKind::Bitmap),
        vec![(k(7), vec![(0, 0), (1, 0)])]
    );
    assert!(read_index(out_b.as_ref(), "index/tag", TermIndexKind::Bitmap).is_empty());
}

#[test]
fn test_restarted_merge_reuses_task_resources() {
    let root = StorageFactory::create(StorageConfig::Memory(Default::default())).unwrap();
    let schema = Arc::new(schema());
    let sources = sources(&root);
    let mapper = DocMapper::build(&sources, TargetSplit::Even(1)).unwrap();
    let manager = IndexTaskResourceManager::new(Arc::new(PrefixedStorage::new("task", root.clone())));
    manager.commit("doc_mapper", &mapper).unwrap();

    let config = Arc::new(truncate_config(&schema));
    let options = MergeOptions::default();
    let mut outputs = Vec::new();
    for attempt in 0..2 {
        let out: Arc<dyn Storage> = Arc::new(PrefixedStorage::new(format!("attempt_{attempt}"), root.clone()));
        let plan = SegmentMergePlan::new(sources.clone(), vec![TargetSegment::new(2, out.clone())]);
        merge_inverted_indexes(schema.clone(), Some(config.clone()), &plan, &options, Some(&manager)).unwrap();
        assert!(manager.has_resource::<BucketMap>(&bucket_map_resource_name("price_desc")));
        assert!(!manager.has_resource::<BucketMap>(&bucket_map_resource_name("payload")));
        outputs.push(read_index(out.as_ref(), "index/title_price_desc", TermIndexKind::Normal));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], vec![(DictKeyInfo::new(1), vec![(3, 1), (4, 8), (6, 6)])]);
}
