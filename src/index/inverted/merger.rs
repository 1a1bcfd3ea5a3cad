//! Merges one inverted index of several source segments into the target
//! segments, building adaptive bitmaps, truncate indexes and merged update
//! patches on the way.

use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::index::inverted::adaptive_bitmap::AdaptiveBitmapIndexWriter;
use crate::index::inverted::doc_mapper::{DOC_MAPPER_RESOURCE_NAME, DocMapper};
use crate::index::inverted::multi_segment_writer::MultiSegmentPostingWriter;
use crate::index::inverted::patch::merge_patches;
use crate::index::inverted::posting::{PostingData, PostingEntry};
use crate::index::inverted::segment::{SourceSegment, TargetSegment};
use crate::index::inverted::term_extender::{IndexTermExtender, TermOperation};
use crate::index::inverted::term_queue::{SegmentTermInfo, SegmentTermInfoQueue};
use crate::index::inverted::truncate::config::TruncateOptionConfig;
use crate::index::inverted::truncate::creator::TruncateIndexWriterCreator;
use crate::index::inverted::{TermIndexKind, index_dir};
use crate::index::merge_options::MergeOptions;
use crate::index::task_resource::IndexTaskResourceManager;
use crate::schema::{IndexSchema, InvertedIndexConfig, ShardingType};

/// Segments taking part in one merge.
#[derive(Debug, Clone)]
pub struct SegmentMergePlan {
    pub sources: Arc<Vec<SourceSegment>>,
    pub targets: Vec<TargetSegment>,
    /// Taken from the task resources when absent.
    pub doc_mapper: Option<Arc<DocMapper>>,
}

impl SegmentMergePlan {
    pub fn new(sources: Vec<SourceSegment>, targets: Vec<TargetSegment>) -> Self {
        SegmentMergePlan {
            sources: Arc::new(sources),
            targets,
            doc_mapper: None,
        }
    }

    pub fn with_doc_mapper(mut self, doc_mapper: Arc<DocMapper>) -> Self {
        self.doc_mapper = Some(doc_mapper);
        self
    }

    /// The plan's doc mapper, or the one committed as a task resource.
    pub fn resolve_doc_mapper(
        &self,
        resource_manager: Option<&IndexTaskResourceManager>,
    ) -> Result<Arc<DocMapper>> {
        let doc_mapper = match (&self.doc_mapper, resource_manager) {
            (Some(doc_mapper), _) => doc_mapper.clone(),
            (None, Some(manager)) if manager.has_resource::<DocMapper>(DOC_MAPPER_RESOURCE_NAME) => {
                Arc::new(manager.load::<DocMapper>(DOC_MAPPER_RESOURCE_NAME)?)
            }
            (None, _) => return Err(IrisError::not_found("doc mapper of the merge")),
        };
        if doc_mapper.source_segment_count() != self.sources.len() {
            return Err(IrisError::invalid_argument(format!(
                "doc mapper covers {} source segments, merge has {}",
                doc_mapper.source_segment_count(),
                self.sources.len()
            )));
        }
        Ok(doc_mapper)
    }
}

/// What a merge of one index produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// The index is sharded and was left to its shards.
    pub skipped: bool,
    pub terms: usize,
    /// Normal terms written per target segment.
    pub normal_terms: Vec<usize>,
    pub bitmap_terms: usize,
    /// Bitmap terms outside the high-frequency vocabulary.
    pub dropped_bitmap_terms: usize,
    /// Terms kept only as bitmaps.
    pub discarded_terms: usize,
    pub truncate_indexes: Vec<String>,
    pub patch_records: usize,
}

pub struct InvertedIndexMerger<'a> {
    index_config: InvertedIndexConfig,
    options: MergeOptions,
    truncate_creator: Option<&'a TruncateIndexWriterCreator>,
    resource_manager: Option<&'a IndexTaskResourceManager>,
}

impl<'a> InvertedIndexMerger<'a> {
    pub fn new(index_config: InvertedIndexConfig, options: MergeOptions) -> Self {
        InvertedIndexMerger {
            index_config,
            options,
            truncate_creator: None,
            resource_manager: None,
        }
    }

    pub fn with_truncate(mut self, creator: &'a TruncateIndexWriterCreator) -> Self {
        self.truncate_creator = Some(creator);
        self
    }

    pub fn with_resource_manager(mut self, resource_manager: &'a IndexTaskResourceManager) -> Self {
        self.resource_manager = Some(resource_manager);
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_config.name
    }

    /// Merge the index. Every failure is reported as [`IrisError::Io`]
    /// naming the index.
    pub fn merge(&self, plan: &SegmentMergePlan) -> Result<MergeStats> {
        if self.index_config.sharding == ShardingType::NeedSharding {
            log::info!("index [{}] is merged per shard, skipping", self.index_config.name);
            return Ok(MergeStats {
                skipped: true,
                ..Default::default()
            });
        }
        self.do_merge(plan).map_err(|e| {
            log::error!("merging index [{}] failed: {e}", self.index_config.name);
            IrisError::io(&self.index_config.name, e.to_string())
        })
    }

    fn do_merge(&self, plan: &SegmentMergePlan) -> Result<MergeStats> {
        let name = self.index_config.name.as_str();
        let doc_mapper = plan.resolve_doc_mapper(self.resource_manager)?;
        let dir = index_dir(name);
        let mut stats = MergeStats::default();

        let mut normal =
            MultiSegmentPostingWriter::new(&plan.targets, &dir, TermIndexKind::Normal, doc_mapper.clone())?;
        let mut bitmap = match self.index_config.high_frequency_vocabulary {
            Some(_) => Some(MultiSegmentPostingWriter::new(
                &plan.targets,
                &dir,
                TermIndexKind::Bitmap,
                doc_mapper.clone(),
            )?),
            None => None,
        };
        let adaptive = match self.index_config.adaptive_bitmap {
            Some(config) => Some(AdaptiveBitmapIndexWriter::new(
                name,
                config.trigger,
                &plan.targets,
                doc_mapper.clone(),
            )?),
            None => None,
        };
        let truncate = match self.truncate_creator {
            Some(creator) => creator.create(name)?,
            None => None,
        };
        if let Some(truncate) = &truncate {
            stats.truncate_indexes = truncate.truncate_index_names();
        }
        let mut extender = IndexTermExtender::new(self.index_config.clone(), adaptive, truncate);

        let mut queue = SegmentTermInfoQueue::new(&plan.sources, name)?;
        if self.options.preload_dict_key_count {
            let count = queue.distinct_key_count();
            log::debug!("index [{name}]: preloaded {count} dictionary keys");
            normal.reserve_terms(count);
        }

        let mut buffer = PostingData::new();
        while let Some((key, kind, terms)) = queue.next_term() {
            stats.terms += 1;
            merge_postings(&doc_mapper, &terms, &mut buffer)?;
            if buffer.is_empty() {
                continue;
            }
            match kind {
                TermIndexKind::Bitmap => {
                    let writer = match bitmap.as_mut() {
                        Some(writer) if !key.is_null && self.index_config.in_high_frequency_vocabulary(key.key) => {
                            writer
                        }
                        _ => {
                            stats.dropped_bitmap_terms += 1;
                            continue;
                        }
                    };
                    writer.write_term(key, &buffer)?;
                    stats.bitmap_terms += 1;
                }
                TermIndexKind::Normal => {
                    let posting = Arc::new(buffer);
                    match extender.extend_term(key, &posting)? {
                        TermOperation::Keep => normal.write_term(key, &posting)?,
                        TermOperation::Discard => stats.discarded_terms += 1,
                    }
                    // truncate jobs are done with the posting by now
                    buffer = Arc::try_unwrap(posting).unwrap_or_default();
                }
            }
        }

        stats.normal_terms = normal.close()?;
        if let Some(bitmap) = bitmap {
            bitmap.close()?;
        }
        extender.finish()?;
        stats.patch_records = merge_patches(name, &plan.sources, &plan.targets, &doc_mapper)?
            .iter()
            .sum();
        log::info!("index [{name}] merged: {stats:?}");
        Ok(stats)
    }
}

/// Concatenate the segment postings of one term into `out`, in merged doc
/// ids. Deleted documents are dropped.
fn merge_postings(doc_mapper: &DocMapper, terms: &[SegmentTermInfo], out: &mut PostingData) -> Result<()> {
    out.clear();
    for term in terms {
        for entry in term.read_posting()?.entries() {
            if let Some(doc_id) = doc_mapper.map(term.source_index, entry.doc_id) {
                out.push_unordered(PostingEntry { doc_id, ..*entry });
            }
        }
    }
    out.sort();
    Ok(())
}

/// Merge every index of `schema`. Truncate indexes are built when
/// `option_config` configures any.
pub fn merge_inverted_indexes(
    schema: Arc<IndexSchema>,
    option_config: Option<Arc<TruncateOptionConfig>>,
    plan: &SegmentMergePlan,
    options: &MergeOptions,
    resource_manager: Option<&IndexTaskResourceManager>,
) -> Result<Vec<(String, MergeStats)>> {
    let doc_mapper = plan.resolve_doc_mapper(resource_manager)?;
    let plan = plan.clone().with_doc_mapper(doc_mapper.clone());
    let creator = match option_config {
        Some(config) if !config.index_configs().is_empty() => Some(TruncateIndexWriterCreator::new(
            config,
            schema.clone(),
            plan.sources.clone(),
            plan.targets.clone(),
            doc_mapper,
            options.clone(),
            resource_manager,
        )?),
        _ => None,
    };

    let mut results = Vec::with_capacity(schema.indexes.len());
    for index in &schema.indexes {
        let mut merger = InvertedIndexMerger::new(index.clone(), options.clone());
        if let Some(creator) = &creator {
            merger = merger.with_truncate(creator);
        }
        if let Some(manager) = resource_manager {
            merger = merger.with_resource_manager(manager);
        }
        let stats = merger.merge(&plan)?;
        results.push((index.name.clone(), stats));
    }
    Ok(results)
}
