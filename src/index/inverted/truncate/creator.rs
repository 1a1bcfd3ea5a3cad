//! Builds the truncate writers of an inverted index.

use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::index::inverted::doc_mapper::DocMapper;
use crate::index::inverted::multi_segment_writer::MultiSegmentPostingWriter;
use crate::index::inverted::segment::{SourceSegment, TargetSegment};
use crate::index::inverted::truncate::attribute_reader::TruncateAttributeReaderCreator;
use crate::index::inverted::truncate::bucket_map_creator::{BucketMapCreator, BucketMaps};
use crate::index::inverted::truncate::collector::creator::DocCollectorCreator;
use crate::index::inverted::truncate::config::{
    TruncateIndexProperty, TruncateOptionConfig, TruncateStrategyType,
};
use crate::index::inverted::truncate::evaluator::create_attribute_evaluator;
use crate::index::inverted::truncate::meta::{TruncateMetaReader, TruncateMetaWriter};
use crate::index::inverted::truncate::multi_writer::MultiTruncateIndexWriter;
use crate::index::inverted::truncate::reference::DocInfoAllocator;
use crate::index::inverted::truncate::scheduler::create_scheduler;
use crate::index::inverted::truncate::trigger::create_trigger;
use crate::index::inverted::truncate::writer::{
    SingleTruncateIndexWriter, TruncateIndexWriter, TruncateMetaOutput,
};
use crate::index::inverted::{TermIndexKind, index_dir};
use crate::index::merge_options::MergeOptions;
use crate::index::task_resource::IndexTaskResourceManager;
use crate::schema::IndexSchema;

/// Shared state for every truncate writer of one merge: attribute readers
/// over the merged doc space and the bucket maps, built once up front.
pub struct TruncateIndexWriterCreator {
    option_config: Arc<TruncateOptionConfig>,
    schema: Arc<IndexSchema>,
    targets: Vec<TargetSegment>,
    doc_mapper: Arc<DocMapper>,
    options: MergeOptions,
    readers: TruncateAttributeReaderCreator,
    bucket_maps: BucketMaps,
}

impl TruncateIndexWriterCreator {
    pub fn new(
        option_config: Arc<TruncateOptionConfig>,
        schema: Arc<IndexSchema>,
        sources: Arc<Vec<SourceSegment>>,
        targets: Vec<TargetSegment>,
        doc_mapper: Arc<DocMapper>,
        options: MergeOptions,
        resource_manager: Option<&IndexTaskResourceManager>,
    ) -> Result<Self> {
        let readers = TruncateAttributeReaderCreator::new(schema.clone(), sources, doc_mapper.clone());
        let properties: Vec<TruncateIndexProperty> = option_config
            .index_configs()
            .iter()
            .flat_map(|config| config.properties.iter().cloned())
            .collect();
        let bucket_maps = BucketMapCreator::new(
            &schema,
            &readers,
            resource_manager,
            options.bucket_map_thread_limit,
        )
        .create(&properties)?;
        log::info!("{} bucket maps ready for truncation", bucket_maps.len());

        Ok(TruncateIndexWriterCreator {
            option_config,
            schema,
            targets,
            doc_mapper,
            options,
            readers,
            bucket_maps,
        })
    }

    pub fn bucket_maps(&self) -> &BucketMaps {
        &self.bucket_maps
    }

    /// Writers for every truncate index of `index_name`. A property that
    /// cannot be built is logged and skipped; `None` when nothing remains.
    pub fn create(&self, index_name: &str) -> Result<Option<MultiTruncateIndexWriter>> {
        let Some(config) = self.option_config.index_config(index_name) else {
            return Ok(None);
        };
        let mut writers: Vec<Box<dyn TruncateIndexWriter>> = Vec::with_capacity(config.properties.len());
        for property in &config.properties {
            match self.create_single_writer(property) {
                Ok(writer) => writers.push(writer),
                Err(e) => log::error!(
                    "skip truncate index [{}] of index [{index_name}]: {e}",
                    property.truncate_index_name
                ),
            }
        }
        if writers.is_empty() {
            return Ok(None);
        }
        let scheduler = create_scheduler(self.options.truncate_thread_count)?;
        log::info!("index [{index_name}]: {} truncate writers", writers.len());
        Ok(Some(MultiTruncateIndexWriter::new(writers, scheduler)))
    }

    fn create_single_writer(&self, property: &TruncateIndexProperty) -> Result<Box<dyn TruncateIndexWriter>> {
        let meta_reader = self.load_meta_reader(property)?;
        let trigger = create_trigger(&property.strategy, meta_reader.clone());
        let collector = DocCollectorCreator::new(&self.schema, &self.readers, &self.bucket_maps)
            .create(property, meta_reader)?;
        let posting_writer = MultiSegmentPostingWriter::new(
            &self.targets,
            &index_dir(&property.truncate_index_name),
            TermIndexKind::Normal,
            self.doc_mapper.clone(),
        )?;
        let meta = self.meta_output(property)?;
        Ok(Box::new(SingleTruncateIndexWriter::new(
            property.truncate_index_name.clone(),
            trigger,
            collector,
            posting_writer,
            meta,
        )))
    }

    fn load_meta_reader(&self, property: &TruncateIndexProperty) -> Result<Option<Arc<TruncateMetaReader>>> {
        let strategy = &property.strategy;
        if strategy.strategy_type != TruncateStrategyType::TruncateMeta
            && !strategy.diversity_constrain.filter_by_meta()
        {
            return Ok(None);
        }
        let Some(storage) = self.options.truncate_meta_storage.as_ref() else {
            log::warn!(
                "truncate index [{}] reads truncate meta but no meta storage is configured",
                property.truncate_index_name
            );
            return Ok(None);
        };
        let reader = TruncateMetaReader::open(
            storage.as_ref(),
            &property.truncate_index_name,
            property.profile.first_sort_desc(),
        )?;
        Ok(Some(Arc::new(reader)))
    }

    /// Boundary values are recorded for attribute-sorted profiles only.
    fn meta_output(&self, property: &TruncateIndexProperty) -> Result<Option<TruncateMetaOutput>> {
        let profile = &property.profile;
        let Some(primary) = profile.sort_params.first() else {
            return Ok(None);
        };
        if primary.is_doc_payload() {
            return Ok(None);
        }
        let target = self
            .targets
            .first()
            .ok_or_else(|| IrisError::invalid_argument("merge has no target segment"))?;
        let attribute = self.schema.attribute(&primary.field).ok_or_else(|| {
            IrisError::not_found(format!("attribute [{}] is not in the schema", primary.field))
        })?;
        let mut allocator = DocInfoAllocator::new();
        let reference =
            allocator.declare_reference(&primary.field, attribute.field_type, attribute.support_null)?;
        Ok(Some(TruncateMetaOutput {
            writer: TruncateMetaWriter::new(target.storage.clone(), &property.truncate_index_name),
            evaluator: create_attribute_evaluator(self.readers.create(&primary.field)?, reference),
        }))
    }
}
