//! Wires a truncate index property into a concrete [`DocCollector`].

use std::sync::Arc;

use crate::error::{IrisError, Result};
use crate::index::inverted::truncate::attribute_reader::TruncateAttributeReaderCreator;
use crate::index::inverted::truncate::bucket_map_creator::BucketMaps;
use crate::index::inverted::truncate::collector::no_sort::NoSortTruncateCollector;
use crate::index::inverted::truncate::collector::sort::{
    BucketSortTruncateCollector, PayloadSortTruncateCollector,
};
use crate::index::inverted::truncate::collector::{CollectorCore, DocCollector};
use crate::index::inverted::truncate::comparator::{Comparator, create_comparator};
use crate::index::inverted::truncate::config::{
    DOC_PAYLOAD_FIELD_NAME, TruncateIndexProperty, TruncateProfile,
};
use crate::index::inverted::truncate::distinctor::{DocDistinctor, create_distinctor};
use crate::index::inverted::truncate::evaluator::{
    DocPayloadEvaluator, Evaluator, MultiAttributeEvaluator, create_attribute_evaluator,
};
use crate::index::inverted::truncate::filter::{
    DocFilterProcessor, DocPayloadFilterProcessor, create_attribute_filter,
};
use crate::index::inverted::truncate::meta::TruncateMetaReader;
use crate::index::inverted::truncate::reference::DocInfoAllocator;
use crate::schema::{FieldType, IndexSchema};

pub struct DocCollectorCreator<'a> {
    schema: &'a IndexSchema,
    readers: &'a TruncateAttributeReaderCreator,
    bucket_maps: &'a BucketMaps,
}

impl<'a> DocCollectorCreator<'a> {
    pub fn new(
        schema: &'a IndexSchema,
        readers: &'a TruncateAttributeReaderCreator,
        bucket_maps: &'a BucketMaps,
    ) -> Self {
        DocCollectorCreator {
            schema,
            readers,
            bucket_maps,
        }
    }

    pub fn create(
        &self,
        property: &TruncateIndexProperty,
        meta_reader: Option<Arc<TruncateMetaReader>>,
    ) -> Result<Box<dyn DocCollector>> {
        let strategy = &property.strategy;
        let profile = &property.profile;
        let core = CollectorCore::new(
            strategy.min_doc_count_to_reserve(),
            strategy.max_doc_count_to_reserve(),
            self.create_filter(property, meta_reader)?,
            self.create_distinctor(property)?,
        );

        if !strategy.has_limit() || !profile.has_sort() {
            return Ok(Box::new(NoSortTruncateCollector::new(core)));
        }
        if profile.is_sort_by_doc_payload() {
            let (allocator, evaluator, comparators) = self.payload_ranking(profile)?;
            return Ok(Box::new(PayloadSortTruncateCollector::new(
                core,
                allocator,
                evaluator,
                comparators,
            )));
        }
        let bucket_map = self.bucket_maps.get(&profile.name).ok_or_else(|| {
            IrisError::not_found(format!("bucket map of truncate profile [{}]", profile.name))
        })?;
        Ok(Box::new(BucketSortTruncateCollector::new(
            core,
            bucket_map.clone(),
            strategy.memory_optimize_threshold,
        )))
    }

    fn create_filter(
        &self,
        property: &TruncateIndexProperty,
        meta_reader: Option<Arc<TruncateMetaReader>>,
    ) -> Result<Option<Box<dyn DocFilterProcessor>>> {
        let constrain = &property.strategy.diversity_constrain;
        if !constrain.need_filter() {
            return Ok(None);
        }
        let meta_reader = if constrain.filter_by_meta() { meta_reader } else { None };
        if constrain.filter_field == DOC_PAYLOAD_FIELD_NAME {
            let evaluator = self.payload_factor_evaluator(&property.profile)?;
            return Ok(Some(Box::new(DocPayloadFilterProcessor::new(
                constrain,
                meta_reader,
                evaluator,
            ))));
        }
        let reader = self.readers.create(&constrain.filter_field)?;
        Ok(Some(create_attribute_filter(reader, constrain, meta_reader)))
    }

    fn create_distinctor(&self, property: &TruncateIndexProperty) -> Result<Option<Box<dyn DocDistinctor>>> {
        let constrain = &property.strategy.diversity_constrain;
        if !constrain.need_distinct() {
            return Ok(None);
        }
        let reader = self.readers.create(&constrain.distinct_field)?;
        Ok(Some(create_distinctor(reader, constrain.distinct_count)))
    }

    /// Payload evaluator with the profile's factor, for filtering on the
    /// scaled payload. `None` when the profile has no factor.
    fn payload_factor_evaluator(&self, profile: &TruncateProfile) -> Result<Option<Box<dyn Evaluator>>> {
        let Some(factor) = profile.doc_payload_factor.as_deref() else {
            return Ok(None);
        };
        let mut allocator = DocInfoAllocator::new();
        let payload_ref = allocator.declare_reference(DOC_PAYLOAD_FIELD_NAME, FieldType::Double, false)?;
        let factor = self.attribute_evaluator(&mut allocator, factor)?;
        Ok(Some(Box::new(DocPayloadEvaluator::new(
            payload_ref,
            Some(factor),
            profile.doc_payload_use_fp16,
        ))))
    }

    fn attribute_evaluator(&self, allocator: &mut DocInfoAllocator, field: &str) -> Result<Box<dyn Evaluator>> {
        let attribute = self
            .schema
            .attribute(field)
            .ok_or_else(|| IrisError::not_found(format!("attribute [{field}] is not in the schema")))?;
        let reference = allocator.declare_reference(field, attribute.field_type, attribute.support_null)?;
        Ok(create_attribute_evaluator(self.readers.create(field)?, reference))
    }

    /// Scratch layout, evaluator and per-key comparators of a payload-first
    /// profile.
    fn payload_ranking(
        &self,
        profile: &TruncateProfile,
    ) -> Result<(DocInfoAllocator, Box<dyn Evaluator>, Vec<Box<dyn Comparator>>)> {
        let mut allocator = DocInfoAllocator::new();
        let payload_ref = allocator.declare_reference(DOC_PAYLOAD_FIELD_NAME, FieldType::Double, false)?;
        let factor = match profile.doc_payload_factor.as_deref() {
            Some(field) => Some(self.attribute_evaluator(&mut allocator, field)?),
            None => None,
        };

        let mut evaluators: Vec<Box<dyn Evaluator>> = vec![Box::new(DocPayloadEvaluator::new(
            payload_ref.clone(),
            factor,
            profile.doc_payload_use_fp16,
        ))];
        let mut comparators = Vec::with_capacity(profile.sort_params.len());
        for param in &profile.sort_params {
            if param.is_doc_payload() {
                comparators.push(create_comparator(payload_ref.clone(), param.pattern));
                continue;
            }
            evaluators.push(self.attribute_evaluator(&mut allocator, &param.field)?);
            let reference = allocator
                .reference(&param.field)
                .cloned()
                .ok_or_else(|| IrisError::internal(format!("reference [{}] vanished", param.field)))?;
            comparators.push(create_comparator(reference, param.pattern));
        }
        Ok((
            allocator,
            Box::new(MultiAttributeEvaluator::new(evaluators)),
            comparators,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::MemoryAttributeIndexer;
    use crate::index::inverted::DictKeyInfo;
    use crate::index::inverted::doc_mapper::{DocMapper, TargetSplit};
    use crate::index::inverted::posting::{BufferedPostingIterator, PostingData, PostingEntry};
    use crate::index::inverted::segment::SourceSegment;
    use crate::index::inverted::truncate::bucket_map_creator::BucketMapCreator;
    use crate::index::inverted::truncate::config::{
        NO_LIMIT, TruncateOptionConfig, TruncateProfileConfig, TruncateStrategy,
    };
    use crate::schema::{AttributeConfig, InvertedIndexConfig};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    struct Fixture {
        schema: IndexSchema,
        readers: TruncateAttributeReaderCreator,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let price = MemoryAttributeIndexer::from_values(
            FieldType::Int32,
            false,
            &[Some(3i32), Some(8), Some(1), Some(6), Some(7)],
        )
        .unwrap();
        let boost = MemoryAttributeIndexer::from_values(
            FieldType::Int32,
            false,
            &[Some(1i32), Some(1), Some(10), Some(1), Some(1)],
        )
        .unwrap();
        let sources = vec![
            SourceSegment::new(0, 5, storage)
                .with_attribute("price", Arc::new(price))
                .with_attribute("boost", Arc::new(boost)),
        ];
        let schema = IndexSchema::new()
            .add_index(InvertedIndexConfig::new("title").with_truncate_profiles(Vec::<String>::new()))
            .add_attribute(AttributeConfig::new("price", FieldType::Int32))
            .add_attribute(AttributeConfig::new("boost", FieldType::Int32));
        let mapper = Arc::new(DocMapper::build(&sources, TargetSplit::Even(1)).unwrap());
        let readers =
            TruncateAttributeReaderCreator::new(Arc::new(schema.clone()), Arc::new(sources), mapper);
        Fixture { schema, readers }
    }

    fn property(
        fixture: &Fixture,
        strategy: TruncateStrategy,
        profile: TruncateProfileConfig,
    ) -> TruncateIndexProperty {
        let config = TruncateOptionConfig::build(vec![strategy], vec![profile], &fixture.schema).unwrap();
        config.index_config("title").unwrap().properties[0].clone()
    }

    fn run(collector: &mut dyn DocCollector, entries: Vec<PostingEntry>) -> Vec<u32> {
        let df = entries.len() as u64;
        let mut iter = BufferedPostingIterator::new(Arc::new(PostingData::from_entries(entries).unwrap()));
        collector.collect_doc_ids(&DictKeyInfo::new(1), &mut iter, df).unwrap();
        collector.truncate_doc_ids().to_vec()
    }

    fn docs(n: u32) -> Vec<PostingEntry> {
        (0..n).map(PostingEntry::new).collect()
    }

    #[test]
    fn test_no_limit_uses_no_sort() {
        let fixture = fixture();
        let property = property(
            &fixture,
            TruncateStrategy::new("all", 1, NO_LIMIT).with_filter("price", 5, 10),
            TruncateProfileConfig::new("p", "-price", "all"),
        );
        let maps = BucketMaps::new();
        let creator = DocCollectorCreator::new(&fixture.schema, &fixture.readers, &maps);
        let mut collector = creator.create(&property, None).unwrap();
        assert_eq!(run(collector.as_mut(), docs(5)), vec![1, 3, 4]);
    }

    #[test]
    fn test_attribute_sort_needs_bucket_map() {
        let fixture = fixture();
        let property = property(
            &fixture,
            TruncateStrategy::new("top", 1, 2),
            TruncateProfileConfig::new("p", "-price", "top"),
        );
        let empty = BucketMaps::new();
        let creator = DocCollectorCreator::new(&fixture.schema, &fixture.readers, &empty);
        assert!(matches!(creator.create(&property, None), Err(IrisError::NotFound(_))));

        let maps = BucketMapCreator::new(&fixture.schema, &fixture.readers, None, 4)
            .create(std::slice::from_ref(&property))
            .unwrap();
        let creator = DocCollectorCreator::new(&fixture.schema, &fixture.readers, &maps);
        let mut collector = creator.create(&property, None).unwrap();
        assert_eq!(run(collector.as_mut(), docs(5)), vec![1, 4]);
        assert_eq!(collector.min_value_doc_id(), Some(4));
    }

    #[test]
    fn test_payload_with_factor() {
        let fixture = fixture();
        let property = property(
            &fixture,
            TruncateStrategy::new("top", 1, 1),
            TruncateProfileConfig::new("p", "-DOC_PAYLOAD", "top").with_doc_payload(Some("boost"), false),
        );
        let maps = BucketMaps::new();
        let creator = DocCollectorCreator::new(&fixture.schema, &fixture.readers, &maps);
        let mut collector = creator.create(&property, None).unwrap();
        let entries = vec![
            PostingEntry::with_payload(0, 50),
            PostingEntry::with_payload(1, 40),
            PostingEntry::with_payload(2, 6),
        ];
        // 6 * 10 beats 50 * 1
        assert_eq!(run(collector.as_mut(), entries), vec![2]);
    }
}
