//! Builds one [`BucketMap`] per ranking profile before the term loop.
//!
//! Every document of the merged space is evaluated into a [`DocInfo`],
//! ranked by the profile's sort keys and its rank stored in the map. Maps
//! already committed to the task resource manager are loaded instead.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::error::{IrisError, Result};
use crate::index::inverted::truncate::attribute_reader::TruncateAttributeReaderCreator;
use crate::index::inverted::truncate::bucket_map::{BucketMap, bucket_map_resource_name};
use crate::index::inverted::truncate::comparator::{Comparator, create_comparator};
use crate::index::inverted::truncate::config::{
    TruncateIndexProperty, TruncateProfile, TruncateStrategy,
};
use crate::index::inverted::truncate::evaluator::{Evaluator, create_attribute_evaluator};
use crate::index::inverted::truncate::reference::{DocInfo, DocInfoAllocator};
use crate::index::task_resource::IndexTaskResourceManager;
use crate::schema::IndexSchema;

/// Bucket maps by profile name.
pub type BucketMaps = AHashMap<String, Arc<BucketMap>>;

/// Whether `profile` ranks by attributes that all exist and `strategy`
/// keeps a bounded number of documents.
pub fn need_create_bucket_map(
    profile: &TruncateProfile,
    strategy: &TruncateStrategy,
    schema: &IndexSchema,
) -> bool {
    strategy.has_limit()
        && profile.has_sort()
        && !profile.is_sort_by_doc_payload()
        && profile
            .sort_attribute_fields()
            .all(|param| schema.attribute(&param.field).is_some())
}

/// Hierarchical sort: order by the first comparator, then sort every run of
/// ties by the next one. Remaining ties keep their incoming order.
struct SortWorkItem<'a> {
    comparators: &'a [Box<dyn Comparator>],
}

impl SortWorkItem<'_> {
    fn sort(&self, docs: &mut [DocInfo]) {
        self.sort_dimension(docs, 0);
    }

    fn sort_dimension(&self, docs: &mut [DocInfo], dim: usize) {
        let Some(comparator) = self.comparators.get(dim) else {
            return;
        };
        if docs.len() < 2 {
            return;
        }
        docs.sort_by(|a, b| order(comparator.as_ref(), a, b));
        if dim + 1 == self.comparators.len() {
            return;
        }
        let mut begin = 0;
        while begin < docs.len() {
            let mut end = begin + 1;
            while end < docs.len() && order(comparator.as_ref(), &docs[begin], &docs[end]).is_eq() {
                end += 1;
            }
            if end - begin > 1 {
                self.sort_dimension(&mut docs[begin..end], dim + 1);
            }
            begin = end;
        }
    }
}

fn order(comparator: &dyn Comparator, a: &DocInfo, b: &DocInfo) -> Ordering {
    if comparator.less_than(a, b) {
        Ordering::Less
    } else if comparator.less_than(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

pub struct BucketMapCreator<'a> {
    schema: &'a IndexSchema,
    readers: &'a TruncateAttributeReaderCreator,
    resource_manager: Option<&'a IndexTaskResourceManager>,
    thread_limit: usize,
}

impl<'a> BucketMapCreator<'a> {
    pub fn new(
        schema: &'a IndexSchema,
        readers: &'a TruncateAttributeReaderCreator,
        resource_manager: Option<&'a IndexTaskResourceManager>,
        thread_limit: usize,
    ) -> Self {
        BucketMapCreator {
            schema,
            readers,
            resource_manager,
            thread_limit: thread_limit.max(1),
        }
    }

    /// Bucket maps for every profile among `properties` that needs one.
    pub fn create(&self, properties: &[TruncateIndexProperty]) -> Result<BucketMaps> {
        let mut profiles: Vec<&Arc<TruncateProfile>> = Vec::new();
        for property in properties {
            if profiles.iter().any(|p| p.name == property.profile.name) {
                continue;
            }
            if need_create_bucket_map(&property.profile, &property.strategy, self.schema) {
                profiles.push(&property.profile);
            } else {
                log::debug!("truncate profile [{}] needs no bucket map", property.profile.name);
            }
        }
        if profiles.is_empty() {
            return Ok(BucketMaps::new());
        }

        let threads = profiles
            .len()
            .min(self.thread_limit)
            .min(num_cpus::get())
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("bucket-map-{idx}"))
            .build()
            .map_err(|e| IrisError::internal(format!("bucket map thread pool: {e}")))?;
        log::info!("creating {} bucket maps with {threads} threads", profiles.len());

        let maps = pool.install(|| {
            profiles
                .par_iter()
                .map(|profile| {
                    self.load_or_build(profile)
                        .map(|map| (profile.name.clone(), Arc::new(map)))
                        .map_err(|e| {
                            IrisError::internal(format!(
                                "create bucket map of profile [{}]: {e}",
                                profile.name
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(maps.into_iter().collect())
    }

    fn load_or_build(&self, profile: &TruncateProfile) -> Result<BucketMap> {
        let resource_name = bucket_map_resource_name(&profile.name);
        if let Some(manager) = self.resource_manager
            && manager.has_resource::<BucketMap>(&resource_name)
        {
            log::info!("loading bucket map [{resource_name}] from task resources");
            return manager.load(&resource_name);
        }
        let map = self.build(profile)?;
        if let Some(manager) = self.resource_manager {
            manager.commit(&resource_name, &map)?;
        }
        Ok(map)
    }

    fn build(&self, profile: &TruncateProfile) -> Result<BucketMap> {
        let total = self.readers.doc_mapper().new_doc_count();
        let mut allocator = DocInfoAllocator::new();
        let mut evaluators: Vec<Box<dyn Evaluator>> = Vec::new();
        let mut comparators: Vec<Box<dyn Comparator>> = Vec::new();
        for param in profile.sort_attribute_fields() {
            let attribute = self.schema.attribute(&param.field).ok_or_else(|| {
                IrisError::not_found(format!("sort attribute [{}] is not in the schema", param.field))
            })?;
            let reference =
                allocator.declare_reference(&param.field, attribute.field_type, attribute.support_null)?;
            let reader = self.readers.create(&param.field)?;
            evaluators.push(create_attribute_evaluator(reader, reference.clone()));
            comparators.push(create_comparator(reference, param.pattern));
        }

        let mut docs = Vec::with_capacity(total as usize);
        for doc_id in 0..total {
            let mut doc_info = allocator.allocate();
            doc_info.set_doc_id(doc_id);
            for evaluator in &mut evaluators {
                evaluator.evaluate(doc_id, None, &mut doc_info)?;
            }
            docs.push(doc_info);
        }
        SortWorkItem {
            comparators: &comparators,
        }
        .sort(&mut docs);

        let mut map = BucketMap::new(profile.name.clone(), total);
        for (rank, doc_info) in docs.iter().enumerate() {
            map.set_sort_value(doc_info.doc_id(), rank as u32);
        }
        log::debug!(
            "built bucket map [{}]: {total} docs in {} buckets",
            profile.name,
            map.bucket_count()
        );
        Ok(map)
    }
}
