//! Range filters applied before documents are ranked.
//!
//! A value passes when `(value as u64 & mask) as i64` lies in `[min, max]`.
//! With a meta reader, `begin_filter` first narrows `[min, max]` to the range
//! recorded for the term and skips terms the meta file does not know.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Result;
use crate::index::DocId;
use crate::index::attribute::{AttributeDiskIndexer, ReadContext};
use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::posting::PostingIterator;
use crate::index::inverted::truncate::config::DiversityConstrain;
use crate::index::inverted::truncate::evaluator::Evaluator;
use crate::index::inverted::truncate::meta::TruncateMetaReader;
use crate::schema::NativeValue;

pub trait DocFilterProcessor: Send {
    /// Prepare for a term. `false` means no document of the term can pass.
    fn begin_filter(&mut self, key: &DictKeyInfo, posting: &dyn PostingIterator) -> bool;

    /// Whether the current document of `posting` (`doc_id`) is rejected.
    fn is_filtered(&mut self, doc_id: DocId, posting: &dyn PostingIterator) -> Result<bool>;
}

/// Configured range plus the per-term narrowed one.
#[derive(Debug, Clone)]
struct FilterRange {
    min: i64,
    max: i64,
    mask: u64,
    current_min: i64,
    current_max: i64,
    meta_reader: Option<Arc<TruncateMetaReader>>,
}

impl FilterRange {
    fn new(constrain: &DiversityConstrain, meta_reader: Option<Arc<TruncateMetaReader>>) -> Self {
        FilterRange {
            min: constrain.filter_min,
            max: constrain.filter_max,
            mask: constrain.filter_mask,
            current_min: constrain.filter_min,
            current_max: constrain.filter_max,
            meta_reader,
        }
    }

    fn begin(&mut self, key: &DictKeyInfo) -> bool {
        let (mut min, mut max) = (self.min, self.max);
        if let Some(reader) = &self.meta_reader {
            let Some((meta_min, meta_max)) = reader.lookup(key) else {
                return false;
            };
            min = min.max(meta_min);
            max = max.min(meta_max);
        }
        self.current_min = min;
        self.current_max = max;
        min <= max
    }

    fn accepts(&self, value: i64) -> bool {
        let masked = (value as u64 & self.mask) as i64;
        self.current_min <= masked && masked <= self.current_max
    }
}

/// Filters on a typed attribute. Null values are always filtered out.
pub struct DocFilterProcessorTyped<T: NativeValue> {
    reader: Arc<dyn AttributeDiskIndexer>,
    ctx: ReadContext,
    buf: Vec<u8>,
    range: FilterRange,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NativeValue> DocFilterProcessorTyped<T> {
    pub fn new(
        reader: Arc<dyn AttributeDiskIndexer>,
        constrain: &DiversityConstrain,
        meta_reader: Option<Arc<TruncateMetaReader>>,
    ) -> Self {
        let ctx = reader.create_read_context();
        DocFilterProcessorTyped {
            reader,
            ctx,
            buf: vec![0; T::SIZE],
            range: FilterRange::new(constrain, meta_reader),
            _marker: PhantomData,
        }
    }
}

impl<T: NativeValue> DocFilterProcessor for DocFilterProcessorTyped<T> {
    fn begin_filter(&mut self, key: &DictKeyInfo, _posting: &dyn PostingIterator) -> bool {
        self.range.begin(key)
    }

    fn is_filtered(&mut self, doc_id: DocId, _posting: &dyn PostingIterator) -> Result<bool> {
        let read = self.reader.read(doc_id, &mut self.ctx, &mut self.buf)?;
        if read.is_null {
            return Ok(true);
        }
        Ok(!self.range.accepts(T::read_le(&self.buf).to_i64()))
    }
}

pub fn create_attribute_filter(
    reader: Arc<dyn AttributeDiskIndexer>,
    constrain: &DiversityConstrain,
    meta_reader: Option<Arc<TruncateMetaReader>>,
) -> Box<dyn DocFilterProcessor> {
    crate::dispatch_field_type!(reader.field_type(), T => {
        Box::new(DocFilterProcessorTyped::<T>::new(reader, constrain, meta_reader))
            as Box<dyn DocFilterProcessor>
    })
}

/// Filters on the doc payload, or on a custom evaluator's value.
pub struct DocPayloadFilterProcessor {
    range: FilterRange,
    evaluator: Option<Box<dyn Evaluator>>,
}

impl DocPayloadFilterProcessor {
    pub fn new(
        constrain: &DiversityConstrain,
        meta_reader: Option<Arc<TruncateMetaReader>>,
        evaluator: Option<Box<dyn Evaluator>>,
    ) -> Self {
        DocPayloadFilterProcessor {
            range: FilterRange::new(constrain, meta_reader),
            evaluator,
        }
    }
}

impl DocFilterProcessor for DocPayloadFilterProcessor {
    fn begin_filter(&mut self, key: &DictKeyInfo, _posting: &dyn PostingIterator) -> bool {
        self.range.begin(key)
    }

    fn is_filtered(&mut self, doc_id: DocId, posting: &dyn PostingIterator) -> Result<bool> {
        let value = match self.evaluator.as_mut() {
            Some(evaluator) => evaluator.value(doc_id, Some(posting))? as i64,
            None => posting.doc_payload() as i64,
        };
        Ok(!self.range.accepts(value))
    }
}
