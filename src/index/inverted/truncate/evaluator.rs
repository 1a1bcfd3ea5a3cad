//! Evaluators materialize a document's ranking values into its [`DocInfo`].

use std::marker::PhantomData;
use std::sync::Arc;

use half::f16;

use crate::error::Result;
use crate::index::DocId;
use crate::index::attribute::{AttributeDiskIndexer, ReadContext};
use crate::index::inverted::posting::PostingIterator;
use crate::index::inverted::truncate::reference::{DocInfo, Reference};
use crate::schema::NativeValue;

pub trait Evaluator: Send {
    /// Store the document's value into `doc_info` through the evaluator's reference.
    fn evaluate(
        &mut self,
        doc_id: DocId,
        posting: Option<&dyn PostingIterator>,
        doc_info: &mut DocInfo,
    ) -> Result<()>;

    /// The document's value as `f64`. Null reads as zero; 128- and 256-bit
    /// attributes always read as zero.
    fn value(&mut self, doc_id: DocId, posting: Option<&dyn PostingIterator>) -> Result<f64>;
}

/// Reads a typed attribute.
pub struct AttributeEvaluator<T: NativeValue> {
    reader: Arc<dyn AttributeDiskIndexer>,
    ctx: ReadContext,
    reference: Reference,
    buf: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NativeValue> AttributeEvaluator<T> {
    pub fn new(reader: Arc<dyn AttributeDiskIndexer>, reference: Reference) -> Self {
        let ctx = reader.create_read_context();
        AttributeEvaluator {
            reader,
            ctx,
            reference,
            buf: vec![0; T::SIZE],
            _marker: PhantomData,
        }
    }

    fn read(&mut self, doc_id: DocId) -> Result<Option<T>> {
        let read = self.reader.read(doc_id, &mut self.ctx, &mut self.buf)?;
        Ok((!read.is_null).then(|| T::read_le(&self.buf)))
    }
}

impl<T: NativeValue> Evaluator for AttributeEvaluator<T> {
    fn evaluate(
        &mut self,
        doc_id: DocId,
        _posting: Option<&dyn PostingIterator>,
        doc_info: &mut DocInfo,
    ) -> Result<()> {
        let value = self.read(doc_id)?;
        self.reference.set(value, doc_info);
        Ok(())
    }

    fn value(&mut self, doc_id: DocId, _posting: Option<&dyn PostingIterator>) -> Result<f64> {
        Ok(self.read(doc_id)?.map(NativeValue::to_f64).unwrap_or(0.0))
    }
}

/// Build an [`AttributeEvaluator`] for the reference's field type.
pub fn create_attribute_evaluator(
    reader: Arc<dyn AttributeDiskIndexer>,
    reference: Reference,
) -> Box<dyn Evaluator> {
    crate::dispatch_field_type!(reference.field_type(), T => {
        Box::new(AttributeEvaluator::<T>::new(reader, reference)) as Box<dyn Evaluator>
    })
}

/// Reads the posting's doc payload, optionally as fp16 and optionally
/// multiplied by a factor attribute. Stored as `f64`.
pub struct DocPayloadEvaluator {
    reference: Reference,
    factor: Option<Box<dyn Evaluator>>,
    use_fp16: bool,
}

impl DocPayloadEvaluator {
    pub fn new(reference: Reference, factor: Option<Box<dyn Evaluator>>, use_fp16: bool) -> Self {
        DocPayloadEvaluator {
            reference,
            factor,
            use_fp16,
        }
    }
}

impl Evaluator for DocPayloadEvaluator {
    fn evaluate(
        &mut self,
        doc_id: DocId,
        posting: Option<&dyn PostingIterator>,
        doc_info: &mut DocInfo,
    ) -> Result<()> {
        let value = self.value(doc_id, posting)?;
        self.reference.set(Some(value), doc_info);
        Ok(())
    }

    fn value(&mut self, doc_id: DocId, posting: Option<&dyn PostingIterator>) -> Result<f64> {
        let raw = posting.map(|p| p.doc_payload()).unwrap_or(0);
        let payload = if self.use_fp16 {
            f16::from_bits(raw).to_f64()
        } else {
            raw as f64
        };
        match self.factor.as_mut() {
            Some(factor) => Ok(payload * factor.value(doc_id, posting)?),
            None => Ok(payload),
        }
    }
}

/// Runs several evaluators into the same record.
pub struct MultiAttributeEvaluator {
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl MultiAttributeEvaluator {
    pub fn new(evaluators: Vec<Box<dyn Evaluator>>) -> Self {
        MultiAttributeEvaluator { evaluators }
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl Evaluator for MultiAttributeEvaluator {
    fn evaluate(
        &mut self,
        doc_id: DocId,
        posting: Option<&dyn PostingIterator>,
        doc_info: &mut DocInfo,
    ) -> Result<()> {
        for evaluator in &mut self.evaluators {
            evaluator.evaluate(doc_id, posting, doc_info)?;
        }
        Ok(())
    }

    /// Value of the primary (first) evaluator.
    fn value(&mut self, doc_id: DocId, posting: Option<&dyn PostingIterator>) -> Result<f64> {
        match self.evaluators.first_mut() {
            Some(first) => first.value(doc_id, posting),
            None => Ok(0.0),
        }
    }
}
