//! "First N distinct values" bookkeeping for diversity constraints.

use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashSet;

use crate::error::Result;
use crate::index::DocId;
use crate::index::attribute::{AttributeDiskIndexer, ReadContext};
use crate::schema::NativeValue;

pub trait DocDistinctor: Send {
    /// Record the document's value. Returns `true` once the distinct budget
    /// is used up.
    fn distinct(&mut self, doc_id: DocId) -> Result<bool>;

    fn is_full(&self) -> bool;

    /// Distinct values still missing.
    fn left_count(&self) -> u64;

    fn reset(&mut self);

    fn estimate_memory_use(&self) -> usize;
}

/// Counts distinct non-null values of a typed attribute, up to `distinct_count`.
pub struct DocDistinctorTyped<T: NativeValue> {
    reader: Arc<dyn AttributeDiskIndexer>,
    ctx: ReadContext,
    buf: Vec<u8>,
    distinct_count: u64,
    seen: AHashSet<T::DistinctKey>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NativeValue> DocDistinctorTyped<T> {
    pub fn new(reader: Arc<dyn AttributeDiskIndexer>, distinct_count: u64) -> Self {
        let ctx = reader.create_read_context();
        DocDistinctorTyped {
            reader,
            ctx,
            buf: vec![0; T::SIZE],
            distinct_count,
            seen: AHashSet::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: NativeValue> DocDistinctor for DocDistinctorTyped<T> {
    fn distinct(&mut self, doc_id: DocId) -> Result<bool> {
        if self.is_full() {
            return Ok(true);
        }
        let read = self.reader.read(doc_id, &mut self.ctx, &mut self.buf)?;
        if !read.is_null {
            self.seen.insert(T::read_le(&self.buf).distinct_key());
        }
        Ok(self.is_full())
    }

    fn is_full(&self) -> bool {
        self.seen.len() as u64 >= self.distinct_count
    }

    fn left_count(&self) -> u64 {
        self.distinct_count.saturating_sub(self.seen.len() as u64)
    }

    fn reset(&mut self) {
        self.seen.clear();
    }

    fn estimate_memory_use(&self) -> usize {
        self.distinct_count as usize * (std::mem::size_of::<T::DistinctKey>() + 8)
    }
}

pub fn create_distinctor(
    reader: Arc<dyn AttributeDiskIndexer>,
    distinct_count: u64,
) -> Box<dyn DocDistinctor> {
    crate::dispatch_field_type!(reader.field_type(), T => {
        Box::new(DocDistinctorTyped::<T>::new(reader, distinct_count)) as Box<dyn DocDistinctor>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::MemoryAttributeIndexer;
    use crate::schema::FieldType;

    #[test]
    fn test_full_after_budget() {
        let column = Arc::new(
            MemoryAttributeIndexer::from_values(
                FieldType::Int32,
                true,
                &[Some(1i32), Some(1), None, Some(2), Some(3)],
            )
            .unwrap(),
        );
        let mut distinctor = create_distinctor(column, 2);
        assert_eq!(distinctor.left_count(), 2);
        assert!(!distinctor.distinct(0).unwrap());
        assert!(!distinctor.distinct(1).unwrap());
        // nulls do not count
        assert!(!distinctor.distinct(2).unwrap());
        assert_eq!(distinctor.left_count(), 1);
        assert!(distinctor.distinct(3).unwrap());
        assert!(distinctor.is_full());
        assert!(distinctor.distinct(4).unwrap());
        assert_eq!(distinctor.left_count(), 0);
    }

    #[test]
    fn test_reset_forgets_values() {
        let column = Arc::new(
            MemoryAttributeIndexer::from_values(FieldType::Double, false, &[Some(0.0f64), Some(-0.0)])
                .unwrap(),
        );
        let mut distinctor = create_distinctor(column, 2);
        distinctor.distinct(0).unwrap();
        distinctor.distinct(1).unwrap();
        assert_eq!(distinctor.left_count(), 1);
        distinctor.reset();
        assert_eq!(distinctor.left_count(), 2);
        assert!(!distinctor.is_full());
    }
}
