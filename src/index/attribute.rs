//! Attribute column access used by truncation.
//!
//! An [`AttributeDiskIndexer`] serves fixed-width values of one attribute in
//! one segment. Readers hand out an opaque per-caller [`ReadContext`] so that
//! implementations can cache decoding state without locking.

use std::any::Any;
use std::fmt::Debug;

use bit_vec::BitVec;

use crate::error::{IrisError, Result};
use crate::index::DocId;
use crate::schema::{FieldType, NativeValue};

/// Per-reader scratch state, created by [`AttributeDiskIndexer::create_read_context`].
pub type ReadContext = Box<dyn Any + Send>;

/// Outcome of one attribute read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRead {
    /// Bytes written into the caller's buffer.
    pub len: usize,
    pub is_null: bool,
}

pub trait AttributeDiskIndexer: Send + Sync + Debug {
    fn field_type(&self) -> FieldType;

    fn support_null(&self) -> bool;

    fn doc_count(&self) -> u32;

    fn create_read_context(&self) -> ReadContext;

    /// Copy the value of `doc_id` into `buf`, which must hold at least
    /// `field_type().native_size()` bytes. Null values leave `buf` zeroed.
    fn read(&self, doc_id: DocId, ctx: &mut ReadContext, buf: &mut [u8]) -> Result<AttributeRead>;
}

/// An attribute column held in memory: little-endian values plus a null bitmap.
#[derive(Debug, Clone)]
pub struct MemoryAttributeIndexer {
    field_type: FieldType,
    support_null: bool,
    value_size: usize,
    data: Vec<u8>,
    nulls: BitVec,
}

impl MemoryAttributeIndexer {
    pub fn new(field_type: FieldType, support_null: bool) -> Self {
        MemoryAttributeIndexer {
            field_type,
            support_null,
            value_size: field_type.native_size(),
            data: Vec::new(),
            nulls: BitVec::new(),
        }
    }

    /// Build a column from values of native type `T`.
    pub fn from_values<T: NativeValue>(
        field_type: FieldType,
        support_null: bool,
        values: &[Option<T>],
    ) -> Result<Self> {
        let mut indexer = Self::new(field_type, support_null);
        for value in values {
            indexer.push(*value)?;
        }
        Ok(indexer)
    }

    /// Append the value of the next document.
    pub fn push<T: NativeValue>(&mut self, value: Option<T>) -> Result<()> {
        if T::SIZE != self.value_size {
            return Err(IrisError::invalid_argument(format!(
                "value of {} bytes pushed into {:?} attribute",
                T::SIZE,
                self.field_type
            )));
        }
        if value.is_none() && !self.support_null {
            return Err(IrisError::invalid_argument(format!(
                "null pushed into non-nullable {:?} attribute",
                self.field_type
            )));
        }
        let start = self.data.len();
        self.data.resize(start + self.value_size, 0);
        if let Some(value) = value {
            value.write_le(&mut self.data[start..]);
        }
        self.nulls.push(value.is_none());
        Ok(())
    }
}

impl AttributeDiskIndexer for MemoryAttributeIndexer {
    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn support_null(&self) -> bool {
        self.support_null
    }

    fn doc_count(&self) -> u32 {
        self.nulls.len() as u32
    }

    fn create_read_context(&self) -> ReadContext {
        Box::new(())
    }

    fn read(&self, doc_id: DocId, _ctx: &mut ReadContext, buf: &mut [u8]) -> Result<AttributeRead> {
        if doc_id >= self.doc_count() {
            return Err(IrisError::invalid_argument(format!(
                "doc {doc_id} out of attribute range {}",
                self.doc_count()
            )));
        }
        if buf.len() < self.value_size {
            return Err(IrisError::invalid_argument(format!(
                "read buffer of {} bytes, value needs {}",
                buf.len(),
                self.value_size
            )));
        }
        let is_null = self.nulls.get(doc_id as usize).unwrap_or(false);
        let start = doc_id as usize * self.value_size;
        if is_null {
            buf[..self.value_size].fill(0);
        } else {
            buf[..self.value_size].copy_from_slice(&self.data[start..start + self.value_size]);
        }
        Ok(AttributeRead {
            len: self.value_size,
            is_null,
        })
    }
}
