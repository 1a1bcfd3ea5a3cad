//! Typed fields inside fixed-layout per-document scratch records.
//!
//! A [`DocInfo`] is a byte buffer whose first four bytes hold the doc id.
//! Every [`Reference`] declared on a [`DocInfoAllocator`] owns a slot after
//! that: an optional null flag byte followed by the little-endian value.
//! Layouts are fixed once the first record is allocated.

use ahash::AHashMap;

use crate::error::{IrisError, Result};
use crate::index::DocId;
use crate::schema::{FieldType, NativeValue};

const DOC_ID_SIZE: usize = std::mem::size_of::<DocId>();

/// Scratch record of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocInfo {
    buf: Vec<u8>,
}

impl DocInfo {
    fn zeroed(size: usize) -> Self {
        DocInfo { buf: vec![0; size] }
    }

    pub fn doc_id(&self) -> DocId {
        DocId::read_le(&self.buf)
    }

    pub fn set_doc_id(&mut self, doc_id: DocId) {
        doc_id.write_le(&mut self.buf);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// A typed slot inside [`DocInfo`] records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    name: String,
    offset: usize,
    field_type: FieldType,
    support_null: bool,
}

impl Reference {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn support_null(&self) -> bool {
        self.support_null
    }

    /// Bytes occupied in the record.
    pub fn size(&self) -> usize {
        usize::from(self.support_null) + self.field_type.native_size()
    }

    fn value_offset(&self) -> usize {
        self.offset + usize::from(self.support_null)
    }

    pub fn is_null(&self, doc_info: &DocInfo) -> bool {
        self.support_null && doc_info.buf[self.offset] != 0
    }

    /// Read the value. `T` must be the native type of the field type.
    pub fn get<T: NativeValue>(&self, doc_info: &DocInfo) -> Option<T> {
        debug_assert_eq!(T::SIZE, self.field_type.native_size());
        if self.is_null(doc_info) {
            return None;
        }
        Some(T::read_le(&doc_info.buf[self.value_offset()..]))
    }

    /// Write the value. `None` on a non-nullable slot stores the default.
    pub fn set<T: NativeValue>(&self, value: Option<T>, doc_info: &mut DocInfo) {
        debug_assert_eq!(T::SIZE, self.field_type.native_size());
        if self.support_null {
            doc_info.buf[self.offset] = u8::from(value.is_none());
        }
        let offset = self.value_offset();
        value.unwrap_or_default().write_le(&mut doc_info.buf[offset..]);
    }

    /// Decimal rendering of the value, or `NULL`.
    pub fn string_value(&self, doc_info: &DocInfo) -> String {
        crate::dispatch_field_type!(self.field_type, T => match self.get::<T>(doc_info) {
            Some(value) => value.render(),
            None => "NULL".to_string(),
        })
    }
}

/// Declares references and hands out zeroed records of the resulting size.
///
/// Released records go to a free list and are reused by later allocations.
#[derive(Debug)]
pub struct DocInfoAllocator {
    references: Vec<Reference>,
    by_name: AHashMap<String, usize>,
    doc_info_size: usize,
    free: Vec<DocInfo>,
    allocated: usize,
    layout_frozen: bool,
}

impl Default for DocInfoAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DocInfoAllocator {
    pub fn new() -> Self {
        DocInfoAllocator {
            references: Vec::new(),
            by_name: AHashMap::new(),
            doc_info_size: DOC_ID_SIZE,
            free: Vec::new(),
            allocated: 0,
            layout_frozen: false,
        }
    }

    /// Declare a field, or return the existing reference of that name.
    pub fn declare_reference(
        &mut self,
        name: &str,
        field_type: FieldType,
        support_null: bool,
    ) -> Result<Reference> {
        if let Some(&idx) = self.by_name.get(name) {
            let existing = &self.references[idx];
            if existing.field_type != field_type || existing.support_null != support_null {
                return Err(IrisError::invalid_argument(format!(
                    "reference [{name}] redeclared as {field_type:?} (was {:?})",
                    existing.field_type
                )));
            }
            return Ok(existing.clone());
        }
        if self.layout_frozen {
            return Err(IrisError::invalid_operation(format!(
                "cannot declare reference [{name}] after allocation started"
            )));
        }
        let reference = Reference {
            name: name.to_string(),
            offset: self.doc_info_size,
            field_type,
            support_null,
        };
        self.doc_info_size += reference.size();
        self.by_name.insert(name.to_string(), self.references.len());
        self.references.push(reference.clone());
        Ok(reference)
    }

    pub fn reference(&self, name: &str) -> Option<&Reference> {
        self.by_name.get(name).map(|&idx| &self.references[idx])
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn doc_info_size(&self) -> usize {
        self.doc_info_size
    }

    /// A zeroed record.
    pub fn allocate(&mut self) -> DocInfo {
        self.layout_frozen = true;
        self.allocated += 1;
        match self.free.pop() {
            Some(mut doc_info) => {
                doc_info.buf.fill(0);
                doc_info
            }
            None => DocInfo::zeroed(self.doc_info_size),
        }
    }

    pub fn deallocate(&mut self, doc_info: DocInfo) {
        self.allocated = self.allocated.saturating_sub(1);
        if doc_info.size() == self.doc_info_size {
            self.free.push(doc_info);
        }
    }

    /// Records handed out and not yet returned.
    pub fn allocated_count(&self) -> usize {
        self.allocated
    }

    /// Forget outstanding records, keeping pooled buffers for reuse.
    pub fn reset(&mut self) {
        self.allocated = 0;
    }

    /// Drop pooled buffers.
    pub fn release(&mut self) {
        self.allocated = 0;
        self.free = Vec::new();
    }

    pub fn pooled_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_idempotent_declare() {
        let mut allocator = DocInfoAllocator::new();
        let price = allocator.declare_reference("price", FieldType::Int64, true).unwrap();
        let score = allocator.declare_reference("score", FieldType::Float, false).unwrap();
        assert_eq!(price.offset(), 4);
        assert_eq!(score.offset(), 4 + 1 + 8);
        assert_eq!(allocator.doc_info_size(), 4 + 9 + 4);

        let again = allocator.declare_reference("price", FieldType::Int64, true).unwrap();
        assert_eq!(again, price);
        assert!(allocator.declare_reference("price", FieldType::Int32, true).is_err());
    }

    #[test]
    fn test_get_set_null() {
        let mut allocator = DocInfoAllocator::new();
        let price = allocator.declare_reference("price", FieldType::Int64, true).unwrap();
        let flag = allocator.declare_reference("flag", FieldType::UInt8, false).unwrap();
        let mut doc = allocator.allocate();
        doc.set_doc_id(77);

        price.set(Some(-12i64), &mut doc);
        flag.set::<u8>(None, &mut doc);
        assert_eq!(doc.doc_id(), 77);
        assert_eq!(price.get::<i64>(&doc), Some(-12));
        assert_eq!(price.string_value(&doc), "-12");
        assert_eq!(flag.get::<u8>(&doc), Some(0));

        price.set::<i64>(None, &mut doc);
        assert_eq!(price.get::<i64>(&doc), None);
        assert_eq!(price.string_value(&doc), "NULL");
    }

    #[test]
    fn test_declare_after_allocate_fails() {
        let mut allocator = DocInfoAllocator::new();
        allocator.declare_reference("a", FieldType::Int32, false).unwrap();
        let doc = allocator.allocate();
        assert!(matches!(
            allocator.declare_reference("b", FieldType::Int32, false),
            Err(IrisError::InvalidOperation(_))
        ));
        assert!(allocator.declare_reference("a", FieldType::Int32, false).is_ok());
        allocator.deallocate(doc);
    }

    #[test]
    fn test_reused_records_are_zeroed() {
        let mut allocator = DocInfoAllocator::new();
        let value = allocator.declare_reference("v", FieldType::UInt32, true).unwrap();
        let mut doc = allocator.allocate();
        doc.set_doc_id(5);
        value.set(Some(99u32), &mut doc);
        allocator.deallocate(doc);
        assert_eq!(allocator.pooled_count(), 1);

        let doc = allocator.allocate();
        assert_eq!(allocator.pooled_count(), 0);
        assert_eq!(doc.doc_id(), 0);
        assert_eq!(value.get::<u32>(&doc), Some(0));
        allocator.deallocate(doc);
        allocator.release();
        assert_eq!(allocator.pooled_count(), 0);
    }
}
