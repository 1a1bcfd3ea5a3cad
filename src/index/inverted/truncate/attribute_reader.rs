//! Attribute reads in the merged doc space.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::{IrisError, Result};
use crate::index::DocId;
use crate::index::attribute::{AttributeDiskIndexer, AttributeRead, ReadContext};
use crate::index::inverted::doc_mapper::DocMapper;
use crate::index::inverted::segment::SourceSegment;
use crate::schema::{AttributeConfig, FieldType, IndexSchema};

/// Serves an attribute by merged doc id: each read is mapped back to the
/// source segment and answered by that segment's indexer.
///
/// Sources without the attribute read as null (or zero when the attribute
/// is not nullable).
#[derive(Debug)]
pub struct TruncateAttributeReader {
    name: String,
    field_type: FieldType,
    support_null: bool,
    doc_mapper: Arc<DocMapper>,
    sources: Vec<Option<Arc<dyn AttributeDiskIndexer>>>,
}

struct SourceContexts(Vec<Option<ReadContext>>);

impl TruncateAttributeReader {
    pub fn create(
        attribute: &AttributeConfig,
        sources: &[SourceSegment],
        doc_mapper: Arc<DocMapper>,
    ) -> Result<Self> {
        if sources.len() != doc_mapper.source_segment_count() {
            return Err(IrisError::invalid_argument(format!(
                "attribute [{}]: {} sources but doc mapper knows {}",
                attribute.name,
                sources.len(),
                doc_mapper.source_segment_count()
            )));
        }
        let mut readers = Vec::with_capacity(sources.len());
        for segment in sources {
            let indexer = segment.attribute(&attribute.name).cloned();
            if let Some(indexer) = &indexer
                && indexer.field_type() != attribute.field_type
            {
                return Err(IrisError::invalid_config(format!(
                    "attribute [{}] of segment {} is {:?}, schema says {:?}",
                    attribute.name,
                    segment.segment_id,
                    indexer.field_type(),
                    attribute.field_type
                )));
            }
            if indexer.is_none() {
                log::debug!(
                    "segment {} has no attribute [{}], its docs read as null",
                    segment.segment_id,
                    attribute.name
                );
            }
            readers.push(indexer);
        }
        Ok(TruncateAttributeReader {
            name: attribute.name.clone(),
            field_type: attribute.field_type,
            support_null: attribute.support_null,
            doc_mapper,
            sources: readers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AttributeDiskIndexer for TruncateAttributeReader {
    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn support_null(&self) -> bool {
        self.support_null
    }

    fn doc_count(&self) -> u32 {
        self.doc_mapper.new_doc_count()
    }

    fn create_read_context(&self) -> ReadContext {
        Box::new(SourceContexts(
            self.sources
                .iter()
                .map(|source| source.as_ref().map(|s| s.create_read_context()))
                .collect(),
        ))
    }

    fn read(&self, doc_id: DocId, ctx: &mut ReadContext, buf: &mut [u8]) -> Result<AttributeRead> {
        let (source, old_doc_id) = self.doc_mapper.reverse_map(doc_id).ok_or_else(|| {
            IrisError::invalid_argument(format!(
                "doc {doc_id} outside merged space of attribute [{}]",
                self.name
            ))
        })?;
        let contexts = ctx
            .downcast_mut::<SourceContexts>()
            .ok_or_else(|| IrisError::invalid_argument("read context of another reader"))?;
        match (&self.sources[source], contexts.0[source].as_mut()) {
            (Some(indexer), Some(source_ctx)) => indexer.read(old_doc_id, source_ctx, buf),
            _ => {
                let len = self.field_type.native_size();
                buf[..len].fill(0);
                Ok(AttributeRead {
                    len,
                    is_null: self.support_null,
                })
            }
        }
    }
}

/// Creates [`TruncateAttributeReader`]s on demand and shares them by name.
#[derive(Debug)]
pub struct TruncateAttributeReaderCreator {
    schema: Arc<IndexSchema>,
    sources: Arc<Vec<SourceSegment>>,
    doc_mapper: Arc<DocMapper>,
    readers: Mutex<AHashMap<String, Arc<TruncateAttributeReader>>>,
}

impl TruncateAttributeReaderCreator {
    pub fn new(
        schema: Arc<IndexSchema>,
        sources: Arc<Vec<SourceSegment>>,
        doc_mapper: Arc<DocMapper>,
    ) -> Self {
        TruncateAttributeReaderCreator {
            schema,
            sources,
            doc_mapper,
            readers: Mutex::new(AHashMap::new()),
        }
    }

    /// Reader of the schema attribute `name`. Unknown attributes are `NotFound`.
    pub fn create(&self, name: &str) -> Result<Arc<TruncateAttributeReader>> {
        let mut readers = self.readers.lock();
        if let Some(reader) = readers.get(name) {
            return Ok(reader.clone());
        }
        let attribute = self
            .schema
            .attribute(name)
            .ok_or_else(|| IrisError::not_found(format!("attribute [{name}] is not in the schema")))?;
        let reader = Arc::new(TruncateAttributeReader::create(
            attribute,
            &self.sources,
            self.doc_mapper.clone(),
        )?);
        readers.insert(name.to_string(), reader.clone());
        Ok(reader)
    }

    pub fn doc_mapper(&self) -> &Arc<DocMapper> {
        &self.doc_mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::MemoryAttributeIndexer;
    use crate::index::inverted::doc_mapper::TargetSplit;
    use crate::schema::NativeValue;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_reads_follow_doc_mapper() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let first = MemoryAttributeIndexer::from_values(
            FieldType::Int32,
            true,
            &[Some(10i32), Some(11), Some(12)],
        )
        .unwrap();
        let sources = vec![
            SourceSegment::new(0, 3, storage.clone())
                .with_deleted(&[1])
                .with_attribute("price", Arc::new(first)),
            SourceSegment::new(1, 2, storage),
        ];
        let mapper = Arc::new(DocMapper::build(&sources, TargetSplit::Even(1)).unwrap());
        let attribute = AttributeConfig::new("price", FieldType::Int32).nullable();
        let reader = TruncateAttributeReader::create(&attribute, &sources, mapper).unwrap();
        assert_eq!(reader.doc_count(), 4);

        let mut ctx = reader.create_read_context();
        let mut buf = [0u8; 4];
        reader.read(1, &mut ctx, &mut buf).unwrap();
        assert_eq!(i32::read_le(&buf), 12);
        assert!(reader.read(2, &mut ctx, &mut buf).unwrap().is_null);
        assert!(reader.read(4, &mut ctx, &mut buf).is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let column = MemoryAttributeIndexer::from_values(FieldType::Int64, false, &[Some(1i64)]).unwrap();
        let sources = vec![SourceSegment::new(0, 1, storage).with_attribute("price", Arc::new(column))];
        let mapper = Arc::new(DocMapper::build(&sources, TargetSplit::Even(1)).unwrap());
        let attribute = AttributeConfig::new("price", FieldType::Int32);
        assert!(TruncateAttributeReader::create(&attribute, &sources, mapper).is_err());
    }
}
