//! Update patches of an inverted index.
//!
//! A segment may carry `index/<name>/patch`: term additions and removals
//! recorded against documents after the segment was built. Merging remaps
//! every record into the target segments.
//!
//! ```text
//! magic: u32, record_count: u64,
//! record_count × (key: u64, is_null: u8, doc_id: u32, is_delete: u8)
//! ```

use crate::error::{IrisError, Result};
use crate::index::DocId;
use crate::index::inverted::doc_mapper::DocMapper;
use crate::index::inverted::segment::{SourceSegment, TargetSegment};
use crate::index::inverted::{DictKeyInfo, index_dir};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

const PATCH_MAGIC: u32 = 0x5041_5443; // "PATC"

pub fn patch_file(index_name: &str) -> String {
    format!("{}/patch", index_dir(index_name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRecord {
    pub key: DictKeyInfo,
    pub doc_id: DocId,
    pub is_delete: bool,
}

impl PatchRecord {
    pub fn add(key: DictKeyInfo, doc_id: DocId) -> Self {
        PatchRecord {
            key,
            doc_id,
            is_delete: false,
        }
    }

    pub fn delete(key: DictKeyInfo, doc_id: DocId) -> Self {
        PatchRecord {
            key,
            doc_id,
            is_delete: true,
        }
    }
}

pub fn write_patch(storage: &dyn Storage, index_name: &str, records: &[PatchRecord]) -> Result<()> {
    let mut writer = StructWriter::new(storage.create_output(&patch_file(index_name))?);
    writer.write_u32(PATCH_MAGIC)?;
    writer.write_u64(records.len() as u64)?;
    for record in records {
        writer.write_u64(record.key.key)?;
        writer.write_u8(record.key.is_null as u8)?;
        writer.write_u32(record.doc_id)?;
        writer.write_u8(record.is_delete as u8)?;
    }
    writer.close()
}

/// Records of the index's patch in `storage`; `None` without a patch file.
pub fn read_patch(storage: &dyn Storage, index_name: &str) -> Result<Option<Vec<PatchRecord>>> {
    let name = patch_file(index_name);
    if !storage.file_exists(&name) {
        return Ok(None);
    }
    let mut reader = StructReader::new(storage.open_input(&name)?)?;
    if reader.read_u32()? != PATCH_MAGIC {
        return Err(IrisError::corruption(format!("bad patch magic in [{name}]")));
    }
    let count = reader.read_u64()?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = reader.read_u64()?;
        let is_null = reader.read_u8()? != 0;
        records.push(PatchRecord {
            key: DictKeyInfo { key, is_null },
            doc_id: reader.read_u32()?,
            is_delete: reader.read_u8()? != 0,
        });
    }
    Ok(Some(records))
}

/// Remap the patches of every source into the targets. Records of deleted
/// documents are dropped. Returns the records written per target.
pub fn merge_patches(
    index_name: &str,
    sources: &[SourceSegment],
    targets: &[TargetSegment],
    doc_mapper: &DocMapper,
) -> Result<Vec<usize>> {
    let mut per_target: Vec<Vec<PatchRecord>> = vec![Vec::new(); targets.len()];
    let mut found = false;
    for (source_index, source) in sources.iter().enumerate() {
        let Some(records) = read_patch(source.storage.as_ref(), index_name)? else {
            continue;
        };
        found = true;
        for record in records {
            let Some(new_doc) = doc_mapper.map(source_index, record.doc_id) else {
                continue;
            };
            let (target, local) = doc_mapper.to_target_local(new_doc).ok_or_else(|| {
                IrisError::index(format!("patched doc {new_doc} is outside the merged space"))
            })?;
            let bucket = per_target.get_mut(target).ok_or_else(|| {
                IrisError::invalid_argument(format!("no target segment at position {target}"))
            })?;
            bucket.push(PatchRecord {
                doc_id: local,
                ..record
            });
        }
    }
    if !found {
        return Ok(vec![0; targets.len()]);
    }

    let mut counts = Vec::with_capacity(targets.len());
    for (target, mut records) in targets.iter().zip(per_target) {
        counts.push(records.len());
        if records.is_empty() {
            continue;
        }
        // stable: later updates of the same doc and key stay later
        records.sort_by_key(|r| (r.key, r.doc_id));
        write_patch(target.storage.as_ref(), index_name, &records)?;
    }
    log::info!("index [{index_name}]: merged patches {counts:?}");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::index::inverted::doc_mapper::TargetSplit;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_patch_file_roundtrip() {
        let storage = MemoryStorage::default();
        let records = vec![
            PatchRecord::add(DictKeyInfo::new(3), 1),
            PatchRecord::delete(DictKeyInfo::null(), 2),
        ];
        write_patch(&storage, "title", &records).unwrap();
        assert_eq!(read_patch(&storage, "title").unwrap(), Some(records));
        assert_eq!(read_patch(&storage, "body").unwrap(), None);
    }

    #[test]
    fn test_merge_remaps_and_drops_deleted() {
        let first: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let second: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        write_patch(
            first.as_ref(),
            "title",
            &[
                PatchRecord::add(DictKeyInfo::new(9), 0),
                PatchRecord::delete(DictKeyInfo::new(9), 1),
                PatchRecord::add(DictKeyInfo::new(2), 2),
            ],
        )
        .unwrap();
        write_patch(second.as_ref(), "title", &[PatchRecord::add(DictKeyInfo::new(2), 0)]).unwrap();
        let sources = vec![
            SourceSegment::new(0, 3, first).with_deleted(&[1]),
            SourceSegment::new(1, 2, second),
        ];
        // new ids: s0:0->0, s0:2->1, s1:0->2, s1:1->3
        let mapper = DocMapper::build(&sources, TargetSplit::Counts(vec![2, 2])).unwrap();
        let out_a: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let out_b: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let targets = vec![TargetSegment::new(5, out_a.clone()), TargetSegment::new(6, out_b.clone())];

        assert_eq!(merge_patches("title", &sources, &targets, &mapper).unwrap(), vec![2, 1]);
        assert_eq!(
            read_patch(out_a.as_ref(), "title").unwrap().unwrap(),
            vec![
                PatchRecord::add(DictKeyInfo::new(2), 1),
                PatchRecord::add(DictKeyInfo::new(9), 0),
            ]
        );
        assert_eq!(
            read_patch(out_b.as_ref(), "title").unwrap().unwrap(),
            vec![PatchRecord::add(DictKeyInfo::new(2), 0)]
        );
    }

    #[test]
    fn test_no_patch_writes_nothing() {
        let sources = vec![SourceSegment::new(0, 2, Arc::new(MemoryStorage::default()))];
        let mapper = DocMapper::build(&sources, TargetSplit::Even(1)).unwrap();
        let out: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let targets = vec![TargetSegment::new(1, out.clone())];
        assert_eq!(merge_patches("title", &sources, &targets, &mapper).unwrap(), vec![0]);
        assert!(!out.file_exists(&patch_file("title")));
    }
}
