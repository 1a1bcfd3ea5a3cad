//! Mapping from source segment doc ids to the merged doc space.
//!
//! Live documents are numbered densely in source order: all live docs of the
//! first source, then the second, and so on. The merged space is then cut
//! into contiguous ranges, one per target segment.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IrisError, Result};
use crate::index::DocId;
use crate::index::inverted::segment::SourceSegment;
use crate::index::task_resource::TaskResource;

/// Resource name the merger looks up when no mapper is supplied.
pub const DOC_MAPPER_RESOURCE_NAME: &str = "doc_mapper";

/// How merged documents are split over target segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSplit {
    /// `n` targets of (almost) equal size, larger ones first.
    Even(usize),
    /// Explicit doc counts per target. Must add up to the live doc count.
    Counts(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMapper {
    /// Per source: old doc id -> new doc id, `None` for deleted docs.
    old_to_new: Vec<Vec<Option<DocId>>>,
    /// New doc id -> (source index, old doc id).
    new_to_old: Vec<(u32, DocId)>,
    target_doc_counts: Vec<u32>,
    /// First new doc id of every target.
    target_bases: Vec<DocId>,
}

impl DocMapper {
    /// Number live documents of `sources` and split them over targets.
    pub fn build(sources: &[SourceSegment], split: TargetSplit) -> Result<Self> {
        let mut next = 0u32;
        let mut old_to_new = Vec::with_capacity(sources.len());
        for segment in sources {
            let mut map = Vec::with_capacity(segment.doc_count as usize);
            for doc_id in 0..segment.doc_count {
                if segment.is_deleted(doc_id) {
                    map.push(None);
                } else {
                    map.push(Some(next));
                    next += 1;
                }
            }
            old_to_new.push(map);
        }
        let target_doc_counts = match split {
            TargetSplit::Even(count) => even_split(next, count)?,
            TargetSplit::Counts(counts) => counts,
        };
        Self::from_maps(old_to_new, target_doc_counts)
    }

    /// Build from explicit per-source maps. New ids must be dense and unique.
    pub fn from_maps(old_to_new: Vec<Vec<Option<DocId>>>, target_doc_counts: Vec<u32>) -> Result<Self> {
        let new_count = old_to_new.iter().flatten().filter(|id| id.is_some()).count();
        let mut new_to_old = vec![(u32::MAX, DocId::MAX); new_count];
        for (source, map) in old_to_new.iter().enumerate() {
            for (old, new) in map.iter().enumerate() {
                let Some(new) = *new else { continue };
                let slot = new_to_old.get_mut(new as usize).ok_or_else(|| {
                    IrisError::invalid_argument(format!(
                        "new doc id {new} outside merged space of {new_count} docs"
                    ))
                })?;
                if slot.0 != u32::MAX {
                    return Err(IrisError::invalid_argument(format!(
                        "new doc id {new} mapped twice"
                    )));
                }
                *slot = (source as u32, old as DocId);
            }
        }
        if target_doc_counts.is_empty() {
            return Err(IrisError::invalid_argument("doc mapper needs at least one target segment"));
        }
        let total: u64 = target_doc_counts.iter().map(|&c| c as u64).sum();
        if total != new_count as u64 {
            return Err(IrisError::invalid_argument(format!(
                "target doc counts add up to {total}, merged space has {new_count} docs"
            )));
        }
        let mut target_bases = Vec::with_capacity(target_doc_counts.len());
        let mut base = 0;
        for &count in &target_doc_counts {
            target_bases.push(base);
            base += count;
        }
        Ok(DocMapper {
            old_to_new,
            new_to_old,
            target_doc_counts,
            target_bases,
        })
    }

    pub fn source_segment_count(&self) -> usize {
        self.old_to_new.len()
    }

    /// New doc id of `old` in source `source`, `None` if deleted.
    pub fn map(&self, source: usize, old: DocId) -> Option<DocId> {
        self.old_to_new
            .get(source)
            .and_then(|map| map.get(old as usize))
            .copied()
            .flatten()
    }

    /// Source index and old doc id of a merged doc.
    pub fn reverse_map(&self, new: DocId) -> Option<(usize, DocId)> {
        self.new_to_old
            .get(new as usize)
            .map(|&(source, old)| (source as usize, old))
    }

    pub fn new_doc_count(&self) -> u32 {
        self.new_to_old.len() as u32
    }

    pub fn target_segment_count(&self) -> usize {
        self.target_doc_counts.len()
    }

    pub fn target_segment_doc_count(&self, target: usize) -> u32 {
        self.target_doc_counts.get(target).copied().unwrap_or(0)
    }

    /// Target index and target-local doc id of a merged doc.
    pub fn to_target_local(&self, new: DocId) -> Option<(usize, DocId)> {
        if new >= self.new_doc_count() {
            return None;
        }
        let target = self.target_bases.partition_point(|&base| base <= new) - 1;
        Some((target, new - self.target_bases[target]))
    }
}

fn even_split(total: u32, count: usize) -> Result<Vec<u32>> {
    if count == 0 {
        return Err(IrisError::invalid_argument("doc mapper needs at least one target segment"));
    }
    let base = total / count as u32;
    let extra = total as usize % count;
    Ok((0..count)
        .map(|idx| base + u32::from(idx < extra))
        .collect())
}

impl TaskResource for DocMapper {
    const RESOURCE_TYPE: &'static str = "doc_mapper";

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.old_to_new.len() as u32)?;
        for map in &self.old_to_new {
            out.write_u32::<LittleEndian>(map.len() as u32)?;
            for new in map {
                out.write_u32::<LittleEndian>(new.unwrap_or(DocId::MAX))?;
            }
        }
        out.write_u32::<LittleEndian>(self.target_doc_counts.len() as u32)?;
        for &count in &self.target_doc_counts {
            out.write_u32::<LittleEndian>(count)?;
        }
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let source_count = cursor.read_u32::<LittleEndian>()?;
        let mut old_to_new = Vec::with_capacity(source_count as usize);
        for _ in 0..source_count {
            let len = cursor.read_u32::<LittleEndian>()?;
            let mut map = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let new = cursor.read_u32::<LittleEndian>()?;
                map.push((new != DocId::MAX).then_some(new));
            }
            old_to_new.push(map);
        }
        let target_count = cursor.read_u32::<LittleEndian>()?;
        let mut counts = Vec::with_capacity(target_count as usize);
        for _ in 0..target_count {
            counts.push(cursor.read_u32::<LittleEndian>()?);
        }
        Self::from_maps(old_to_new, counts).map_err(|e| IrisError::corruption(format!("doc mapper: {e}")))
    }
}
