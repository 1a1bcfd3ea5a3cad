//! Global rank of every merged document under one profile's ordering,
//! coarsened into about `sqrt(n)` buckets of equal size.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IrisError, Result};
use crate::index::DocId;
use crate::index::task_resource::TaskResource;

/// Resource name of a profile's bucket map.
pub fn bucket_map_resource_name(profile_name: &str) -> String {
    format!("bucket_map_{profile_name}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMap {
    name: String,
    sort_values: Vec<u32>,
    bucket_count: u32,
    bucket_size: u32,
}

impl BucketMap {
    pub fn new(name: impl Into<String>, total_count: u32) -> Self {
        let (bucket_count, bucket_size) = Self::bucket_layout(total_count);
        BucketMap {
            name: name.into(),
            sort_values: vec![0; total_count as usize],
            bucket_count,
            bucket_size,
        }
    }

    fn bucket_layout(total_count: u32) -> (u32, u32) {
        let count = (total_count as f64).sqrt().ceil() as u32;
        let count = count.max(1);
        let size = total_count.div_ceil(count).max(1);
        (count, size)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_count(&self) -> u32 {
        self.sort_values.len() as u32
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    pub fn set_sort_value(&mut self, doc_id: DocId, rank: u32) {
        self.sort_values[doc_id as usize] = rank;
    }

    /// Rank of `doc_id`; `0` ranks first.
    pub fn sort_value(&self, doc_id: DocId) -> u32 {
        self.sort_values[doc_id as usize]
    }

    pub fn bucket_value(&self, doc_id: DocId) -> u32 {
        self.sort_value(doc_id) / self.bucket_size
    }

    pub fn estimate_memory_use(&self) -> usize {
        self.sort_values.len() * std::mem::size_of::<u32>()
    }
}

impl TaskResource for BucketMap {
    const RESOURCE_TYPE: &'static str = "bucket_map";

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let name = self.name.as_bytes();
        out.write_u32::<LittleEndian>(name.len() as u32)?;
        out.extend_from_slice(name);
        out.write_u32::<LittleEndian>(self.sort_values.len() as u32)?;
        for &value in &self.sort_values {
            out.write_u32::<LittleEndian>(value)?;
        }
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let name_len = cursor.read_u32::<LittleEndian>()? as usize;
        let start = cursor.position() as usize;
        let name = bytes
            .get(start..start + name_len)
            .ok_or_else(|| IrisError::corruption("bucket map name truncated"))?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|e| IrisError::corruption(format!("bucket map name: {e}")))?;
        cursor.set_position((start + name_len) as u64);

        let total = cursor.read_u32::<LittleEndian>()?;
        let mut map = BucketMap::new(name, total);
        for value in map.sort_values.iter_mut() {
            *value = cursor.read_u32::<LittleEndian>()?;
            if *value >= total {
                return Err(IrisError::corruption(format!(
                    "bucket map rank {value} out of range {total}"
                )));
            }
        }
        Ok(map)
    }
}
