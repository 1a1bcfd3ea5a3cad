//! Index level building blocks shared by the merge path.

pub mod attribute;
pub mod inverted;
pub mod merge_options;
pub mod task_resource;

/// Document id inside one segment, or inside the merged doc space.
pub type DocId = u32;

/// Per-document payload stored next to each posting entry.
pub type DocPayload = u16;
