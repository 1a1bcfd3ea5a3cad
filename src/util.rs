//! Shared utility modules used across the merge and truncation code.

pub mod thread_pool;
pub mod varint;
