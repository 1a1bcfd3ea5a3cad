//! Truncate indexes: bounded, ranked copies of high-frequency posting lists.
//!
//! For every term whose posting list triggers truncation, each truncate
//! profile of the index selects the documents to keep (filtering, distinct
//! counting and ranking by attribute or doc payload) and writes them into the
//! `<index>_<profile>` index of the target segments.
//!
//! Components, leaf first: [`reference`] (typed scratch records),
//! [`evaluator`], [`comparator`], [`filter`], [`distinctor`],
//! [`bucket_map`], [`collector`], [`trigger`] and [`meta`], [`writer`] and
//! [`multi_writer`], and finally [`creator`] which wires a
//! [`config::TruncateOptionConfig`] into writers.

pub mod attribute_reader;
pub mod bucket_map;
pub mod bucket_map_creator;
pub mod collector;
pub mod comparator;
pub mod config;
pub mod creator;
pub mod distinctor;
pub mod evaluator;
pub mod filter;
pub mod meta;
pub mod multi_writer;
pub mod reference;
pub mod scheduler;
pub mod trigger;
pub mod writer;

/// Name of the truncate index built for `index_name` under `profile_name`.
pub fn truncate_index_name(index_name: &str, profile_name: &str) -> String {
    format!("{index_name}_{profile_name}")
}
