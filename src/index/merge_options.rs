//! Process-level merge settings resolved once from the environment.

use std::fmt;
use std::sync::Arc;

use crate::storage::Storage;

pub const TRUNCATE_THREAD_COUNT_ENV: &str = "TRUNCATE_THREAD_COUNT";
pub const PRELOAD_DICT_KEY_COUNT_ENV: &str = "INDEXLIB_PRELOAD_DICTKEY_COUNT";

pub const DEFAULT_TRUNCATE_THREAD_COUNT: usize = 2;
pub const MAX_TRUNCATE_THREAD_COUNT: usize = 512;
pub const DEFAULT_BUCKET_MAP_THREAD_LIMIT: usize = 20;

/// Settings consulted by the inverted index merger and the truncate writers.
#[derive(Clone)]
pub struct MergeOptions {
    /// Threads used to run truncate writers of one term.
    pub truncate_thread_count: usize,

    /// Count distinct dictionary keys of all sources before merging so the
    /// target dictionaries can be pre-sized.
    pub preload_dict_key_count: bool,

    /// Upper bound on threads sorting bucket maps.
    pub bucket_map_thread_limit: usize,

    /// Storage holding `truncate_meta/<truncate index>` files of a previous
    /// build, read by `truncate_meta` strategies and meta filters.
    pub truncate_meta_storage: Option<Arc<dyn Storage>>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            truncate_thread_count: DEFAULT_TRUNCATE_THREAD_COUNT,
            preload_dict_key_count: false,
            bucket_map_thread_limit: DEFAULT_BUCKET_MAP_THREAD_LIMIT,
            truncate_meta_storage: None,
        }
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("truncate_thread_count", &self.truncate_thread_count)
            .field("preload_dict_key_count", &self.preload_dict_key_count)
            .field("bucket_map_thread_limit", &self.bucket_map_thread_limit)
            .field("truncate_meta_storage", &self.truncate_meta_storage.is_some())
            .finish()
    }
}

impl MergeOptions {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve options through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let truncate_thread_count = match lookup(TRUNCATE_THREAD_COUNT_ENV) {
            Some(raw) => parse_thread_count(&raw),
            None => DEFAULT_TRUNCATE_THREAD_COUNT,
        };
        let preload_dict_key_count = lookup(PRELOAD_DICT_KEY_COUNT_ENV)
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        MergeOptions {
            truncate_thread_count,
            preload_dict_key_count,
            ..Default::default()
        }
    }

    pub fn with_truncate_meta_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.truncate_meta_storage = Some(storage);
        self
    }
}

fn parse_thread_count(raw: &str) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(count) => count.clamp(1, MAX_TRUNCATE_THREAD_COUNT as i64) as usize,
        Err(_) => {
            log::warn!(
                "invalid {TRUNCATE_THREAD_COUNT_ENV} [{raw}], using {DEFAULT_TRUNCATE_THREAD_COUNT}"
            );
            DEFAULT_TRUNCATE_THREAD_COUNT
        }
    }
}
