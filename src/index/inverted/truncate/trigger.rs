//! Per-term decision whether a truncate index gets the term at all.

use std::sync::Arc;

use crate::index::inverted::DictKeyInfo;
use crate::index::inverted::truncate::config::{TruncateStrategy, TruncateStrategyType};
use crate::index::inverted::truncate::meta::TruncateMetaReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateTriggerInfo {
    pub key: DictKeyInfo,
    pub doc_freq: u64,
}

impl TruncateTriggerInfo {
    pub fn new(key: DictKeyInfo, doc_freq: u64) -> Self {
        TruncateTriggerInfo { key, doc_freq }
    }
}

pub trait TruncateTrigger: Send + Sync {
    fn need_truncate(&self, info: &TruncateTriggerInfo) -> bool;
}

/// Fires when the doc frequency exceeds the threshold.
#[derive(Debug, Clone)]
pub struct DefaultTruncateTrigger {
    threshold: u64,
}

impl DefaultTruncateTrigger {
    pub fn new(threshold: u64) -> Self {
        DefaultTruncateTrigger { threshold }
    }
}

impl TruncateTrigger for DefaultTruncateTrigger {
    fn need_truncate(&self, info: &TruncateTriggerInfo) -> bool {
        info.doc_freq > self.threshold
    }
}

/// Fires for terms recorded in the previous build's meta file. Without a
/// meta file nothing is truncated.
#[derive(Debug, Clone)]
pub struct TruncateMetaTrigger {
    meta_reader: Option<Arc<TruncateMetaReader>>,
}

impl TruncateMetaTrigger {
    pub fn new(meta_reader: Option<Arc<TruncateMetaReader>>) -> Self {
        TruncateMetaTrigger { meta_reader }
    }
}

impl TruncateTrigger for TruncateMetaTrigger {
    fn need_truncate(&self, info: &TruncateTriggerInfo) -> bool {
        self.meta_reader
            .as_ref()
            .is_some_and(|reader| reader.contains(&info.key))
    }
}

pub fn create_trigger(
    strategy: &TruncateStrategy,
    meta_reader: Option<Arc<TruncateMetaReader>>,
) -> Box<dyn TruncateTrigger> {
    match strategy.strategy_type {
        TruncateStrategyType::Default => Box::new(DefaultTruncateTrigger::new(strategy.threshold)),
        TruncateStrategyType::TruncateMeta => Box::new(TruncateMetaTrigger::new(meta_reader)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_trigger_is_strictly_greater() {
        let trigger = DefaultTruncateTrigger::new(10);
        assert!(!trigger.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(1), 10)));
        assert!(trigger.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(1), 11)));
    }

    #[test]
    fn test_meta_trigger() {
        let mut reader = TruncateMetaReader::new(true);
        reader.add(DictKeyInfo::new(5), 100);
        let trigger = TruncateMetaTrigger::new(Some(Arc::new(reader)));
        assert!(trigger.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(5), 1)));
        assert!(!trigger.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(6), 1_000_000)));
        let without_meta = TruncateMetaTrigger::new(None);
        assert!(!without_meta.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(5), 1)));
    }

    #[test]
    fn test_create_by_strategy_type() {
        let strategy = TruncateStrategy::new("s", 2, 1).with_type(TruncateStrategyType::TruncateMeta);
        let trigger = create_trigger(&strategy, None);
        assert!(!trigger.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(5), 100)));
        let trigger = create_trigger(&TruncateStrategy::new("s", 2, 1), None);
        assert!(trigger.need_truncate(&TruncateTriggerInfo::new(DictKeyInfo::new(5), 3)));
    }
}
