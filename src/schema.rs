//! Index schema: attributes and inverted index definitions.
//!
//! Only the parts of a schema that the merge path consults are modelled:
//! attribute types (for typed truncation components) and per-index settings
//! (sharding, truncate profile usage, high-frequency bitmap handling).

pub mod field_type;

pub use field_type::{FieldType, NativeValue, U256};

use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};

/// A single-value attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub support_null: bool,
}

impl AttributeConfig {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        AttributeConfig {
            name: name.into(),
            field_type,
            support_null: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.support_null = true;
        self
    }
}

/// How an index is sharded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingType {
    #[default]
    None,
    /// Parent of sharded indexes. Merged per shard, never as a whole.
    NeedSharding,
    /// One shard of a sharded index.
    Shard,
}

/// Which postings exist for high-frequency vocabulary terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighFrequencyTermPostingType {
    /// Normal and bitmap posting.
    #[default]
    Both,
    /// Bitmap posting only.
    Bitmap,
}

/// When a term gets an adaptive bitmap posting during merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveBitmapTrigger {
    /// Merged doc frequency reaches the given count.
    DocFrequency(u64),
    /// Merged doc frequency reaches the given percentage of all new docs.
    Percent(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveBitmapConfig {
    pub trigger: AdaptiveBitmapTrigger,
}

/// An inverted index as seen by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndexConfig {
    pub name: String,

    #[serde(default)]
    pub sharding: ShardingType,

    /// Whether truncate indexes are built for this index.
    #[serde(default)]
    pub has_truncate: bool,

    /// Truncate profiles this index participates in. Empty means every
    /// configured profile.
    #[serde(default)]
    pub use_truncate_profiles: Vec<String>,

    /// Terms that keep a bitmap posting. `None` disables the dictionary.
    #[serde(default)]
    pub high_frequency_vocabulary: Option<Vec<u64>>,

    #[serde(default)]
    pub high_frequency_term_posting_type: HighFrequencyTermPostingType,

    #[serde(default)]
    pub adaptive_bitmap: Option<AdaptiveBitmapConfig>,
}

impl InvertedIndexConfig {
    pub fn new(name: impl Into<String>) -> Self {
        InvertedIndexConfig {
            name: name.into(),
            sharding: ShardingType::None,
            has_truncate: false,
            use_truncate_profiles: Vec::new(),
            high_frequency_vocabulary: None,
            high_frequency_term_posting_type: HighFrequencyTermPostingType::Both,
            adaptive_bitmap: None,
        }
    }

    pub fn with_sharding(mut self, sharding: ShardingType) -> Self {
        self.sharding = sharding;
        self
    }

    /// Enable truncation, restricted to `profiles` unless empty.
    pub fn with_truncate_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.has_truncate = true;
        self.use_truncate_profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_high_frequency_vocabulary(
        mut self,
        keys: Vec<u64>,
        posting_type: HighFrequencyTermPostingType,
    ) -> Self {
        self.high_frequency_vocabulary = Some(keys);
        self.high_frequency_term_posting_type = posting_type;
        self
    }

    pub fn with_adaptive_bitmap(mut self, trigger: AdaptiveBitmapTrigger) -> Self {
        self.adaptive_bitmap = Some(AdaptiveBitmapConfig { trigger });
        self
    }

    pub fn in_high_frequency_vocabulary(&self, key: u64) -> bool {
        self.high_frequency_vocabulary
            .as_ref()
            .is_some_and(|vocabulary| vocabulary.contains(&key))
    }

    /// Whether vocabulary terms keep only the bitmap posting.
    pub fn bitmap_only(&self) -> bool {
        self.high_frequency_vocabulary.is_some()
            && self.high_frequency_term_posting_type == HighFrequencyTermPostingType::Bitmap
    }

    pub fn uses_truncate_profile(&self, profile: &str) -> bool {
        if !self.has_truncate {
            return false;
        }
        self.use_truncate_profiles.is_empty()
            || self.use_truncate_profiles.iter().any(|p| p == profile)
    }
}

/// Everything the merger needs to know about a table's indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    #[serde(default)]
    pub indexes: Vec<InvertedIndexConfig>,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

impl IndexSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_index(mut self, index: InvertedIndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn add_attribute(mut self, attribute: AttributeConfig) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn index(&self, name: &str) -> Option<&InvertedIndexConfig> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeConfig> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Reject duplicate index or attribute names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = ahash::AHashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(IrisError::invalid_config(format!(
                    "duplicate index [{}] in schema",
                    index.name
                )));
            }
        }
        seen.clear();
        for attr in &self.attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(IrisError::invalid_config(format!(
                    "duplicate attribute [{}] in schema",
                    attr.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_from_json() {
        let json = r#"{
            "indexes": [
                {"name": "title", "has_truncate": true, "use_truncate_profiles": ["desc_price"]},
                {"name": "body", "sharding": "need_sharding"}
            ],
            "attributes": [
                {"name": "price", "field_type": "int64", "support_null": true}
            ]
        }"#;
        let schema: IndexSchema = serde_json::from_str(json).unwrap();
        schema.validate().unwrap();

        let title = schema.index("title").unwrap();
        assert!(title.uses_truncate_profile("desc_price"));
        assert!(!title.uses_truncate_profile("asc_ts"));
        assert_eq!(schema.index("body").unwrap().sharding, ShardingType::NeedSharding);
        assert_eq!(schema.attribute("price").unwrap().field_type, FieldType::Int64);
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let schema = IndexSchema::new()
            .add_attribute(AttributeConfig::new("price", FieldType::Int32))
            .add_attribute(AttributeConfig::new("price", FieldType::Int64));
        assert!(matches!(schema.validate(), Err(IrisError::InvalidConfig(_))));
    }

    #[test]
    fn test_vocabulary() {
        let index = InvertedIndexConfig::new("title")
            .with_high_frequency_vocabulary(vec![7, 9], HighFrequencyTermPostingType::Bitmap);
        assert!(index.in_high_frequency_vocabulary(9));
        assert!(!index.in_high_frequency_vocabulary(8));
        assert!(index.bitmap_only());
    }
}
