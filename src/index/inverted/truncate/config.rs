//! Truncate strategies, profiles and their resolution against a schema.
//!
//! A *strategy* says when a term is truncated and how many documents are
//! kept (threshold, limit, filter and distinct constraints). A *profile* says
//! how documents are ranked (sort description, doc payload parameters) and
//! names the strategy it uses. [`TruncateOptionConfig::build`] validates both
//! and resolves, for every index with truncation enabled, the ordered list of
//! `(profile, strategy, truncate index name)` triples.
//!
//! ```json
//! {
//!   "truncate_strategies": [
//!     {"strategy_name": "top10", "threshold": 100, "limit": 10,
//!      "diversity_constrain": {"distinct_field": "seller",
//!                              "distinct_count": 2,
//!                              "distinct_expand_limit": 20}}
//!   ],
//!   "truncate_profiles": [
//!     {"profile_name": "desc_price", "sort_description": "-price;+ts",
//!      "strategy_name": "top10"}
//!   ]
//! }
//! ```

use std::sync::Arc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};
use crate::index::inverted::truncate::truncate_index_name;
use crate::schema::IndexSchema;

/// Sort key naming the posting's doc payload instead of an attribute.
pub const DOC_PAYLOAD_FIELD_NAME: &str = "DOC_PAYLOAD";

/// Limit value meaning "keep everything that passes the filters".
pub const NO_LIMIT: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncateStrategyType {
    /// Truncate terms whose doc frequency exceeds the threshold.
    #[default]
    Default,
    /// Truncate terms recorded in the previous build's truncate meta file.
    TruncateMeta,
}

/// Filtering and distinct constraints of a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConstrain {
    pub filter_field: String,
    pub filter_min: i64,
    pub filter_max: i64,
    pub filter_mask: u64,
    /// Narrow the filter range with the truncate meta file.
    pub filter_by_meta: bool,
    pub distinct_field: String,
    pub distinct_count: u64,
    pub distinct_expand_limit: u64,
}

impl Default for DiversityConstrain {
    fn default() -> Self {
        DiversityConstrain {
            filter_field: String::new(),
            filter_min: i64::MIN,
            filter_max: i64::MAX,
            filter_mask: u64::MAX,
            filter_by_meta: false,
            distinct_field: String::new(),
            distinct_count: 0,
            distinct_expand_limit: 0,
        }
    }
}

impl DiversityConstrain {
    pub fn need_filter(&self) -> bool {
        !self.filter_field.is_empty()
    }

    pub fn need_distinct(&self) -> bool {
        !self.distinct_field.is_empty()
    }

    pub fn filter_by_meta(&self) -> bool {
        self.need_filter() && self.filter_by_meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncateStrategy {
    pub strategy_name: String,
    #[serde(default)]
    pub strategy_type: TruncateStrategyType,
    /// Doc frequency a term must exceed to be truncated.
    #[serde(default)]
    pub threshold: u64,
    /// Documents to keep per term.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Pre-size bucket vectors once a term covers this percentage of all docs.
    #[serde(default = "default_memory_optimize_threshold")]
    pub memory_optimize_threshold: u64,
    #[serde(default)]
    pub diversity_constrain: DiversityConstrain,
    /// Profiles bound to this strategy, filled in by [`TruncateOptionConfig::build`].
    #[serde(skip)]
    pub profile_names: Vec<String>,
}

fn default_limit() -> u64 {
    NO_LIMIT
}

fn default_memory_optimize_threshold() -> u64 {
    20
}

impl TruncateStrategy {
    pub fn new(name: impl Into<String>, threshold: u64, limit: u64) -> Self {
        TruncateStrategy {
            strategy_name: name.into(),
            strategy_type: TruncateStrategyType::Default,
            threshold,
            limit,
            memory_optimize_threshold: default_memory_optimize_threshold(),
            diversity_constrain: DiversityConstrain::default(),
            profile_names: Vec::new(),
        }
    }

    pub fn with_type(mut self, strategy_type: TruncateStrategyType) -> Self {
        self.strategy_type = strategy_type;
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, min: i64, max: i64) -> Self {
        self.diversity_constrain.filter_field = field.into();
        self.diversity_constrain.filter_min = min;
        self.diversity_constrain.filter_max = max;
        self
    }

    pub fn with_distinct(mut self, field: impl Into<String>, count: u64, expand_limit: u64) -> Self {
        self.diversity_constrain.distinct_field = field.into();
        self.diversity_constrain.distinct_count = count;
        self.diversity_constrain.distinct_expand_limit = expand_limit;
        self
    }

    pub fn has_limit(&self) -> bool {
        self.limit != NO_LIMIT
    }

    /// Fewest documents kept per term.
    pub fn min_doc_count_to_reserve(&self) -> u64 {
        self.limit
    }

    /// Most documents kept per term.
    pub fn max_doc_count_to_reserve(&self) -> u64 {
        if self.diversity_constrain.need_distinct() {
            self.diversity_constrain.distinct_expand_limit
        } else {
            self.limit
        }
    }

    fn validate(&self) -> Result<()> {
        let name = &self.strategy_name;
        if name.is_empty() {
            return Err(IrisError::invalid_config("truncate strategy name is empty"));
        }
        if self.limit == 0 {
            return Err(IrisError::invalid_config(format!(
                "truncate strategy [{name}]: limit must be positive"
            )));
        }
        if self.memory_optimize_threshold > 100 {
            return Err(IrisError::invalid_config(format!(
                "truncate strategy [{name}]: memory_optimize_threshold {} not in [0, 100]",
                self.memory_optimize_threshold
            )));
        }
        let constrain = &self.diversity_constrain;
        if constrain.need_distinct()
            && !(constrain.distinct_count <= self.limit && self.limit <= constrain.distinct_expand_limit)
        {
            return Err(IrisError::invalid_config(format!(
                "truncate strategy [{name}]: need distinct_count ({}) <= limit ({}) <= distinct_expand_limit ({})",
                constrain.distinct_count, self.limit, constrain.distinct_expand_limit
            )));
        }
        if constrain.need_distinct() && constrain.distinct_count == 0 {
            return Err(IrisError::invalid_config(format!(
                "truncate strategy [{name}]: distinct_count must be positive"
            )));
        }
        if constrain.filter_by_meta && !constrain.need_filter() {
            return Err(IrisError::invalid_config(format!(
                "truncate strategy [{name}]: filter_by_meta needs a filter field"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPattern {
    Asc,
    Desc,
}

/// One sort key of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParam {
    pub field: String,
    pub pattern: SortPattern,
}

impl SortParam {
    pub fn is_desc(&self) -> bool {
        self.pattern == SortPattern::Desc
    }

    pub fn is_doc_payload(&self) -> bool {
        self.field == DOC_PAYLOAD_FIELD_NAME
    }
}

/// Parse `"-price;+ts;score"`: `-` is descending, `+` or nothing ascending.
pub fn parse_sort_description(description: &str) -> Result<Vec<SortParam>> {
    if description.trim().is_empty() {
        return Ok(Vec::new());
    }
    description
        .split(';')
        .map(|part| {
            let part = part.trim();
            let (pattern, field) = match part.as_bytes().first() {
                Some(b'-') => (SortPattern::Desc, &part[1..]),
                Some(b'+') => (SortPattern::Asc, &part[1..]),
                _ => (SortPattern::Asc, part),
            };
            if field.is_empty()
                || field
                    .chars()
                    .any(|c| c == '-' || c == '+' || c.is_whitespace())
            {
                return Err(IrisError::invalid_config(format!(
                    "invalid sort pattern [{part}] in [{description}]"
                )));
            }
            Ok(SortParam {
                field: field.to_string(),
                pattern,
            })
        })
        .collect()
}

/// A truncate profile as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncateProfileConfig {
    pub profile_name: String,
    #[serde(default)]
    pub sort_description: String,
    pub strategy_name: String,
    /// Payload column the doc payload is read from; profiles of one index
    /// that sort by doc payload must agree on it.
    #[serde(default)]
    pub payload_name: String,
    /// Attribute the doc payload is multiplied with.
    #[serde(default)]
    pub doc_payload_factor: Option<String>,
    /// Decode the payload as an IEEE-754 half float.
    #[serde(default)]
    pub doc_payload_use_fp16: bool,
}

impl TruncateProfileConfig {
    pub fn new(
        name: impl Into<String>,
        sort_description: impl Into<String>,
        strategy_name: impl Into<String>,
    ) -> Self {
        TruncateProfileConfig {
            profile_name: name.into(),
            sort_description: sort_description.into(),
            strategy_name: strategy_name.into(),
            payload_name: String::new(),
            doc_payload_factor: None,
            doc_payload_use_fp16: false,
        }
    }

    pub fn with_doc_payload(mut self, factor: Option<&str>, use_fp16: bool) -> Self {
        self.doc_payload_factor = factor.map(str::to_string);
        self.doc_payload_use_fp16 = use_fp16;
        self
    }

    pub fn with_payload_name(mut self, payload_name: impl Into<String>) -> Self {
        self.payload_name = payload_name.into();
        self
    }
}

/// A validated truncate profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateProfile {
    pub name: String,
    pub sort_params: Vec<SortParam>,
    pub strategy_name: String,
    /// Indexes using this profile, resolved from the schema.
    pub index_names: Vec<String>,
    pub payload_name: String,
    pub doc_payload_factor: Option<String>,
    pub doc_payload_use_fp16: bool,
}

impl TruncateProfile {
    pub fn has_sort(&self) -> bool {
        !self.sort_params.is_empty()
    }

    pub fn is_sort_by_doc_payload(&self) -> bool {
        self.sort_params.first().is_some_and(SortParam::is_doc_payload)
    }

    /// Whether the primary key ranks larger values first.
    pub fn first_sort_desc(&self) -> bool {
        self.sort_params.first().is_none_or(SortParam::is_desc)
    }

    /// Attribute sort keys, in priority order.
    pub fn sort_attribute_fields(&self) -> impl Iterator<Item = &SortParam> {
        self.sort_params.iter().filter(|p| !p.is_doc_payload())
    }

    fn from_config(config: TruncateProfileConfig) -> Result<Self> {
        if config.profile_name.is_empty() {
            return Err(IrisError::invalid_config("truncate profile name is empty"));
        }
        let sort_params = parse_sort_description(&config.sort_description)?;
        if sort_params.iter().skip(1).any(SortParam::is_doc_payload) {
            return Err(IrisError::invalid_config(format!(
                "truncate profile [{}]: {DOC_PAYLOAD_FIELD_NAME} must be the first sort key",
                config.profile_name
            )));
        }
        Ok(TruncateProfile {
            name: config.profile_name,
            sort_params,
            strategy_name: config.strategy_name,
            index_names: Vec::new(),
            payload_name: config.payload_name,
            doc_payload_factor: config.doc_payload_factor.filter(|f| !f.is_empty()),
            doc_payload_use_fp16: config.doc_payload_use_fp16,
        })
    }
}

/// One truncate index to build for an index.
#[derive(Debug, Clone)]
pub struct TruncateIndexProperty {
    pub truncate_index_name: String,
    pub profile: Arc<TruncateProfile>,
    pub strategy: Arc<TruncateStrategy>,
}

/// Truncate indexes of one inverted index.
#[derive(Debug, Clone)]
pub struct TruncateIndexConfig {
    pub index_name: String,
    pub properties: Vec<TruncateIndexProperty>,
}

/// Raw configuration file content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruncateConfigFile {
    #[serde(default)]
    pub truncate_strategies: Vec<TruncateStrategy>,
    #[serde(default)]
    pub truncate_profiles: Vec<TruncateProfileConfig>,
}

/// Strategies, profiles and the per-index truncate layout.
#[derive(Debug, Clone, Default)]
pub struct TruncateOptionConfig {
    strategies: Vec<Arc<TruncateStrategy>>,
    profiles: Vec<Arc<TruncateProfile>>,
    indexes: Vec<TruncateIndexConfig>,
}

impl TruncateOptionConfig {
    pub fn from_json(json: &str, schema: &IndexSchema) -> Result<Self> {
        let file: TruncateConfigFile = serde_json::from_str(json)?;
        Self::build(file.truncate_strategies, file.truncate_profiles, schema)
    }

    pub fn build(
        strategies: Vec<TruncateStrategy>,
        profiles: Vec<TruncateProfileConfig>,
        schema: &IndexSchema,
    ) -> Result<Self> {
        let mut names = AHashSet::new();
        for strategy in &strategies {
            strategy.validate()?;
            if !names.insert(strategy.strategy_name.clone()) {
                return Err(IrisError::invalid_config(format!(
                    "duplicate truncate strategy [{}]",
                    strategy.strategy_name
                )));
            }
        }
        let mut strategies = strategies;

        let mut resolved = Vec::with_capacity(profiles.len());
        names.clear();
        for config in profiles {
            let mut profile = TruncateProfile::from_config(config)?;
            if !names.insert(profile.name.clone()) {
                return Err(IrisError::invalid_config(format!(
                    "duplicate truncate profile [{}]",
                    profile.name
                )));
            }
            let strategy = strategies
                .iter_mut()
                .find(|s| s.strategy_name == profile.strategy_name)
                .ok_or_else(|| {
                    IrisError::invalid_config(format!(
                        "truncate profile [{}] uses unknown strategy [{}]",
                        profile.name, profile.strategy_name
                    ))
                })?;
            strategy.profile_names.push(profile.name.clone());
            profile.index_names = schema
                .indexes
                .iter()
                .filter(|index| index.uses_truncate_profile(&profile.name))
                .map(|index| index.name.clone())
                .collect();
            resolved.push(profile);
        }

        let strategies: Vec<Arc<TruncateStrategy>> = strategies.into_iter().map(Arc::new).collect();
        let profiles: Vec<Arc<TruncateProfile>> = resolved.into_iter().map(Arc::new).collect();

        let mut indexes = Vec::new();
        for index in &schema.indexes {
            if !index.has_truncate {
                continue;
            }
            let mut payload_name: Option<&str> = None;
            let mut properties = Vec::new();
            for profile in profiles.iter().filter(|p| p.index_names.contains(&index.name)) {
                if profile.is_sort_by_doc_payload() {
                    match payload_name {
                        Some(name) if name != profile.payload_name => {
                            return Err(IrisError::invalid_config(format!(
                                "index [{}]: truncate profiles use payloads [{name}] and [{}]",
                                index.name, profile.payload_name
                            )));
                        }
                        _ => payload_name = Some(&profile.payload_name),
                    }
                }
                let strategy = strategies
                    .iter()
                    .find(|s| s.strategy_name == profile.strategy_name)
                    .cloned()
                    .ok_or_else(|| IrisError::internal("resolved strategy disappeared"))?;
                properties.push(TruncateIndexProperty {
                    truncate_index_name: truncate_index_name(&index.name, &profile.name),
                    profile: profile.clone(),
                    strategy,
                });
            }
            if !properties.is_empty() {
                indexes.push(TruncateIndexConfig {
                    index_name: index.name.clone(),
                    properties,
                });
            }
        }

        Ok(TruncateOptionConfig {
            strategies,
            profiles,
            indexes,
        })
    }

    pub fn strategies(&self) -> &[Arc<TruncateStrategy>] {
        &self.strategies
    }

    pub fn profiles(&self) -> &[Arc<TruncateProfile>] {
        &self.profiles
    }

    pub fn strategy(&self, name: &str) -> Option<&Arc<TruncateStrategy>> {
        self.strategies.iter().find(|s| s.strategy_name == name)
    }

    pub fn profile(&self, name: &str) -> Option<&Arc<TruncateProfile>> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn index_config(&self, index_name: &str) -> Option<&TruncateIndexConfig> {
        self.indexes.iter().find(|c| c.index_name == index_name)
    }

    pub fn is_truncate_index(&self, index_name: &str) -> bool {
        self.index_config(index_name).is_some()
    }

    pub fn index_configs(&self) -> &[TruncateIndexConfig] {
        &self.indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeConfig, FieldType, InvertedIndexConfig};

    fn schema() -> IndexSchema {
        IndexSchema::new()
            .add_index(InvertedIndexConfig::new("title").with_truncate_profiles(Vec::<String>::new()))
            .add_index(InvertedIndexConfig::new("body").with_truncate_profiles(["desc_price"]))
            .add_index(InvertedIndexConfig::new("tag"))
            .add_attribute(AttributeConfig::new("price", FieldType::Int64))
    }

    #[test]
    fn test_parse_sort_description() {
        let params = parse_sort_description("-price; +ts ;score").unwrap();
        assert_eq!(params.len(), 3);
        assert!(params[0].is_desc());
        assert_eq!(params[1].field, "ts");
        assert_eq!(params[2].pattern, SortPattern::Asc);
        assert!(parse_sort_description("").unwrap().is_empty());
        assert!(parse_sort_description("-").is_err());
        assert!(parse_sort_description("price;;ts").is_err());
        assert!(parse_sort_description("--price").is_err());
    }

    #[test]
    fn test_build_resolves_indexes() {
        let config = TruncateOptionConfig::build(
            vec![TruncateStrategy::new("top", 10, 5)],
            vec![
                TruncateProfileConfig::new("desc_price", "-price", "top"),
                TruncateProfileConfig::new("asc_ts", "+ts", "top"),
            ],
            &schema(),
        )
        .unwrap();

        let title = config.index_config("title").unwrap();
        let names: Vec<_> = title.properties.iter().map(|p| p.truncate_index_name.as_str()).collect();
        assert_eq!(names, vec!["title_desc_price", "title_asc_ts"]);
        assert_eq!(config.index_config("body").unwrap().properties.len(), 1);
        assert!(!config.is_truncate_index("tag"));
        assert_eq!(
            config.profile("desc_price").unwrap().index_names,
            vec!["title".to_string(), "body".to_string()]
        );
        assert_eq!(config.strategy("top").unwrap().profile_names.len(), 2);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "truncate_strategies": [
                {"strategy_name": "top", "threshold": 100, "limit": 10,
                 "diversity_constrain": {"distinct_field": "seller",
                                         "distinct_count": 2,
                                         "distinct_expand_limit": 20}},
                {"strategy_name": "meta", "strategy_type": "truncate_meta"}
            ],
            "truncate_profiles": [
                {"profile_name": "desc_price", "sort_description": "-price", "strategy_name": "top"},
                {"profile_name": "all", "strategy_name": "meta"}
            ]
        }"#;
        let config = TruncateOptionConfig::from_json(json, &schema()).unwrap();
        let top = config.strategy("top").unwrap();
        assert_eq!(top.min_doc_count_to_reserve(), 10);
        assert_eq!(top.max_doc_count_to_reserve(), 20);
        let meta = config.strategy("meta").unwrap();
        assert_eq!(meta.strategy_type, TruncateStrategyType::TruncateMeta);
        assert!(!meta.has_limit());
    }

    #[test]
    fn test_rejects_invalid_strategies() {
        let profiles = || vec![TruncateProfileConfig::new("p", "-price", "s")];
        let check = |strategy: TruncateStrategy| {
            matches!(
                TruncateOptionConfig::build(vec![strategy], profiles(), &schema()),
                Err(IrisError::InvalidConfig(_))
            )
        };
        assert!(check(TruncateStrategy::new("", 10, 5)));
        assert!(check(TruncateStrategy::new("s", 10, 0)));
        let mut strategy = TruncateStrategy::new("s", 10, 5);
        strategy.memory_optimize_threshold = 101;
        assert!(check(strategy));
        assert!(check(TruncateStrategy::new("s", 10, 5).with_distinct("seller", 6, 10)));
        assert!(check(TruncateStrategy::new("s", 10, 5).with_distinct("seller", 2, 4)));
        assert!(!check(TruncateStrategy::new("s", 10, 5).with_distinct("seller", 2, 5)));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_profiles() {
        let strategies = || vec![TruncateStrategy::new("s", 10, 5)];
        let duplicate_strategy = TruncateOptionConfig::build(
            vec![TruncateStrategy::new("s", 10, 5), TruncateStrategy::new("s", 1, 1)],
            vec![],
            &schema(),
        );
        assert!(matches!(duplicate_strategy, Err(IrisError::InvalidConfig(_))));

        let duplicate_profile = TruncateOptionConfig::build(
            strategies(),
            vec![
                TruncateProfileConfig::new("p", "-price", "s"),
                TruncateProfileConfig::new("p", "+price", "s"),
            ],
            &schema(),
        );
        assert!(matches!(duplicate_profile, Err(IrisError::InvalidConfig(_))));

        for profile in [
            TruncateProfileConfig::new("", "-price", "s"),
            TruncateProfileConfig::new("p", "-price;-", "s"),
            TruncateProfileConfig::new("p", "-price", "missing"),
            TruncateProfileConfig::new("p", "-price;-DOC_PAYLOAD", "s"),
        ] {
            let result = TruncateOptionConfig::build(strategies(), vec![profile], &schema());
            assert!(matches!(result, Err(IrisError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_payload_names_must_agree_per_index() {
        let result = TruncateOptionConfig::build(
            vec![TruncateStrategy::new("s", 10, 5)],
            vec![
                TruncateProfileConfig::new("p1", "-DOC_PAYLOAD", "s").with_payload_name("a"),
                TruncateProfileConfig::new("p2", "+DOC_PAYLOAD", "s").with_payload_name("b"),
            ],
            &schema(),
        );
        assert!(matches!(result, Err(IrisError::InvalidConfig(_))));

        let result = TruncateOptionConfig::build(
            vec![TruncateStrategy::new("s", 10, 5)],
            vec![
                TruncateProfileConfig::new("p1", "-DOC_PAYLOAD", "s").with_payload_name("a"),
                TruncateProfileConfig::new("p2", "+DOC_PAYLOAD;-price", "s").with_payload_name("a"),
            ],
            &schema(),
        );
        assert!(result.is_ok());
    }
}
