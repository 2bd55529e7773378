use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered CT log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CtLog {
    pub name: String,
    pub url: String,
    pub category: String,
    /// A frozen log no longer grows; once fully fetched it is retired.
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub fetch_completed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoryWeight {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Latest known size of a log.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSize {
    pub tree_size: u64,
    pub updated_at: DateTime<Utc>,
}

/// Contents of the `--logs-file` YAML document.
///
/// ```yaml
/// categories:
///   - name: google
///     weight: 3
/// logs:
///   - name: argon2025h1
///     url: https://ct.googleapis.com/logs/us1/argon2025h1
///     category: google
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRegistry {
    #[serde(default)]
    pub categories: Vec<CategoryWeight>,
    #[serde(default)]
    pub logs: Vec<CtLog>,
}

impl LogRegistry {
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Categories named by logs but missing from `categories` get weight 1.
    pub fn effective_categories(&self) -> Vec<CategoryWeight> {
        let mut categories = self.categories.clone();
        for log in &self.logs {
            if !categories.iter().any(|c| c.name == log.category) {
                categories.push(CategoryWeight { name: log.category.clone(), weight: default_weight() });
            }
        }
        categories
    }
}
