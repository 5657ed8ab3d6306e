use std::env;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::permissions::DEFAULT_MAX_LISTS_PER_OWNER;

pub const MAX_LISTS_ENV: &str = "LISTS_MAX_PER_OWNER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListsConfig {
    pub max_lists_per_owner: i64,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            max_lists_per_owner: DEFAULT_MAX_LISTS_PER_OWNER,
        }
    }
}

impl ListsConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_LISTS_ENV) {
            config.max_lists_per_owner = parse_max_lists(&raw)?;
        }
        Ok(config)
    }

    pub fn with_max_lists_per_owner(mut self, max_lists_per_owner: i64) -> Self {
        self.max_lists_per_owner = max_lists_per_owner;
        self
    }
}

fn parse_max_lists(raw: &str) -> Result<i64> {
    let value = raw.trim().parse::<i64>().map_err(|err| {
        LibError::invalid_with_code(
            "config_invalid",
            "LISTS_MAX_PER_OWNER must be a whole number",
            anyhow!("invalid {} {:?}: {}", MAX_LISTS_ENV, raw, err),
        )
    })?;
    if value < 0 {
        return Err(LibError::invalid_with_code(
            "config_invalid",
            "LISTS_MAX_PER_OWNER must not be negative",
            anyhow!("negative {} {}", MAX_LISTS_ENV, value),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_to_one_thousand_lists() {
        let config = ListsConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(config.max_lists_per_owner, 1000);
    }

    #[test]
    fn reads_limit_from_environment_lookup() {
        let config = ListsConfig::from_lookup(|key| {
            (key == MAX_LISTS_ENV).then(|| " 25 ".to_string())
        })
        .expect("valid limit");
        assert_eq!(config.max_lists_per_owner, 25);
    }

    #[test]
    fn rejects_garbage_and_negative_limits() {
        for raw in ["lots", "-1", ""] {
            let err = ListsConfig::from_lookup(|_| Some(raw.to_string()))
                .expect_err("limit should be rejected");
            assert_eq!(err.code, "config_invalid");
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ListsConfig = serde_json::from_value(json!({})).expect("empty config");
        assert_eq!(config, ListsConfig::default());

        let config: ListsConfig =
            serde_json::from_value(json!({"maxListsPerOwner": 3})).expect("explicit config");
        assert_eq!(config.max_lists_per_owner, 3);
    }
}
