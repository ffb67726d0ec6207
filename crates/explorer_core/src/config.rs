//! Explorer configuration.

use crate::pipeline::FaultMode;
use crate::storage::Page;
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u32 = 25;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Used when a request asks for a limit of 0.
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Mode for list views when the caller does not ask for one.
    pub list_mode: FaultMode,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            list_mode: FaultMode::Tolerant,
        }
    }
}

impl ExplorerConfig {
    pub fn page(&self, offset: u32, limit: u32) -> Page {
        let limit = if limit == 0 {
            self.default_page_size
        } else {
            limit
        };
        Page {
            offset,
            limit: limit.min(self.max_page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamps_and_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.page(0, 0).limit, DEFAULT_PAGE_SIZE);
        assert_eq!(config.page(10, 1000).limit, MAX_PAGE_SIZE);
        assert_eq!(config.page(10, 7), Page { offset: 10, limit: 7 });
    }

    #[test]
    fn partial_config_from_json() {
        let config: ExplorerConfig = serde_json::from_str(r#"{"list_mode":"strict"}"#).unwrap();
        assert_eq!(config.list_mode, FaultMode::Strict);
        assert_eq!(config.max_page_size, MAX_PAGE_SIZE);
    }
}
