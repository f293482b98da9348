use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    /// Append an implicit `return` to void bodies that can fall off the end.
    pub ensure_terminated: bool,
    /// Attach each statement's source text to its IR node.
    pub annotate_source: bool,
    /// Runtime index checks for non-literal subscripts.
    pub array_bounds_check: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            ensure_terminated: true,
            annotate_source: true,
            array_bounds_check: true,
        }
    }
}

impl LoweringConfig {
    pub fn minimal() -> Self {
        Self {
            ensure_terminated: true,
            annotate_source: false,
            array_bounds_check: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: LoweringConfig = serde_json::from_str(r#"{"annotate_source": false}"#).unwrap();
        assert!(config.ensure_terminated);
        assert!(!config.annotate_source);
        assert!(config.array_bounds_check);
    }
}
