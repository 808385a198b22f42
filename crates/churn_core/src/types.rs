//! Common data structures shared by the trainer and the model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a feature column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    /// Quantitative column, split on value thresholds
    Numeric,
    /// Integer-coded column, split on category sets
    Categorical,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Numeric => "numeric",
            FeatureType::Categorical => "categorical",
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureType::Categorical)
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_type_names() {
        assert_eq!(FeatureType::Numeric.to_string(), "numeric");
        assert_eq!(FeatureType::Categorical.to_string(), "categorical");
        assert!(FeatureType::Categorical.is_categorical());

        let json = serde_json::to_string(&FeatureType::Categorical).unwrap();
        assert_eq!(json, "\"categorical\"");
    }
}
