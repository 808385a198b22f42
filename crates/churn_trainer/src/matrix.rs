//! Typed feature matrix handed to the booster

use churn_core::{ChurnError, FeatureType};
use std::collections::HashMap;

use crate::errors::Result;

/// Rows, labels and per-column semantic types
#[derive(Clone, Debug, PartialEq)]
pub struct TypedMatrix {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    pub feature_names: Vec<String>,
    pub feature_types: Vec<FeatureType>,
}

impl TypedMatrix {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature name for a column index
    pub fn feature_name(&self, idx: usize) -> Option<&str> {
        self.feature_names.get(idx).map(String::as_str)
    }

    pub fn feature_type(&self, idx: usize) -> Option<FeatureType> {
        self.feature_types.get(idx).copied()
    }

    /// Values of a single column
    pub fn column(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[idx])
    }
}

/// Package rows and labels with one type tag per feature column
///
/// Every name in `feature_names` must appear in exactly one of
/// `numeric` / `categorical`, and both lists may only name declared columns.
pub fn build_matrix(
    rows: Vec<Vec<f64>>,
    labels: Vec<u8>,
    feature_names: &[String],
    numeric: &[String],
    categorical: &[String],
) -> Result<TypedMatrix> {
    let feature_types = classify_features(feature_names, numeric, categorical)?;

    if rows.len() != labels.len() {
        return Err(ChurnError::data(format!(
            "{} rows but {} labels",
            rows.len(),
            labels.len()
        ))
        .into());
    }

    for (i, row) in rows.iter().enumerate() {
        if row.len() != feature_names.len() {
            return Err(ChurnError::data(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                feature_names.len()
            ))
            .into());
        }
        for (j, &value) in row.iter().enumerate() {
            if feature_types[j].is_categorical() && !is_category_code(value) {
                return Err(ChurnError::data(format!(
                    "row {} column `{}` holds {} which is not a category code",
                    i, feature_names[j], value
                ))
                .into());
            }
        }
    }

    if let Some((i, label)) = labels.iter().enumerate().find(|&(_, &y)| y > 1) {
        return Err(ChurnError::data(format!("label {} at row {} is not binary", label, i)).into());
    }

    Ok(TypedMatrix {
        rows,
        labels,
        feature_names: feature_names.to_vec(),
        feature_types,
    })
}

fn classify_features(
    feature_names: &[String],
    numeric: &[String],
    categorical: &[String],
) -> Result<Vec<FeatureType>> {
    let declared: HashMap<&str, usize> = feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut types: Vec<Option<FeatureType>> = vec![None; feature_names.len()];
    for (list, feature_type) in [(numeric, FeatureType::Numeric), (categorical, FeatureType::Categorical)] {
        for name in list {
            let idx = *declared.get(name.as_str()).ok_or_else(|| {
                ChurnError::config(
                    format!("features.{}", feature_type),
                    format!("`{}` is not one of the matrix columns", name),
                )
            })?;
            if let Some(existing) = types[idx] {
                return Err(ChurnError::config(
                    "features",
                    format!("`{}` is declared both {} and {}", name, existing, feature_type),
                )
                .into());
            }
            types[idx] = Some(feature_type);
        }
    }

    types
        .into_iter()
        .zip(feature_names)
        .map(|(t, name)| {
            t.ok_or_else(|| {
                ChurnError::config(
                    "features",
                    format!("`{}` is neither numeric nor categorical", name),
                )
                .into()
            })
        })
        .collect()
}

fn is_category_code(value: f64) -> bool {
    value.is_nan() || (value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_types_follow_column_order() -> Result<()> {
        let matrix = build_matrix(
            vec![vec![1.0, 2.0, 10.5], vec![0.0, f64::NAN, 3.0]],
            vec![0, 1],
            &names(&["plan", "channel", "amount"]),
            &names(&["amount"]),
            &names(&["channel", "plan"]),
        )?;

        assert_eq!(
            matrix.feature_types,
            vec![FeatureType::Categorical, FeatureType::Categorical, FeatureType::Numeric]
        );
        assert_eq!(matrix.feature_name(2), Some("amount"));
        assert_eq!(matrix.feature_name(3), None);
        assert_eq!(matrix.column(2).collect::<Vec<_>>(), vec![10.5, 3.0]);
        Ok(())
    }

    #[test]
    fn test_unclassified_feature_rejected() {
        let err = build_matrix(
            vec![vec![1.0, 2.0]],
            vec![0],
            &names(&["a", "b"]),
            &names(&["a"]),
            &[],
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("`b`"));
    }

    #[test]
    fn test_double_classification_rejected() {
        let err = build_matrix(
            vec![vec![1.0]],
            vec![0],
            &names(&["a"]),
            &names(&["a"]),
            &names(&["a"]),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_type_list_name_rejected() {
        let err = build_matrix(
            vec![vec![1.0]],
            vec![0],
            &names(&["a"]),
            &names(&["a", "ghost"]),
            &[],
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_shape_mismatches_are_data_errors() {
        let err = build_matrix(vec![vec![1.0]], vec![0, 1], &names(&["a"]), &names(&["a"]), &[])
            .unwrap_err();
        assert!(!err.is_configuration());

        let err = build_matrix(vec![vec![1.0, 2.0]], vec![0], &names(&["a"]), &names(&["a"]), &[])
            .unwrap_err();
        assert!(err.to_string().contains("2 values"));
    }

    #[test]
    fn test_invalid_category_code_rejected() {
        let err = build_matrix(vec![vec![1.5]], vec![0], &names(&["c"]), &[], &names(&["c"]))
            .unwrap_err();
        assert!(err.to_string().contains("category code"));

        let err = build_matrix(vec![vec![-1.0]], vec![0], &names(&["c"]), &[], &names(&["c"]))
            .unwrap_err();
        assert!(err.to_string().contains("category code"));
    }

    #[test]
    fn test_empty_matrix_is_valid() -> Result<()> {
        let matrix = build_matrix(vec![], vec![], &names(&["a"]), &names(&["a"]), &[])?;
        assert!(matrix.is_empty());
        assert_eq!(matrix.num_features(), 1);
        Ok(())
    }
}
