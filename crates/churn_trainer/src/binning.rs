//! Feature quantization for histogram split finding
//!
//! Bin 0 of every column holds missing values. Numeric columns map the
//! remaining values onto at most `max_bin - 1` quantile bins whose upper
//! bounds become split thresholds; categorical columns get one bin per
//! observed code.

use churn_core::FeatureType;
use rayon::prelude::*;

use crate::matrix::TypedMatrix;

/// Bin index reserved for missing values
pub const MISSING_BIN: u32 = 0;

/// Value → bin mapping for one column
#[derive(Debug, Clone, PartialEq)]
pub enum BinMapper {
    /// Strictly increasing upper bounds; bin `b` (1-based) holds values in
    /// `(cuts[b - 2], cuts[b - 1]]` and the last bin everything above
    Numeric { cuts: Vec<f64> },
    /// Sorted distinct category codes; bin `b` holds `codes[b - 1]`
    Categorical { codes: Vec<u32> },
}

impl BinMapper {
    /// Quantile cuts over the non-missing values of a numeric column
    pub fn numeric(values: impl Iterator<Item = f64>, max_bin: usize) -> Self {
        let mut sorted: Vec<f64> = values.filter(|v| !v.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);

        let Some(&max) = sorted.last() else {
            return BinMapper::Numeric { cuts: Vec::new() };
        };

        let mut distinct = sorted.clone();
        distinct.dedup();

        let value_bins = max_bin.saturating_sub(1).max(1);
        let mut cuts: Vec<f64> = if distinct.len() <= value_bins {
            distinct
        } else {
            let n = sorted.len();
            (1..value_bins).map(|i| sorted[i * n / value_bins - 1]).collect()
        };
        cuts.dedup();
        cuts.retain(|&c| c < max);

        BinMapper::Numeric { cuts }
    }

    /// One bin per observed code of a categorical column
    pub fn categorical(values: impl Iterator<Item = f64>) -> Self {
        let mut codes: Vec<u32> = values.filter(|v| !v.is_nan()).map(|v| v as u32).collect();
        codes.sort_unstable();
        codes.dedup();
        BinMapper::Categorical { codes }
    }

    /// Total bins including the missing bin
    pub fn num_bins(&self) -> usize {
        match self {
            BinMapper::Numeric { cuts } => cuts.len() + 2,
            BinMapper::Categorical { codes } => codes.len() + 1,
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, BinMapper::Categorical { .. })
    }

    pub fn bin(&self, value: f64) -> u32 {
        if value.is_nan() {
            return MISSING_BIN;
        }
        let idx = match self {
            BinMapper::Numeric { cuts } => cuts.partition_point(|&c| c < value),
            BinMapper::Categorical { codes } => match codes.binary_search(&(value as u32)) {
                Ok(idx) => idx,
                // Unseen codes share the missing bin
                Err(_) => return MISSING_BIN,
            },
        };
        idx as u32 + 1
    }

    /// Threshold of the numeric split `bin <= b`
    pub fn threshold(&self, bin: u32) -> Option<f64> {
        match self {
            BinMapper::Numeric { cuts } if bin >= 1 => cuts.get(bin as usize - 1).copied(),
            _ => None,
        }
    }

    /// Category code held by a categorical bin
    pub fn category(&self, bin: u32) -> Option<u32> {
        match self {
            BinMapper::Categorical { codes } if bin >= 1 => codes.get(bin as usize - 1).copied(),
            _ => None,
        }
    }
}

/// Column-major binned copy of a training matrix
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    pub columns: Vec<Vec<u32>>,
    pub mappers: Vec<BinMapper>,
    pub num_rows: usize,
}

impl BinnedMatrix {
    pub fn from_matrix(matrix: &TypedMatrix, max_bin: usize) -> Self {
        let (mappers, columns): (Vec<_>, Vec<_>) = (0..matrix.num_features())
            .into_par_iter()
            .map(|feature| {
                let mapper = match matrix.feature_types[feature] {
                    FeatureType::Numeric => BinMapper::numeric(matrix.column(feature), max_bin),
                    FeatureType::Categorical => BinMapper::categorical(matrix.column(feature)),
                };
                let column = matrix.column(feature).map(|v| mapper.bin(v)).collect::<Vec<_>>();
                (mapper, column)
            })
            .unzip();

        Self {
            columns,
            mappers,
            num_rows: matrix.num_rows(),
        }
    }

    pub fn num_features(&self) -> usize {
        self.mappers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_few_distinct_values_keep_exact_cuts() {
        let mapper = BinMapper::numeric([3.0, 1.0, 2.0, 2.0, f64::NAN].into_iter(), 256);
        assert_eq!(mapper, BinMapper::Numeric { cuts: vec![1.0, 2.0] });
        assert_eq!(mapper.num_bins(), 4);

        assert_eq!(mapper.bin(f64::NAN), MISSING_BIN);
        assert_eq!(mapper.bin(0.5), 1);
        assert_eq!(mapper.bin(1.0), 1);
        assert_eq!(mapper.bin(1.5), 2);
        assert_eq!(mapper.bin(3.0), 3);
        assert_eq!(mapper.threshold(2), Some(2.0));
        assert_eq!(mapper.threshold(0), None);
        assert_eq!(mapper.threshold(3), None);
    }

    #[test]
    fn test_quantile_cuts_bounded_by_max_bin() {
        let mapper = BinMapper::numeric((0..1000).map(f64::from), 17);
        match &mapper {
            BinMapper::Numeric { cuts } => {
                assert!(cuts.len() <= 15);
                assert!(cuts.windows(2).all(|w| w[0] < w[1]));
            }
            other => panic!("unexpected mapper {other:?}"),
        }
        assert!(mapper.num_bins() <= 17);
    }

    #[test]
    fn test_threshold_agrees_with_bins() {
        let values: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 / 7.0).collect();
        let mapper = BinMapper::numeric(values.iter().copied(), 32);
        for b in 1..mapper.num_bins() as u32 - 1 {
            let threshold = mapper.threshold(b).unwrap();
            for &v in &values {
                assert_eq!(v <= threshold, mapper.bin(v) <= b);
            }
        }
    }

    #[test]
    fn test_categorical_bins() {
        let mapper = BinMapper::categorical([4.0, 1.0, f64::NAN, 4.0].into_iter());
        assert_eq!(mapper.num_bins(), 3);
        assert_eq!(mapper.bin(1.0), 1);
        assert_eq!(mapper.bin(4.0), 2);
        assert_eq!(mapper.bin(7.0), MISSING_BIN);
        assert_eq!(mapper.category(2), Some(4));
        assert_eq!(mapper.category(0), None);
    }

    #[test]
    fn test_binned_matrix_is_column_major() {
        let matrix = TypedMatrix {
            rows: vec![vec![1.0, 0.0], vec![5.0, 2.0], vec![f64::NAN, 0.0]],
            labels: vec![0, 1, 0],
            feature_names: vec!["amount".into(), "plan".into()],
            feature_types: vec![FeatureType::Numeric, FeatureType::Categorical],
        };
        let binned = BinnedMatrix::from_matrix(&matrix, 256);

        assert_eq!(binned.num_rows, 3);
        assert_eq!(binned.num_features(), 2);
        assert_eq!(binned.columns[0], vec![1, 2, 0]);
        assert_eq!(binned.columns[1], vec![1, 2, 1]);
        assert!(binned.mappers[1].is_categorical());
    }
}
