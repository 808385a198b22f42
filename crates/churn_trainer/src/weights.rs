//! Class-imbalance correction

use tracing::info;

/// Positive-class weight `negatives / positives`
///
/// Falls back to `1.0` when the labels contain no positives.
pub fn compute_scale_pos_weight(labels: &[u8]) -> f64 {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;

    let weight = if positives > 0 {
        negatives as f64 / positives as f64
    } else {
        1.0
    };

    info!(
        negatives,
        positives,
        "Scale pos weight: {:.4} (neg={}, pos={})",
        weight,
        negatives,
        positives
    );
    weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imbalanced_labels() {
        assert_eq!(compute_scale_pos_weight(&[0, 0, 0, 0, 1]), 4.0);
    }

    #[test]
    fn test_balanced_labels() {
        assert_eq!(compute_scale_pos_weight(&[0, 0, 1, 1]), 1.0);
    }

    #[test]
    fn test_no_positives_defaults_to_one() {
        assert_eq!(compute_scale_pos_weight(&[0, 0, 0, 0]), 1.0);
        assert_eq!(compute_scale_pos_weight(&[]), 1.0);
    }

    #[test]
    fn test_only_positives() {
        assert_eq!(compute_scale_pos_weight(&[1, 1, 1]), 0.0);
    }
}
