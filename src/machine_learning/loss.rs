//! Loss functions for classifier training

use ndarray::ArrayView2;

use crate::machine_learning::core::ConfigurationError;

/// Probability floor used to keep logarithms finite
pub const EPSILON: f64 = 1e-15;

/// Trait for classification losses
pub trait ClassificationLoss: Send + Sync {
    /// Loss between true labels and predicted class probabilities.
    ///
    /// `labels` holds the sorted distinct labels of the full training set;
    /// column `j` of `proba` is the probability of `labels[j]`.
    fn loss(&self, y_true: &[usize], proba: ArrayView2<f64>, labels: &[usize]) -> Result<f64, ConfigurationError>;
}

impl<F> ClassificationLoss for F
where
    F: Fn(&[usize], ArrayView2<f64>, &[usize]) -> Result<f64, ConfigurationError> + Send + Sync,
{
    fn loss(&self, y_true: &[usize], proba: ArrayView2<f64>, labels: &[usize]) -> Result<f64, ConfigurationError> {
        self(y_true, proba, labels)
    }
}

/// Cross-Entropy loss for multi-class classification
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl ClassificationLoss for CrossEntropy {
    fn loss(&self, y_true: &[usize], proba: ArrayView2<f64>, labels: &[usize]) -> Result<f64, ConfigurationError> {
        if y_true.len() != proba.nrows() {
            return Err(ConfigurationError::InvalidValue(format!(
                "{} targets for {} probability rows",
                y_true.len(),
                proba.nrows()
            )));
        }
        if y_true.is_empty() {
            return Err(ConfigurationError::InvalidValue("no samples to score".to_string()));
        }
        if proba.ncols() < labels.len() {
            return Err(ConfigurationError::CardinalityMismatch {
                declared: proba.ncols(),
                observed: labels.len(),
            });
        }

        let mut loss = 0.0;
        for (row, &target) in proba.rows().into_iter().zip(y_true) {
            let column = labels.binary_search(&target).map_err(|_| {
                ConfigurationError::InvalidValue(format!("label {} is not one of {:?}", target, labels))
            })?;

            // Clip, then renormalize so that each row is a distribution again
            let clipped = row.mapv(|p| p.clamp(EPSILON, 1.0 - EPSILON));
            let p = clipped[column] / clipped.sum();
            loss -= p.ln();
        }

        Ok(loss / y_true.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction_has_near_zero_loss() {
        let proba = array![[1.0, 0.0], [0.0, 1.0]];
        let loss = CrossEntropy.loss(&[0, 1], proba.view(), &[0, 1]).unwrap();
        assert!(loss < 1e-12);
    }

    #[test]
    fn test_uniform_prediction() {
        let proba = array![[0.5, 0.5], [0.5, 0.5]];
        let loss = CrossEntropy.loss(&[0, 1], proba.view(), &[0, 1]).unwrap();
        assert!((loss - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_rows_are_renormalized() {
        // Selected bitstrings need not carry the full probability mass
        let proba = array![[0.2, 0.2]];
        let loss = CrossEntropy.loss(&[3], proba.view(), &[1, 3]).unwrap();
        assert!((loss - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let proba = array![[0.5, 0.5]];
        assert!(CrossEntropy.loss(&[2], proba.view(), &[0, 1]).is_err());
    }

    fn constant_loss(_: &[usize], _: ArrayView2<f64>, _: &[usize]) -> Result<f64, ConfigurationError> {
        Ok(0.25)
    }

    #[test]
    fn test_functions_are_losses() {
        let proba = array![[0.5, 0.5]];
        assert_eq!(constant_loss.loss(&[0], proba.view(), &[0, 1]).unwrap(), 0.25);
    }
}
