//! Training-set helpers: label encoding and minibatch sampling

use rand::Rng;

use crate::machine_learning::core::ConfigurationError;

/// Sorted distinct labels of a full training set.
///
/// The position of a label in this set is the class column it is scored
/// against, so the encoding stays fixed even when a minibatch misses a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<usize>,
}

impl LabelSet {
    pub fn from_targets(targets: &[usize]) -> Self {
        let mut labels = targets.to_vec();
        labels.sort_unstable();
        labels.dedup();
        LabelSet { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Class column of `label`, if it belongs to the set
    pub fn position(&self, label: usize) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }
}

/// Draws minibatch indices without replacement
#[derive(Debug, Clone, Copy)]
pub struct MinibatchSampler {
    n_samples: usize,
    batch_size: usize,
}

impl MinibatchSampler {
    /// `batch_size` of `None` or `Some(0)` uses the full set, reshuffled on every draw
    pub fn new(n_samples: usize, batch_size: Option<usize>) -> Result<Self, ConfigurationError> {
        if n_samples == 0 {
            return Err(ConfigurationError::InvalidValue("training set is empty".to_string()));
        }

        let batch_size = match batch_size {
            None | Some(0) => n_samples,
            Some(size) if size > n_samples => {
                return Err(ConfigurationError::InvalidValue(format!(
                    "batch size {} exceeds the {} training samples",
                    size, n_samples
                )))
            }
            Some(size) => size,
        };

        Ok(MinibatchSampler {
            n_samples,
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Distinct indices in random exposure order
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        rand::seq::index::sample(rng, self.n_samples, self.batch_size).into_vec()
    }
}
