use ndarray::ArrayView1;
use serde::{Serialize, Deserialize};

/// Statistics for a collection of values
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
    pub count: usize,
}

impl Statistics {
    /// Compute statistics from a slice of values; all zeros when empty
    pub fn from_slice(values: &[f32]) -> Self {
        if values.is_empty() {
            return Statistics::default();
        }

        let count = values.len();
        let sum: f32 = values.iter().sum();
        let mean = sum / count as f32;

        let variance = values.iter()
            .map(|&x| (x - mean).powi(2))
            .sum::<f32>() / count as f32;
        let std = variance.sqrt();

        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        Statistics {
            mean,
            std,
            min,
            max,
            count,
        }
    }

    /// Compute statistics from an array view
    pub fn from_array(array: ArrayView1<f32>) -> Self {
        let values: Vec<f32> = array.iter().copied().collect();
        Self::from_slice(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_statistics() {
        let stats = Statistics::from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 2.5).abs() < 1e-6);
        assert!((stats.std - 1.25f32.sqrt()).abs() < 1e-6);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(Statistics::from_slice(&[]), Statistics::default());
    }

    #[test]
    fn test_non_contiguous_view() {
        let a = array![[1.0, 10.0], [3.0, 20.0]];
        let stats = Statistics::from_array(a.column(0));
        assert_eq!(stats.mean, 2.0);
    }
}
