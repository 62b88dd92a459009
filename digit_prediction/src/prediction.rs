use crate::model_service::ModelError;
use serde::{Deserialize, Serialize};

pub const NUM_CLASSES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: u8,
    /// Probability of `predicted_class`, as a percentage.
    pub confidence: f64,
}

impl PredictionResult {
    /// Picks the most probable class. Ties resolve to the lowest index.
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self, ModelError> {
        if probabilities.len() != NUM_CLASSES {
            return Err(ModelError::InvalidOutput(format!(
                "expected {} class probabilities, got {}",
                NUM_CLASSES,
                probabilities.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::InvalidOutput(format!(
                "non-finite probability in {:?}",
                probabilities
            )));
        }

        let (class_id, probability) = probabilities
            .iter()
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
            .ok_or_else(|| ModelError::InvalidOutput("empty output".to_string()))?;

        Ok(Self {
            predicted_class: class_id as u8,
            confidence: f64::from(probability) * 100.,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_and_percentage() {
        let probabilities = [0.1, 0.05, 0.05, 0.7, 0.02, 0.02, 0.02, 0.02, 0.01, 0.01];
        let result = PredictionResult::from_probabilities(&probabilities).unwrap();

        assert_eq!(result.predicted_class, 3);
        assert!((result.confidence - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_ties_resolve_to_first_index() {
        let probabilities = [0.0, 0.4, 0.0, 0.0, 0.4, 0.0, 0.1, 0.1, 0.0, 0.0];
        let result = PredictionResult::from_probabilities(&probabilities).unwrap();

        assert_eq!(result.predicted_class, 1);
    }

    #[test]
    fn test_rejects_wrong_class_count() {
        let result = PredictionResult::from_probabilities(&[0.5, 0.5]);

        assert!(matches!(result, Err(ModelError::InvalidOutput(_))));
    }

    #[test]
    fn test_rejects_nan() {
        let mut probabilities = [0.1_f32; NUM_CLASSES];
        probabilities[2] = f32::NAN;

        assert!(PredictionResult::from_probabilities(&probabilities).is_err());
    }

    #[test]
    fn test_serializes_to_gateway_contract() {
        let result = PredictionResult {
            predicted_class: 7,
            confidence: 93.5,
        };
        let json = serde_json::to_value(result).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"predicted_class": 7, "confidence": 93.5})
        );
    }
}
