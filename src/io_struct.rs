//! Wire types for the prediction endpoint.

use serde::{Deserialize, Serialize};

/// One ranked entry of a classification response.
///
/// `confidence` is a percentage in [0, 100], rounded to two decimal places;
/// `class_idx` indexes into [`crate::labels::CLASS_NAMES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f32,
    pub class_idx: usize,
}
