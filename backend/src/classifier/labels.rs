//! Turns raw classifier scores into a label, a confidence, a health flag and
//! a crop type.
//!
//! The string heuristics (`is_diseased`, `crop_type_from_class`) are plain
//! functions over a label so they can be exercised without a model or a
//! database.

use serde::Serialize;

use super::catalog::ClassCatalog;

/// Case-insensitive substrings that mark a class as diseased.
pub const DISEASE_KEYWORDS: &[&str] = &[
    "disease",
    "diseases",
    "blight",
    "rust",
    "mildew",
    "leaf spot",
    "bacterial",
    "viral",
    "wilt",
    "infect",
];

/// Words dropped before picking the crop name out of a free-form label.
const CROP_NOISE_WORDS: &[&str] = &["plant", "crop", "disease", "diseases"];

const CROP_SEPARATOR: &str = "___";
const SUM_CLIP: f32 = 1e-9;
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub class_index: usize,
    pub label: String,
    /// Probability of the predicted class, in `[0, 1]`.
    pub confidence: f32,
    pub is_healthy: bool,
    pub crop_type: String,
}

#[derive(Debug, Clone)]
pub struct LabelInterpreter {
    catalog: ClassCatalog,
}

impl LabelInterpreter {
    pub fn new(catalog: ClassCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// `declared_classes` is the class count the model reported about itself;
    /// when it is `None` the length of `scores` is used instead.
    pub fn interpret(&self, scores: &[f32], declared_classes: Option<usize>) -> Interpretation {
        let probabilities = if is_distribution(scores) {
            scores.to_vec()
        } else {
            softmax(scores)
        };

        let (class_index, confidence) = argmax(&probabilities).unwrap_or((0, 0.0));
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let expected = declared_classes.unwrap_or(scores.len());
        let catalog_name = if self.catalog.len() == expected {
            self.catalog.get(class_index)
        } else {
            None
        };
        let label = match catalog_name {
            Some(name) => name.to_string(),
            None => {
                log::warn!(
                    "Class names mismatch: catalog has {} entries vs model classes={}, output length={}",
                    self.catalog.len(),
                    expected,
                    scores.len()
                );
                synthetic_label(class_index)
            }
        };

        let is_healthy = !is_diseased(&label);
        let crop_type = crop_type_from_class(&label);

        Interpretation {
            class_index,
            label,
            confidence,
            is_healthy,
            crop_type,
        }
    }
}

pub fn synthetic_label(index: usize) -> String {
    format!("Class_{}", index)
}

/// Numerically stable softmax: shifts by the max before exponentiating and
/// divides by the sum clipped below at `1e-9`.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum = exps.iter().sum::<f32>().max(SUM_CLIP);
    exps.into_iter().map(|e| e / sum).collect()
}

/// True when `scores` already look like a probability distribution.
pub fn is_distribution(scores: &[f32]) -> bool {
    if scores.is_empty() || !scores.iter().all(|s| (0.0..=1.0).contains(s)) {
        return false;
    }
    (scores.iter().sum::<f32>() - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

/// Index and value of the first maximum; NaN entries are skipped.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if !(v > b) => best,
            _ if v.is_nan() => best,
            _ => Some((i, v)),
        })
}

pub fn is_diseased(class_name: &str) -> bool {
    let lowered = class_name.to_lowercase();
    DISEASE_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// `"Corn___Leaf_Blight"` gives `"Corn"`, `"Wheat Crop Diseases"` gives
/// `"Wheat"`. Falls back to the whole label when nothing is left.
pub fn crop_type_from_class(class_name: &str) -> String {
    if let Some((crop, _)) = class_name.split_once(CROP_SEPARATOR) {
        return crop.trim().to_string();
    }

    let spaced = class_name.replace('_', " ");
    spaced
        .split_whitespace()
        .find(|word| {
            !CROP_NOISE_WORDS
                .iter()
                .any(|noise| word.eq_ignore_ascii_case(noise))
        })
        .map(str::to_string)
        .unwrap_or_else(|| class_name.to_string())
}
