//! Shared math utilities for detection infrastructure.
//!
//! Greedy non-maximum suppression and activation helpers used by both the
//! object and palm detectors.

use crate::shared::geometry::BoundingBox;

/// A scored box candidate as seen by [`nms`].
pub trait Scored {
    fn bbox(&self) -> &BoundingBox;
    fn score(&self) -> f64;
    /// Candidates only suppress others in the same group (e.g. class id).
    fn group(&self) -> usize {
        0
    }
}

/// Greedy NMS: sort by score descending, suppress overlapping boxes of the
/// same group whose IoU exceeds `iou_thresh`.
pub fn nms<T: Scored>(mut candidates: Vec<T>, iou_thresh: f64) -> Vec<T> {
    candidates.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..candidates.len() {
            if suppressed[j] || candidates[i].group() != candidates[j].group() {
                continue;
            }
            if candidates[i].bbox().iou(candidates[j].bbox()) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }

    candidates
        .into_iter()
        .zip(suppressed)
        .filter_map(|(c, s)| (!s).then_some(c))
        .collect()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Interprets a model score as a probability, applying the sigmoid when
/// the model emits raw logits.
pub fn as_probability(x: f32) -> f32 {
    if (0.0..=1.0).contains(&x) {
        x
    } else {
        sigmoid(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Candidate {
        bbox: BoundingBox,
        score: f64,
        group: usize,
    }

    impl Scored for Candidate {
        fn bbox(&self) -> &BoundingBox {
            &self.bbox
        }
        fn score(&self) -> f64 {
            self.score
        }
        fn group(&self) -> usize {
            self.group
        }
    }

    fn candidate(x1: f64, y1: f64, x2: f64, y2: f64, score: f64, group: usize) -> Candidate {
        Candidate {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            score,
            group,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let kept = nms(
            vec![
                candidate(0.0, 0.0, 100.0, 100.0, 0.9, 0),
                candidate(5.0, 5.0, 105.0, 105.0, 0.8, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let kept = nms(
            vec![
                candidate(0.0, 0.0, 50.0, 50.0, 0.9, 0),
                candidate(200.0, 200.0, 250.0, 250.0, 0.8, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_confidence_ordering() {
        let kept = nms(
            vec![
                candidate(0.0, 0.0, 100.0, 100.0, 0.5, 0),
                candidate(2.0, 2.0, 102.0, 102.0, 0.9, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_is_group_aware() {
        let kept = nms(
            vec![
                candidate(0.0, 0.0, 100.0, 100.0, 0.9, 0),
                candidate(0.0, 0.0, 100.0, 100.0, 0.8, 1),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        let kept: Vec<Candidate> = nms(Vec::new(), 0.45);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_as_probability_passes_probabilities_through() {
        assert_eq!(as_probability(0.7), 0.7);
        assert!((as_probability(4.0) - sigmoid(4.0)).abs() < 1e-6);
        assert!(as_probability(-4.0) < 0.05);
    }
}
