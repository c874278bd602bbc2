//! Metrics Module for Saliency Evaluation
//!
//! Provides the per-sample metrics reported on benchmark datasets:
//! - Mean absolute error (MAE)
//! - Maximum and average F-measure over a sweep of thresholds
//! - S-measure (structure measure, region + object similarity)
//!
//! Predictions are probability maps in `[0, 1]`, ground truth is a binary map.
//! All denominators are clamped so an all-background ground truth never
//! divides by zero.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SaliencyError};

const EPS: f64 = 1e-20;

/// Scores for a single prediction / ground-truth pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub mae: f64,
    pub max_f: f64,
    pub avg_f: f64,
    pub s_measure: f64,
}

/// Saliency metric evaluator
#[derive(Debug, Clone)]
pub struct SaliencyMetrics {
    /// Number of thresholds swept for the F-measure curve
    pub thresholds: usize,
    /// Precision weight in the F-measure
    pub beta_sq: f64,
    /// Balance between object and region terms in the S-measure
    pub alpha: f64,
}

impl Default for SaliencyMetrics {
    fn default() -> Self {
        Self {
            thresholds: 255,
            beta_sq: 0.3,
            alpha: 0.5,
        }
    }
}

impl SaliencyMetrics {
    /// Evaluate a prediction against its ground truth.
    ///
    /// Both maps are row-major with `height * width` elements.
    pub fn evaluate(
        &self,
        pred: &[f32],
        gt: &[f32],
        height: usize,
        width: usize,
    ) -> Result<MetricScores> {
        let n = height * width;
        if pred.len() != n || gt.len() != n {
            return Err(SaliencyError::Inference(format!(
                "metric inputs must be {}x{} ({} values), got pred={} gt={}",
                height,
                width,
                n,
                pred.len(),
                gt.len()
            )));
        }
        if n == 0 {
            return Err(SaliencyError::Inference(
                "cannot evaluate an empty map".to_string(),
            ));
        }

        let pred: Vec<f64> = pred.iter().map(|&v| (v as f64).clamp(0.0, 1.0)).collect();
        let gt: Vec<f64> = gt
            .iter()
            .map(|&v| if v >= 0.5 { 1.0 } else { 0.0 })
            .collect();

        let (max_f, avg_f) = self.f_measure(&pred, &gt);

        Ok(MetricScores {
            mae: mae(&pred, &gt),
            max_f,
            avg_f,
            s_measure: self.s_measure(&pred, &gt, height, width),
        })
    }

    /// Maximum and mean F-measure over evenly spaced thresholds in `[0, 1)`
    fn f_measure(&self, pred: &[f64], gt: &[f64]) -> (f64, f64) {
        let steps = self.thresholds.max(1);
        let positives: f64 = gt.iter().sum();
        let mut max_f: f64 = 0.0;
        let mut sum_f = 0.0;

        for i in 0..steps {
            let threshold = if steps == 1 {
                0.0
            } else {
                (1.0 - 1e-10) * i as f64 / (steps - 1) as f64
            };

            let mut predicted = 0.0;
            let mut true_pos = 0.0;
            for (&p, &g) in pred.iter().zip(gt) {
                if p >= threshold {
                    predicted += 1.0;
                    true_pos += g;
                }
            }

            let precision = true_pos / (predicted + EPS);
            let recall = true_pos / (positives + EPS);
            let denom = self.beta_sq * precision + recall;
            let f = if denom > 0.0 {
                (1.0 + self.beta_sq) * precision * recall / denom
            } else {
                0.0
            };

            max_f = max_f.max(f);
            sum_f += f;
        }

        (max_f, sum_f / steps as f64)
    }

    fn s_measure(&self, pred: &[f64], gt: &[f64], height: usize, width: usize) -> f64 {
        let gt_mean = mean(gt);

        let score = if gt_mean == 0.0 {
            1.0 - mean(pred)
        } else if gt_mean == 1.0 {
            mean(pred)
        } else {
            self.alpha * object_similarity(pred, gt)
                + (1.0 - self.alpha) * region_similarity(pred, gt, height, width)
        };

        score.clamp(0.0, 1.0)
    }
}

/// Mean absolute error between two maps of equal length
pub fn mae(pred: &[f64], gt: &[f64]) -> f64 {
    let total: f64 = pred.iter().zip(gt).map(|(p, g)| (p - g).abs()).sum();
    total / pred.len().max(1) as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn object_similarity(pred: &[f64], gt: &[f64]) -> f64 {
    let fg: Vec<f64> = pred
        .iter()
        .zip(gt)
        .filter(|(_, &g)| g == 1.0)
        .map(|(&p, _)| p)
        .collect();
    let bg: Vec<f64> = pred
        .iter()
        .zip(gt)
        .filter(|(_, &g)| g == 0.0)
        .map(|(&p, _)| 1.0 - p)
        .collect();

    let u = mean(gt);
    u * object_score(&fg) + (1.0 - u) * object_score(&bg)
}

fn object_score(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let x = mean(values);
    let sigma = if values.len() > 1 {
        let var = values.iter().map(|v| (v - x).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };
    2.0 * x / (x * x + 1.0 + sigma + EPS)
}

fn region_similarity(pred: &[f64], gt: &[f64], height: usize, width: usize) -> f64 {
    let (cx, cy) = centroid(gt, height, width);
    let area = (height * width) as f64;

    let w1 = (cx * cy) as f64 / area;
    let w2 = ((width - cx) * cy) as f64 / area;
    let w3 = (cx * (height - cy)) as f64 / area;
    let w4 = 1.0 - w1 - w2 - w3;

    let quadrants = [
        (0..cy, 0..cx, w1),
        (0..cy, cx..width, w2),
        (cy..height, 0..cx, w3),
        (cy..height, cx..width, w4),
    ];

    quadrants
        .into_iter()
        .map(|(rows, cols, weight)| {
            if weight <= 0.0 {
                return 0.0;
            }
            let mut p = Vec::with_capacity(rows.len() * cols.len());
            let mut g = Vec::with_capacity(rows.len() * cols.len());
            for r in rows {
                for c in cols.clone() {
                    p.push(pred[r * width + c]);
                    g.push(gt[r * width + c]);
                }
            }
            weight * ssim(&p, &g)
        })
        .sum()
}

/// Foreground centroid as (column, row), rounded. Falls back to the image center.
fn centroid(gt: &[f64], height: usize, width: usize) -> (usize, usize) {
    let total: f64 = gt.iter().sum();
    if total == 0.0 {
        return ((width as f64 / 2.0).round() as usize, (height as f64 / 2.0).round() as usize);
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for r in 0..height {
        for c in 0..width {
            let v = gt[r * width + c];
            sum_x += v * c as f64;
            sum_y += v * r as f64;
        }
    }

    let cx = (sum_x / total + EPS).round() as usize;
    let cy = (sum_y / total + EPS).round() as usize;
    (cx.min(width), cy.min(height))
}

fn ssim(pred: &[f64], gt: &[f64]) -> f64 {
    if pred.is_empty() {
        return 0.0;
    }
    let n = pred.len() as f64;
    let x = mean(pred);
    let y = mean(gt);

    let mut sigma_x2 = 0.0;
    let mut sigma_y2 = 0.0;
    let mut sigma_xy = 0.0;
    for (&p, &g) in pred.iter().zip(gt) {
        sigma_x2 += (p - x).powi(2);
        sigma_y2 += (g - y).powi(2);
        sigma_xy += (p - x) * (g - y);
    }
    let denom = n - 1.0 + EPS;
    sigma_x2 /= denom;
    sigma_y2 /= denom;
    sigma_xy /= denom;

    let alpha = 4.0 * x * y * sigma_xy;
    let beta = (x * x + y * y) * (sigma_x2 + sigma_y2);

    if alpha != 0.0 {
        alpha / (beta + EPS)
    } else if beta == 0.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_gt(size: usize, lo: usize, hi: usize) -> Vec<f32> {
        let mut gt = vec![0.0; size * size];
        for r in lo..hi {
            for c in lo..hi {
                gt[r * size + c] = 1.0;
            }
        }
        gt
    }

    #[test]
    fn test_perfect_prediction() {
        let gt = square_gt(16, 4, 12);
        let scores = SaliencyMetrics::default()
            .evaluate(&gt, &gt, 16, 16)
            .unwrap();

        assert_eq!(scores.mae, 0.0);
        assert!((scores.max_f - 1.0).abs() < 1e-6);
        assert!(scores.s_measure > 0.99);
    }

    #[test]
    fn test_inverted_prediction_is_poor() {
        let gt = square_gt(16, 4, 12);
        let inverted: Vec<f32> = gt.iter().map(|v| 1.0 - v).collect();
        let scores = SaliencyMetrics::default()
            .evaluate(&inverted, &gt, 16, 16)
            .unwrap();

        assert_eq!(scores.mae, 1.0);
        assert!(scores.s_measure < 0.1);
    }

    #[test]
    fn test_all_background_gt_has_finite_scores() {
        let gt = vec![0.0; 64];
        let pred = vec![0.25; 64];
        let scores = SaliencyMetrics::default().evaluate(&pred, &gt, 8, 8).unwrap();

        assert!((scores.mae - 0.25).abs() < 1e-9);
        assert!((scores.s_measure - 0.75).abs() < 1e-9);
        assert!(scores.max_f.is_finite());
        assert!(scores.avg_f.is_finite());
        assert_eq!(scores.max_f, 0.0);
    }

    #[test]
    fn test_scores_within_unit_range() {
        let gt = square_gt(12, 2, 7);
        let pred: Vec<f32> = (0..144).map(|i| (i % 13) as f32 / 12.0).collect();
        let s = SaliencyMetrics::default().evaluate(&pred, &gt, 12, 12).unwrap();

        for v in [s.mae, s.max_f, s.avg_f, s.s_measure] {
            assert!((0.0..=1.0).contains(&v), "score {} out of range", v);
        }
        assert!(s.avg_f <= s.max_f);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let result = SaliencyMetrics::default().evaluate(&[0.0; 10], &[0.0; 16], 4, 4);
        assert!(result.is_err());
    }
}
