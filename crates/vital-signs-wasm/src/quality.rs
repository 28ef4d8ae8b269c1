//! 信号质量评估
//!
//! 对放大后的 PPG 窗口打 0-1 分：
//! - 周期性（心率滞后带内自相关峰值）: 50%
//! - 幅度充足度: 30%
//! - 基线稳定性: 20%
//!
//! 少于 30 个样本或窗口为常数时返回 0。

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::stats;

const MIN_SAMPLES: usize = 30;

const PERIODICITY_WEIGHT: f64 = 0.5;
const AMPLITUDE_WEIGHT: f64 = 0.3;
const STABILITY_WEIGHT: f64 = 0.2;

/// 放大后峰峰值（p5-p95）的可用区间
const MIN_USABLE_AMPLITUDE: f64 = 1.0;
const FULL_AMPLITUDE: f64 = 8.0;

const MIN_HEART_HZ: f64 = 0.7;
const MAX_HEART_HZ: f64 = 3.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub periodicity: f64,
    pub amplitude: f64,
    pub stability: f64,
    pub score: f64,
}

#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct SignalQualityAnalyzer {
    min_samples: usize,
}

#[wasm_bindgen]
impl SignalQualityAnalyzer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
        }
    }

    /// 综合质量分 (0-1)
    pub fn assess(&self, buffer: &[f64], sample_rate: f64) -> f64 {
        self.report(buffer, sample_rate).score
    }
}

impl Default for SignalQualityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalQualityAnalyzer {
    pub fn report(&self, buffer: &[f64], sample_rate: f64) -> QualityReport {
        if buffer.len() < self.min_samples || stats::std_dev(buffer) < 1e-9 {
            return QualityReport::default();
        }
        let fs = if sample_rate > 0.0 { sample_rate } else { 30.0 };

        let detrended = stats::detrend(buffer);
        let min_lag = (fs / MAX_HEART_HZ).floor() as usize;
        let max_lag = (fs / MIN_HEART_HZ).ceil() as usize;
        let periodicity = stats::autocorrelation_peak(&detrended, min_lag, max_lag).0;

        let spread = stats::percentile(buffer, 95.0) - stats::percentile(buffer, 5.0);
        let amplitude = stats::ramp(spread, MIN_USABLE_AMPLITUDE, FULL_AMPLITUDE);

        // 前后两半均值漂移相对于波动幅度越小越稳定
        let half = buffer.len() / 2;
        let drift = (stats::mean(&buffer[..half]) - stats::mean(&buffer[half..])).abs();
        let stability = if spread > 0.0 {
            (1.0 - drift / spread).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let score = (PERIODICITY_WEIGHT * periodicity
            + AMPLITUDE_WEIGHT * amplitude
            + STABILITY_WEIGHT * stability)
            .clamp(0.0, 1.0);

        QualityReport {
            periodicity,
            amplitude,
            stability,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn short_or_flat_buffers_score_zero() {
        let q = SignalQualityAnalyzer::new();
        assert_eq!(q.assess(&[1.0; 10], 30.0), 0.0);
        assert_eq!(q.assess(&[42.0; 200], 30.0), 0.0);
    }

    #[test]
    fn clean_pulse_scores_high() {
        let q = SignalQualityAnalyzer::new();
        let buf: Vec<f64> = (0..150)
            .map(|i| 6.0 * (2.0 * PI * 1.2 * i as f64 / 30.0).sin())
            .collect();
        let report = q.report(&buf, 30.0);
        assert!(report.periodicity > 0.8);
        assert_eq!(report.amplitude, 1.0);
        assert!(report.score > 0.85, "score = {}", report.score);
    }

    #[test]
    fn drifting_noise_scores_lower_than_pulse() {
        let q = SignalQualityAnalyzer::new();
        // 确定性的伪随机序列
        let mut x = 0.37_f64;
        let noise: Vec<f64> = (0..150)
            .map(|i| {
                x = (x * 3.9 * (1.0 - x)).clamp(0.0, 1.0);
                (x - 0.5) * 4.0 + i as f64 * 0.2
            })
            .collect();
        let pulse: Vec<f64> = (0..150)
            .map(|i| 6.0 * (2.0 * PI * 1.2 * i as f64 / 30.0).sin())
            .collect();
        assert!(q.assess(&noise, 30.0) < q.assess(&pulse, 30.0));
    }
}
