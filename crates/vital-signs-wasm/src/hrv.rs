//! 心率变异性（HRV）时域指标

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::stats;

const NN50_THRESHOLD_MS: f64 = 50.0;

#[wasm_bindgen]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrvMetrics {
    /// 相邻间期差值的均方根（毫秒）
    pub rmssd: f64,
    /// 间期标准差（毫秒）
    pub sdnn: f64,
    /// 相邻差值超过 50ms 的比例 (0-100)
    pub pnn50: f64,
}

impl HrvMetrics {
    /// 少于 2 个间期时全部为 0
    pub fn from_intervals(intervals: &[f64]) -> Self {
        if intervals.len() < 2 {
            return Self::default();
        }
        let diffs: Vec<f64> = intervals.windows(2).map(|w| w[1] - w[0]).collect();
        let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
        let nn50 = diffs.iter().filter(|d| d.abs() > NN50_THRESHOLD_MS).count();
        Self {
            rmssd,
            sdnn: stats::std_dev(intervals),
            pnn50: nn50 as f64 / diffs.len() as f64 * 100.0,
        }
    }
}

/// 由 RR 间期数组计算 HRV 指标
#[wasm_bindgen(js_name = "computeHrv")]
pub fn compute_hrv(intervals: &[f64]) -> HrvMetrics {
    HrvMetrics::from_intervals(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_intervals_yield_zeros() {
        assert_eq!(HrvMetrics::from_intervals(&[]), HrvMetrics::default());
        assert_eq!(HrvMetrics::from_intervals(&[800.0]), HrvMetrics::default());
    }

    #[test]
    fn known_series() {
        let m = HrvMetrics::from_intervals(&[800.0, 860.0, 800.0, 820.0]);
        // 差值 60, -60, 20
        let expected_rmssd = ((3600.0 + 3600.0 + 400.0) / 3.0_f64).sqrt();
        assert!((m.rmssd - expected_rmssd).abs() < 1e-9);
        assert!((m.pnn50 - 200.0 / 3.0).abs() < 1e-9);
        assert!(m.sdnn > 0.0);
    }

    #[test]
    fn constant_rhythm_has_no_variability() {
        let m = HrvMetrics::from_intervals(&[1000.0; 10]);
        assert_eq!(m, HrvMetrics::default());
    }
}
