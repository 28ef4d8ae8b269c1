//! 血压估计
//!
//! 收缩压由心率、上升时间与灌注指数线性组合，舒张压由收缩压推出。
//! 截断范围：收缩压 90-180，舒张压 60-110，脉压 25-70。
//! 心率未知时不输出（显示 `--/--`）。

use serde::{Deserialize, Serialize};

use crate::config::ExtractorConfig;
use crate::waveform::WaveformFeatures;

pub const PRESSURE_SENTINEL: &str = "--/--";

const SYSTOLIC_RANGE: (f64, f64) = (90.0, 180.0);
const DIASTOLIC_RANGE: (f64, f64) = (60.0, 110.0);
const PULSE_PRESSURE_RANGE: (f64, f64) = (25.0, 70.0);

const REFERENCE_HR: f64 = 70.0;
const REFERENCE_RISE_MS: f64 = 200.0;
const REFERENCE_PI: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

impl BloodPressure {
    /// `"SYS/DIA"` 形式，四舍五入到整数
    pub fn display(&self) -> String {
        format!("{:.0}/{:.0}", self.systolic, self.diastolic)
    }
}

pub fn display_or_sentinel(bp: Option<BloodPressure>) -> String {
    bp.map(|bp| bp.display())
        .unwrap_or_else(|| PRESSURE_SENTINEL.to_string())
}

pub fn estimate(
    features: &WaveformFeatures,
    heart_rate: f64,
    quality: f64,
    config: &ExtractorConfig,
) -> Option<(BloodPressure, f64)> {
    if heart_rate.is_nan() || heart_rate <= 0.0 || !features.has_pulse() {
        return None;
    }

    let hr_term = 0.5 * (heart_rate - REFERENCE_HR);
    let rise_term = (0.04 * (REFERENCE_RISE_MS - features.rise_time_ms)).clamp(-15.0, 15.0);
    let pi_term = (-400.0 * (features.perfusion_index - REFERENCE_PI)).clamp(-10.0, 10.0);
    let systolic = (config.systolic_baseline + hr_term + rise_term + pi_term)
        .clamp(SYSTOLIC_RANGE.0, SYSTOLIC_RANGE.1);

    let diastolic = (0.6 * systolic + 8.0).clamp(DIASTOLIC_RANGE.0, DIASTOLIC_RANGE.1);
    let pulse_pressure = (systolic - diastolic).clamp(PULSE_PRESSURE_RANGE.0, PULSE_PRESSURE_RANGE.1);
    let diastolic = (systolic - pulse_pressure).clamp(DIASTOLIC_RANGE.0, DIASTOLIC_RANGE.1);

    if !systolic.is_finite() || !diastolic.is_finite() {
        return None;
    }

    Some((
        BloodPressure {
            systolic: systolic.round(),
            diastolic: diastolic.round(),
        },
        (quality * 0.7).clamp(0.0, 1.0),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(rise_ms: f64, pi: f64) -> WaveformFeatures {
        WaveformFeatures {
            dc: 150.0,
            ac: pi * 150.0,
            perfusion_index: pi,
            rise_time_ms: rise_ms,
            ..Default::default()
        }
    }

    #[test]
    fn reference_inputs_give_baseline() {
        let cfg = ExtractorConfig::default();
        let (bp, _) = estimate(&features(200.0, 0.01), 70.0, 1.0, &cfg).unwrap();
        assert_eq!(bp.systolic, 118.0);
        // 0.6 * 118 + 8 = 78.8
        assert_eq!(bp.diastolic, 79.0);
        assert_eq!(bp.display(), "118/79");
    }

    #[test]
    fn ranges_hold_at_extremes() {
        let cfg = ExtractorConfig::default();
        for hr in [30.0, 60.0, 120.0, 240.0] {
            for rise in [0.0, 200.0, 900.0] {
                for pi in [0.0001, 0.01, 0.2] {
                    let (bp, _) = estimate(&features(rise, pi), hr, 1.0, &cfg).unwrap();
                    assert!((90.0..=180.0).contains(&bp.systolic));
                    assert!((60.0..=110.0).contains(&bp.diastolic));
                    let pp = bp.systolic - bp.diastolic;
                    assert!((25.0..=70.0).contains(&pp), "pp = {pp}");
                }
            }
        }
    }

    #[test]
    fn unknown_heart_rate_is_sentinel() {
        let cfg = ExtractorConfig::default();
        assert!(estimate(&features(200.0, 0.01), 0.0, 1.0, &cfg).is_none());
        assert_eq!(display_or_sentinel(None), "--/--");
    }
}
