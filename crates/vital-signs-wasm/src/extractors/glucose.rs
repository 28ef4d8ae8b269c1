//! 血糖启发式估计
//!
//! 基线 95 mg/dL，按上升/下降斜率比与灌注指数偏离参考值的程度修正，
//! 截断到 [70, 180]。置信度上限 0.5。

use super::Estimate;
use crate::config::ExtractorConfig;
use crate::waveform::WaveformFeatures;

const GLUCOSE_RANGE: (f64, f64) = (70.0, 180.0);
const MAX_CONFIDENCE: f64 = 0.5;
const REFERENCE_PI: f64 = 0.01;

pub fn estimate(features: &WaveformFeatures, quality: f64, config: &ExtractorConfig) -> Estimate {
    if !features.has_pulse() {
        return Estimate::NONE;
    }
    let slope_term = (20.0 * (features.slope_ratio - 1.0)).clamp(-25.0, 25.0);
    let pi_term = (-500.0 * (features.perfusion_index - REFERENCE_PI)).clamp(-15.0, 15.0);
    let value = config.glucose_baseline + slope_term + pi_term;
    if !value.is_finite() {
        return Estimate::NONE;
    }
    Estimate {
        value: value.clamp(GLUCOSE_RANGE.0, GLUCOSE_RANGE.1).round(),
        confidence: (quality * MAX_CONFIDENCE).clamp(0.0, MAX_CONFIDENCE),
    }
}
