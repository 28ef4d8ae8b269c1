//! 血脂启发式估计（总胆固醇、甘油三酯）
//!
//! 由脉搏面积比与斜率比推算，截断到 [130, 260] / [50, 250]。置信度上限 0.5。

use serde::{Deserialize, Serialize};

use crate::config::ExtractorConfig;
use crate::waveform::WaveformFeatures;

const CHOLESTEROL_RANGE: (f64, f64) = (130.0, 260.0);
const TRIGLYCERIDES_RANGE: (f64, f64) = (50.0, 250.0);
const MAX_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LipidsEstimate {
    pub total_cholesterol: f64,
    pub triglycerides: f64,
    pub confidence: f64,
}

impl LipidsEstimate {
    pub fn is_measured(&self) -> bool {
        self.total_cholesterol > 0.0 && self.triglycerides > 0.0
    }
}

pub fn estimate(
    features: &WaveformFeatures,
    quality: f64,
    config: &ExtractorConfig,
) -> LipidsEstimate {
    if !features.has_pulse() {
        return LipidsEstimate::default();
    }
    let area = features.pulse_area_ratio - 0.5;
    let slope = (features.slope_ratio - 1.0).clamp(-1.0, 1.0);

    let cholesterol = config.cholesterol_baseline + 120.0 * area + 15.0 * slope;
    let triglycerides = config.triglycerides_baseline + 200.0 * area - 20.0 * slope;
    if !cholesterol.is_finite() || !triglycerides.is_finite() {
        return LipidsEstimate::default();
    }

    LipidsEstimate {
        total_cholesterol: cholesterol
            .clamp(CHOLESTEROL_RANGE.0, CHOLESTEROL_RANGE.1)
            .round(),
        triglycerides: triglycerides
            .clamp(TRIGLYCERIDES_RANGE.0, TRIGLYCERIDES_RANGE.1)
            .round(),
        confidence: (quality * MAX_CONFIDENCE).clamp(0.0, MAX_CONFIDENCE),
    }
}
