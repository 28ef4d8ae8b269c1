//! 血氧饱和度（比值法）
//!
//! 单通道摄像头没有红光/红外双波长，这里以灌注指数相对参考灌注的比值
//! 作为 R：`SpO2 = 110 - 25·R`，截断到 [70, 100]。

use super::Estimate;
use crate::config::ExtractorConfig;
use crate::stats;
use crate::waveform::WaveformFeatures;

pub const SPO2_MIN: f64 = 70.0;
pub const SPO2_MAX: f64 = 100.0;

pub fn estimate(features: &WaveformFeatures, quality: f64, config: &ExtractorConfig) -> Estimate {
    if !features.has_pulse() || config.reference_perfusion <= 0.0 {
        return Estimate::NONE;
    }
    let r = features.perfusion_index / config.reference_perfusion;
    let value = clamp_spo2(config.spo2_intercept - config.spo2_slope * r);
    if value == 0.0 {
        return Estimate::NONE;
    }
    // 灌注过低时比值对噪声敏感
    let perfusion_factor = stats::ramp(features.perfusion_index, 0.001, 0.006);
    Estimate {
        value,
        confidence: (quality * perfusion_factor).clamp(0.0, 1.0),
    }
}

/// 有限值截断到 [70, 100]，非有限值返回哨兵 0
pub fn clamp_spo2(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(SPO2_MIN, SPO2_MAX)
    } else {
        0.0
    }
}
