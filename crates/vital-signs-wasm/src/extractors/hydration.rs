//! 水合度估计（%）
//!
//! 灌注指数越高、透射亮度越低（组织含水多吸收强）估计值越高，
//! 截断到 [45, 100]。

use super::Estimate;
use crate::config::ExtractorConfig;
use crate::waveform::WaveformFeatures;

const HYDRATION_RANGE: (f64, f64) = (45.0, 100.0);
const REFERENCE_PI: f64 = 0.01;
const REFERENCE_DC: f64 = 150.0;

pub fn estimate(features: &WaveformFeatures, quality: f64, config: &ExtractorConfig) -> Estimate {
    if !features.has_pulse() {
        return Estimate::NONE;
    }
    let pi_term = (1000.0 * (features.perfusion_index - REFERENCE_PI)).clamp(-20.0, 20.0);
    let dc_term = (-0.1 * (features.dc - REFERENCE_DC)).clamp(-10.0, 10.0);
    let value = config.hydration_baseline + pi_term + dc_term;
    if !value.is_finite() {
        return Estimate::NONE;
    }
    Estimate {
        value: value.clamp(HYDRATION_RANGE.0, HYDRATION_RANGE.1).round(),
        confidence: (quality * 0.6).clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pi: f64, dc: f64) -> WaveformFeatures {
        WaveformFeatures {
            dc,
            ac: pi * dc,
            perfusion_index: pi,
            ..Default::default()
        }
    }

    #[test]
    fn reference_inputs_give_baseline() {
        let est = estimate(&features(0.01, 150.0), 1.0, &ExtractorConfig::default());
        assert_eq!(est.value, 65.0);
    }

    #[test]
    fn higher_perfusion_reads_higher() {
        let cfg = ExtractorConfig::default();
        let lo = estimate(&features(0.005, 150.0), 1.0, &cfg);
        let hi = estimate(&features(0.02, 150.0), 1.0, &cfg);
        assert!(hi.value > lo.value);
        assert!((45.0..=100.0).contains(&hi.value));
    }

    #[test]
    fn no_pulse_is_sentinel() {
        let est = estimate(&features(0.0, 150.0), 1.0, &ExtractorConfig::default());
        assert_eq!(est, Estimate::NONE);
    }
}
