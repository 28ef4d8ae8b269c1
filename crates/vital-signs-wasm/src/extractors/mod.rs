//! 各生理指标估算
//!
//! 所有估算器共享一次 `WaveformFeatures` 提取。样本不足 20 个、
//! DC 非正或 AC 近似为 0 时返回各自的哨兵值（数值 0，血压 `--/--`），不会 panic。
//!
//! 血糖与血脂仅为波形形态的确定性启发式估计，置信度上限 0.5。

pub mod glucose;
pub mod hydration;
pub mod lipids;
pub mod pressure;
pub mod spo2;

use serde::Serialize;

use crate::config::ExtractorConfig;
use crate::waveform::WaveformFeatures;

pub use lipids::LipidsEstimate;
pub use pressure::{BloodPressure, PRESSURE_SENTINEL};

/// 单值估计，`value == 0` 表示无测量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub value: f64,
    pub confidence: f64,
}

impl Estimate {
    pub const NONE: Estimate = Estimate {
        value: 0.0,
        confidence: 0.0,
    };

    pub fn is_measured(&self) -> bool {
        self.value > 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalEstimates {
    pub spo2: Estimate,
    pub pressure: Option<BloodPressure>,
    pub pressure_confidence: f64,
    pub glucose: Estimate,
    pub lipids: LipidsEstimate,
    pub hydration: Estimate,
}

/// 波形输入与上下文
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub amplified: &'a [f64],
    pub raw: &'a [f64],
    pub sample_rate: f64,
    pub heart_rate: f64,
    /// 0-1，用于缩放各项置信度
    pub signal_quality: f64,
}

/// 一次性计算全部指标
pub fn extract_all(input: &ExtractionInput<'_>, config: &ExtractorConfig) -> VitalEstimates {
    if input.amplified.len() < config.min_samples || input.raw.len() < config.min_samples {
        return VitalEstimates::default();
    }
    let Some(features) = WaveformFeatures::extract(input.amplified, input.raw, input.sample_rate)
    else {
        return VitalEstimates::default();
    };
    if !features.has_pulse() {
        return VitalEstimates::default();
    }

    let quality = input.signal_quality.clamp(0.0, 1.0);
    let (pressure, pressure_confidence) =
        match pressure::estimate(&features, input.heart_rate, quality, config) {
            Some((bp, conf)) => (Some(bp), conf),
            None => (None, 0.0),
        };

    VitalEstimates {
        spo2: spo2::estimate(&features, quality, config),
        pressure,
        pressure_confidence,
        glucose: glucose::estimate(&features, quality, config),
        lipids: lipids::estimate(&features, quality, config),
        hydration: hydration::estimate(&features, quality, config),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pulse_buffers;
    use super::*;

    fn input<'a>(amp: &'a [f64], raw: &'a [f64], hr: f64) -> ExtractionInput<'a> {
        ExtractionInput {
            amplified: amp,
            raw,
            sample_rate: 30.0,
            heart_rate: hr,
            signal_quality: 0.9,
        }
    }

    #[test]
    fn short_buffers_return_sentinels() {
        let cfg = ExtractorConfig::default();
        for n in 0..20 {
            let (amp, raw) = pulse_buffers(n, 1.0, 150.0);
            let est = extract_all(&input(&amp, &raw, 72.0), &cfg);
            assert_eq!(est, VitalEstimates::default());
        }
    }

    #[test]
    fn flat_raw_returns_sentinels() {
        let cfg = ExtractorConfig::default();
        let amp = vec![0.0; 100];
        let raw = vec![150.0; 100];
        let est = extract_all(&input(&amp, &raw, 72.0), &cfg);
        assert_eq!(est.spo2, Estimate::NONE);
        assert!(est.pressure.is_none());
    }

    #[test]
    fn pulse_produces_all_estimates_in_range() {
        let cfg = ExtractorConfig::default();
        let (amp, raw) = pulse_buffers(150, 1.0, 150.0);
        let est = extract_all(&input(&amp, &raw, 72.0), &cfg);
        assert!((70.0..=100.0).contains(&est.spo2.value));
        let bp = est.pressure.unwrap();
        assert!((90.0..=180.0).contains(&bp.systolic));
        assert!((60.0..=110.0).contains(&bp.diastolic));
        assert!((70.0..=180.0).contains(&est.glucose.value));
        assert!((130.0..=260.0).contains(&est.lipids.total_cholesterol));
        assert!((50.0..=250.0).contains(&est.lipids.triglycerides));
        assert!((45.0..=100.0).contains(&est.hydration.value));
        assert!(est.glucose.confidence <= 0.5);
        assert!(est.lipids.confidence <= 0.5);
    }

    #[test]
    fn pressure_requires_heart_rate() {
        let cfg = ExtractorConfig::default();
        let (amp, raw) = pulse_buffers(150, 1.0, 150.0);
        let est = extract_all(&input(&amp, &raw, 0.0), &cfg);
        assert!(est.pressure.is_none());
        assert!(est.spo2.is_measured());
    }
}
