//! 管线参数配置
//!
//! 浏览器端与后端共用同一份默认值。各子配置均可单独缺省，
//! 反序列化时缺失的字段回落到 `Default`。

use serde::{Deserialize, Serialize};

/// 所有按样本数或读数计的窗口上限，30fps 下约 5 分钟
pub const MAX_WINDOW: usize = 10_000;

/// 信号放大器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmplifierConfig {
    /// 基线与方差统计窗口（样本数），30fps 下约 3 秒
    pub window_size: usize,
    /// 低通滑动平均窗口（样本数）
    pub smoothing_window: usize,
    /// 放大后期望的 AC 幅度
    pub target_amplitude: f64,
    pub min_gain: f64,
    pub max_gain: f64,
    /// 检测到类心跳振荡时的增益收敛速率
    pub fast_adapt_rate: f64,
    /// 未检测到振荡时的增益收敛速率
    pub slow_adapt_rate: f64,
    pub min_oscillation_hz: f64,
    pub max_oscillation_hz: f64,
    /// 透射式 PPG 中血容量增加时亮度下降，反相后收缩期对应波峰
    pub invert_signal: bool,
    /// 时间戳不足以估计采样率时使用的默认值（Hz）
    pub fallback_sample_rate: f64,
}

impl Default for AmplifierConfig {
    fn default() -> Self {
        Self {
            window_size: 90,
            smoothing_window: 5,
            target_amplitude: 10.0,
            min_gain: 1.0,
            max_gain: 20.0,
            fast_adapt_rate: 0.2,
            slow_adapt_rate: 0.05,
            min_oscillation_hz: 0.7,
            max_oscillation_hz: 3.5,
            invert_signal: true,
            fallback_sample_rate: 30.0,
        }
    }
}

/// 手指检测融合参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FingerConfig {
    /// 原始亮度单位下的 AC 峰峰值
    pub min_amplitude: f64,
    pub full_amplitude: f64,
    pub min_rhythmicity: f64,
    pub full_rhythmicity: f64,
    /// 红色通道均值的合理区间
    pub min_brightness: f64,
    pub max_brightness: f64,
    /// 亮度区间两侧的软过渡宽度
    pub brightness_ramp: f64,
    pub amplitude_weight: f64,
    pub rhythmicity_weight: f64,
    pub quality_weight: f64,
    /// 置信度 EMA 系数
    pub confidence_smoothing: f64,
    pub on_threshold: f64,
    pub off_threshold: f64,
    pub min_detect_dwell_ms: f64,
    pub min_loss_dwell_ms: f64,
    /// 超过该时长未刷新的信号源视为缺失
    pub source_timeout_ms: f64,
}

impl Default for FingerConfig {
    fn default() -> Self {
        Self {
            min_amplitude: 0.3,
            full_amplitude: 2.0,
            min_rhythmicity: 0.2,
            full_rhythmicity: 0.6,
            min_brightness: 60.0,
            max_brightness: 250.0,
            brightness_ramp: 20.0,
            amplitude_weight: 0.40,
            rhythmicity_weight: 0.35,
            quality_weight: 0.25,
            confidence_smoothing: 0.3,
            on_threshold: 0.6,
            off_threshold: 0.35,
            min_detect_dwell_ms: 800.0,
            min_loss_dwell_ms: 1200.0,
            source_timeout_ms: 1500.0,
        }
    }
}

/// 峰值检测参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatConfig {
    pub buffer_size: usize,
    /// 自适应阈值 = min + ratio * (max - min)
    pub threshold_ratio: f64,
    /// 不应期（毫秒）
    pub min_peak_interval_ms: f64,
    pub rr_window: usize,
    pub bpm_smoothing: f64,
    /// 缓冲区动态范围低于该值时不判峰
    pub min_signal_range: f64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            buffer_size: 60,
            threshold_ratio: 0.55,
            min_peak_interval_ms: 250.0,
            rr_window: 15,
            bpm_smoothing: 0.3,
            min_signal_range: 1.0,
        }
    }
}

/// 心律失常模式检测参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrhythmiaConfig {
    pub rr_window: usize,
    pub variation_window: usize,
    /// 仅用于建立基线的前 N 个间期
    pub learning_intervals: usize,
    pub missed_beat_ratio: f64,
    pub premature_ratio: f64,
    pub compensatory_ratio: f64,
    pub irregular_threshold: f64,
    pub min_irregular_samples: usize,
    pub variation_threshold: f64,
    pub min_event_gap_ms: f64,
    pub display_hold_ms: f64,
}

impl Default for ArrhythmiaConfig {
    fn default() -> Self {
        Self {
            rr_window: 12,
            variation_window: 8,
            learning_intervals: 6,
            missed_beat_ratio: 1.7,
            premature_ratio: 0.8,
            compensatory_ratio: 1.1,
            irregular_threshold: 0.15,
            min_irregular_samples: 6,
            variation_threshold: 0.3,
            min_event_gap_ms: 1000.0,
            display_hold_ms: 3000.0,
        }
    }
}

/// 各生理指标估算的标定参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    pub min_samples: usize,
    /// R = PI / reference_perfusion
    pub reference_perfusion: f64,
    pub spo2_intercept: f64,
    pub spo2_slope: f64,
    pub systolic_baseline: f64,
    pub glucose_baseline: f64,
    pub cholesterol_baseline: f64,
    pub triglycerides_baseline: f64,
    pub hydration_baseline: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            reference_perfusion: 0.02,
            spo2_intercept: 110.0,
            spo2_slope: 25.0,
            systolic_baseline: 118.0,
            glucose_baseline: 95.0,
            cholesterol_baseline: 180.0,
            triglycerides_baseline: 120.0,
            hydration_baseline: 65.0,
        }
    }
}

/// 编排层参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorConfig {
    /// PPG 波形缓冲区（样本数），30fps 下约 10 秒
    pub ppg_buffer_size: usize,
    /// 生理指标刷新间隔（毫秒）
    pub vitals_interval_ms: f64,
    /// 显示值中值平滑窗口
    pub display_median_window: usize,
    /// 会话汇总被视为有效所需的心率读数
    pub min_valid_readings: usize,
    /// 每项指标保留的历史读数上限
    pub max_session_readings: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ppg_buffer_size: 300,
            vitals_interval_ms: 1000.0,
            display_median_window: 5,
            min_valid_readings: 5,
            max_session_readings: 600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub amplifier: AmplifierConfig,
    #[serde(default)]
    pub finger: FingerConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub arrhythmia: ArrhythmiaConfig,
    #[serde(default)]
    pub extractors: ExtractorConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.check_window_bounds()?;

        let a = &self.amplifier;
        if a.window_size < 10 {
            return Err("amplifier.window_size must be >= 10".to_string());
        }
        if a.smoothing_window == 0 {
            return Err("amplifier.smoothing_window must be >= 1".to_string());
        }
        if a.min_gain <= 0.0 || a.max_gain < a.min_gain {
            return Err("amplifier gain range must satisfy 0 < min_gain <= max_gain".to_string());
        }
        if a.target_amplitude <= 0.0 {
            return Err("amplifier.target_amplitude must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&a.fast_adapt_rate) || !(0.0..=1.0).contains(&a.slow_adapt_rate) {
            return Err("amplifier adapt rates must be in [0,1]".to_string());
        }
        if a.fallback_sample_rate <= 0.0 {
            return Err("amplifier.fallback_sample_rate must be > 0".to_string());
        }
        if a.min_oscillation_hz <= 0.0 || a.max_oscillation_hz <= a.min_oscillation_hz {
            return Err("amplifier oscillation band must satisfy 0 < min < max".to_string());
        }

        let f = &self.finger;
        if f.full_amplitude <= f.min_amplitude || f.full_rhythmicity <= f.min_rhythmicity {
            return Err("finger ramp bounds must satisfy min < full".to_string());
        }
        if f.max_brightness <= f.min_brightness {
            return Err("finger.max_brightness must be > min_brightness".to_string());
        }
        let weight_sum = f.amplitude_weight + f.rhythmicity_weight + f.quality_weight;
        if f.amplitude_weight < 0.0 || f.rhythmicity_weight < 0.0 || f.quality_weight < 0.0 {
            return Err("finger weights must be >= 0".to_string());
        }
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(format!(
                "finger weights should sum to ~1.0 (got {weight_sum:.3})"
            ));
        }
        if !(0.0..=1.0).contains(&f.confidence_smoothing) || f.confidence_smoothing == 0.0 {
            return Err("finger.confidence_smoothing must be in (0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&f.on_threshold)
            || !(0.0..=1.0).contains(&f.off_threshold)
            || f.off_threshold > f.on_threshold
        {
            return Err("finger thresholds must satisfy 0 <= off <= on <= 1".to_string());
        }
        if f.min_detect_dwell_ms < 0.0 || f.min_loss_dwell_ms < 0.0 || f.source_timeout_ms <= 0.0 {
            return Err("finger dwell/timeout values must be non-negative".to_string());
        }

        let h = &self.heartbeat;
        if h.buffer_size < 3 {
            return Err("heartbeat.buffer_size must be >= 3".to_string());
        }
        if !(0.0..1.0).contains(&h.threshold_ratio) {
            return Err("heartbeat.threshold_ratio must be in [0,1)".to_string());
        }
        if h.rr_window < 2 {
            return Err("heartbeat.rr_window must be >= 2".to_string());
        }
        if !(0.0..=1.0).contains(&h.bpm_smoothing) || h.bpm_smoothing == 0.0 {
            return Err("heartbeat.bpm_smoothing must be in (0,1]".to_string());
        }

        let r = &self.arrhythmia;
        if r.rr_window < 2 || r.variation_window == 0 {
            return Err("arrhythmia windows are too small".to_string());
        }
        if r.learning_intervals == 0 || r.learning_intervals > r.rr_window {
            return Err("arrhythmia.learning_intervals must be in [1, rr_window]".to_string());
        }
        if r.missed_beat_ratio <= 1.0 || r.compensatory_ratio <= 1.0 {
            return Err("arrhythmia missed/compensatory ratios must be > 1".to_string());
        }
        if !(0.0..1.0).contains(&r.premature_ratio) {
            return Err("arrhythmia.premature_ratio must be in [0,1)".to_string());
        }

        let e = &self.extractors;
        if e.min_samples < 20 {
            return Err("extractors.min_samples must be >= 20".to_string());
        }
        if e.reference_perfusion <= 0.0 {
            return Err("extractors.reference_perfusion must be > 0".to_string());
        }

        let p = &self.processor;
        if p.ppg_buffer_size < e.min_samples {
            return Err("processor.ppg_buffer_size must be >= extractors.min_samples".to_string());
        }
        if p.vitals_interval_ms < 0.0 {
            return Err("processor.vitals_interval_ms must be >= 0".to_string());
        }
        if p.display_median_window == 0 || p.max_session_readings == 0 {
            return Err("processor windows must be >= 1".to_string());
        }

        Ok(())
    }

    fn check_window_bounds(&self) -> Result<(), String> {
        let windows = [
            ("amplifier.window_size", self.amplifier.window_size),
            ("amplifier.smoothing_window", self.amplifier.smoothing_window),
            ("heartbeat.buffer_size", self.heartbeat.buffer_size),
            ("heartbeat.rr_window", self.heartbeat.rr_window),
            ("arrhythmia.rr_window", self.arrhythmia.rr_window),
            ("arrhythmia.variation_window", self.arrhythmia.variation_window),
            ("arrhythmia.learning_intervals", self.arrhythmia.learning_intervals),
            ("arrhythmia.min_irregular_samples", self.arrhythmia.min_irregular_samples),
            ("extractors.min_samples", self.extractors.min_samples),
            ("processor.ppg_buffer_size", self.processor.ppg_buffer_size),
            ("processor.display_median_window", self.processor.display_median_window),
            ("processor.min_valid_readings", self.processor.min_valid_readings),
            ("processor.max_session_readings", self.processor.max_session_readings),
        ];
        match windows.iter().find(|(_, size)| *size > MAX_WINDOW) {
            Some((name, size)) => Err(format!("{name} must be <= {MAX_WINDOW} (got {size})")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.finger.off_threshold = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.finger.amplitude_weight = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_windows_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.heartbeat.buffer_size = usize::MAX / 4;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("heartbeat.buffer_size"), "{err}");

        let mut cfg = PipelineConfig::default();
        cfg.processor.ppg_buffer_size = MAX_WINDOW + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.amplifier.window_size = MAX_WINDOW;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"heartbeat":{"thresholdRatio":0.6}}"#).unwrap();
        assert_eq!(cfg.heartbeat.threshold_ratio, 0.6);
        assert_eq!(cfg.heartbeat.rr_window, 15);
        assert_eq!(cfg.amplifier, AmplifierConfig::default());
    }
}
