//! 生理指标处理器（管线编排）
//!
//! 每帧处理顺序：
//! 1. 信号放大 → 2. 质量评估 → 3. 手指检测（幅度、节律、亮度、质量）
//! 4. 检测到手指时运行心跳检测，每个新的有效 RR 间期送入心律失常检测
//! 5. 放大值写入 PPG 缓冲 → 6. 每 1000ms 重新估算各项指标，其间复用上次结果
//! 7. SpO2 与心率取最近 5 个读数的中位数用于显示 → 8. 组装 `VitalSignsResult`
//!
//! 手指从检测到变为丢失时，心跳、心律失常检测器与 PPG 缓冲全部重置。
//! 非有限样本被忽略，直接返回上一次的快照。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::amplifier::SignalAmplifier;
use crate::arrhythmia::{ArrhythmiaDetector, ArrhythmiaEvent, STATUS_CALIBRATING};
use crate::config::PipelineConfig;
use crate::extractors::{self, pressure, ExtractionInput, VitalEstimates};
use crate::finger::{DetectionState, FingerDetector, FingerSources};
use crate::heartbeat::{HeartbeatDetector, HeartbeatResult};
use crate::hrv::HrvMetrics;
use crate::quality::SignalQualityAnalyzer;
use crate::stats;

/// 单帧 PPG 样本
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// 毫秒
    pub timestamp: f64,
    /// 红色通道平均亮度 (0-255)
    pub raw_value: f64,
}

#[wasm_bindgen]
impl Sample {
    #[wasm_bindgen(constructor)]
    pub fn new(timestamp: f64, raw_value: f64) -> Self {
        Self {
            timestamp,
            raw_value,
        }
    }
}

impl Sample {
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite() && self.raw_value.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lipids {
    pub total_cholesterol: f64,
    pub triglycerides: f64,
}

/// 各指标的置信度子分 (0-1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalConfidence {
    pub heart_rate: f64,
    pub spo2: f64,
    pub pressure: f64,
    pub glucose: f64,
    pub lipids: f64,
    pub hydration: f64,
}

/// 最新一帧的指标快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSignsResult {
    pub timestamp: f64,
    pub finger: DetectionState,
    pub heart_rate: f64,
    pub is_peak: bool,
    pub spo2: f64,
    pub pressure: String,
    pub arrhythmia_status: String,
    pub arrhythmia_count: u32,
    pub last_arrhythmia: Option<ArrhythmiaEvent>,
    pub glucose: f64,
    pub lipids: Lipids,
    pub hydration: f64,
    pub hrv: HrvMetrics,
    pub signal_quality: f64,
    pub confidence: Option<VitalConfidence>,
}

impl Default for VitalSignsResult {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            finger: DetectionState::default(),
            heart_rate: 0.0,
            is_peak: false,
            spo2: 0.0,
            pressure: pressure::PRESSURE_SENTINEL.to_string(),
            arrhythmia_status: STATUS_CALIBRATING.to_string(),
            arrhythmia_count: 0,
            last_arrhythmia: None,
            glucose: 0.0,
            lipids: Lipids::default(),
            hydration: 0.0,
            hrv: HrvMetrics::default(),
            signal_quality: 0.0,
            confidence: None,
        }
    }
}

/// 测量结束时的汇总，各项为会话内非哨兵读数的中位数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSummary {
    pub heart_rate: f64,
    pub spo2: f64,
    pub pressure: String,
    pub glucose: f64,
    pub lipids: Lipids,
    pub hydration: f64,
    pub arrhythmia_count: u32,
    pub sample_count: u64,
    pub duration_ms: f64,
    pub is_valid: bool,
}

/// 会话内各指标的历史读数
#[derive(Debug, Default)]
struct SessionReadings {
    heart_rate: VecDeque<f64>,
    spo2: VecDeque<f64>,
    systolic: VecDeque<f64>,
    diastolic: VecDeque<f64>,
    glucose: VecDeque<f64>,
    cholesterol: VecDeque<f64>,
    triglycerides: VecDeque<f64>,
    hydration: VecDeque<f64>,
}

impl SessionReadings {
    fn push(buf: &mut VecDeque<f64>, value: f64, cap: usize) {
        if value > 0.0 && value.is_finite() {
            buf.push_back(value);
            while buf.len() > cap {
                buf.pop_front();
            }
        }
    }

    fn median(buf: &VecDeque<f64>) -> f64 {
        let values: Vec<f64> = buf.iter().copied().collect();
        stats::median(&values)
    }
}

#[wasm_bindgen]
pub struct VitalSignsProcessor {
    config: PipelineConfig,
    amplifier: SignalAmplifier,
    quality: SignalQualityAnalyzer,
    finger: FingerDetector,
    heartbeat: HeartbeatDetector,
    arrhythmia: ArrhythmiaDetector,
    quality_window: VecDeque<f64>,
    ppg: VecDeque<f64>,
    raw: VecDeque<f64>,
    estimates: VitalEstimates,
    last_refresh_ts: Option<f64>,
    display_hr: VecDeque<f64>,
    display_spo2: VecDeque<f64>,
    readings: SessionReadings,
    /// 已重置的检测器累计的心律失常次数
    carried_arrhythmias: u32,
    was_detected: bool,
    sample_count: u64,
    first_ts: Option<f64>,
    last_ts: f64,
    latest: VitalSignsResult,
}

#[wasm_bindgen]
impl VitalSignsProcessor {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// 使用 JS 对象形式的 `PipelineConfig` 创建，缺省字段取默认值
    #[wasm_bindgen(js_name = "withConfig")]
    pub fn with_config_js(config: JsValue) -> Result<VitalSignsProcessor, JsValue> {
        let config: PipelineConfig = serde_wasm_bindgen::from_value(config)
            .map_err(|e| JsValue::from_str(&format!("invalid config: {e}")))?;
        config.validate().map_err(|e| JsValue::from_str(&e))?;
        Ok(Self::with_config(config))
    }

    /// 处理一帧，返回 `VitalSignsResult`
    #[wasm_bindgen(js_name = "processSample")]
    pub fn process_sample_js(&mut self, timestamp: f64, raw_value: f64) -> JsValue {
        let result = self.process(Sample::new(timestamp, raw_value));
        serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
    }

    /// 返回 `MeasurementSummary`，不清空状态
    #[wasm_bindgen(js_name = "finalize")]
    pub fn finalize_js(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.finalize()).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "getSampleCount")]
    pub fn sample_count_js(&self) -> f64 {
        self.sample_count as f64
    }

    pub fn reset(&mut self) {
        self.amplifier.reset();
        self.finger.reset();
        self.heartbeat.reset();
        self.arrhythmia.reset();
        self.quality_window.clear();
        self.ppg.clear();
        self.raw.clear();
        self.estimates = VitalEstimates::default();
        self.last_refresh_ts = None;
        self.display_hr.clear();
        self.display_spo2.clear();
        self.readings = SessionReadings::default();
        self.carried_arrhythmias = 0;
        self.was_detected = false;
        self.sample_count = 0;
        self.first_ts = None;
        self.last_ts = 0.0;
        self.latest = VitalSignsResult::default();
    }
}

impl Default for VitalSignsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl VitalSignsProcessor {
    pub fn with_config(config: PipelineConfig) -> Self {
        let ppg_cap = config.processor.ppg_buffer_size;
        Self {
            amplifier: SignalAmplifier::with_config(config.amplifier.clone()),
            quality: SignalQualityAnalyzer::new(),
            finger: FingerDetector::with_config(config.finger.clone()),
            heartbeat: HeartbeatDetector::with_config(config.heartbeat.clone()),
            arrhythmia: ArrhythmiaDetector::with_config(config.arrhythmia.clone()),
            quality_window: VecDeque::with_capacity(config.amplifier.window_size),
            ppg: VecDeque::with_capacity(ppg_cap),
            raw: VecDeque::with_capacity(ppg_cap),
            estimates: VitalEstimates::default(),
            last_refresh_ts: None,
            display_hr: VecDeque::new(),
            display_spo2: VecDeque::new(),
            readings: SessionReadings::default(),
            carried_arrhythmias: 0,
            was_detected: false,
            sample_count: 0,
            first_ts: None,
            last_ts: 0.0,
            latest: VitalSignsResult::default(),
            config,
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn latest(&self) -> &VitalSignsResult {
        &self.latest
    }

    pub fn process_batch(&mut self, samples: &[Sample]) -> VitalSignsResult {
        for sample in samples {
            self.process(*sample);
        }
        self.latest.clone()
    }

    pub fn process(&mut self, sample: Sample) -> VitalSignsResult {
        if !sample.is_finite() {
            tracing::trace!("non-finite sample ignored");
            return self.latest.clone();
        }
        let ts = sample.timestamp;
        self.sample_count += 1;
        self.first_ts.get_or_insert(ts);
        self.last_ts = ts;

        let amp = self.amplifier.process(sample.raw_value, ts);

        self.quality_window.push_back(amp.value);
        while self.quality_window.len() > self.config.amplifier.window_size {
            self.quality_window.pop_front();
        }
        let window: Vec<f64> = self.quality_window.iter().copied().collect();
        let signal_quality = self.quality.assess(&window, self.amplifier.sample_rate());

        let finger = self.finger.update(
            &FingerSources {
                amplitude: amp.amplitude,
                rhythmicity: amp.rhythmicity,
                brightness: sample.raw_value,
                quality: signal_quality,
            },
            ts,
        );

        if self.was_detected && !finger.is_finger_detected {
            self.on_finger_lost();
        }
        self.was_detected = finger.is_finger_detected;

        let mut beat = HeartbeatResult::default();
        if finger.is_finger_detected {
            beat = self.heartbeat.process(amp.value, ts);
            if beat.new_rr > 0.0 {
                self.arrhythmia.process_interval(beat.new_rr, ts);
                if beat.bpm > 0.0 {
                    self.push_display(DisplayKind::HeartRate, beat.bpm);
                }
            }

            let cap = self.config.processor.ppg_buffer_size;
            self.ppg.push_back(amp.value);
            self.raw.push_back(sample.raw_value);
            while self.ppg.len() > cap {
                self.ppg.pop_front();
            }
            while self.raw.len() > cap {
                self.raw.pop_front();
            }

            let due = self
                .last_refresh_ts
                .map(|last| ts - last >= self.config.processor.vitals_interval_ms)
                .unwrap_or(true);
            if due {
                self.refresh_estimates(beat.bpm, signal_quality);
                self.last_refresh_ts = Some(ts);
            }
        }

        self.latest = self.build_result(ts, finger, beat, signal_quality);
        self.latest.clone()
    }

    /// 汇总会话内的全部有效读数
    pub fn finalize(&self) -> MeasurementSummary {
        let r = &self.readings;
        let systolic = SessionReadings::median(&r.systolic);
        let diastolic = SessionReadings::median(&r.diastolic);
        let pressure = if systolic > 0.0 && diastolic > 0.0 {
            pressure::display_or_sentinel(Some(pressure::BloodPressure {
                systolic,
                diastolic,
            }))
        } else {
            pressure::PRESSURE_SENTINEL.to_string()
        };

        MeasurementSummary {
            heart_rate: SessionReadings::median(&r.heart_rate).round(),
            spo2: SessionReadings::median(&r.spo2).round(),
            pressure,
            glucose: SessionReadings::median(&r.glucose).round(),
            lipids: Lipids {
                total_cholesterol: SessionReadings::median(&r.cholesterol).round(),
                triglycerides: SessionReadings::median(&r.triglycerides).round(),
            },
            hydration: SessionReadings::median(&r.hydration).round(),
            arrhythmia_count: self.arrhythmia_count(),
            sample_count: self.sample_count,
            duration_ms: self.first_ts.map(|first| self.last_ts - first).unwrap_or(0.0),
            is_valid: r.heart_rate.len() >= self.config.processor.min_valid_readings,
        }
    }

    fn arrhythmia_count(&self) -> u32 {
        self.carried_arrhythmias + self.arrhythmia.count()
    }

    fn on_finger_lost(&mut self) {
        tracing::debug!(
            samples = self.sample_count,
            "finger lost, resetting beat state"
        );
        self.carried_arrhythmias += self.arrhythmia.count();
        self.heartbeat.reset();
        self.arrhythmia.reset();
        self.ppg.clear();
        self.raw.clear();
        self.estimates = VitalEstimates::default();
        self.last_refresh_ts = None;
        self.display_hr.clear();
        self.display_spo2.clear();
    }

    fn refresh_estimates(&mut self, heart_rate: f64, signal_quality: f64) {
        let amplified: Vec<f64> = self.ppg.iter().copied().collect();
        let raw: Vec<f64> = self.raw.iter().copied().collect();
        self.estimates = extractors::extract_all(
            &ExtractionInput {
                amplified: &amplified,
                raw: &raw,
                sample_rate: self.amplifier.sample_rate(),
                heart_rate,
                signal_quality,
            },
            &self.config.extractors,
        );

        if self.estimates.spo2.is_measured() {
            self.push_display(DisplayKind::Spo2, self.estimates.spo2.value);
        }

        let cap = self.config.processor.max_session_readings;
        let e = self.estimates;
        let r = &mut self.readings;
        SessionReadings::push(&mut r.heart_rate, Self::display_median(&self.display_hr), cap);
        SessionReadings::push(&mut r.spo2, e.spo2.value, cap);
        if let Some(bp) = e.pressure {
            SessionReadings::push(&mut r.systolic, bp.systolic, cap);
            SessionReadings::push(&mut r.diastolic, bp.diastolic, cap);
        }
        SessionReadings::push(&mut r.glucose, e.glucose.value, cap);
        SessionReadings::push(&mut r.cholesterol, e.lipids.total_cholesterol, cap);
        SessionReadings::push(&mut r.triglycerides, e.lipids.triglycerides, cap);
        SessionReadings::push(&mut r.hydration, e.hydration.value, cap);
    }

    fn push_display(&mut self, kind: DisplayKind, value: f64) {
        let window = self.config.processor.display_median_window;
        let buf = match kind {
            DisplayKind::HeartRate => &mut self.display_hr,
            DisplayKind::Spo2 => &mut self.display_spo2,
        };
        buf.push_back(value);
        while buf.len() > window {
            buf.pop_front();
        }
    }

    fn display_median(buf: &VecDeque<f64>) -> f64 {
        let values: Vec<f64> = buf.iter().copied().collect();
        stats::median(&values)
    }

    fn build_result(
        &self,
        ts: f64,
        finger: DetectionState,
        beat: HeartbeatResult,
        signal_quality: f64,
    ) -> VitalSignsResult {
        let e = &self.estimates;
        let detected = finger.is_finger_detected;
        let confidence = detected.then(|| VitalConfidence {
            heart_rate: beat.confidence,
            spo2: e.spo2.confidence,
            pressure: e.pressure_confidence,
            glucose: e.glucose.confidence,
            lipids: e.lipids.confidence,
            hydration: e.hydration.confidence,
        });

        // 空窗口保持哨兵 0，不经过截断
        let spo2 = if self.display_spo2.is_empty() {
            0.0
        } else {
            extractors::spo2::clamp_spo2(Self::display_median(&self.display_spo2)).round()
        };

        VitalSignsResult {
            timestamp: ts,
            finger,
            heart_rate: Self::display_median(&self.display_hr).round(),
            is_peak: beat.is_peak,
            spo2,
            pressure: pressure::display_or_sentinel(e.pressure),
            arrhythmia_status: self.arrhythmia.status_with_count(ts, self.arrhythmia_count()),
            arrhythmia_count: self.arrhythmia_count(),
            last_arrhythmia: self.arrhythmia.last_event(),
            glucose: e.glucose.value,
            lipids: Lipids {
                total_cholesterol: e.lipids.total_cholesterol,
                triglycerides: e.lipids.triglycerides,
            },
            hydration: e.hydration.value,
            hrv: HrvMetrics::from_intervals(&self.heartbeat.rr_intervals()),
            signal_quality,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DisplayKind {
    HeartRate,
    Spo2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FRAME_MS: f64 = 1000.0 / 30.0;

    /// 透射式 PPG：收缩期亮度下降
    fn pulse_sample(i: usize, hz: f64) -> Sample {
        let ts = i as f64 * FRAME_MS;
        let phase = 2.0 * PI * hz * ts / 1000.0;
        Sample::new(ts, 150.0 - 2.0 * phase.sin())
    }

    fn run_pulse(p: &mut VitalSignsProcessor, frames: usize, hz: f64) -> VitalSignsResult {
        let mut last = VitalSignsResult::default();
        for i in 0..frames {
            last = p.process(pulse_sample(i, hz));
        }
        last
    }

    #[test]
    fn fresh_processor_reports_sentinels() {
        let p = VitalSignsProcessor::new();
        let r = p.latest();
        assert_eq!(r.pressure, "--/--");
        assert_eq!(r.arrhythmia_status, "CALIBRATING");
        assert_eq!(r.spo2, 0.0);
        assert!(r.confidence.is_none());
    }

    #[test]
    fn synthetic_pulse_yields_heart_rate() {
        let mut p = VitalSignsProcessor::new();
        let r = run_pulse(&mut p, 30 * 20, 1.2);
        assert!(r.finger.is_finger_detected);
        assert!((r.heart_rate - 72.0).abs() <= 3.0, "hr = {}", r.heart_rate);
        assert!((70.0..=100.0).contains(&r.spo2));
        assert_ne!(r.pressure, "--/--");
        assert!(r.arrhythmia_status.starts_with("NO ARRHYTHMIA"));
        assert!(r.confidence.is_some());
        assert_eq!(p.sample_count(), 600);
    }

    #[test]
    fn constant_input_never_detects_finger() {
        let mut p = VitalSignsProcessor::new();
        let mut prev_conf = f64::INFINITY;
        for i in 0..120 {
            let r = p.process(Sample::new(i as f64 * FRAME_MS, 150.0));
            assert!(!r.finger.is_finger_detected);
            assert!(r.finger.confidence <= prev_conf);
            prev_conf = r.finger.confidence;
        }
        assert!(prev_conf < 0.01);
        assert_eq!(p.latest().heart_rate, 0.0);
    }

    #[test]
    fn losing_finger_resets_beat_state() {
        let mut p = VitalSignsProcessor::new();
        run_pulse(&mut p, 30 * 15, 1.2);
        assert!(p.latest().heart_rate > 0.0);
        let start = 30 * 15;
        for i in 0..90 {
            p.process(Sample::new((start + i) as f64 * FRAME_MS, 5.0));
        }
        let r = p.latest();
        assert!(!r.finger.is_finger_detected);
        assert_eq!(r.heart_rate, 0.0);
        assert_eq!(r.spo2, 0.0);
        assert_eq!(r.pressure, "--/--");
        assert_eq!(r.arrhythmia_status, "CALIBRATING");
    }

    #[test]
    fn arrhythmia_count_survives_finger_loss() {
        let mut p = VitalSignsProcessor::new();
        let mut ts = 0.0;
        for _ in 0..6 {
            ts += 800.0;
            p.arrhythmia.process_interval(800.0, ts);
        }
        ts += 2000.0;
        p.arrhythmia.process_interval(2000.0, ts);
        assert_eq!(p.arrhythmia_count(), 1);

        p.on_finger_lost();
        assert_eq!(p.arrhythmia.count(), 0);
        assert_eq!(p.arrhythmia_count(), 1);

        for _ in 0..8 {
            ts += 800.0;
            p.arrhythmia.process_interval(800.0, ts);
        }
        let status = p.arrhythmia.status_with_count(ts, p.arrhythmia_count());
        assert_eq!(status, "NO ARRHYTHMIA|1");

        // 帧级结果中的状态与计数一致
        let r = p.process(Sample::new(ts + FRAME_MS, 5.0));
        assert_eq!(r.arrhythmia_count, 1);
        assert!(r.arrhythmia_status.ends_with("|1"), "{}", r.arrhythmia_status);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut p = VitalSignsProcessor::new();
        run_pulse(&mut p, 60, 1.2);
        let before = p.latest().clone();
        let r = p.process(Sample::new(f64::NAN, 100.0));
        assert_eq!(r, before);
        let r = p.process(Sample::new(5000.0, f64::INFINITY));
        assert_eq!(r, before);
        assert_eq!(p.sample_count(), 60);
    }

    #[test]
    fn finalize_summarizes_session() {
        let mut p = VitalSignsProcessor::new();
        run_pulse(&mut p, 30 * 20, 1.2);
        let summary = p.finalize();
        assert!(summary.is_valid);
        assert!((summary.heart_rate - 72.0).abs() <= 3.0);
        assert!((70.0..=100.0).contains(&summary.spo2));
        assert_eq!(summary.sample_count, 600);
        assert!((summary.duration_ms - 599.0 * FRAME_MS).abs() < 1e-6);
    }

    #[test]
    fn empty_session_summary_is_invalid() {
        let p = VitalSignsProcessor::new();
        let summary = p.finalize();
        assert!(!summary.is_valid);
        assert_eq!(summary.pressure, "--/--");
        assert_eq!(summary.heart_rate, 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut p = VitalSignsProcessor::new();
        run_pulse(&mut p, 30 * 10, 1.2);
        p.reset();
        assert_eq!(p.sample_count(), 0);
        assert_eq!(p.latest(), &VitalSignsResult::default());
        assert!(!p.finalize().is_valid);
    }

    #[test]
    fn result_serializes_with_camel_case_keys() {
        let mut p = VitalSignsProcessor::new();
        let r = run_pulse(&mut p, 30 * 5, 1.2);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("arrhythmiaStatus").is_some());
        assert!(json.get("signalQuality").is_some());
        assert!(json["finger"].get("isFingerDetected").is_some());
    }
}
