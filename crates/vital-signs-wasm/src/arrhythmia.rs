//! 心律失常模式检测模块
//!
//! 维护最近 12 个 RR 间期与最近 8 个变异率，
//! 变异率 = |rr - 基线| / 基线，基线为缓冲内已有间期的均值。
//!
//! 前 6 个间期只用于建立基线（状态 `CALIBRATING`）。之后按顺序匹配：
//! 1. 漏搏: rr > 1.7 × 基线（该间期不进入基线缓冲，也不计入变异率）
//! 2. 早搏: 上一间期 < 0.8 × 基线，且当前间期 > 1.1 × 基线（代偿间歇）
//! 3. 持续不齐: 至少 6 个变异率且均值 > 0.15
//! 4. 高变异: 单个变异率 > 0.3
//!
//! 两次计数之间至少间隔 1000ms；检测到后 3000ms 内状态保持为
//! `ARRHYTHMIA DETECTED|n`。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::config::ArrhythmiaConfig;
use crate::heartbeat::is_plausible_rr;
use crate::stats;

pub const STATUS_CALIBRATING: &str = "CALIBRATING";
const STATUS_NORMAL: &str = "NO ARRHYTHMIA";
const STATUS_DETECTED: &str = "ARRHYTHMIA DETECTED";

#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrhythmiaKind {
    MissedBeat = 0,
    PrematureBeat = 1,
    IrregularRhythm = 2,
    HighVariation = 3,
}

impl ArrhythmiaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissedBeat => "missedBeat",
            Self::PrematureBeat => "prematureBeat",
            Self::IrregularRhythm => "irregularRhythm",
            Self::HighVariation => "highVariation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrhythmiaEvent {
    pub kind: ArrhythmiaKind,
    pub timestamp: f64,
    pub rr: f64,
    pub variation_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrhythmiaResult {
    pub status: String,
    pub count: u32,
    pub calibrating: bool,
    /// 本次输入触发的事件
    pub event: Option<ArrhythmiaEvent>,
}

#[wasm_bindgen]
pub struct ArrhythmiaDetector {
    config: ArrhythmiaConfig,
    rr_buffer: VecDeque<f64>,
    variations: VecDeque<f64>,
    intervals_seen: usize,
    count: u32,
    last_counted_ts: Option<f64>,
    last_event: Option<ArrhythmiaEvent>,
}

#[wasm_bindgen]
impl ArrhythmiaDetector {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::with_config(ArrhythmiaConfig::default())
    }

    /// 输入一个 RR 间期（毫秒），返回 `ArrhythmiaResult`
    #[wasm_bindgen(js_name = "processInterval")]
    pub fn process_interval_js(&mut self, rr_ms: f64, timestamp: f64) -> JsValue {
        let result = self.process_interval(rr_ms, timestamp);
        serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "getStatus")]
    pub fn status_at(&self, timestamp: f64) -> String {
        self.status_with_count(timestamp, self.count)
    }

    #[wasm_bindgen(getter)]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.rr_buffer.clear();
        self.variations.clear();
        self.intervals_seen = 0;
        self.count = 0;
        self.last_counted_ts = None;
        self.last_event = None;
    }
}

impl Default for ArrhythmiaDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrhythmiaDetector {
    pub fn with_config(config: ArrhythmiaConfig) -> Self {
        Self {
            rr_buffer: VecDeque::with_capacity(config.rr_window),
            variations: VecDeque::with_capacity(config.variation_window),
            intervals_seen: 0,
            count: 0,
            last_counted_ts: None,
            last_event: None,
            config,
        }
    }

    pub fn process_interval(&mut self, rr_ms: f64, timestamp: f64) -> ArrhythmiaResult {
        if !is_plausible_rr(rr_ms) {
            return self.result(timestamp, None);
        }

        self.intervals_seen += 1;
        if self.intervals_seen <= self.config.learning_intervals || self.rr_buffer.is_empty() {
            self.push_rr(rr_ms);
            return self.result(timestamp, None);
        }

        let prior: Vec<f64> = self.rr_buffer.iter().copied().collect();
        let baseline = stats::mean(&prior);
        let ratio = (rr_ms - baseline).abs() / baseline;

        // 漏搏间期既不进入基线缓冲，也不进入变异率缓冲
        let kind = if rr_ms > self.config.missed_beat_ratio * baseline {
            Some(ArrhythmiaKind::MissedBeat)
        } else {
            self.push_variation(ratio);
            let kind = self.classify(rr_ms, baseline, ratio);
            self.push_rr(rr_ms);
            kind
        };

        let event = kind.map(|kind| ArrhythmiaEvent {
            kind,
            timestamp,
            rr: rr_ms,
            variation_ratio: ratio,
        });
        if let Some(e) = event {
            self.record(e);
        }
        self.result(timestamp, event)
    }

    /// 状态字符串，计数由调用方给出（编排层会累加手指离开前的计数）
    pub fn status_with_count(&self, timestamp: f64, count: u32) -> String {
        if self.is_calibrating() {
            return STATUS_CALIBRATING.to_string();
        }
        let showing = self
            .last_event
            .map(|e| timestamp - e.timestamp < self.config.display_hold_ms)
            .unwrap_or(false);
        let label = if showing { STATUS_DETECTED } else { STATUS_NORMAL };
        format!("{label}|{count}")
    }

    pub fn last_event(&self) -> Option<ArrhythmiaEvent> {
        self.last_event
    }

    pub fn is_calibrating(&self) -> bool {
        self.intervals_seen <= self.config.learning_intervals
    }

    fn classify(&self, rr: f64, baseline: f64, ratio: f64) -> Option<ArrhythmiaKind> {
        let c = &self.config;
        if let Some(prev) = self.rr_buffer.back() {
            if *prev < c.premature_ratio * baseline && rr > c.compensatory_ratio * baseline {
                return Some(ArrhythmiaKind::PrematureBeat);
            }
        }
        if self.variations.len() >= c.min_irregular_samples {
            let ratios: Vec<f64> = self.variations.iter().copied().collect();
            if stats::mean(&ratios) > c.irregular_threshold {
                return Some(ArrhythmiaKind::IrregularRhythm);
            }
        }
        if ratio > c.variation_threshold {
            return Some(ArrhythmiaKind::HighVariation);
        }
        None
    }

    fn record(&mut self, event: ArrhythmiaEvent) {
        let counts = self
            .last_counted_ts
            .map(|last| event.timestamp - last >= self.config.min_event_gap_ms)
            .unwrap_or(true);
        if counts {
            self.count += 1;
            self.last_counted_ts = Some(event.timestamp);
            tracing::info!(
                kind = event.kind.as_str(),
                rr = event.rr,
                variation = event.variation_ratio,
                count = self.count,
                "arrhythmia event"
            );
        }
        self.last_event = Some(event);
    }

    fn push_variation(&mut self, ratio: f64) {
        self.variations.push_back(ratio);
        while self.variations.len() > self.config.variation_window {
            self.variations.pop_front();
        }
    }

    fn push_rr(&mut self, rr: f64) {
        self.rr_buffer.push_back(rr);
        while self.rr_buffer.len() > self.config.rr_window {
            self.rr_buffer.pop_front();
        }
    }

    fn result(&self, timestamp: f64, event: Option<ArrhythmiaEvent>) -> ArrhythmiaResult {
        ArrhythmiaResult {
            status: self.status_at(timestamp),
            count: self.count,
            calibrating: self.is_calibrating(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated() -> (ArrhythmiaDetector, f64) {
        let mut det = ArrhythmiaDetector::new();
        let mut ts = 0.0;
        for _ in 0..6 {
            ts += 800.0;
            let r = det.process_interval(800.0, ts);
            assert_eq!(r.status, STATUS_CALIBRATING);
        }
        (det, ts)
    }

    #[test]
    fn starts_calibrating() {
        let det = ArrhythmiaDetector::new();
        assert_eq!(det.status_at(0.0), "CALIBRATING");
    }

    #[test]
    fn regular_rhythm_has_no_events() {
        let (mut det, mut ts) = calibrated();
        for i in 0..40 {
            ts += 800.0;
            let jitter = if i % 2 == 0 { 15.0 } else { -15.0 };
            let r = det.process_interval(800.0 + jitter, ts);
            assert!(r.event.is_none());
        }
        assert_eq!(det.count(), 0);
        assert_eq!(det.status_at(ts), "NO ARRHYTHMIA|0");
    }

    #[test]
    fn long_gap_is_a_missed_beat() {
        let (mut det, ts) = calibrated();
        let r = det.process_interval(1600.0, ts + 1600.0);
        assert_eq!(r.event.map(|e| e.kind), Some(ArrhythmiaKind::MissedBeat));
        assert_eq!(r.status, "ARRHYTHMIA DETECTED|1");
        // 漏搏间期不污染基线
        assert!(det.rr_buffer.iter().all(|rr| *rr == 800.0));
    }

    #[test]
    fn regular_rhythm_after_missed_beat_is_not_irregular() {
        let (mut det, mut ts) = calibrated();
        ts += 2000.0;
        let r = det.process_interval(2000.0, ts);
        assert_eq!(r.event.map(|e| e.kind), Some(ArrhythmiaKind::MissedBeat));

        for _ in 0..12 {
            ts += 800.0;
            let r = det.process_interval(800.0, ts);
            assert!(r.event.is_none(), "unexpected {:?}", r.event);
        }
        assert_eq!(det.count(), 1);
        assert!(det.variations.iter().all(|v| *v < 0.01));
    }

    #[test]
    fn premature_beat_with_compensatory_pause() {
        let (mut det, mut ts) = calibrated();
        ts += 600.0;
        assert!(det.process_interval(600.0, ts).event.is_none());
        ts += 1000.0;
        let r = det.process_interval(1000.0, ts);
        assert_eq!(r.event.map(|e| e.kind), Some(ArrhythmiaKind::PrematureBeat));
    }

    #[test]
    fn alternating_intervals_are_irregular() {
        let (mut det, mut ts) = calibrated();
        let mut kinds = Vec::new();
        for i in 0..8 {
            let rr = if i % 2 == 0 { 650.0 } else { 950.0 };
            ts += rr;
            if let Some(e) = det.process_interval(rr, ts).event {
                kinds.push(e.kind);
            }
        }
        assert!(kinds.contains(&ArrhythmiaKind::IrregularRhythm));
    }

    #[test]
    fn events_closer_than_gap_count_once() {
        let (mut det, _) = calibrated();
        det.process_interval(1600.0, 10_000.0);
        det.process_interval(1600.0, 10_500.0);
        assert_eq!(det.count(), 1);
        det.process_interval(1600.0, 11_200.0);
        assert_eq!(det.count(), 2);
    }

    #[test]
    fn detected_status_is_held_then_cleared() {
        let (mut det, _) = calibrated();
        det.process_interval(1600.0, 10_000.0);
        assert_eq!(det.status_at(12_000.0), "ARRHYTHMIA DETECTED|1");
        assert_eq!(det.status_at(13_500.0), "NO ARRHYTHMIA|1");
    }

    #[test]
    fn implausible_intervals_are_ignored() {
        let (mut det, ts) = calibrated();
        let r = det.process_interval(3000.0, ts + 3000.0);
        assert!(r.event.is_none());
        assert_eq!(det.count(), 0);
    }
}
