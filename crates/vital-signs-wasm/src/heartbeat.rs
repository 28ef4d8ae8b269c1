//! 心跳（峰值）检测模块
//!
//! 在 60 个样本的滚动缓冲上计算自适应阈值 `min + 0.55·(max - min)`，
//! 局部极大值延迟一个样本确认（prev < cur ≥ next），并受 250ms 不应期约束。
//!
//! 相邻峰的时间差即 RR 间期，超出 [250ms, 2000ms]（240-30 BPM）的间期
//! 被剔除，不参与心率计算。心率取中位数 ±25% 内间期的加权均值
//! （越新的权重越大），再在心跳之间做 EMA 平滑。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::config::HeartbeatConfig;
use crate::stats;

pub const MIN_RR_MS: f64 = 250.0;
pub const MAX_RR_MS: f64 = 2000.0;

/// 相对中位数的可接受偏差
const MEDIAN_TOLERANCE: f64 = 0.25;
/// 置信度达到满分所需的间期数
const FULL_CONFIDENCE_INTERVALS: f64 = 5.0;

pub fn is_plausible_rr(rr_ms: f64) -> bool {
    rr_ms.is_finite() && (MIN_RR_MS..=MAX_RR_MS).contains(&rr_ms)
}

/// 由 RR 间期序列（旧 → 新）计算心率，不足 2 个有效间期时返回 0
#[wasm_bindgen(js_name = "calculateBpm")]
pub fn calculate_bpm(intervals: &[f64]) -> f64 {
    let valid: Vec<f64> = intervals.iter().copied().filter(|rr| is_plausible_rr(*rr)).collect();
    if valid.len() < 2 {
        return 0.0;
    }

    let med = stats::median(&valid);
    let lo = med * (1.0 - MEDIAN_TOLERANCE);
    let hi = med * (1.0 + MEDIAN_TOLERANCE);
    let consistent: Vec<f64> = valid.into_iter().filter(|rr| *rr >= lo && *rr <= hi).collect();
    if consistent.len() < 2 {
        return 0.0;
    }

    let (weighted, total_weight) = consistent
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, w_sum), (i, rr)| {
            let w = (i + 1) as f64;
            (sum + rr * w, w_sum + w)
        });
    60_000.0 / (weighted / total_weight)
}

#[wasm_bindgen]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    /// 平滑后的心率，未知时为 0
    pub bpm: f64,
    pub is_peak: bool,
    /// 0-1，由间期一致性与数量决定
    pub confidence: f64,
    pub rr_count: u32,
    /// 最近一个有效 RR 间期（毫秒），无则为 0
    pub last_rr: f64,
    /// 本次新确认的有效 RR 间期（毫秒），无则为 0
    pub new_rr: f64,
}

#[wasm_bindgen]
pub struct HeartbeatDetector {
    config: HeartbeatConfig,
    buffer: VecDeque<(f64, f64)>,
    rr_intervals: VecDeque<f64>,
    last_peak_ts: Option<f64>,
    smoothed_bpm: f64,
    rejected: u32,
    peak_count: u32,
}

#[wasm_bindgen]
impl HeartbeatDetector {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::with_config(HeartbeatConfig::default())
    }

    /// 输入一个放大后的样本
    pub fn process(&mut self, value: f64, timestamp: f64) -> HeartbeatResult {
        self.buffer.push_back((value, timestamp));
        while self.buffer.len() > self.config.buffer_size {
            self.buffer.pop_front();
        }

        let mut is_peak = false;
        let mut new_rr = 0.0;

        if let Some(peak_ts) = self.confirmed_peak() {
            is_peak = true;
            self.peak_count += 1;
            if let Some(prev) = self.last_peak_ts {
                let rr = peak_ts - prev;
                if is_plausible_rr(rr) {
                    self.push_interval(rr);
                    new_rr = rr;
                } else {
                    self.rejected += 1;
                    tracing::trace!(rr, "rr interval rejected");
                }
            }
            self.last_peak_ts = Some(peak_ts);
        }

        if new_rr > 0.0 {
            let intervals: Vec<f64> = self.rr_intervals.iter().copied().collect();
            let instant = calculate_bpm(&intervals);
            if instant > 0.0 {
                self.smoothed_bpm = if self.smoothed_bpm == 0.0 {
                    instant
                } else {
                    let alpha = self.config.bpm_smoothing;
                    alpha * instant + (1.0 - alpha) * self.smoothed_bpm
                };
            }
        }

        HeartbeatResult {
            bpm: self.smoothed_bpm,
            is_peak,
            confidence: self.confidence(),
            rr_count: self.rr_intervals.len() as u32,
            last_rr: self.rr_intervals.back().copied().unwrap_or(0.0),
            new_rr,
        }
    }

    #[wasm_bindgen(getter)]
    pub fn bpm(&self) -> f64 {
        self.smoothed_bpm
    }

    #[wasm_bindgen(js_name = "getRrIntervals")]
    pub fn rr_intervals(&self) -> Vec<f64> {
        self.rr_intervals.iter().copied().collect()
    }

    #[wasm_bindgen(getter, js_name = "rejectedIntervals")]
    pub fn rejected_intervals(&self) -> u32 {
        self.rejected
    }

    #[wasm_bindgen(getter, js_name = "peakCount")]
    pub fn peak_count(&self) -> u32 {
        self.peak_count
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.rr_intervals.clear();
        self.last_peak_ts = None;
        self.smoothed_bpm = 0.0;
        self.rejected = 0;
        self.peak_count = 0;
    }
}

impl Default for HeartbeatDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatDetector {
    pub fn with_config(config: HeartbeatConfig) -> Self {
        Self {
            buffer: VecDeque::with_capacity(config.buffer_size),
            rr_intervals: VecDeque::with_capacity(config.rr_window),
            last_peak_ts: None,
            smoothed_bpm: 0.0,
            rejected: 0,
            peak_count: 0,
            config,
        }
    }

    /// 检查倒数第二个样本是否为有效峰，返回其时间戳
    fn confirmed_peak(&self) -> Option<f64> {
        let n = self.buffer.len();
        if n < 3 {
            return None;
        }
        let (prev, _) = self.buffer[n - 3];
        let (cur, cur_ts) = self.buffer[n - 2];
        let (next, _) = self.buffer[n - 1];
        if !(prev < cur && cur >= next) {
            return None;
        }

        let (lo, hi) = self
            .buffer
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (v, _)| {
                (lo.min(*v), hi.max(*v))
            });
        let range = hi - lo;
        if range < self.config.min_signal_range {
            return None;
        }
        if cur < lo + self.config.threshold_ratio * range {
            return None;
        }

        match self.last_peak_ts {
            Some(last) if cur_ts - last < self.config.min_peak_interval_ms => None,
            _ => Some(cur_ts),
        }
    }

    fn push_interval(&mut self, rr: f64) {
        self.rr_intervals.push_back(rr);
        while self.rr_intervals.len() > self.config.rr_window {
            self.rr_intervals.pop_front();
        }
    }

    fn confidence(&self) -> f64 {
        if self.rr_intervals.len() < 2 {
            return 0.0;
        }
        let intervals: Vec<f64> = self.rr_intervals.iter().copied().collect();
        let m = stats::mean(&intervals);
        if m <= 0.0 {
            return 0.0;
        }
        let cv = stats::std_dev(&intervals) / m;
        let consistency = (1.0 - 2.0 * cv).clamp(0.0, 1.0);
        let coverage = (intervals.len() as f64 / FULL_CONFIDENCE_INTERVALS).min(1.0);
        consistency * coverage
    }
}
