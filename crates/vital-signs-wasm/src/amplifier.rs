//! 信号放大模块
//!
//! 将每帧的原始亮度标量映射为去基线、自适应增益后的 PPG 值：
//! 1. 5 点滑动平均低通
//! 2. 窗口均值作为 DC 基线，当前值减基线得到 AC
//! 3. 目标增益 = target_amplitude / (2·std)，截断到 [1, 20]
//! 4. AC 过零率落在 0.7-3.5 Hz（42-210 BPM）时视为类心跳振荡，
//!    增益以 0.2 快速收敛，否则以 0.05 缓慢收敛
//!
//! 同时输出窗口内 AC 峰峰值与心率滞后带内的自相关峰值（节律性）。

use std::collections::VecDeque;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::AmplifierConfig;
use crate::stats;

/// 少于该样本数时输出 0
const MIN_SAMPLES: usize = 3;

/// 单帧放大结果
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmplifiedSample {
    pub value: f64,
    pub gain: f64,
    pub baseline: f64,
    /// 窗口内 AC 峰峰值（原始亮度单位）
    pub amplitude: f64,
    /// 0-1
    pub rhythmicity: f64,
    pub is_oscillating: bool,
}

#[wasm_bindgen]
pub struct SignalAmplifier {
    config: AmplifierConfig,
    raw: VecDeque<f64>,
    smoothed: VecDeque<f64>,
    timestamps: VecDeque<f64>,
    gain: f64,
    sample_rate: f64,
}

#[wasm_bindgen]
impl SignalAmplifier {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::with_config(AmplifierConfig::default())
    }

    /// 输入一帧原始亮度，返回放大后的样本
    #[wasm_bindgen(js_name = "process")]
    pub fn process(&mut self, raw_value: f64, timestamp: f64) -> AmplifiedSample {
        self.raw.push_back(raw_value);
        while self.raw.len() > self.config.smoothing_window {
            self.raw.pop_front();
        }
        let smoothed = self.raw.iter().sum::<f64>() / self.raw.len() as f64;

        self.smoothed.push_back(smoothed);
        self.timestamps.push_back(timestamp);
        while self.smoothed.len() > self.config.window_size {
            self.smoothed.pop_front();
            self.timestamps.pop_front();
        }

        if self.smoothed.len() < MIN_SAMPLES {
            return AmplifiedSample {
                value: 0.0,
                gain: self.gain,
                baseline: smoothed,
                amplitude: 0.0,
                rhythmicity: 0.0,
                is_oscillating: false,
            };
        }

        let window: Vec<f64> = self.smoothed.iter().copied().collect();
        let ts: Vec<f64> = self.timestamps.iter().copied().collect();
        self.sample_rate = stats::estimate_sample_rate(&ts, self.config.fallback_sample_rate);

        let baseline = stats::mean(&window);
        let ac = smoothed - baseline;
        let (lo, hi) = stats::min_max(&window);
        let amplitude = hi - lo;
        let std = stats::std_dev(&window);

        let detrended = stats::detrend(&window);
        let is_oscillating = std > 1e-9 && self.oscillation_in_band(&detrended);
        let rhythmicity = self.rhythmicity(&detrended);

        let target_gain = if std > 1e-9 {
            (self.config.target_amplitude / (2.0 * std))
                .clamp(self.config.min_gain, self.config.max_gain)
        } else {
            self.gain
        };
        let rate = if is_oscillating {
            self.config.fast_adapt_rate
        } else {
            self.config.slow_adapt_rate
        };
        self.gain = (self.gain + rate * (target_gain - self.gain))
            .clamp(self.config.min_gain, self.config.max_gain);

        let sign = if self.config.invert_signal { -1.0 } else { 1.0 };

        AmplifiedSample {
            value: sign * ac * self.gain,
            gain: self.gain,
            baseline,
            amplitude,
            rhythmicity,
            is_oscillating,
        }
    }

    #[wasm_bindgen(getter)]
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// 由最近时间戳估计的采样率（Hz）
    #[wasm_bindgen(getter, js_name = "sampleRate")]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.smoothed.clear();
        self.timestamps.clear();
        self.gain = self.config.min_gain;
        self.sample_rate = self.config.fallback_sample_rate;
    }
}

impl Default for SignalAmplifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalAmplifier {
    pub fn with_config(config: AmplifierConfig) -> Self {
        let window = config.window_size;
        Self {
            gain: config.min_gain,
            sample_rate: config.fallback_sample_rate,
            raw: VecDeque::with_capacity(config.smoothing_window),
            smoothed: VecDeque::with_capacity(window),
            timestamps: VecDeque::with_capacity(window),
            config,
        }
    }

    fn oscillation_in_band(&self, detrended: &[f64]) -> bool {
        let duration_s = (detrended.len() - 1) as f64 / self.sample_rate;
        if duration_s <= 0.0 {
            return false;
        }
        let freq = stats::zero_crossings(detrended) as f64 / 2.0 / duration_s;
        freq >= self.config.min_oscillation_hz && freq <= self.config.max_oscillation_hz
    }

    fn rhythmicity(&self, detrended: &[f64]) -> f64 {
        let min_lag = (self.sample_rate / self.config.max_oscillation_hz).floor() as usize;
        let max_lag = (self.sample_rate / self.config.min_oscillation_hz).ceil() as usize;
        stats::autocorrelation_peak(detrended, min_lag, max_lag).0
    }
}
