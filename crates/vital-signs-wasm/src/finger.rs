//! 手指检测模块（统一实现）
//!
//! 融合四个独立信号源判断手指是否覆盖摄像头：
//! - 幅度: AC 峰峰值，0.3 → 2.0 线性映射
//! - 节律性: 心率带自相关峰值，0.2 → 0.6 线性映射
//! - 亮度: 红色通道均值在 [60, 250] 内为 1，两侧软过渡
//! - 质量: 信号质量分原样使用
//!
//! 原始置信度 = 亮度门控 × (0.40·幅度 + 0.35·节律 + 0.25·质量)，
//! 再经 α=0.3 的 EMA 平滑。检测状态带迟滞：
//! 置信度 ≥ 0.6 持续 800ms 才判为检测到，< 0.35 持续 1200ms 才判为丢失。
//! 超过 1500ms 未刷新的信号源记为 0 分。

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::config::FingerConfig;
use crate::stats;

const SOURCE_COUNT: usize = 4;
/// 单个信号源"赞成"的分数线
const CONSENSUS_SCORE: f64 = 0.5;

#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Amplitude = 0,
    Rhythmicity = 1,
    Brightness = 2,
    Quality = 3,
}

impl SourceKind {
    pub const ALL: [SourceKind; SOURCE_COUNT] = [
        SourceKind::Amplitude,
        SourceKind::Rhythmicity,
        SourceKind::Brightness,
        SourceKind::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amplitude => "amplitude",
            Self::Rhythmicity => "rhythmicity",
            Self::Brightness => "brightness",
            Self::Quality => "quality",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 融合后的检测状态
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionState {
    pub is_finger_detected: bool,
    /// 平滑后的置信度 (0-1)
    pub confidence: f64,
    /// 得分 ≥ 0.5 的信号源占比 (0-1)
    pub consensus_level: f64,
}

/// 一次性提供全部信号源读数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FingerSources {
    pub amplitude: f64,
    pub rhythmicity: f64,
    pub brightness: f64,
    pub quality: f64,
}

#[derive(Debug, Clone, Copy)]
struct SourceReading {
    value: f64,
    updated_at: f64,
}

#[wasm_bindgen]
pub struct FingerDetector {
    config: FingerConfig,
    readings: [Option<SourceReading>; SOURCE_COUNT],
    scores: [f64; SOURCE_COUNT],
    confidence: f64,
    consensus: f64,
    detected: bool,
    /// 置信度越过当前方向阈值的起始时刻
    crossing_since: Option<f64>,
}

#[wasm_bindgen]
impl FingerDetector {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::with_config(FingerConfig::default())
    }

    /// 刷新单个信号源并重新融合
    ///
    /// 每次调用都会推进一次 EMA；逐帧刷新全部信号源时应使用 `updateAll`。
    #[wasm_bindgen(js_name = "updateSource")]
    pub fn update_source(&mut self, kind: SourceKind, value: f64, timestamp: f64) -> DetectionState {
        self.store(kind, value, timestamp);
        self.fuse(timestamp)
    }

    #[wasm_bindgen(js_name = "updateAll")]
    pub fn update_all(
        &mut self,
        amplitude: f64,
        rhythmicity: f64,
        brightness: f64,
        quality: f64,
        timestamp: f64,
    ) -> DetectionState {
        self.update(
            &FingerSources {
                amplitude,
                rhythmicity,
                brightness,
                quality,
            },
            timestamp,
        )
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> DetectionState {
        DetectionState {
            is_finger_detected: self.detected,
            confidence: self.confidence,
            consensus_level: self.consensus,
        }
    }

    /// 指定信号源最近一次的归一化得分
    #[wasm_bindgen(js_name = "sourceScore")]
    pub fn source_score(&self, kind: SourceKind) -> f64 {
        self.scores[kind.index()]
    }

    pub fn reset(&mut self) {
        self.readings = [None; SOURCE_COUNT];
        self.scores = [0.0; SOURCE_COUNT];
        self.confidence = 0.0;
        self.consensus = 0.0;
        self.detected = false;
        self.crossing_since = None;
    }
}

impl Default for FingerDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerDetector {
    pub fn with_config(config: FingerConfig) -> Self {
        Self {
            config,
            readings: [None; SOURCE_COUNT],
            scores: [0.0; SOURCE_COUNT],
            confidence: 0.0,
            consensus: 0.0,
            detected: false,
            crossing_since: None,
        }
    }

    pub fn update(&mut self, sources: &FingerSources, timestamp: f64) -> DetectionState {
        self.store(SourceKind::Amplitude, sources.amplitude, timestamp);
        self.store(SourceKind::Rhythmicity, sources.rhythmicity, timestamp);
        self.store(SourceKind::Brightness, sources.brightness, timestamp);
        self.store(SourceKind::Quality, sources.quality, timestamp);
        self.fuse(timestamp)
    }

    fn store(&mut self, kind: SourceKind, value: f64, timestamp: f64) {
        // 非有限读数按缺失处理
        self.readings[kind.index()] = value.is_finite().then_some(SourceReading {
            value,
            updated_at: timestamp,
        });
    }

    fn score(&self, kind: SourceKind, value: f64) -> f64 {
        let c = &self.config;
        match kind {
            SourceKind::Amplitude => stats::ramp(value, c.min_amplitude, c.full_amplitude),
            SourceKind::Rhythmicity => stats::ramp(value, c.min_rhythmicity, c.full_rhythmicity),
            SourceKind::Brightness => {
                if value < c.min_brightness {
                    stats::ramp(value, c.min_brightness - c.brightness_ramp, c.min_brightness)
                } else if value > c.max_brightness {
                    1.0 - stats::ramp(value, c.max_brightness, c.max_brightness + c.brightness_ramp)
                } else {
                    1.0
                }
            }
            SourceKind::Quality => value.clamp(0.0, 1.0),
        }
    }

    fn fuse(&mut self, timestamp: f64) -> DetectionState {
        for kind in SourceKind::ALL {
            let i = kind.index();
            self.scores[i] = match self.readings[i] {
                Some(r) if timestamp - r.updated_at <= self.config.source_timeout_ms => {
                    self.score(kind, r.value)
                }
                _ => 0.0,
            };
        }

        let [amplitude, rhythmicity, brightness, quality] = self.scores;
        let raw = brightness
            * (self.config.amplitude_weight * amplitude
                + self.config.rhythmicity_weight * rhythmicity
                + self.config.quality_weight * quality);
        let alpha = self.config.confidence_smoothing;
        self.confidence = (alpha * raw.clamp(0.0, 1.0) + (1.0 - alpha) * self.confidence).clamp(0.0, 1.0);

        let agreeing = self.scores.iter().filter(|s| **s >= CONSENSUS_SCORE).count();
        self.consensus = agreeing as f64 / SOURCE_COUNT as f64;

        self.apply_hysteresis(timestamp);
        self.state()
    }

    fn apply_hysteresis(&mut self, timestamp: f64) {
        let (crossing, dwell) = if self.detected {
            (self.confidence < self.config.off_threshold, self.config.min_loss_dwell_ms)
        } else {
            (self.confidence >= self.config.on_threshold, self.config.min_detect_dwell_ms)
        };

        if !crossing {
            self.crossing_since = None;
            return;
        }

        let since = *self.crossing_since.get_or_insert(timestamp);
        if timestamp - since >= dwell {
            self.detected = !self.detected;
            self.crossing_since = None;
            if self.detected {
                tracing::debug!(confidence = self.confidence, "finger detected");
            } else {
                tracing::debug!(confidence = self.confidence, "finger lost");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: FingerSources = FingerSources {
        amplitude: 3.0,
        rhythmicity: 0.8,
        brightness: 150.0,
        quality: 0.9,
    };

    const FLAT: FingerSources = FingerSources {
        amplitude: 0.0,
        rhythmicity: 0.0,
        brightness: 150.0,
        quality: 0.0,
    };

    fn feed(det: &mut FingerDetector, src: &FingerSources, from_ms: f64, frames: usize) -> f64 {
        let mut ts = from_ms;
        for _ in 0..frames {
            det.update(src, ts);
            ts += 33.0;
        }
        ts
    }

    #[test]
    fn strong_sources_detect_after_dwell() {
        let mut det = FingerDetector::new();
        let ts = feed(&mut det, &GOOD, 0.0, 10);
        // EMA 尚在爬升或驻留时间未到
        assert!(!det.state().is_finger_detected);
        feed(&mut det, &GOOD, ts, 40);
        let state = det.state();
        assert!(state.is_finger_detected);
        assert!(state.confidence > 0.9);
        assert_eq!(state.consensus_level, 1.0);
    }

    #[test]
    fn flat_signal_confidence_decays_toward_zero() {
        let mut det = FingerDetector::new();
        let ts = feed(&mut det, &GOOD, 0.0, 60);
        let before = det.state().confidence;
        let mut prev = before;
        let mut ts = ts;
        for _ in 0..30 {
            det.update(&FLAT, ts);
            ts += 33.0;
            let c = det.state().confidence;
            assert!(c <= prev);
            prev = c;
        }
        assert!(prev < 0.001, "confidence = {prev}");
        assert!(!det.state().is_finger_detected);
    }

    #[test]
    fn brief_dropout_does_not_flip_state() {
        let mut det = FingerDetector::new();
        let ts = feed(&mut det, &GOOD, 0.0, 60);
        assert!(det.state().is_finger_detected);
        // 约 500ms 的丢失短于 1200ms 的驻留时间
        let ts = feed(&mut det, &FLAT, ts, 15);
        assert!(det.state().is_finger_detected);
        feed(&mut det, &GOOD, ts, 5);
        assert!(det.state().is_finger_detected);
    }

    #[test]
    fn stale_sources_count_as_missing() {
        let mut det = FingerDetector::new();
        feed(&mut det, &GOOD, 0.0, 60);
        // 仅亮度持续刷新，其余信号源过期
        let mut ts = 60.0 * 33.0 + 2000.0;
        for _ in 0..60 {
            det.update_source(SourceKind::Brightness, 150.0, ts);
            ts += 33.0;
        }
        assert_eq!(det.source_score(SourceKind::Amplitude), 0.0);
        assert_eq!(det.state().consensus_level, 0.25);
        assert!(!det.state().is_finger_detected);
    }

    #[test]
    fn darkness_gates_everything() {
        let mut det = FingerDetector::new();
        let dark = FingerSources {
            brightness: 10.0,
            ..GOOD
        };
        feed(&mut det, &dark, 0.0, 90);
        assert_eq!(det.state().confidence, 0.0);
        assert!(!det.state().is_finger_detected);
    }

    #[test]
    fn reset_clears_detection() {
        let mut det = FingerDetector::new();
        feed(&mut det, &GOOD, 0.0, 60);
        det.reset();
        assert_eq!(det.state(), DetectionState::default());
    }
}
