//! PPG 生理指标管线 WASM 库
//!
//! 从手机摄像头的逐帧亮度（光电容积脉搏波，PPG）估计心率、血氧、血压、
//! 血糖、血脂、水合度与心律失常。编译为 WebAssembly 在浏览器端运行，
//! 同时作为 rlib 被后端会话服务直接链接，两端共用同一份实现。
//!
//! ## 模块
//! - `amplifier`: 去基线与自适应增益放大
//! - `quality`: 信号质量评分
//! - `finger`: 多信号源融合的手指检测（带迟滞）
//! - `heartbeat`: 峰值检测、RR 间期与心率
//! - `arrhythmia`: RR 间期模式识别（漏搏、早搏、持续不齐、高变异）
//! - `hrv`: RMSSD / SDNN / pNN50
//! - `waveform`: 共享的波形形态特征
//! - `extractors`: SpO2、血压、血糖、血脂、水合度估算
//! - `processor`: 逐帧编排与会话汇总

pub mod amplifier;
pub mod arrhythmia;
pub mod config;
pub mod extractors;
pub mod finger;
pub mod heartbeat;
pub mod hrv;
pub mod processor;
pub mod quality;
pub mod stats;
pub mod waveform;

// 重新导出核心类型，方便外部使用
pub use amplifier::{AmplifiedSample, SignalAmplifier};
pub use arrhythmia::{ArrhythmiaDetector, ArrhythmiaEvent, ArrhythmiaKind, ArrhythmiaResult};
pub use config::PipelineConfig;
pub use finger::{DetectionState, FingerDetector, FingerSources, SourceKind};
pub use heartbeat::{calculate_bpm, HeartbeatDetector, HeartbeatResult};
pub use hrv::HrvMetrics;
pub use processor::{
    Lipids, MeasurementSummary, Sample, VitalConfidence, VitalSignsProcessor, VitalSignsResult,
};
pub use quality::SignalQualityAnalyzer;
