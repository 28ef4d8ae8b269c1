//! PPG 波形形态特征
//!
//! 所有生理指标估算共用的一次特征提取：
//! AC/DC、灌注指数、上升/下降斜率及其比值、平均上升时间、脉搏面积比。

use serde::Serialize;

use crate::stats;

/// 特征提取所需的最少样本数
pub const MIN_WAVEFORM_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformFeatures {
    /// 原始亮度均值
    pub dc: f64,
    /// 去趋势原始信号的 p5-p95 跨度
    pub ac: f64,
    /// AC / DC
    pub perfusion_index: f64,
    /// 放大信号上升段的平均斜率（单位/秒）
    pub rise_slope: f64,
    /// 放大信号下降段的平均斜率绝对值（单位/秒）
    pub fall_slope: f64,
    pub slope_ratio: f64,
    pub rise_time_ms: f64,
    /// 均值以上面积占总绝对面积的比例 (0-1)
    pub pulse_area_ratio: f64,
    pub sample_count: usize,
}

impl WaveformFeatures {
    /// `amplified` 与 `raw` 为同一时间窗内的样本，任一不足 20 个时返回 `None`
    pub fn extract(amplified: &[f64], raw: &[f64], sample_rate: f64) -> Option<Self> {
        if amplified.len() < MIN_WAVEFORM_SAMPLES || raw.len() < MIN_WAVEFORM_SAMPLES {
            return None;
        }
        let fs = if sample_rate > 0.0 { sample_rate } else { 30.0 };

        let dc = stats::mean(raw);
        let detrended = stats::detrend(raw);
        let ac = stats::percentile(&detrended, 95.0) - stats::percentile(&detrended, 5.0);
        let perfusion_index = if dc > 0.0 { ac / dc } else { 0.0 };

        let mut rise_sum = 0.0;
        let mut rise_n = 0usize;
        let mut fall_sum = 0.0;
        let mut fall_n = 0usize;
        let mut runs: Vec<usize> = Vec::new();
        let mut run = 0usize;
        for w in amplified.windows(2) {
            let d = (w[1] - w[0]) * fs;
            if d > 0.0 {
                rise_sum += d;
                rise_n += 1;
                run += 1;
            } else {
                if d < 0.0 {
                    fall_sum += -d;
                    fall_n += 1;
                }
                if run > 0 {
                    runs.push(run);
                    run = 0;
                }
            }
        }
        if run > 0 {
            runs.push(run);
        }

        let rise_slope = if rise_n > 0 { rise_sum / rise_n as f64 } else { 0.0 };
        let fall_slope = if fall_n > 0 { fall_sum / fall_n as f64 } else { 0.0 };
        let slope_ratio = if fall_slope > 0.0 { rise_slope / fall_slope } else { 0.0 };
        let rise_time_ms = if runs.is_empty() {
            0.0
        } else {
            runs.iter().sum::<usize>() as f64 / runs.len() as f64 * 1000.0 / fs
        };

        let m = stats::mean(amplified);
        let (above, total) = amplified.iter().fold((0.0, 0.0), |(above, total), v| {
            let c = v - m;
            (above + c.max(0.0), total + c.abs())
        });
        let pulse_area_ratio = if total > 0.0 { above / total } else { 0.0 };

        Some(Self {
            dc,
            ac,
            perfusion_index,
            rise_slope,
            fall_slope,
            slope_ratio,
            rise_time_ms,
            pulse_area_ratio,
            sample_count: amplified.len(),
        })
    }

    /// 有可测量的搏动成分
    pub fn has_pulse(&self) -> bool {
        self.dc > 0.0 && self.ac > 1e-6 && self.perfusion_index.is_finite()
    }
}
