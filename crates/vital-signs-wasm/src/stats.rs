//! 滑动窗口上的基础统计量
//!
//! 所有函数对空切片返回 0，不会 panic。

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 总体标准差
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// 线性插值百分位，`p` 取 0..=100
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// 去除最小二乘直线趋势
pub fn detrend(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.iter().map(|_| 0.0).collect();
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };
    values
        .iter()
        .enumerate()
        .map(|(i, &y)| y - (y_mean + slope * (i as f64 - x_mean)))
        .collect()
}

/// 符号变化次数（忽略恰好为 0 的点）
pub fn zero_crossings(values: &[f64]) -> usize {
    let mut count = 0;
    let mut prev_sign = 0i8;
    for &v in values {
        let sign = if v > 0.0 {
            1
        } else if v < 0.0 {
            -1
        } else {
            continue;
        };
        if prev_sign != 0 && sign != prev_sign {
            count += 1;
        }
        prev_sign = sign;
    }
    count
}

/// 在 `[min_lag, max_lag]` 内寻找归一化自相关的最大值。
///
/// 返回 `(峰值, 对应滞后)`，峰值截断到 [0, 1]。
/// 每个滞后按重叠长度做无偏归一化，避免短滞后天然占优。
pub fn autocorrelation_peak(values: &[f64], min_lag: usize, max_lag: usize) -> (f64, usize) {
    let n = values.len();
    let min_lag = min_lag.max(1);
    let max_lag = max_lag.min(n / 2);
    if n < 4 || min_lag > max_lag {
        return (0.0, 0);
    }

    let m = mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
    let energy = centered.iter().map(|v| v * v).sum::<f64>() / n as f64;
    if energy <= f64::EPSILON {
        return (0.0, 0);
    }

    let mut best = (0.0, 0);
    for lag in min_lag..=max_lag {
        let overlap = n - lag;
        let sum: f64 = (0..overlap).map(|i| centered[i] * centered[i + lag]).sum();
        let r = sum / overlap as f64 / energy;
        if r > best.0 {
            best = (r, lag);
        }
    }
    (best.0.clamp(0.0, 1.0), best.1)
}

/// 线性斜坡：`value <= lo` 为 0，`value >= hi` 为 1
pub fn ramp(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return if value >= hi { 1.0 } else { 0.0 };
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// 由时间戳序列估计采样率（Hz），无法估计时返回 `fallback`
pub fn estimate_sample_rate(timestamps: &[f64], fallback: f64) -> f64 {
    if timestamps.len() < 2 {
        return fallback;
    }
    let span = timestamps[timestamps.len() - 1] - timestamps[0];
    if span <= 0.0 || !span.is_finite() {
        return fallback;
    }
    let rate = (timestamps.len() - 1) as f64 * 1000.0 / span;
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        fallback
    }
}
