//! # 直方图计算
//!
//! ## 设计思路
//!
//! 对 R/G/B 三个通道独立计数（alpha 通道不参与），结果只依赖输入，多次计算结果一致。
//!
//! ## 实现思路
//!
//! 小图顺序遍历；像素数达到阈值后按行切分，用 rayon 的 `fold/reduce`
//! 各自累加局部桶再逐桶合并（加法可交换，结果与顺序版本一致）。

use rayon::prelude::*;

use super::{AdjustError, PixelBuffer};

/// 每个通道的桶数量。
pub const BINS: usize = 256;
/// 默认并行阈值（像素）。
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 512 * 512;

/// 颜色通道。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

/// 三通道频数分布，下标为采样值，值为出现次数。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Histogram {
    red: Vec<u64>,
    green: Vec<u64>,
    blue: Vec<u64>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            red: vec![0; BINS],
            green: vec![0; BINS],
            blue: vec![0; BINS],
        }
    }
}

impl Histogram {
    /// 由外部数据构建，要求每个通道恰好 256 个桶。
    pub fn from_channels(red: Vec<u64>, green: Vec<u64>, blue: Vec<u64>) -> Result<Self, AdjustError> {
        for (name, bins) in [("red", &red), ("green", &green), ("blue", &blue)] {
            if bins.len() != BINS {
                return Err(AdjustError::InvalidBufferShape(format!(
                    "{} 通道桶数量为 {}（应为 {}）",
                    name,
                    bins.len(),
                    BINS
                )));
            }
        }
        Ok(Self { red, green, blue })
    }

    pub fn channel(&self, channel: Channel) -> &[u64] {
        match channel {
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }

    pub fn red(&self) -> &[u64] {
        &self.red
    }

    pub fn green(&self) -> &[u64] {
        &self.green
    }

    pub fn blue(&self) -> &[u64] {
        &self.blue
    }

    /// 单通道计数总和（等于像素数）。
    pub fn total(&self, channel: Channel) -> u64 {
        self.channel(channel).iter().sum()
    }

    /// 三通道中最大的单桶计数，用于绘图归一化。
    pub fn peak(&self) -> u64 {
        self.red
            .iter()
            .chain(&self.green)
            .chain(&self.blue)
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn tally_rows(mut self, rows: &[u8], channels: usize) -> Self {
        for pixel in rows.chunks_exact(channels) {
            self.red[pixel[0] as usize] += 1;
            self.green[pixel[1] as usize] += 1;
            self.blue[pixel[2] as usize] += 1;
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for (dst, src) in self
            .red
            .iter_mut()
            .chain(self.green.iter_mut())
            .chain(self.blue.iter_mut())
            .zip(other.red.iter().chain(&other.green).chain(&other.blue))
        {
            *dst += *src;
        }
        self
    }
}

/// 计算缓冲的三通道直方图（使用默认并行阈值）。
pub fn histogram(buffer: &PixelBuffer) -> Result<Histogram, AdjustError> {
    histogram_with_threshold(buffer, DEFAULT_PARALLEL_THRESHOLD)
}

/// 计算直方图；像素数 `>= parallel_threshold` 时按行并行统计。
pub fn histogram_with_threshold(
    buffer: &PixelBuffer,
    parallel_threshold: usize,
) -> Result<Histogram, AdjustError> {
    buffer.validate()?;

    let channels = buffer.channels as usize;
    if buffer.pixel_count() == 0 {
        return Ok(Histogram::default());
    }

    if buffer.pixel_count() >= parallel_threshold {
        let stride = buffer.row_stride();
        Ok(buffer
            .data
            .par_chunks(stride)
            .fold(Histogram::default, |acc, row| acc.tally_rows(row, channels))
            .reduce(Histogram::default, Histogram::merge))
    } else {
        Ok(Histogram::default().tally_rows(&buffer.data, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, channels: u8) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height) as usize * channels as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x % 256) as u8);
                data.push((y % 256) as u8);
                data.push(((x + y) % 256) as u8);
                if channels == 4 {
                    data.push(200);
                }
            }
        }
        PixelBuffer::new(width, height, channels, data).expect("valid buffer")
    }

    #[test]
    fn counts_each_channel_independently() {
        let buffer = PixelBuffer::new(2, 1, 3, vec![255, 0, 0, 0, 255, 0]).expect("valid buffer");
        let hist = histogram(&buffer).expect("histogram should succeed");

        assert_eq!(hist.red()[255], 1);
        assert_eq!(hist.red()[0], 1);
        assert_eq!(hist.green()[255], 1);
        assert_eq!(hist.blue()[0], 2);
    }

    #[test]
    fn alpha_channel_is_excluded() {
        let buffer = PixelBuffer::new(1, 1, 4, vec![1, 2, 3, 4]).expect("valid buffer");
        let hist = histogram(&buffer).expect("histogram should succeed");

        assert_eq!(hist.red()[1], 1);
        assert_eq!(hist.green()[2], 1);
        assert_eq!(hist.blue()[3], 1);
        assert_eq!(hist.total(Channel::Red), 1);
        assert_eq!(hist.peak(), 1);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let buffer = gradient(300, 40, 4);
        let sequential = histogram_with_threshold(&buffer, usize::MAX).expect("sequential");
        let parallel = histogram_with_threshold(&buffer, 1).expect("parallel");

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.total(Channel::Blue), 300 * 40);
    }

    #[test]
    fn empty_buffer_yields_zero_histogram() {
        let buffer = PixelBuffer::new(0, 5, 3, Vec::new()).expect("valid buffer");
        let hist = histogram(&buffer).expect("histogram should succeed");
        assert_eq!(hist.peak(), 0);
    }

    #[test]
    fn from_channels_rejects_wrong_bin_count() {
        let result = Histogram::from_channels(vec![0; 255], vec![0; BINS], vec![0; BINS]);
        assert!(matches!(result, Err(AdjustError::InvalidBufferShape(_))));
    }
}
