//! # 像素缓冲与调整参数
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `PixelBuffer` 表示已解码的原始像素（行优先、通道交错）
//! - `AdjustmentParams` 表示一次线性变换的参数，构造时即完成范围校验
//!
//! 缓冲按值语义使用：引擎只读输入、返回新缓冲，控制器才能安全保留原图反复推导。
//!
//! ## 实现思路
//!
//! 解码流程沿用“先读 header 尺寸 → 按上限快速拒绝 → 完整解码 → 校验长度”的顺序，
//! 降低异常输入触发高内存开销的风险。

use std::fmt;
use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgb, Rgba};

use super::{AdjustError, PipelineConfig};

/// 对比度（增益）下限。
pub const ALPHA_MIN: f32 = 0.1;
/// 对比度（增益）上限。
pub const ALPHA_MAX: f32 = 3.0;
/// 亮度（偏移）下限。
pub const BETA_MIN: i32 = -100;
/// 亮度（偏移）上限。
pub const BETA_MAX: i32 = 100;

/// 已解码的像素数据。
///
/// `data.len()` 必须等于 `width * height * channels`，`channels` 只能是 3（RGB）或 4（RGBA）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// 宽度（像素）。
    pub width: u32,
    /// 高度（像素）。
    pub height: u32,
    /// 每像素通道数。
    pub channels: u8,
    /// 通道交错的 8 位采样。
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// 构造并校验形状。
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, AdjustError> {
        let buffer = Self {
            width,
            height,
            channels,
            data,
        };
        buffer.validate()?;
        Ok(buffer)
    }

    /// 每个采样都取同一个值的缓冲。
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Result<Self, AdjustError> {
        let len = Self::expected_len(width, height, channels)?;
        Self::new(width, height, channels, vec![value; len])
    }

    /// 像素数量。
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 是否带 alpha 通道。
    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// 单行字节数。
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// 校验通道布局与数据长度。
    pub fn validate(&self) -> Result<(), AdjustError> {
        let expected = Self::expected_len(self.width, self.height, self.channels)?;
        if self.data.len() != expected {
            return Err(AdjustError::InvalidBufferShape(format!(
                "数据长度 {} 与 {}x{}x{} 不一致",
                self.data.len(),
                self.width,
                self.height,
                self.channels
            )));
        }
        Ok(())
    }

    fn expected_len(width: u32, height: u32, channels: u8) -> Result<usize, AdjustError> {
        if channels != 3 && channels != 4 {
            return Err(AdjustError::InvalidBufferShape(format!(
                "不支持的通道数：{}（仅支持 3 / 4）",
                channels
            )));
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(channels as usize))
            .ok_or_else(|| AdjustError::InvalidBufferShape("缓冲尺寸溢出".to_string()))
    }

    /// 将编码后的图片字节解码为 RGBA 缓冲。
    pub fn decode(bytes: &[u8], config: &PipelineConfig) -> Result<Self, AdjustError> {
        let _format: ImageFormat = image::guess_format(bytes)
            .map_err(|e| AdjustError::InvalidImage(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions(bytes)?;
        Self::validate_decode_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AdjustError::Decode(format!("图片解码失败：{}", e)))?;
        let (width, height) = decoded.dimensions();
        Self::validate_decode_limits(config, width, height)?;

        let data = decoded.to_rgba8().into_raw();
        Self::new(width, height, 4, data)
            .map_err(|_| AdjustError::Decode("解码后像素数据长度异常".to_string()))
    }

    /// 编码为 PNG。
    pub fn encode_png(&self) -> Result<Vec<u8>, AdjustError> {
        self.validate()?;
        let image = match self.channels {
            4 => ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgba8),
            _ => ImageBuffer::<Rgb<u8>, _>::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8),
        }
        .ok_or_else(|| AdjustError::InvalidBufferShape("PNG 编码缓冲长度异常".to_string()))?;

        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| AdjustError::Decode(format!("PNG 编码失败：{}", e)))?;
        Ok(cursor.into_inner())
    }

    fn inspect_dimensions(bytes: &[u8]) -> Result<(u32, u32), AdjustError> {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| AdjustError::InvalidImage(format!("无法识别图片格式：{}", e)))?
            .into_dimensions()
            .map_err(|e| AdjustError::InvalidImage(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_decode_limits(
        config: &PipelineConfig,
        width: u32,
        height: u32,
    ) -> Result<(), AdjustError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| AdjustError::InvalidImage("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(AdjustError::InvalidImage(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        let estimated = pixels.saturating_mul(4);
        if estimated > config.max_decoded_bytes {
            return Err(AdjustError::InvalidImage(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}

/// 线性变换参数：`alpha` 为增益（对比度），`beta` 为偏移（亮度）。
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AdjustmentParams {
    alpha: f32,
    beta: i32,
}

impl Default for AdjustmentParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0,
        }
    }
}

impl AdjustmentParams {
    /// 严格构造：越界或 NaN 直接拒绝。
    pub fn new(alpha: f32, beta: i32) -> Result<Self, AdjustError> {
        if !alpha.is_finite() || !(ALPHA_MIN..=ALPHA_MAX).contains(&alpha) {
            return Err(AdjustError::InvalidParams(format!(
                "alpha 必须在 {}~{} 之间，实际：{}",
                ALPHA_MIN, ALPHA_MAX, alpha
            )));
        }
        if !(BETA_MIN..=BETA_MAX).contains(&beta) {
            return Err(AdjustError::InvalidParams(format!(
                "beta 必须在 {}~{} 之间，实际：{}",
                BETA_MIN, BETA_MAX, beta
            )));
        }
        Ok(Self { alpha, beta })
    }

    /// 宽松构造：越界值收敛到边界，NaN 视为 1.0。
    pub fn clamped(alpha: f32, beta: i32) -> Self {
        let alpha = if alpha.is_nan() {
            1.0
        } else {
            alpha.clamp(ALPHA_MIN, ALPHA_MAX)
        };
        Self {
            alpha,
            beta: beta.clamp(BETA_MIN, BETA_MAX),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn beta(&self) -> i32 {
        self.beta
    }

    /// `alpha = 1.0, beta = 0` 时变换为恒等映射。
    pub fn is_identity(&self) -> bool {
        self.alpha == 1.0 && self.beta == 0
    }
}

impl fmt::Display for AdjustmentParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "α: {:.1}, β: {}", self.alpha, self.beta)
    }
}
