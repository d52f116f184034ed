//! # 像素变换引擎
//!
//! 对每个颜色采样执行 `clamp(round(alpha * v + beta), 0, 255)`，alpha 通道原样透传。
//! 8 位采样只有 256 种取值，先构建查找表再逐字节映射。

use std::time::Instant;

use super::{AdjustError, AdjustmentParams, PixelBuffer};

/// 对缓冲应用线性变换，返回新缓冲；输入保持不变。
pub fn adjust(buffer: &PixelBuffer, params: AdjustmentParams) -> Result<PixelBuffer, AdjustError> {
    buffer.validate()?;
    let start = Instant::now();

    let lut = build_lut(params);
    let channels = buffer.channels as usize;
    let mut data = Vec::with_capacity(buffer.data.len());

    if buffer.has_alpha() {
        for pixel in buffer.data.chunks_exact(channels) {
            data.push(lut[pixel[0] as usize]);
            data.push(lut[pixel[1] as usize]);
            data.push(lut[pixel[2] as usize]);
            data.push(pixel[3]);
        }
    } else {
        data.extend(buffer.data.iter().map(|&v| lut[v as usize]));
    }

    log::debug!(
        "🎚️ 像素变换完成 - {}x{} ({}) {}µs",
        buffer.width,
        buffer.height,
        params,
        start.elapsed().as_micros()
    );

    PixelBuffer::new(buffer.width, buffer.height, buffer.channels, data)
}

/// 单个采样的映射结果。
pub fn map_sample(v: u8, params: AdjustmentParams) -> u8 {
    let value = params.alpha() * v as f32 + params.beta() as f32;
    value.round().clamp(0.0, 255.0) as u8
}

fn build_lut(params: AdjustmentParams) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = map_sample(v as u8, params);
    }
    lut
}
