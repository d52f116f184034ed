//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级 `AppError`，CLI 入口统一返回 `Result<T, AppError>`，
//! 流水线内部错误（`AdjustError`）与文件读写错误都能用 `?` 直接向上传递。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `AdjustError` / `std::io::Error` / `serde_json::Error` 提供 `From` 转换。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 `--json` 输出。

use serde::Serialize;

use crate::adjustment::AdjustError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 调整流水线错误（解码 / 变换 / 远端同步）
    #[error("{0}")]
    Adjust(#[from] AdjustError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 结果序列化失败
    #[error("序列化失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// 进程退出码：输入问题为 2，远端问题为 3，其余为 1。
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Adjust(err) if err.is_remote() => 3,
            Self::Adjust(
                AdjustError::InvalidParams(_)
                | AdjustError::InvalidImage(_)
                | AdjustError::ImageLoadFailed(_)
                | AdjustError::Decode(_),
            ) => 2,
            _ => 1,
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
