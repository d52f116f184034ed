//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载调整链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 按恢复方式分三类：
//! - 本地契约错误（`InvalidBufferShape` / `InvalidParams`）：调用方编程错误
//! - 图片加载错误（`InvalidImage` / `ImageLoadFailed` / `Decode`）：会话回到 Empty
//! - 远端错误（`ServiceUnavailable` / `StaleSession` / `Timeout`）：本地结果保持有效

/// 调整链路统一错误类型。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdjustError {
    #[error("像素缓冲形状非法：{0}")]
    InvalidBufferShape(String),

    #[error("调整参数非法：{0}")]
    InvalidParams(String),

    #[error("图片无效：{0}")]
    InvalidImage(String),

    #[error("图片加载失败：{0}")]
    ImageLoadFailed(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("服务不可用：{0}")]
    ServiceUnavailable(String),

    #[error("服务端会话已失效：{0}")]
    StaleSession(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("配置错误：{0}")]
    InvalidConfig(String),
}

impl AdjustError {
    /// 稳定错误码，供界面层做分支展示。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBufferShape(_) => "E_BUFFER_SHAPE",
            Self::InvalidParams(_) => "E_PARAMS",
            Self::InvalidImage(_) => "E_INVALID_IMAGE",
            Self::ImageLoadFailed(_) => "E_IMAGE_LOAD",
            Self::Decode(_) => "E_DECODE",
            Self::ServiceUnavailable(_) => "E_SERVICE_UNAVAILABLE",
            Self::StaleSession(_) => "E_STALE_SESSION",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidConfig(_) => "E_CONFIG",
        }
    }

    /// 错误发生的阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidBufferShape(_) | Self::InvalidParams(_) => "local",
            Self::InvalidImage(_) | Self::ImageLoadFailed(_) | Self::Decode(_) => "upload",
            Self::ServiceUnavailable(_) | Self::StaleSession(_) | Self::Timeout(_) => "remote",
            Self::InvalidConfig(_) => "config",
        }
    }

    /// 是否属于远端边界错误（本地调整结果不受影响）。
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_) | Self::StaleSession(_) | Self::Timeout(_)
        )
    }
}

impl From<AdjustError> for String {
    fn from(error: AdjustError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_classified() {
        assert!(AdjustError::StaleSession("x".into()).is_remote());
        assert!(AdjustError::Timeout("x".into()).is_remote());
        assert!(!AdjustError::InvalidImage("x".into()).is_remote());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(AdjustError::ServiceUnavailable(String::new()).code(), "E_SERVICE_UNAVAILABLE");
        assert_eq!(AdjustError::ImageLoadFailed(String::new()).stage(), "upload");
        assert_eq!(AdjustError::InvalidBufferShape(String::new()).stage(), "local");
    }
}
