//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `PipelineConfig`，保证运行时行为可观测、可调整、可测试。
//! 服务地址属于进程级配置：首次访问时从环境变量解析，之后全程复用。
//!
//! ## 实现思路
//!
//! - `Default` 提供可直接使用的配置（服务地址取进程级解析结果）。
//! - `from_env` 是 `Default` 的语义化别名，供入口处显式调用。
//! - `validate` 在构建控制器/HTTP 客户端前统一做范围校验。

use once_cell::sync::Lazy;

use super::AdjustError;

/// 服务地址环境变量名。
pub const BACKEND_URL_ENV: &str = "LUMINOTUNE_BACKEND_URL";
/// 未配置环境变量时的回退地址。
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

static BACKEND_URL: Lazy<String> = Lazy::new(|| {
    let url = std::env::var(BACKEND_URL_ENV)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    log::info!("🔧 图片服务地址：{}", url);
    url
});

/// 进程级服务地址（环境变量优先，否则回退默认值）。
pub fn backend_url() -> &'static str {
    BACKEND_URL.as_str()
}

/// 调整流水线配置。
///
/// 字段覆盖远端请求、防抖、上传/解码上限与本地直方图并行四个方面。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 图片服务基础地址（不含末尾 `/`）。
    pub backend_url: String,
    /// 单次请求总超时（秒）。
    pub request_timeout_secs: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout_secs: u64,
    /// REMOTE 模式下参数变化后的静默期（毫秒）。
    pub debounce_ms: u64,
    /// 允许上传的原始文件体积上限（字节）。
    pub max_upload_bytes: u64,
    /// 服务返回原图解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 可重试失败的最大尝试次数（含首次）。
    pub max_retries: u8,
    /// 直方图统计切换为并行的像素阈值。
    pub parallel_threshold_pixels: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: backend_url().to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 8,
            debounce_ms: 500,
            max_upload_bytes: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            max_retries: 3,
            parallel_threshold_pixels: 512 * 512,
        }
    }
}

impl PipelineConfig {
    /// 使用进程级环境配置构建。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use luminotune::adjustment::PipelineConfig;
    ///
    /// let config = PipelineConfig::from_env();
    /// config.validate()?;
    /// # Ok::<(), luminotune::adjustment::AdjustError>(())
    /// ```
    pub fn from_env() -> Self {
        Self::default()
    }

    /// 指定服务地址，其余字段取默认值。
    pub fn with_backend_url(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            backend_url: url.trim().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// 拼接接口完整地址，例如 `endpoint("upload")` → `{base}/api/upload`。
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/api/{}", self.backend_url, name)
    }

    /// 校验配置范围。
    pub fn validate(&self) -> Result<(), AdjustError> {
        if self.backend_url.is_empty() {
            return Err(AdjustError::InvalidConfig("backend_url 不能为空".to_string()));
        }
        reqwest::Url::parse(&self.backend_url)
            .map_err(|e| AdjustError::InvalidConfig(format!("backend_url 无法解析：{}", e)))?;
        if !(1..=120).contains(&self.request_timeout_secs) {
            return Err(AdjustError::InvalidConfig(
                "request_timeout_secs 必须在 1~120 秒之间".to_string(),
            ));
        }
        if !(1..=120).contains(&self.connect_timeout_secs) {
            return Err(AdjustError::InvalidConfig(
                "connect_timeout_secs 必须在 1~120 秒之间".to_string(),
            ));
        }
        if self.debounce_ms > 10_000 {
            return Err(AdjustError::InvalidConfig(
                "debounce_ms 必须在 0~10000 毫秒之间".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(AdjustError::InvalidConfig("max_retries 至少为 1".to_string()));
        }
        if self.max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(AdjustError::InvalidConfig(
                "max_decoded_bytes 不能小于 8MB".to_string(),
            ));
        }

        Ok(())
    }
}
