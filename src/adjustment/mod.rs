//! # 亮度/对比度调整模块（adjustment）
//!
//! ## 设计思路
//!
//! 将“像素变换 → 直方图统计 → 远端同步 → 会话编排”按职责拆分为多个子模块：
//!
//! - `buffer`：像素缓冲、调整参数与图片解码/编码
//! - `transform`：线性变换引擎（纯函数）
//! - `histogram`：三通道直方图（大图按行并行）
//! - `remote`：远端图片服务适配（`RemoteSync` trait + HTTP 实现）
//! - `session`：会话聚合（模式、参数、图像、两套直方图槽位）
//! - `debounce`：可取消的延迟调度
//! - `controller`：唯一的会话写入方，负责状态机与远端结果排序
//! - `config/error`：配置、错误
//!
//! ## 新同事快速上手
//!
//! ```text
//! 调用方（CLI / 界面）
//!    ↓
//! controller.rs（状态机 + 序号过滤 + 阶段耗时日志）
//!    ├─ transform.rs / histogram.rs（LOCAL，同步）
//!    ├─ debounce.rs（REMOTE 参数变化，500ms 静默期）
//!    └─ remote.rs（上传 / 远端调整 / 清理）
//!    ↓
//! session.rs（只读快照给展示层）
//! ```
//!
//! ## 分层职责建议
//!
//! - 公式或取整规则变更只改 `transform.rs`
//! - 接口路径、状态码映射、重试策略改 `remote.rs`
//! - 模式切换与结果排序问题优先看 `controller.rs`

mod buffer;
mod config;
mod controller;
mod debounce;
mod error;
mod histogram;
mod remote;
mod session;
mod transform;

pub use buffer::{AdjustmentParams, PixelBuffer, ALPHA_MAX, ALPHA_MIN, BETA_MAX, BETA_MIN};
pub use config::{backend_url, PipelineConfig, BACKEND_URL_ENV, DEFAULT_BACKEND_URL};
pub use controller::{AdjustmentController, RemoteEvent, RemoteOutcome};
pub use debounce::Debouncer;
pub use error::AdjustError;
pub use histogram::{histogram, histogram_with_threshold, Channel, Histogram, BINS, DEFAULT_PARALLEL_THRESHOLD};
pub use remote::{
    AdjustResponse, HttpRemoteSync, ProcessResponse, RemoteSync, RenderedHistogram, UploadResponse,
};
pub use session::{ComputationMode, HistogramView, Session, SessionState};
pub use transform::{adjust, map_sample};
