//! # LuminoTune — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 调用方 (CLI / 界面层)                     │
//! │                                                          │
//! │   load_image ── set_params ── toggle_mode ── reset       │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AdjustError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  └─ adjustment                                           │
//! │      ├─ controller     会话状态机 + 远端结果排序          │
//! │      ├─ transform      α·v + β 线性变换 (LUT)             │
//! │      ├─ histogram      三通道直方图 (rayon)               │
//! │      ├─ remote         HTTP 图片服务 (reqwest + 重试)     │
//! │      └─ debounce       500ms 静默期调度                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 入口的返回类型 |
//! | [`adjustment`] | 亮度/对比度调整、直方图、远端同步与会话编排 |

pub mod adjustment;
pub mod error;
