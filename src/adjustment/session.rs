//! # 会话聚合
//!
//! ## 设计思路
//!
//! 用单一 `Session` 聚合替代分散的界面状态标记：原图、调整后图像、参数、计算模式、
//! 以及两套直方图槽位（本地计算 / 远端渲染）。界面按当前模式读取对应槽位，
//! 切换模式不会丢掉另一套结果。
//!
//! `Session` 只由控制器修改，对外只读。

use super::{AdjustmentParams, Histogram, PixelBuffer, RenderedHistogram};

/// 直方图（以及 REMOTE 模式下的调整产物）由谁计算。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputationMode {
    #[default]
    Local,
    Remote,
}

impl ComputationMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// 是否已加载图片。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Loaded,
}

/// 当前用于展示的直方图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramView<'a> {
    /// 本地统计的数值直方图。
    Computed(&'a Histogram),
    /// 服务端渲染的直方图图片。
    Rendered(&'a RenderedHistogram),
}

/// 单次会话状态。
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub(super) mode: ComputationMode,
    pub(super) params: AdjustmentParams,
    pub(super) original: Option<PixelBuffer>,
    pub(super) adjusted: Option<PixelBuffer>,
    pub(super) local_original_histogram: Option<Histogram>,
    pub(super) local_adjusted_histogram: Option<Histogram>,
    pub(super) remote_original_histogram: Option<RenderedHistogram>,
    pub(super) remote_adjusted_histogram: Option<RenderedHistogram>,
}

impl Session {
    pub fn new(mode: ComputationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        if self.original.is_some() {
            SessionState::Loaded
        } else {
            SessionState::Empty
        }
    }

    pub fn mode(&self) -> ComputationMode {
        self.mode
    }

    pub fn params(&self) -> AdjustmentParams {
        self.params
    }

    pub fn original(&self) -> Option<&PixelBuffer> {
        self.original.as_ref()
    }

    pub fn adjusted(&self) -> Option<&PixelBuffer> {
        self.adjusted.as_ref()
    }

    pub fn local_adjusted_histogram(&self) -> Option<&Histogram> {
        self.local_adjusted_histogram.as_ref()
    }

    pub fn remote_adjusted_histogram(&self) -> Option<&RenderedHistogram> {
        self.remote_adjusted_histogram.as_ref()
    }

    /// 按当前模式选择原图直方图。
    pub fn displayed_original_histogram(&self) -> Option<HistogramView<'_>> {
        match self.mode {
            ComputationMode::Local => self
                .local_original_histogram
                .as_ref()
                .map(HistogramView::Computed),
            ComputationMode::Remote => self
                .remote_original_histogram
                .as_ref()
                .map(HistogramView::Rendered),
        }
    }

    /// 按当前模式选择调整后直方图。
    pub fn displayed_adjusted_histogram(&self) -> Option<HistogramView<'_>> {
        match self.mode {
            ComputationMode::Local => self
                .local_adjusted_histogram
                .as_ref()
                .map(HistogramView::Computed),
            ComputationMode::Remote => self
                .remote_adjusted_histogram
                .as_ref()
                .map(HistogramView::Rendered),
        }
    }

    /// 丢弃所有图像与直方图，保留模式与参数。
    pub(super) fn drop_artifacts(&mut self) {
        self.original = None;
        self.adjusted = None;
        self.local_original_histogram = None;
        self.local_adjusted_histogram = None;
        self.remote_original_histogram = None;
        self.remote_adjusted_histogram = None;
    }

    /// 回到空会话：仅保留模式，参数恢复默认。
    pub(super) fn clear(&mut self) {
        *self = Self::new(self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_mode_and_resets_params() {
        let mut session = Session::new(ComputationMode::Remote);
        session.params = AdjustmentParams::new(2.0, 30).expect("valid params");
        session.original = Some(PixelBuffer::filled(1, 1, 3, 0).expect("valid buffer"));
        assert_eq!(session.state(), SessionState::Loaded);

        session.clear();

        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.mode(), ComputationMode::Remote);
        assert!(session.params().is_identity());
    }

    #[test]
    fn displayed_histogram_follows_mode() {
        let mut session = Session::new(ComputationMode::Local);
        session.local_adjusted_histogram = Some(Histogram::default());
        session.remote_adjusted_histogram = Some(RenderedHistogram { png: vec![1, 2, 3] });

        assert!(matches!(
            session.displayed_adjusted_histogram(),
            Some(HistogramView::Computed(_))
        ));

        session.mode = session.mode.toggled();
        assert!(matches!(
            session.displayed_adjusted_histogram(),
            Some(HistogramView::Rendered(r)) if r.png == vec![1, 2, 3]
        ));
        assert!(session.displayed_original_histogram().is_none());
    }
}
