//! # 调整流水线控制器
//!
//! ## 设计思路
//!
//! `AdjustmentController` 独占 `Session`，是会话唯一的写入方。状态机为
//! `ComputationMode × {Empty, Loaded}`，转换入口固定为：
//! `load_image` / `set_params` / `toggle_mode` / `reset`。
//!
//! - 本地像素变换与直方图是同步调用，每次参数变化立即执行，画面不落后于输入。
//! - 远端调用是唯一的挂起点：在后台任务中执行，结果经 channel 回到控制器，
//!   由持有控制器的那条逻辑线程串行应用。
//!
//! ## 实现思路
//!
//! - 每个远端调整请求在调度时分配递增序号；请求真正发出时登记到 `issued`。
//! - 应用结果时，序号小于最新已发出序号、或不大于已应用/失效下界的结果一律丢弃。
//! - `load_image` / `reset` / 切回 LOCAL 会抬高失效下界，旧会话的迟到结果不会生效。
//! - 远端失败只记录提示，已展示的结果保持不变。
//!
//! ```text
//! set_params ──► adjust() ──► histogram()         (LOCAL)
//!      │
//!      └──► Debouncer(500ms) ──► request_adjustment ──► channel ──► apply_remote_event
//!                                                                   (REMOTE, 按序号过滤)
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::debounce::Debouncer;
use super::histogram::histogram_with_threshold;
use super::session::{ComputationMode, HistogramView, Session, SessionState};
use super::transform::adjust;
use super::{AdjustError, AdjustResponse, AdjustmentParams, PipelineConfig, PixelBuffer, RemoteSync};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 后台任务送回控制器的远端结果。
#[derive(Debug)]
pub struct RemoteEvent {
    pub seq: u64,
    pub params: AdjustmentParams,
    pub result: Result<AdjustResponse, AdjustError>,
}

/// 远端结果的处理结论。
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// 结果已写入会话。
    Applied { seq: u64 },
    /// 已被更新的请求取代，结果被丢弃。
    Discarded { seq: u64 },
    /// 最新请求失败；已展示的结果保持不变。
    Failed { seq: u64, error: AdjustError },
}

/// 在途远端任务计数守卫：任务结束（含被取消）时自动减一。
struct OutstandingGuard(Arc<AtomicUsize>);

impl OutstandingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 调整流水线控制器。
pub struct AdjustmentController<R: RemoteSync> {
    remote: Arc<R>,
    config: PipelineConfig,
    session: Session,
    debouncer: Debouncer,
    next_seq: u64,
    issued: Arc<AtomicU64>,
    floor: u64,
    last_applied: u64,
    outstanding: Arc<AtomicUsize>,
    events_tx: mpsc::UnboundedSender<RemoteEvent>,
    events_rx: mpsc::UnboundedReceiver<RemoteEvent>,
    notice: Option<AdjustError>,
}

impl<R: RemoteSync> AdjustmentController<R> {
    /// 创建空会话控制器（LOCAL 模式）。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use luminotune::adjustment::{AdjustmentController, HttpRemoteSync, PipelineConfig};
    ///
    /// let config = PipelineConfig::from_env();
    /// let remote = HttpRemoteSync::new(config.clone())?;
    /// let controller = AdjustmentController::new(remote, config)?;
    /// # Ok::<(), luminotune::adjustment::AdjustError>(())
    /// ```
    pub fn new(remote: R, config: PipelineConfig) -> Result<Self, AdjustError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            remote: Arc::new(remote),
            debouncer: Debouncer::new(Duration::from_millis(config.debounce_ms)),
            config,
            session: Session::new(ComputationMode::Local),
            next_seq: 0,
            issued: Arc::new(AtomicU64::new(0)),
            floor: 0,
            last_applied: 0,
            outstanding: Arc::new(AtomicUsize::new(0)),
            events_tx,
            events_rx,
            notice: None,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn mode(&self) -> ComputationMode {
        self.session.mode()
    }

    pub fn params(&self) -> AdjustmentParams {
        self.session.params()
    }

    pub fn original(&self) -> Option<&PixelBuffer> {
        self.session.original()
    }

    pub fn adjusted(&self) -> Option<&PixelBuffer> {
        self.session.adjusted()
    }

    pub fn displayed_original_histogram(&self) -> Option<HistogramView<'_>> {
        self.session.displayed_original_histogram()
    }

    pub fn displayed_adjusted_histogram(&self) -> Option<HistogramView<'_>> {
        self.session.displayed_adjusted_histogram()
    }

    /// 取出最近一次需要提示用户的错误。
    pub fn take_notice(&mut self) -> Option<AdjustError> {
        self.notice.take()
    }

    /// 是否仍有未结束的远端任务（含等待静默期的任务）。
    pub fn has_outstanding_remote_work(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) > 0
    }

    /// 加载图片：始终经远端服务解码，再按当前参数在本地推导调整结果。
    ///
    /// 失败时会话回到 Empty，并返回 `ImageLoadFailed`。
    pub async fn load_image(&mut self, file: Bytes) -> Result<(), AdjustError> {
        self.invalidate_remote_results();
        let start = Instant::now();

        let upload = match self.remote.upload_image(file).await {
            Ok(upload) => upload,
            Err(err) => {
                log::error!("❌ 图片加载失败：{}", err);
                self.session.drop_artifacts();
                let failure = AdjustError::ImageLoadFailed(err.to_string());
                self.notice = Some(failure.clone());
                return Err(failure);
            }
        };

        self.session.drop_artifacts();
        self.session.original = Some(upload.original);
        self.session.remote_original_histogram = upload.original_histogram;

        if let Err(err) = self.recompute_local() {
            self.session.drop_artifacts();
            let failure = AdjustError::ImageLoadFailed(err.to_string());
            self.notice = Some(failure.clone());
            return Err(failure);
        }

        log::info!(
            "✅ 图片已加载 - mode={} {} total={}ms",
            self.session.mode.as_str(),
            self.session.params,
            start.elapsed().as_millis()
        );

        if self.session.mode == ComputationMode::Remote {
            self.issue_now();
        }

        Ok(())
    }

    /// 更新参数：本地立即重算；REMOTE 模式额外防抖调度远端刷新。
    pub fn set_params(&mut self, params: AdjustmentParams) -> Result<(), AdjustError> {
        self.session.params = params;

        if self.session.state() == SessionState::Empty {
            return Ok(());
        }

        self.recompute_local()?;

        if self.session.mode == ComputationMode::Remote {
            self.schedule_debounced();
        }

        Ok(())
    }

    /// 只修改对比度，越界值被拒绝。
    pub fn set_alpha(&mut self, alpha: f32) -> Result<(), AdjustError> {
        let params = AdjustmentParams::new(alpha, self.session.params.beta())?;
        self.set_params(params)
    }

    /// 只修改亮度，越界值被拒绝。
    pub fn set_beta(&mut self, beta: i32) -> Result<(), AdjustError> {
        let params = AdjustmentParams::new(self.session.params.alpha(), beta)?;
        self.set_params(params)
    }

    /// 切换 LOCAL ↔ REMOTE。
    ///
    /// 已加载图片时切入 REMOTE 会立即发出一次远端调整请求（不经防抖）。
    pub fn toggle_mode(&mut self) -> Result<ComputationMode, AdjustError> {
        let mode = self.session.mode.toggled();
        self.session.mode = mode;
        log::info!("🔀 计算模式切换为 {}", mode.as_str());

        if self.session.state() == SessionState::Loaded {
            match mode {
                ComputationMode::Remote => self.issue_now(),
                ComputationMode::Local => {
                    self.invalidate_remote_results();
                    self.recompute_local()?;
                }
            }
        }

        Ok(mode)
    }

    /// 清空会话（保留模式），并尽力通知服务端丢弃图片。
    pub async fn reset(&mut self) {
        self.invalidate_remote_results();
        self.session.clear();
        self.notice = None;
        log::info!("🧹 会话已重置 - mode={}", self.session.mode.as_str());

        if let Err(err) = self.remote.clear_session().await {
            log::warn!("⚠️ 通知服务端清理会话失败（已忽略）：{}", err);
        }
    }

    /// 等待下一个远端结果并应用。
    pub async fn next_remote_outcome(&mut self) -> Option<RemoteOutcome> {
        let event = self.events_rx.recv().await?;
        Some(self.apply_remote_event(event))
    }

    /// 应用所有已到达的远端结果，不等待。
    pub fn drain_remote_events(&mut self) -> Vec<RemoteOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            outcomes.push(self.apply_remote_event(event));
        }
        outcomes
    }

    /// 等到所有在途远端任务结束，并应用期间到达的结果。
    pub async fn settle(&mut self) -> Vec<RemoteOutcome> {
        let mut outcomes = Vec::new();

        loop {
            if !self.has_outstanding_remote_work() {
                outcomes.extend(self.drain_remote_events());
                return outcomes;
            }

            let event = tokio::select! {
                event = self.events_rx.recv() => event,
                _ = tokio::time::sleep(SETTLE_POLL_INTERVAL) => None,
            };

            if let Some(event) = event {
                outcomes.push(self.apply_remote_event(event));
            }
        }
    }

    /// 按序号决定是否应用一条远端结果。
    pub fn apply_remote_event(&mut self, event: RemoteEvent) -> RemoteOutcome {
        let seq = event.seq;
        let latest_issued = self.issued.load(Ordering::SeqCst);

        if seq < latest_issued || seq <= self.floor.max(self.last_applied) {
            log::debug!(
                "🗑️ 丢弃过期远端结果 - seq={} latest={} ({})",
                seq,
                latest_issued,
                event.params
            );
            return RemoteOutcome::Discarded { seq };
        }

        self.last_applied = seq;

        match event.result {
            Ok(response) => {
                if let Some(rendered) = response.adjusted_histogram {
                    self.session.remote_adjusted_histogram = Some(rendered);
                }
                log::debug!("📥 远端直方图已更新 - seq={} ({})", seq, event.params);
                RemoteOutcome::Applied { seq }
            }
            Err(error) => {
                log::warn!("⚠️ 远端调整失败，保留上一次结果：{}", error);
                self.notice = Some(error.clone());
                RemoteOutcome::Failed { seq, error }
            }
        }
    }

    /// 由原图重新推导调整后图像；LOCAL 模式同时重算直方图。
    fn recompute_local(&mut self) -> Result<(), AdjustError> {
        let Some(original) = self.session.original.as_ref() else {
            return Ok(());
        };

        let transform_start = Instant::now();
        let adjusted = adjust(original, self.session.params)?;
        let transform_elapsed = transform_start.elapsed();

        let histogram_start = Instant::now();
        if self.session.mode == ComputationMode::Local {
            let threshold = self.config.parallel_threshold_pixels;
            if self.session.local_original_histogram.is_none() {
                self.session.local_original_histogram =
                    Some(histogram_with_threshold(original, threshold)?);
            }
            self.session.local_adjusted_histogram =
                Some(histogram_with_threshold(&adjusted, threshold)?);
        }
        let histogram_elapsed = histogram_start.elapsed();

        log::info!(
            "🎨 本地重算 - {}x{} transform={}µs histogram={}µs",
            adjusted.width,
            adjusted.height,
            transform_elapsed.as_micros(),
            histogram_elapsed.as_micros()
        );

        self.session.adjusted = Some(adjusted);
        Ok(())
    }

    /// 所有已调度/在途的远端结果失效。
    fn invalidate_remote_results(&mut self) {
        self.debouncer.cancel();
        self.floor = self.next_seq;
    }

    fn allocate_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// 立即发出远端调整请求（取消尚未触发的防抖任务）。
    fn issue_now(&mut self) {
        self.debouncer.cancel();
        let seq = self.allocate_seq();
        self.issued.fetch_max(seq, Ordering::SeqCst);
        log::debug!("📡 立即发出远端调整 - seq={}", seq);

        let task = self.remote_task(seq, self.session.params);
        tokio::spawn(task);
    }

    /// 静默期后发出远端调整请求；新的调度会取消旧的。
    fn schedule_debounced(&mut self) {
        let seq = self.allocate_seq();
        let issued = Arc::clone(&self.issued);
        let task = self.remote_task(seq, self.session.params);

        self.debouncer.schedule(async move {
            issued.fetch_max(seq, Ordering::SeqCst);
            log::debug!("📡 防抖结束，发出远端调整 - seq={}", seq);
            task.await;
        });
    }

    fn remote_task(
        &self,
        seq: u64,
        params: AdjustmentParams,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        let events_tx = self.events_tx.clone();
        let guard = OutstandingGuard::new(&self.outstanding);

        async move {
            let _guard = guard;
            let result = remote.request_adjustment(params).await;
            if events_tx.send(RemoteEvent { seq, params, result }).is_err() {
                log::debug!("控制器已释放，丢弃远端结果 seq={}", seq);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::{RenderedHistogram, UploadResponse};

    struct NoopRemote;

    impl RemoteSync for NoopRemote {
        async fn upload_image(&self, _file: Bytes) -> Result<UploadResponse, AdjustError> {
            Ok(UploadResponse {
                original: PixelBuffer::filled(2, 2, 3, 10)?,
                original_histogram: None,
            })
        }

        async fn request_adjustment(
            &self,
            _params: AdjustmentParams,
        ) -> Result<AdjustResponse, AdjustError> {
            Ok(AdjustResponse::default())
        }

        async fn clear_session(&self) -> Result<(), AdjustError> {
            Ok(())
        }
    }

    fn controller() -> AdjustmentController<NoopRemote> {
        let config = PipelineConfig::with_backend_url("http://localhost:8000");
        AdjustmentController::new(NoopRemote, config).expect("controller init failed")
    }

    fn event(seq: u64, marker: u8) -> RemoteEvent {
        RemoteEvent {
            seq,
            params: AdjustmentParams::default(),
            result: Ok(AdjustResponse {
                adjusted_histogram: Some(RenderedHistogram { png: vec![marker] }),
            }),
        }
    }

    #[test]
    fn older_event_is_discarded_after_newer_applied() {
        let mut controller = controller();
        controller.issued.store(2, Ordering::SeqCst);

        assert_eq!(controller.apply_remote_event(event(2, 2)), RemoteOutcome::Applied { seq: 2 });
        assert_eq!(controller.apply_remote_event(event(1, 1)), RemoteOutcome::Discarded { seq: 1 });
        assert_eq!(
            controller.session.remote_adjusted_histogram(),
            Some(&RenderedHistogram { png: vec![2] })
        );
    }

    #[test]
    fn superseded_event_is_discarded_even_when_it_arrives_first() {
        let mut controller = controller();
        controller.issued.store(3, Ordering::SeqCst);

        assert_eq!(controller.apply_remote_event(event(2, 2)), RemoteOutcome::Discarded { seq: 2 });
        assert!(controller.session.remote_adjusted_histogram().is_none());
    }

    #[test]
    fn events_below_floor_are_discarded() {
        let mut controller = controller();
        controller.next_seq = 5;
        controller.invalidate_remote_results();

        assert_eq!(controller.apply_remote_event(event(5, 5)), RemoteOutcome::Discarded { seq: 5 });
        assert_eq!(controller.apply_remote_event(event(6, 6)), RemoteOutcome::Applied { seq: 6 });
    }

    #[test]
    fn failure_keeps_last_known_good_histogram() {
        let mut controller = controller();
        controller.apply_remote_event(event(1, 1));

        let outcome = controller.apply_remote_event(RemoteEvent {
            seq: 2,
            params: AdjustmentParams::default(),
            result: Err(AdjustError::ServiceUnavailable("down".into())),
        });

        assert!(matches!(outcome, RemoteOutcome::Failed { seq: 2, .. }));
        assert_eq!(
            controller.session.remote_adjusted_histogram(),
            Some(&RenderedHistogram { png: vec![1] })
        );
        assert!(matches!(controller.take_notice(), Some(AdjustError::ServiceUnavailable(_))));
    }

    #[test]
    fn set_params_on_empty_session_only_records_params() {
        let mut controller = controller();
        let params = AdjustmentParams::new(2.0, 10).expect("valid params");

        controller.set_params(params).expect("set params should succeed");

        assert_eq!(controller.state(), SessionState::Empty);
        assert_eq!(controller.params(), params);
        assert!(controller.adjusted().is_none());
    }

    #[tokio::test]
    async fn set_alpha_rejects_out_of_range_value() {
        let mut controller = controller();
        controller
            .load_image(Bytes::from_static(b"png"))
            .await
            .expect("load should succeed");

        let result = controller.set_alpha(5.0);
        assert!(matches!(result, Err(AdjustError::InvalidParams(_))));
        assert!(controller.params().is_identity());

        controller.set_beta(20).expect("beta within range");
        assert_eq!(controller.adjusted().map(|b| b.data[0]), Some(30));
    }
}
