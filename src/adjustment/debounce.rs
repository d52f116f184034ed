//! # 防抖调度
//!
//! ## 设计思路
//!
//! 每次调度生成一个取消标志（`Arc<AtomicBool>`），重新调度 = 置位旧标志 + 生成新标志。
//! 后台任务在静默期结束后检查标志，已取消则直接退出，不会发出请求。
//! 已经发出的请求不在传输层中断，其结果由控制器按序号丢弃。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 带取消标志的延迟任务调度器。
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<Arc<AtomicBool>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 取消尚未触发的任务，并在静默期后执行 `task`。
    ///
    /// 需要在 tokio 运行时内调用。
    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let cancelled = Arc::new(AtomicBool::new(false));
        self.pending = Some(Arc::clone(&cancelled));
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if cancelled.load(Ordering::SeqCst) {
                log::debug!("⏭️ 防抖任务已被新调度取代");
                return;
            }
            task.await;
        });
    }

    /// 取消尚未触发的任务；返回是否确有待触发任务。
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(flag) => !flag.swap(true, Ordering::SeqCst),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_last_task() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=5 {
            let fired = Arc::clone(&fired);
            let last = Arc::clone(&last);
            debouncer.schedule(async move {
                fired.fetch_add(1, Ordering::SeqCst);
                last.store(i, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_pending_task() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        debouncer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
