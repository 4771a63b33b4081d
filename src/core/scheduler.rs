//! 定时调度器：按固定间隔触发同步，同一时间最多一个任务在执行

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 由调度器周期执行的任务
#[async_trait]
pub trait SyncTask: Send + Sync + 'static {
    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("同步间隔必须大于 0")]
    ZeroInterval,
}

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// 调度统计
#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    ticks_skipped: AtomicU64,
}

/// 调度统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub ticks_skipped: u64,
}

/// 定时器与工作任务共享的状态
struct Shared {
    /// 任务是否正在执行
    running: Mutex<bool>,
    idle: Notify,
    counters: Counters,
}

impl Shared {
    fn running(&self) -> MutexGuard<'_, bool> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 抢占执行权，已有任务在执行时返回 false
    fn try_begin(&self) -> bool {
        let mut running = self.running();
        if *running {
            return false;
        }
        *running = true;
        true
    }

    fn finish(&self) {
        *self.running() = false;
        self.idle.notify_waiters();
    }
}

pub struct Scheduler {
    interval: Duration,
    task: Arc<dyn SyncTask>,
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(interval: Duration, task: Arc<dyn SyncTask>) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        Ok(Self {
            interval,
            task,
            shared: Arc::new(Shared {
                running: Mutex::new(false),
                idle: Notify::new(),
                counters: Counters::default(),
            }),
            timer: Mutex::new(None),
        })
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 启动定时器，首次触发立即发生
    pub fn start(&self) {
        let mut timer = self.timer();
        if timer.is_some() {
            warn!("调度器已在运行，忽略重复启动");
            return;
        }

        let period = self.interval;
        let shared = self.shared.clone();
        let task = self.task.clone();

        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                Self::on_tick(&shared, &task);
            }
        }));

        info!("调度器已启动，间隔 {:?}", period);
    }

    /// 停止定时器；正在执行的任务会继续完成，但不会再启动新任务
    pub fn stop(&self) {
        match self.timer().take() {
            Some(handle) => {
                handle.abort();
                info!("调度器已停止");
            }
            None => debug!("调度器未运行，忽略停止"),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.timer().is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_task_running(&self) -> bool {
        *self.shared.running()
    }

    /// 等待正在执行的任务结束
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_task_running() {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.counters;
        SchedulerStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            runs_started: c.runs_started.load(Ordering::Relaxed),
            runs_completed: c.runs_completed.load(Ordering::Relaxed),
            runs_failed: c.runs_failed.load(Ordering::Relaxed),
            ticks_skipped: c.ticks_skipped.load(Ordering::Relaxed),
        }
    }

    fn on_tick(shared: &Arc<Shared>, task: &Arc<dyn SyncTask>) {
        let counters = &shared.counters;
        counters.ticks.fetch_add(1, Ordering::Relaxed);

        if !shared.try_begin() {
            counters.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            warn!("上一次同步尚未结束，跳过本次触发");
            return;
        }
        counters.runs_started.fetch_add(1, Ordering::Relaxed);

        let shared = shared.clone();
        let task = task.clone();
        tokio::spawn(async move {
            let guard = shared.clone();
            scopeguard::defer! {
                guard.finish();
            }

            // 在独立任务中执行，panic 以 JoinError 的形式返回
            let result = tokio::spawn(async move { task.run().await }).await;
            let counters = &shared.counters;
            match result {
                Ok(Ok(())) => {
                    counters.runs_completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    counters.runs_failed.fetch_add(1, Ordering::Relaxed);
                    error!("同步任务失败: {:#}", e);
                }
                Err(e) => {
                    counters.runs_failed.fetch_add(1, Ordering::Relaxed);
                    error!("同步任务异常终止: {}", e);
                }
            }
        });
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer().take() {
            handle.abort();
        }
    }
}
