use crate::config::MirrorConfig;
use crate::core::comparator::{DiffEngine, DiffError};
use crate::core::executor::SyncExecutor;
use crate::core::report::CycleReport;
use crate::core::scanner::{LocalScanner, TreeScanner};
use crate::core::scheduler::SyncTask;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// 同步周期级别的失败，出现时本周期不会修改目标树
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("扫描目录树失败")]
    Scan(#[source] anyhow::Error),
    #[error("计算差异失败")]
    Diff(#[from] DiffError),
}

/// 镜像引擎：扫描 -> 比较 -> 执行
pub struct MirrorEngine {
    source: PathBuf,
    replica: PathBuf,
    scanner: Arc<dyn TreeScanner>,
    diff: DiffEngine,
    executor: SyncExecutor,
}

impl MirrorEngine {
    pub fn new(config: &MirrorConfig) -> Self {
        let scanner = LocalScanner::new(config.hash_algorithm, config.max_concurrent_hashes);
        Self::with_scanner(
            config.source.clone(),
            config.replica.clone(),
            Arc::new(scanner),
            DiffEngine::new(config.move_pairing),
        )
    }

    pub fn with_scanner(
        source: PathBuf,
        replica: PathBuf,
        scanner: Arc<dyn TreeScanner>,
        diff: DiffEngine,
    ) -> Self {
        let executor = SyncExecutor::new(source.clone(), replica.clone());
        Self {
            source,
            replica,
            scanner,
            diff,
            executor,
        }
    }

    /// 执行一次完整的同步周期
    ///
    /// 单个条目的失败只体现在报告里，周期本身仍然返回 `Ok`。
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        info!(
            "开始同步: {} -> {}",
            self.source.display(),
            self.replica.display()
        );

        let input = self
            .scanner
            .scan_pair(&self.source, &self.replica)
            .await
            .map_err(CycleError::Scan)?;

        let plan = self.diff.plan(&input.source, &input.dest)?;
        let summary = DiffEngine::summarize(&plan);
        info!(
            "差异分析完成: 创建目录 {}, 移动 {}, 复制 {}, 删除文件 {}, 删除目录 {}",
            summary.dirs_to_create,
            summary.move_count,
            summary.copy_count,
            summary.delete_count,
            summary.dirs_to_delete
        );

        let report = self.executor.apply(&plan).await;
        report.log();

        if report.has_failures() {
            warn!(
                "同步完成，{} / {} 个操作失败，耗时 {}ms",
                report.failed_count(),
                report.processed_count(),
                report.duration_ms()
            );
        } else {
            info!(
                "同步完成: {} 个操作，耗时 {}ms",
                report.processed_count(),
                report.duration_ms()
            );
        }

        Ok(report)
    }
}

#[async_trait]
impl SyncTask for MirrorEngine {
    async fn run(&self) -> anyhow::Result<()> {
        self.run_cycle().await?;
        Ok(())
    }
}
