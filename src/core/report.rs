//! 同步结果报告

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// 单个条目的失败原因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("源文件不存在")]
    SourceMissing,
    #[error("目标文件已存在")]
    DestinationExists,
    #[error("目标所在目录不存在")]
    DestinationDirMissing,
    #[error("目录已存在")]
    AlreadyExists,
    #[error("路径不存在")]
    NotFound,
    #[error("IO 错误: {0}")]
    Io(String),
}

impl From<std::io::Error> for ItemError {
    fn from(err: std::io::Error) -> Self {
        ItemError::Io(err.to_string())
    }
}

/// 同步子操作，按执行顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateDirectories,
    MoveFiles,
    CopyFiles,
    DeleteFiles,
    DeleteDirectories,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::CreateDirectories => write!(f, "创建目录"),
            OperationKind::MoveFiles => write!(f, "移动文件"),
            OperationKind::CopyFiles => write!(f, "复制文件"),
            OperationKind::DeleteFiles => write!(f, "删除文件"),
            OperationKind::DeleteDirectories => write!(f, "删除目录"),
        }
    }
}

/// 单个子操作的结果，每个输入条目恰好出现在其中一个列表里
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub kind: OperationKind,
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, ItemError)>,
    pub succeeded_pairs: Vec<(PathBuf, PathBuf)>,
    pub failed_pairs: Vec<(PathBuf, PathBuf, ItemError)>,
}

impl OperationOutcome {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
            succeeded_pairs: Vec::new(),
            failed_pairs: Vec::new(),
        }
    }

    /// 记录单路径条目的结果
    pub fn record(&mut self, path: PathBuf, result: Result<(), ItemError>) {
        match result {
            Ok(()) => self.succeeded.push(path),
            Err(e) => self.failed.push((path, e)),
        }
    }

    /// 记录成对条目（移动、复制）的结果
    pub fn record_pair(&mut self, from: PathBuf, to: PathBuf, result: Result<(), ItemError>) {
        match result {
            Ok(()) => self.succeeded_pairs.push((from, to)),
            Err(e) => self.failed_pairs.push((from, to, e)),
        }
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len() + self.succeeded_pairs.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len() + self.failed_pairs.len()
    }

    /// 已处理的条目总数（成功 + 失败）
    pub fn processed_count(&self) -> usize {
        self.success_count() + self.failure_count()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// 逐条输出结果
    pub fn log(&self) {
        for path in &self.succeeded {
            info!("{} - 成功: {}", self.kind, path.display());
        }
        for (from, to) in &self.succeeded_pairs {
            info!("{} - 成功: {} -> {}", self.kind, from.display(), to.display());
        }
        for (path, e) in &self.failed {
            error!("{} - 失败: {} ({})", self.kind, path.display(), e);
        }
        for (from, to, e) in &self.failed_pairs {
            error!(
                "{} - 失败: {} -> {} ({})",
                self.kind,
                from.display(),
                to.display(),
                e
            );
        }
    }
}

/// 一个同步周期内所有子操作的汇总
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<OperationOutcome>,
}

impl CycleReport {
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: OperationOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn outcome(&self, kind: OperationKind) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(OperationOutcome::has_failures)
    }

    pub fn processed_count(&self) -> usize {
        self.outcomes.iter().map(OperationOutcome::processed_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().map(OperationOutcome::failure_count).sum()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn log(&self) {
        for outcome in &self.outcomes {
            outcome.log();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counts() {
        let mut outcome = OperationOutcome::new(OperationKind::MoveFiles);
        outcome.record_pair("a".into(), "b".into(), Ok(()));
        outcome.record_pair("c".into(), "d".into(), Err(ItemError::SourceMissing));
        outcome.record("e".into(), Err(ItemError::NotFound));

        assert_eq!(outcome.success_count(), 1);
        assert_eq!(outcome.failure_count(), 2);
        assert_eq!(outcome.processed_count(), 3);
        assert!(outcome.has_failures());
    }

    #[test]
    fn test_report_aggregates_outcomes() {
        let mut report = CycleReport::begin();
        let mut create = OperationOutcome::new(OperationKind::CreateDirectories);
        create.record("x".into(), Ok(()));
        report.push(create);
        report.push(OperationOutcome::new(OperationKind::DeleteFiles));
        report.finish();

        assert!(!report.has_failures());
        assert_eq!(report.processed_count(), 1);
        assert!(report.outcome(OperationKind::DeleteFiles).is_some());
        assert!(report.outcome(OperationKind::CopyFiles).is_none());
        assert!(report.duration_ms() >= 0);
    }

    #[test]
    fn test_io_error_message_is_kept() {
        let err: ItemError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err, ItemError::Io("disk full".to_string()));
    }
}
