//! 应用配置模块

use crate::core::comparator::MovePairing;
use crate::core::hash::HashAlgorithm;
use crate::core::scanner::DEFAULT_MAX_CONCURRENT_HASHES;
use crate::logging::LogConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 单向目录镜像同步工具
#[derive(Parser, Debug, Default)]
#[command(name = "treemirror")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// 源目录
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// 副本目录
    #[arg(long)]
    pub replica: Option<PathBuf>,

    /// 同步间隔（秒）
    #[arg(long)]
    pub interval: Option<u64>,

    /// 日志文件路径
    #[arg(long = "log")]
    pub log_file: Option<PathBuf>,

    /// JSON 配置文件，命令行参数优先
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 只同步一次然后退出
    #[arg(long)]
    pub once: bool,

    /// 日志级别: error, warn, info, debug, trace
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("未指定源目录 (--source)")]
    MissingSource,
    #[error("未指定副本目录 (--replica)")]
    MissingReplica,
    #[error("同步间隔必须为正整数，当前为 {0}")]
    InvalidInterval(u64),
    #[error("源目录不存在: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("源目录与副本目录不能相同或互相包含")]
    SameRoots,
    #[error("读取配置文件失败 ({}): {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("解析配置文件失败 ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// 镜像配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default)]
    pub source: PathBuf,
    #[serde(default)]
    pub replica: PathBuf,
    /// 同步间隔（秒）
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// 同时计算摘要的最大文件数
    #[serde(default = "default_max_concurrent_hashes")]
    pub max_concurrent_hashes: usize,
    #[serde(default)]
    pub move_pairing: MovePairing,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_interval_secs() -> u64 {
    60 // 默认每分钟一次
}

fn default_log_file() -> PathBuf {
    PathBuf::from("treemirror.log")
}

fn default_max_concurrent_hashes() -> usize {
    DEFAULT_MAX_CONCURRENT_HASHES
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            replica: PathBuf::new(),
            interval_secs: default_interval_secs(),
            log_file: default_log_file(),
            hash_algorithm: HashAlgorithm::default(),
            max_concurrent_hashes: default_max_concurrent_hashes(),
            move_pairing: MovePairing::default(),
            log: LogConfig::default(),
        }
    }
}

impl MirrorConfig {
    /// 从 JSON 配置文件加载
    pub fn load(config_file: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(config_file).map_err(|source| ConfigError::Read {
            path: config_file.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_file.to_path_buf(),
            source,
        })
    }

    /// 合并配置文件与命令行参数并校验
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// 命令行参数覆盖配置文件中的值
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(source) = &args.source {
            self.source = source.clone();
        }
        if let Some(replica) = &args.replica {
            self.replica = replica.clone();
        }
        if let Some(interval) = args.interval {
            self.interval_secs = interval;
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = log_file.clone();
        }
        if let Some(level) = &args.log_level {
            self.log.level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::MissingSource);
        }
        if self.replica.as_os_str().is_empty() {
            return Err(ConfigError::MissingReplica);
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval(self.interval_secs));
        }
        if !self.source.is_dir() {
            return Err(ConfigError::SourceNotFound(self.source.clone()));
        }

        let source = absolutize(&self.source);
        let replica = absolutize(&self.replica);
        if source.starts_with(&replica) || replica.starts_with(&source) {
            return Err(ConfigError::SameRoots);
        }

        Ok(())
    }
}

impl fmt::Display for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "源目录:     {}", self.source.display())?;
        writeln!(f, "副本目录:   {}", self.replica.display())?;
        writeln!(f, "同步间隔:   {}", format_interval(self.interval_secs))?;
        writeln!(f, "摘要算法:   {}", self.hash_algorithm)?;
        writeln!(f, "移动配对:   {}", self.move_pairing)?;
        write!(f, "日志文件:   {}", self.log_file.display())
    }
}

/// 规范化路径；不存在的部分拼接在最近的已存在祖先之后
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            absolutize(parent).join(name)
        }
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// 把秒数格式化为 `1d 2h 3m 4s`，省略为 0 的部分
pub fn format_interval(secs: u64) -> String {
    if secs == 0 {
        return "0s".to_string();
    }

    let units = [
        (secs / 86_400, "d"),
        (secs % 86_400 / 3_600, "h"),
        (secs % 3_600 / 60, "m"),
        (secs % 60, "s"),
    ];

    units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect::<Vec<_>>()
        .join(" ")
}
