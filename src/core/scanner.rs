use crate::core::hash::HashAlgorithm;
use crate::core::model::{FileAttributes, FileRecord, SyncInput, TreeSnapshot};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use walkdir::WalkDir;

/// 默认同时计算摘要的文件数
pub const DEFAULT_MAX_CONCURRENT_HASHES: usize = 10;

/// 目录树扫描接口：生成一棵树的快照
#[async_trait]
pub trait TreeScanner: Send + Sync {
    /// 扫描单棵目录树
    async fn scan(&self, root: &Path) -> Result<TreeSnapshot>;

    /// 准备目标树根目录，默认不做任何事
    async fn prepare_dest(&self, _dest: &Path) -> Result<()> {
        Ok(())
    }

    /// 同时扫描源树和目标树，任意一边失败则整体失败
    async fn scan_pair(&self, source: &Path, dest: &Path) -> Result<SyncInput> {
        self.prepare_dest(dest).await?;
        let (source, dest) = tokio::try_join!(self.scan(source), self.scan(dest))?;
        Ok(SyncInput { source, dest })
    }
}

/// 本地文件系统扫描器
pub struct LocalScanner {
    algorithm: HashAlgorithm,
    max_concurrent: usize,
}

/// 遍历阶段收集到的文件
struct WalkedFile {
    absolute: PathBuf,
    relative: String,
    metadata: Metadata,
}

impl LocalScanner {
    pub fn new(algorithm: HashAlgorithm, max_concurrent: usize) -> Self {
        Self {
            algorithm,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    fn relative_path(root: &Path, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} 不在 {} 之下", path.display(), root.display()))?;
        let relative = relative
            .to_str()
            .with_context(|| format!("路径不是合法的 UTF-8: {}", path.display()))?;
        Ok(Self::normalize_path(relative))
    }

    /// 遍历目录树，返回 (目录相对路径, 文件列表)
    fn walk(root: &Path) -> Result<(Vec<String>, Vec<WalkedFile>)> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("遍历目录失败: {}", root.display()))?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                dirs.push(Self::relative_path(root, entry.path())?);
            } else if file_type.is_file() {
                let metadata = entry
                    .metadata()
                    .with_context(|| format!("读取元数据失败: {}", entry.path().display()))?;
                files.push(WalkedFile {
                    absolute: entry.path().to_path_buf(),
                    relative: Self::relative_path(root, entry.path())?,
                    metadata,
                });
            } else {
                debug!("跳过非常规文件: {}", entry.path().display());
            }
        }

        Ok((dirs, files))
    }

    fn build_record(file: WalkedFile, content_hash: String) -> FileRecord {
        let file_name = file
            .absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        FileRecord {
            attributes: attributes_of(&file_name, &file.metadata),
            relative_path: file.relative,
            file_name,
            content_hash,
            size: file.metadata.len(),
            created: to_utc(file.metadata.created()),
            modified: to_utc(file.metadata.modified()),
            accessed: to_utc(file.metadata.accessed()),
        }
    }
}

#[async_trait]
impl TreeScanner for LocalScanner {
    /// 目标树根目录不存在时先创建，首次同步的目标树可以为空
    async fn prepare_dest(&self, dest: &Path) -> Result<()> {
        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tokio::fs::create_dir_all(dest)
                .await
                .with_context(|| format!("创建目标根目录失败: {}", dest.display()))?;
            debug!("已创建目标根目录: {}", dest.display());
        }
        Ok(())
    }

    async fn scan(&self, root: &Path) -> Result<TreeSnapshot> {
        info!("开始扫描: {}", root.display());

        // 根目录缺失（例如源目录被卸载）时不能当作空树处理
        let is_dir = tokio::fs::metadata(root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            bail!("目录不存在或不可访问: {}", root.display());
        }

        let walk_root = root.to_path_buf();
        let (dirs, files) = tokio::task::spawn_blocking(move || Self::walk(&walk_root))
            .await
            .context("遍历任务异常退出")??;

        // 限制同时读取的文件数
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(files.len());

        for file in files {
            let permit = semaphore.clone().acquire_owned().await?;
            let algorithm = self.algorithm;

            let handle = tokio::task::spawn_blocking(move || {
                let result = algorithm.hash_file(&file.absolute);
                drop(permit);
                result.map(|hash| Self::build_record(file, hash))
            });
            handles.push(handle);
        }

        let mut snapshot = TreeSnapshot::new(root);
        for dir in dirs {
            snapshot.add_directory(dir);
        }
        // 按遍历顺序收集，保证同一摘要下的记录顺序稳定
        for handle in handles {
            let record = handle.await.context("摘要任务异常退出")??;
            snapshot.add_file(record);
        }

        info!(
            "扫描完成: {} - {} 个文件, {} 个目录",
            root.display(),
            snapshot.file_count(),
            snapshot.directory_count()
        );

        Ok(snapshot)
    }
}

impl Default for LocalScanner {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_MAX_CONCURRENT_HASHES)
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

fn attributes_of(file_name: &str, metadata: &Metadata) -> FileAttributes {
    let mut attributes = FileAttributes::NONE;
    if metadata.permissions().readonly() {
        attributes.insert(FileAttributes::READ_ONLY);
    }
    if file_name.starts_with('.') {
        attributes.insert(FileAttributes::HIDDEN);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 != 0 {
            attributes.insert(FileAttributes::EXECUTABLE);
        }
    }
    attributes
}
