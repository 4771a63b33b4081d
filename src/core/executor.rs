use crate::core::model::SyncPlan;
use crate::core::report::{CycleReport, ItemError, OperationKind, OperationOutcome};
use filetime::FileTime;
use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// 把同步计划应用到目标树
///
/// 五个子操作按固定顺序执行：创建目录、移动、复制、删除文件、删除目录。
/// 单个条目失败只记录到报告中，不会中断同批次的其他条目。
pub struct SyncExecutor {
    source_root: PathBuf,
    dest_root: PathBuf,
}

impl SyncExecutor {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
        }
    }

    pub async fn apply(&self, plan: &SyncPlan) -> CycleReport {
        let mut report = CycleReport::begin();
        info!("开始执行同步计划: {} 个操作", plan.len());

        let dirs = resolve_all(&self.dest_root, &plan.dirs_to_create);
        report.push(self.create_directories(&dirs).await);

        let moves: Vec<_> = plan
            .files_to_move
            .iter()
            .map(|(old, new)| (self.dest_root.join(old), self.dest_root.join(new)))
            .collect();
        report.push(self.move_files(&moves).await);

        let copies: Vec<_> = plan
            .files_to_copy
            .iter()
            .map(|rel| (self.source_root.join(rel), self.dest_root.join(rel)))
            .collect();
        report.push(self.copy_files(&copies).await);

        let files = resolve_all(&self.dest_root, &plan.files_to_delete);
        report.push(self.delete_files(&files).await);

        let dirs = resolve_all(&self.dest_root, &plan.dirs_to_delete);
        report.push(self.delete_directories(&dirs).await);

        report.finish();
        report
    }

    pub async fn create_directories(&self, paths: &[PathBuf]) -> OperationOutcome {
        debug!("创建目录: {} 个", paths.len());
        let mut outcome = OperationOutcome::new(OperationKind::CreateDirectories);

        for path in paths {
            let result = async {
                if path_exists(path).await? {
                    return Err(ItemError::AlreadyExists);
                }
                fs::create_dir_all(path).await?;
                Ok::<_, ItemError>(())
            }
            .await;
            outcome.record(path.clone(), result);
        }

        outcome
    }

    pub async fn move_files(&self, pairs: &[(PathBuf, PathBuf)]) -> OperationOutcome {
        debug!("移动文件: {} 个", pairs.len());
        let mut outcome = OperationOutcome::new(OperationKind::MoveFiles);

        for (from, to) in pairs {
            let result = async {
                check_transfer(from, to).await?;
                clear_read_only(from).await?;
                fs::rename(from, to).await?;
                Ok::<_, ItemError>(())
            }
            .await;
            outcome.record_pair(from.clone(), to.clone(), result);
        }

        outcome
    }

    /// 复制文件，目标已存在时不覆盖
    pub async fn copy_files(&self, pairs: &[(PathBuf, PathBuf)]) -> OperationOutcome {
        debug!("复制文件: {} 个", pairs.len());
        let mut outcome = OperationOutcome::new(OperationKind::CopyFiles);

        for (from, to) in pairs {
            let result = async {
                check_transfer(from, to).await?;
                fs::copy(from, to).await?;
                copy_attributes(from, to).await?;
                Ok::<_, ItemError>(())
            }
            .await;
            outcome.record_pair(from.clone(), to.clone(), result);
        }

        outcome
    }

    pub async fn delete_files(&self, paths: &[PathBuf]) -> OperationOutcome {
        debug!("删除文件: {} 个", paths.len());
        let mut outcome = OperationOutcome::new(OperationKind::DeleteFiles);

        for path in paths {
            let result = async {
                if !is_file(path).await? {
                    return Err(ItemError::NotFound);
                }
                clear_read_only(path).await?;
                fs::remove_file(path).await?;
                Ok::<_, ItemError>(())
            }
            .await;
            outcome.record(path.clone(), result);
        }

        outcome
    }

    /// 递归删除目录（连同残留内容）
    pub async fn delete_directories(&self, paths: &[PathBuf]) -> OperationOutcome {
        debug!("删除目录: {} 个", paths.len());
        let mut outcome = OperationOutcome::new(OperationKind::DeleteDirectories);

        for path in paths {
            let result = async {
                if !is_dir(path).await? {
                    return Err(ItemError::NotFound);
                }
                if let Err(e) = fs::remove_dir_all(path).await {
                    warn!("删除目录失败: {} - {}", path.display(), e);
                    return Err(e.into());
                }
                Ok::<_, ItemError>(())
            }
            .await;
            outcome.record(path.clone(), result);
        }

        outcome
    }
}

fn resolve_all(root: &Path, relative: &[String]) -> Vec<PathBuf> {
    relative.iter().map(|rel| root.join(rel)).collect()
}

/// 移动和复制共用的前置检查
async fn check_transfer(from: &Path, to: &Path) -> Result<(), ItemError> {
    if !is_file(from).await? {
        return Err(ItemError::SourceMissing);
    }
    if path_exists(to).await? {
        return Err(ItemError::DestinationExists);
    }
    let parent_exists = match to.parent() {
        Some(parent) => is_dir(parent).await?,
        None => false,
    };
    if !parent_exists {
        return Err(ItemError::DestinationDirMissing);
    }
    Ok(())
}

async fn metadata_of(path: &Path) -> std::io::Result<Option<std::fs::Metadata>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn path_exists(path: &Path) -> std::io::Result<bool> {
    Ok(metadata_of(path).await?.is_some())
}

async fn is_file(path: &Path) -> std::io::Result<bool> {
    Ok(metadata_of(path).await?.is_some_and(|m| m.is_file()))
}

async fn is_dir(path: &Path) -> std::io::Result<bool> {
    Ok(metadata_of(path).await?.is_some_and(|m| m.is_dir()))
}

fn writable(mut permissions: Permissions) -> Permissions {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }
    permissions
}

/// 去掉文件的只读属性
pub async fn clear_read_only(path: &Path) -> std::io::Result<()> {
    let permissions = fs::metadata(path).await?.permissions();
    if permissions.readonly() {
        fs::set_permissions(path, writable(permissions)).await?;
    }
    Ok(())
}

/// 把源文件的访问/修改时间和权限同步到目标文件
async fn copy_attributes(from: &Path, to: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(from).await?;

    // 只读文件在部分平台上无法修改时间，先放开再恢复
    clear_read_only(to).await?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    let target = to.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_times(&target, atime, mtime))
        .await
        .map_err(std::io::Error::other)??;

    fs::set_permissions(to, metadata.permissions()).await
}
