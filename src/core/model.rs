//! 快照与同步计划的数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 文件系统属性位集
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileAttributes(u32);

impl FileAttributes {
    pub const NONE: Self = Self(0);
    /// 只读
    pub const READ_ONLY: Self = Self(1);
    /// 隐藏（点开头的文件名）
    pub const HIDDEN: Self = Self(1 << 1);
    /// 可执行（仅 Unix）
    pub const EXECUTABLE: Self = Self(1 << 2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 单个文件的扫描记录，生成后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// 相对于树根的路径，统一使用 `/` 分隔
    pub relative_path: String,
    pub file_name: String,
    /// 文件内容摘要（小写十六进制）
    pub content_hash: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub attributes: FileAttributes,
}

impl FileRecord {
    /// 仅含路径和摘要的记录，其余字段取默认值
    pub fn new(relative_path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let file_name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            relative_path,
            file_name,
            content_hash: content_hash.into(),
            size: 0,
            created: None,
            modified: None,
            accessed: None,
            attributes: FileAttributes::NONE,
        }
    }
}

/// 目录索引：相对路径 -> 绝对路径
pub type DirectoryIndex = BTreeMap<String, PathBuf>;

/// 内容索引：内容摘要 -> 共享该摘要的文件列表（保持顺序）
pub type ContentIndex = BTreeMap<String, Vec<FileRecord>>;

/// 单棵目录树在某一时刻的扫描结果
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    pub root: PathBuf,
    pub contents: ContentIndex,
    pub directories: DirectoryIndex,
}

impl TreeSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// 按记录自身的摘要归入内容索引
    pub fn add_file(&mut self, record: FileRecord) {
        self.contents
            .entry(record.content_hash.clone())
            .or_default()
            .push(record);
    }

    /// 登记一个目录，绝对路径由根目录拼出
    pub fn add_directory(&mut self, relative_path: impl Into<String>) {
        let relative_path = relative_path.into();
        let absolute = self.root.join(&relative_path);
        self.directories.insert(relative_path, absolute);
    }

    pub fn file_count(&self) -> usize {
        self.contents.values().map(Vec::len).sum()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    /// 遍历全部文件记录
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.contents.values().flatten()
    }
}

/// 一个周期内源树与目标树的快照
#[derive(Debug, Clone)]
pub struct SyncInput {
    pub source: TreeSnapshot,
    pub dest: TreeSnapshot,
}

/// 让目标树与源树一致所需的操作集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub dirs_to_delete: Vec<String>,
    pub dirs_to_create: Vec<String>,
    pub files_to_delete: Vec<String>,
    pub files_to_copy: Vec<String>,
    /// (目标树中的旧路径, 新路径)
    pub files_to_move: Vec<(String, String)>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 计划中的操作总数
    pub fn len(&self) -> usize {
        self.dirs_to_delete.len()
            + self.dirs_to_create.len()
            + self.files_to_delete.len()
            + self.files_to_copy.len()
            + self.files_to_move.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_bits() {
        let mut attrs = FileAttributes::READ_ONLY | FileAttributes::HIDDEN;
        assert!(attrs.contains(FileAttributes::READ_ONLY));
        assert!(attrs.contains(FileAttributes::HIDDEN));
        assert!(!attrs.contains(FileAttributes::EXECUTABLE));

        attrs.remove(FileAttributes::READ_ONLY);
        assert_eq!(attrs, FileAttributes::HIDDEN);
    }

    #[test]
    fn test_snapshot_groups_by_hash() {
        let mut snapshot = TreeSnapshot::new("/tmp/src");
        snapshot.add_file(FileRecord::new("a.txt", "h1"));
        snapshot.add_file(FileRecord::new("dir/b.txt", "h1"));
        snapshot.add_file(FileRecord::new("c.txt", "h2"));
        snapshot.add_directory("dir");

        assert_eq!(snapshot.file_count(), 3);
        assert_eq!(snapshot.contents["h1"].len(), 2);
        assert_eq!(snapshot.contents["h1"][1].file_name, "b.txt");
        assert_eq!(snapshot.directories["dir"], PathBuf::from("/tmp/src/dir"));
    }
}
