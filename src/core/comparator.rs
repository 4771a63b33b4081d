use crate::core::model::{SyncPlan, TreeSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// 比较阶段的错误（仅在快照本身不合法时出现）
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("快照不合法 ({root}): {reason}")]
    MalformedSnapshot { root: String, reason: String },
}

/// 移动配对方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MovePairing {
    /// 只在同一个摘要内配对，移动前后内容一定相同
    #[default]
    PerHash,
    /// 把所有共有摘要下的剩余路径拉平后按位置配对（兼容旧版行为，可能跨摘要配对）
    Flattened,
}

impl std::fmt::Display for MovePairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovePairing::PerHash => write!(f, "perHash"),
            MovePairing::Flattened => write!(f, "flattened"),
        }
    }
}

/// 比较配置
#[derive(Debug, Clone, Default)]
pub struct CompareConfig {
    pub move_pairing: MovePairing,
}

/// 基于内容摘要的差异计算器
pub struct DiffEngine {
    config: CompareConfig,
}

impl DiffEngine {
    pub fn new(move_pairing: MovePairing) -> Self {
        Self {
            config: CompareConfig { move_pairing },
        }
    }

    pub fn with_config(config: CompareConfig) -> Self {
        Self { config }
    }

    /// 计算让目标树与源树一致所需的操作，不访问文件系统
    pub fn plan(&self, source: &TreeSnapshot, dest: &TreeSnapshot) -> Result<SyncPlan, DiffError> {
        Self::validate(source)?;
        Self::validate(dest)?;

        let mut plan = SyncPlan {
            // 子目录排在父目录之前
            dirs_to_delete: dest
                .directories
                .keys()
                .rev()
                .filter(|path| !source.directories.contains_key(*path))
                .cloned()
                .collect(),
            dirs_to_create: source
                .directories
                .keys()
                .filter(|path| !dest.directories.contains_key(*path))
                .cloned()
                .collect(),
            ..Default::default()
        };

        // 只在源中出现的摘要：全部复制
        let mut shared_hashes = Vec::new();
        for (hash, records) in &source.contents {
            if dest.contents.contains_key(hash) {
                shared_hashes.push(hash.as_str());
            } else {
                plan.files_to_copy
                    .extend(records.iter().map(|r| r.relative_path.clone()));
            }
        }

        // 只在目标中出现的摘要：全部删除
        for (hash, records) in &dest.contents {
            if !source.contents.contains_key(hash) {
                plan.files_to_delete
                    .extend(records.iter().map(|r| r.relative_path.clone()));
            }
        }

        match self.config.move_pairing {
            MovePairing::Flattened => Self::pair_moves(&shared_hashes, source, dest, &mut plan),
            MovePairing::PerHash => {
                for hash in &shared_hashes {
                    Self::pair_moves(std::slice::from_ref(hash), source, dest, &mut plan);
                }
            }
        }

        debug!(
            "比较完成: 创建目录 {}, 删除目录 {}, 复制 {}, 移动 {}, 删除 {}",
            plan.dirs_to_create.len(),
            plan.dirs_to_delete.len(),
            plan.files_to_copy.len(),
            plan.files_to_move.len(),
            plan.files_to_delete.len()
        );

        Ok(plan)
    }

    /// 对共有摘要下位置发生变化的文件做移动配对，多出的部分转为复制或删除
    fn pair_moves(
        hashes: &[&str],
        source: &TreeSnapshot,
        dest: &TreeSnapshot,
        plan: &mut SyncPlan,
    ) {
        let src_paths = Self::flatten(hashes, source);
        let dest_paths = Self::flatten(hashes, dest);

        let src_lookup: HashMap<&str, &str> = src_paths.iter().copied().collect();
        let dest_lookup: HashMap<&str, &str> = dest_paths.iter().copied().collect();

        // 路径和摘要都相同的文件已经就位
        let src_remaining: Vec<&str> = src_paths
            .iter()
            .filter(|(path, hash)| dest_lookup.get(path) != Some(hash))
            .map(|(path, _)| *path)
            .collect();
        let dest_remaining: Vec<&str> = dest_paths
            .iter()
            .filter(|(path, hash)| src_lookup.get(path) != Some(hash))
            .map(|(path, _)| *path)
            .collect();

        let paired = src_remaining.len().min(dest_remaining.len());

        plan.files_to_move.extend(
            dest_remaining[..paired]
                .iter()
                .zip(&src_remaining[..paired])
                .map(|(old, new)| (old.to_string(), new.to_string())),
        );
        plan.files_to_copy
            .extend(src_remaining[paired..].iter().map(|p| p.to_string()));
        plan.files_to_delete
            .extend(dest_remaining[paired..].iter().map(|p| p.to_string()));
    }

    /// 按摘要顺序展开为 (路径, 摘要) 列表
    fn flatten<'a>(hashes: &[&str], snapshot: &'a TreeSnapshot) -> Vec<(&'a str, &'a str)> {
        hashes
            .iter()
            .filter_map(|hash| snapshot.contents.get(*hash))
            .flatten()
            .map(|r| (r.relative_path.as_str(), r.content_hash.as_str()))
            .collect()
    }

    /// 检查快照：记录的摘要必须与所在分组一致，路径在树内唯一且非空
    fn validate(snapshot: &TreeSnapshot) -> Result<(), DiffError> {
        let malformed = |reason: String| DiffError::MalformedSnapshot {
            root: snapshot.root.display().to_string(),
            reason,
        };

        let mut seen = HashSet::new();
        for (hash, records) in &snapshot.contents {
            for record in records {
                if &record.content_hash != hash {
                    return Err(malformed(format!(
                        "{} 的摘要 {} 与所在分组 {} 不一致",
                        record.relative_path, record.content_hash, hash
                    )));
                }
                if record.relative_path.is_empty() {
                    return Err(malformed("存在空的相对路径".to_string()));
                }
                if !seen.insert(record.relative_path.as_str()) {
                    return Err(malformed(format!("路径重复: {}", record.relative_path)));
                }
            }
        }

        Ok(())
    }

    /// 统计计划中的操作
    pub fn summarize(plan: &SyncPlan) -> PlanSummary {
        PlanSummary {
            dirs_to_create: plan.dirs_to_create.len(),
            dirs_to_delete: plan.dirs_to_delete.len(),
            copy_count: plan.files_to_copy.len(),
            move_count: plan.files_to_move.len(),
            delete_count: plan.files_to_delete.len(),
        }
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(MovePairing::default())
    }
}

/// 计划统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub dirs_to_create: usize,
    pub dirs_to_delete: usize,
    pub copy_count: usize,
    pub move_count: usize,
    pub delete_count: usize,
}

impl PlanSummary {
    pub fn total_operations(&self) -> usize {
        self.dirs_to_create + self.dirs_to_delete + self.copy_count + self.move_count + self.delete_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::FileRecord;
    use std::collections::BTreeMap;

    fn snapshot(root: &str, files: &[(&str, &str)], dirs: &[&str]) -> TreeSnapshot {
        let mut snapshot = TreeSnapshot::new(root);
        for (path, hash) in files {
            snapshot.add_file(FileRecord::new(*path, *hash));
        }
        for dir in dirs {
            snapshot.add_directory(*dir);
        }
        snapshot
    }

    /// 在内存中按计划改写目标树（路径 -> 摘要），用于验证收敛
    fn simulate(plan: &SyncPlan, source: &TreeSnapshot, dest: &TreeSnapshot) -> BTreeMap<String, String> {
        let src: HashMap<_, _> = source
            .files()
            .map(|r| (r.relative_path.clone(), r.content_hash.clone()))
            .collect();
        let mut tree: BTreeMap<_, _> = dest
            .files()
            .map(|r| (r.relative_path.clone(), r.content_hash.clone()))
            .collect();

        for (old, new) in &plan.files_to_move {
            let hash = tree.remove(old).expect("move source exists");
            assert!(tree.insert(new.clone(), hash).is_none(), "move target free");
        }
        for path in &plan.files_to_copy {
            assert!(tree.insert(path.clone(), src[path].clone()).is_none(), "copy target free");
        }
        for path in &plan.files_to_delete {
            tree.remove(path).expect("deleted file exists");
        }
        tree
    }

    fn as_tree(snapshot: &TreeSnapshot) -> BTreeMap<String, String> {
        snapshot
            .files()
            .map(|r| (r.relative_path.clone(), r.content_hash.clone()))
            .collect()
    }

    #[test]
    fn test_directory_symmetric_difference() {
        let source = snapshot("/src", &[], &["a", "a/b"]);
        let dest = snapshot("/dst", &[], &["a", "c"]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(plan.dirs_to_create, vec!["a/b".to_string()]);
        assert_eq!(plan.dirs_to_delete, vec!["c".to_string()]);
        assert!(plan.files_to_copy.is_empty());
        assert!(plan.files_to_move.is_empty());
    }

    #[test]
    fn test_nested_directory_order() {
        let source = snapshot("/src", &[], &["p", "p/q"]);
        let dest = snapshot("/dst", &[], &["x", "x/y", "x/y/z"]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(plan.dirs_to_create, vec!["p".to_string(), "p/q".to_string()]);
        assert_eq!(
            plan.dirs_to_delete,
            vec!["x/y/z".to_string(), "x/y".to_string(), "x".to_string()]
        );
    }

    #[test]
    fn test_hash_only_in_source_is_copied() {
        let source = snapshot("/src", &[("f.txt", "h1")], &[]);
        let dest = snapshot("/dst", &[], &[]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(plan.files_to_copy, vec!["f.txt".to_string()]);
        assert!(plan.files_to_delete.is_empty());
        assert!(plan.files_to_move.is_empty());
    }

    #[test]
    fn test_hash_only_in_dest_is_deleted() {
        let source = snapshot("/src", &[], &[]);
        let dest = snapshot("/dst", &[("old.txt", "h2")], &[]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(plan.files_to_delete, vec!["old.txt".to_string()]);
        assert!(plan.files_to_copy.is_empty());
        assert!(plan.files_to_move.is_empty());
    }

    #[test]
    fn test_renamed_file_becomes_move() {
        let source = snapshot("/src", &[("new/name.txt", "h3")], &["new"]);
        let dest = snapshot("/dst", &[("old/name.txt", "h3")], &["old"]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(
            plan.files_to_move,
            vec![("old/name.txt".to_string(), "new/name.txt".to_string())]
        );
        assert!(plan.files_to_copy.is_empty());
        assert!(plan.files_to_delete.is_empty());
        assert_eq!(plan.dirs_to_create, vec!["new".to_string()]);
        assert_eq!(plan.dirs_to_delete, vec!["old".to_string()]);
    }

    #[test]
    fn test_extra_source_duplicate_is_copied() {
        let source = snapshot("/src", &[("a.txt", "h4"), ("b.txt", "h4")], &[]);
        let dest = snapshot("/dst", &[("c.txt", "h4")], &[]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(
            plan.files_to_move,
            vec![("c.txt".to_string(), "a.txt".to_string())]
        );
        assert_eq!(plan.files_to_copy, vec!["b.txt".to_string()]);
        assert!(plan.files_to_delete.is_empty());
        assert_eq!(simulate(&plan, &source, &dest), as_tree(&source));
    }

    #[test]
    fn test_extra_dest_duplicate_is_deleted() {
        let source = snapshot("/src", &[("keep.txt", "h5")], &[]);
        let dest = snapshot(
            "/dst",
            &[("keep.txt", "h5"), ("copy1.txt", "h5"), ("copy2.txt", "h5")],
            &[],
        );

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert!(plan.files_to_move.is_empty());
        assert!(plan.files_to_copy.is_empty());
        assert_eq!(
            plan.files_to_delete,
            vec!["copy1.txt".to_string(), "copy2.txt".to_string()]
        );
        assert_eq!(simulate(&plan, &source, &dest), as_tree(&source));
    }

    #[test]
    fn test_identical_trees_produce_empty_plan() {
        let files = [("a.txt", "h1"), ("d/b.txt", "h2"), ("d/c.txt", "h2")];
        let source = snapshot("/src", &files, &["d"]);
        let dest = snapshot("/dst", &files, &["d"]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert!(plan.is_empty());
        assert_eq!(DiffEngine::summarize(&plan).total_operations(), 0);
    }

    #[test]
    fn test_duplicate_counts_are_conserved() {
        let source = snapshot(
            "/src",
            &[("x1", "h"), ("x2", "h"), ("x3", "h"), ("y1", "g")],
            &[],
        );
        let dest = snapshot("/dst", &[("x1", "h"), ("z1", "g"), ("z2", "g"), ("z3", "g")], &[]);

        let plan = DiffEngine::new(MovePairing::PerHash)
            .plan(&source, &dest)
            .unwrap();
        let result = simulate(&plan, &source, &dest);

        let count = |tree: &BTreeMap<String, String>, hash: &str| {
            tree.values().filter(|h| h.as_str() == hash).count()
        };
        assert_eq!(count(&result, "h"), 3);
        assert_eq!(count(&result, "g"), 1);
        assert_eq!(result.len(), source.file_count());
    }

    #[test]
    fn test_flattened_pairing_can_cross_hashes() {
        // 两个摘要各有一个源文件新增、一个目标文件多余，拉平后按位置配对
        let source = snapshot("/src", &[("a1", "ha"), ("a2", "ha"), ("b1", "hb")], &[]);
        let dest = snapshot("/dst", &[("a1", "ha"), ("b1", "hb"), ("b2", "hb")], &[]);

        let plan = DiffEngine::new(MovePairing::Flattened)
            .plan(&source, &dest)
            .unwrap();

        assert_eq!(plan.files_to_move, vec![("b2".to_string(), "a2".to_string())]);
        assert!(plan.files_to_copy.is_empty());
        assert!(plan.files_to_delete.is_empty());
    }

    #[test]
    fn test_flattened_pairing_breaks_duplicate_counts() {
        let source = snapshot("/src", &[("x1", "h"), ("x2", "h"), ("y1", "g")], &[]);
        let dest = snapshot("/dst", &[("x1", "h"), ("z1", "g"), ("z2", "g")], &[]);

        let plan = DiffEngine::new(MovePairing::Flattened)
            .plan(&source, &dest)
            .unwrap();

        // g 的多余副本被移动到了 h 的位置上
        assert_eq!(
            plan.files_to_move,
            vec![
                ("z1".to_string(), "y1".to_string()),
                ("z2".to_string(), "x2".to_string())
            ]
        );
        assert_ne!(simulate(&plan, &source, &dest), as_tree(&source));
    }

    #[test]
    fn test_per_hash_pairing_never_crosses_hashes() {
        let source = snapshot("/src", &[("a1", "ha"), ("a2", "ha"), ("b1", "hb")], &[]);
        let dest = snapshot("/dst", &[("a1", "ha"), ("b1", "hb"), ("b2", "hb")], &[]);

        let plan = DiffEngine::new(MovePairing::PerHash)
            .plan(&source, &dest)
            .unwrap();

        assert!(plan.files_to_move.is_empty());
        assert_eq!(plan.files_to_copy, vec!["a2".to_string()]);
        assert_eq!(plan.files_to_delete, vec!["b2".to_string()]);
        assert_eq!(simulate(&plan, &source, &dest), as_tree(&source));
    }

    #[test]
    fn test_hash_exclusive_files_never_moved() {
        let source = snapshot("/src", &[("only_src", "s"), ("shared", "x")], &[]);
        let dest = snapshot("/dst", &[("only_dst", "d"), ("moved", "x")], &[]);

        let plan = DiffEngine::default().plan(&source, &dest).unwrap();

        assert_eq!(plan.files_to_copy, vec!["only_src".to_string()]);
        assert_eq!(plan.files_to_delete, vec!["only_dst".to_string()]);
        assert_eq!(plan.files_to_move, vec![("moved".to_string(), "shared".to_string())]);
    }

    #[test]
    fn test_record_under_wrong_hash_is_rejected() {
        let mut source = TreeSnapshot::new("/src");
        source
            .contents
            .entry("h1".to_string())
            .or_default()
            .push(FileRecord::new("a.txt", "h2"));

        let err = DiffEngine::default()
            .plan(&source, &TreeSnapshot::new("/dst"))
            .unwrap_err();
        assert!(matches!(err, DiffError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let source = snapshot("/src", &[("a.txt", "h1"), ("a.txt", "h2")], &[]);

        let result = DiffEngine::default().plan(&source, &TreeSnapshot::new("/dst"));
        assert!(result.is_err());
    }
}
