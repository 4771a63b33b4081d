//! 文件内容摘要

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// 摘要算法
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// 128 位 MD5，与旧版副本的摘要兼容
    #[default]
    Md5,
    Blake3,
}

impl HashAlgorithm {
    /// 计算内存数据的摘要
    pub fn hash_bytes(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => format!("{:x}", Md5::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    /// 流式读取文件并计算摘要（阻塞调用）
    pub fn hash_file(self, path: &Path) -> Result<String> {
        let mut file =
            File::open(path).with_context(|| format!("打开文件失败: {}", path.display()))?;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        match self {
            HashAlgorithm::Md5 => {
                let mut hasher = Md5::new();
                loop {
                    let n = file
                        .read(&mut buffer)
                        .with_context(|| format!("读取文件失败: {}", path.display()))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                Ok(format!("{:x}", hasher.finalize()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let n = file
                        .read(&mut buffer)
                        .with_context(|| format!("读取文件失败: {}", path.display()))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Blake3 => write!(f, "blake3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_known_value() {
        assert_eq!(
            HashAlgorithm::Md5.hash_bytes(b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_file_hash_matches_bytes_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Blake3] {
            assert_eq!(
                algorithm.hash_file(file.path()).unwrap(),
                algorithm.hash_bytes(&data)
            );
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HashAlgorithm::Md5.hash_file(&dir.path().join("nope")).is_err());
    }
}
