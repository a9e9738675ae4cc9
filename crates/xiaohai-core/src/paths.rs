//! 路径约定（清单相对路径解析）。
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// 清单文件所在目录（相对路径的基准目录）。
///
/// 返回值：
/// - 清单路径有父目录：返回父目录
/// - 否则返回当前目录 `.`
pub fn manifest_base_dir(manifest: &Path) -> PathBuf {
    manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 将清单中的路径字段解析为实际路径。
///
/// 参数：
/// - `base`：相对路径的基准目录（通常是清单文件所在目录）
/// - `raw`：清单中的路径字符串
///
/// 返回值：
/// - `raw` 为绝对路径：直接返回
/// - `raw` 为相对路径：返回 `base.join(raw)`
/// - `raw` 为裸程序名（不含路径分隔符）：原样返回，交由 PATH 查找
///
/// 异常处理：
/// - `raw` 为空字符串时返回错误
pub fn resolve_path(base: &Path, raw: &str) -> Result<PathBuf> {
    if raw.is_empty() {
        return Err(anyhow!("空路径"));
    }
    let p = PathBuf::from(raw);
    if p.is_absolute() || p.components().count() == 1 {
        Ok(p)
    } else {
        Ok(base.join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_manifest_dir() {
        let base = manifest_base_dir(Path::new("conf/bridge-manifest.json"));
        assert_eq!(base, PathBuf::from("conf"));
        assert_eq!(resolve_path(&base, "bin/app").unwrap(), PathBuf::from("conf/bin/app"));
        assert_eq!(resolve_path(&base, "sh").unwrap(), PathBuf::from("sh"));
        assert!(resolve_path(&base, "").is_err());
    }

    #[test]
    fn bare_manifest_name_uses_current_dir() {
        assert_eq!(manifest_base_dir(Path::new("bridge-manifest.json")), PathBuf::from("."));
    }
}
