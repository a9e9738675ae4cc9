//! 启动目标注册表：字符串标识 -> 启动动作。
//!
//! 说明：
//! - 注册表在组装阶段填充（代码注册或由清单构建），运行期只读
//! - 未注册的标识在解析时返回 `None`，由路由转换为 `TARGET_NOT_FOUND`
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use xiaohai_core::manifest::MiniAppManifest;
use xiaohai_core::paths;

use crate::launcher::{LaunchAction, ProcessAction};

/// 启动目标注册表。
#[derive(Clone, Default)]
pub struct LaunchRegistry {
    actions: HashMap<String, Arc<dyn LaunchAction>>,
}

impl LaunchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册启动动作；同名标识会被覆盖（记录告警）。
    pub fn register(&mut self, id: impl Into<String>, action: Arc<dyn LaunchAction>) {
        let id = id.into();
        if self.actions.insert(id.clone(), action).is_some() {
            warn!(%id, "启动目标重复注册，已覆盖");
        }
    }

    /// 按标识解析启动动作。
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn LaunchAction>> {
        self.actions.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 由清单中的小程序列表构建注册表（每项对应一个 [`ProcessAction`]）。
    ///
    /// 参数：
    /// - `miniapps`：清单中的小程序注册项
    /// - `base_dir`：相对 `exe` 路径的基准目录（通常为清单所在目录）
    ///
    /// 异常处理：
    /// - 注册项 `exe` 为空时返回错误
    pub fn from_manifest(miniapps: &[MiniAppManifest], base_dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for app in miniapps {
            let exe = paths::resolve_path(base_dir, &app.exe)
                .with_context(|| format!("小程序 {} 的 exe 配置无效", app.id))?;
            debug!(id = %app.id, exe = %exe.display(), "注册小程序");
            registry.register(
                app.id.clone(),
                Arc::new(ProcessAction::new(exe, app.args.clone(), app.extras)),
            );
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xiaohai_core::manifest::ExtrasMode;

    #[test]
    fn builds_from_manifest_entries() {
        let apps = vec![
            MiniAppManifest {
                id: "com.x.Y".to_string(),
                name: "Y".to_string(),
                exe: "bin/y".to_string(),
                args: vec![],
                extras: ExtrasMode::Stringified,
            },
            MiniAppManifest {
                id: "com.x.Z".to_string(),
                name: String::new(),
                exe: "sh".to_string(),
                args: vec!["-c".to_string(), "exit 0".to_string()],
                extras: ExtrasMode::Typed,
            },
        ];
        let registry = LaunchRegistry::from_manifest(&apps, Path::new("conf")).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("com.x.Y").is_some());
        assert_eq!(
            registry.resolve("com.x.Y").map(|a| a.extras_mode()),
            Some(ExtrasMode::Stringified)
        );
        assert!(registry.resolve("com.x.W").is_none());
    }

    #[test]
    fn empty_exe_is_rejected() {
        let apps = vec![MiniAppManifest {
            id: "broken".to_string(),
            name: String::new(),
            exe: String::new(),
            args: vec![],
            extras: ExtrasMode::Typed,
        }];
        assert!(LaunchRegistry::from_manifest(&apps, Path::new(".")).is_err());
    }
}
