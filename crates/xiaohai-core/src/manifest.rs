//! 桥接清单（bridge-manifest.json）：加解密/启动策略配置与小程序注册表。
//!
//! 该模块描述组装桥接层需要的全部输入：
//! - 加解密配置（IV 策略、是否附加认证标签）
//! - 启动策略（重复挂起时的处理方式、宿主展示环境）
//! - 回复事件类型、Web 小程序的 URL 打开命令
//! - 小程序注册表（标识 -> 可执行文件）
//!
//! 约定：
//! - 所有段均通过 `#[serde(default)]` 提供默认值，以便清单向前兼容
//! - 该模块仅定义数据结构与读取，不执行任何启动动作
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cipher::CipherSettings;

/// 默认的 `dispatch` 回复事件类型。
pub const DEFAULT_REPLY_EVENT_TYPE: &str = "nativeData";

/// 清单根对象（对应 `bridge-manifest.json`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeManifest {
    #[serde(default)]
    /// 加解密配置。
    pub cipher: CipherSettings,
    #[serde(default)]
    /// 小程序启动策略。
    pub launch: LaunchSettings,
    #[serde(default = "default_reply_event_type")]
    /// `dispatch` 回复信封使用的固定事件类型。
    pub reply_event_type: String,
    #[serde(default)]
    /// Web 小程序的 URL 打开命令（程序 + 参数，URL 追加在末尾）；为空则只记录日志。
    pub url_opener: Vec<String>,
    #[serde(default)]
    /// 小程序注册表。
    pub miniapps: Vec<MiniAppManifest>,
}

fn default_reply_event_type() -> String {
    DEFAULT_REPLY_EVENT_TYPE.to_string()
}

impl Default for BridgeManifest {
    fn default() -> Self {
        Self {
            cipher: CipherSettings::default(),
            launch: LaunchSettings::default(),
            reply_event_type: default_reply_event_type(),
            url_opener: Vec::new(),
            miniapps: Vec::new(),
        }
    }
}

impl BridgeManifest {
    /// 读取并解析清单文件。
    ///
    /// 异常处理：
    /// - 文件读取失败（不存在/权限/IO）返回错误
    /// - JSON 解析失败返回错误
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("读取清单失败: {}", path.display()))?;
        let manifest: BridgeManifest = serde_json::from_slice(&bytes).context("解析清单 JSON 失败")?;
        Ok(manifest)
    }
}

/// 小程序启动策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LaunchSettings {
    #[serde(default)]
    /// 已有启动在等待结果时，再次启动的处理方式。
    pub rearm_policy: RearmPolicy,
    #[serde(default)]
    /// 宿主展示环境。
    pub environment: LaunchEnvironment,
}

/// 重复挂起策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// 拒绝新的启动（返回 `LAUNCH_IN_PROGRESS`）。
    #[default]
    Reject,
    /// 覆盖旧的挂起回调；旧调用方永远收不到结果。
    Replace,
}

/// 宿主展示环境。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaunchEnvironment {
    /// 可观察子应用结束并回传结果（异步完成）。
    #[default]
    ResultCapable,
    /// 只能前台拉起，无结果通道（立即以成功完成）。
    Foreground,
    /// 没有可用的展示上下文。
    Detached,
}

/// 启动参数传递方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtrasMode {
    /// 保留字符串/整数/布尔/浮点的原生类型，其余转为字符串。
    #[default]
    Typed,
    /// 全部转为字符串。
    Stringified,
}

/// 单个小程序注册项。
///
/// 说明：
/// - `id` 即启动请求中的 `appId` 或 `entryPath`
/// - `exe` 可为相对路径（相对清单文件目录）或绝对路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniAppManifest {
    /// 启动目标标识（唯一）。
    pub id: String,
    #[serde(default)]
    /// 展示名称。
    pub name: String,
    /// 可执行文件路径。
    pub exe: String,
    #[serde(default)]
    /// 启动参数。
    pub args: Vec<String>,
    #[serde(default)]
    /// 启动参数传递方式。
    pub extras: ExtrasMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::IvPolicy;

    #[test]
    fn empty_object_uses_defaults() {
        let m: BridgeManifest = serde_json::from_str("{}").unwrap();
        assert_eq!(m.reply_event_type, "nativeData");
        assert_eq!(m.cipher.iv_policy, IvPolicy::Random);
        assert!(m.cipher.authenticate);
        assert_eq!(m.launch.rearm_policy, RearmPolicy::Reject);
        assert_eq!(m.launch.environment, LaunchEnvironment::ResultCapable);
        assert!(m.miniapps.is_empty());
    }

    #[test]
    fn miniapp_entry_parses_with_stringified_extras() {
        let json = r#"{
            "cipher": { "iv_policy": "fixed_zero", "authenticate": false },
            "launch": { "rearm_policy": "replace", "environment": "foreground" },
            "miniapps": [
                { "id": "com.x.Y", "exe": "bin/y", "extras": "stringified" }
            ]
        }"#;
        let m: BridgeManifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.cipher.iv_policy, IvPolicy::FixedZero);
        assert!(!m.cipher.authenticate);
        assert_eq!(m.launch.rearm_policy, RearmPolicy::Replace);
        assert_eq!(m.launch.environment, LaunchEnvironment::Foreground);
        assert_eq!(m.miniapps[0].extras, ExtrasMode::Stringified);
        assert!(m.miniapps[0].args.is_empty());
    }
}
