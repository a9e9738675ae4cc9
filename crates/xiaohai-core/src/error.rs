//! 桥接层统一错误类型。
//!
//! 约定：
//! - 编解码、加解密、小程序启动等失败统一表达为 [`BridgeError`]
//! - 跨边界返回时通过 [`BridgeError::code`] 映射为稳定的错误码字符串（宿主侧据此分支处理）
//! - 错误信息中不应包含密钥明文
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use thiserror::Error;
use uuid::Uuid;

/// 桥接层错误。
///
/// 分类：
/// - 事件通道：`MalformedPayload` / `DecryptionFailed` / `InvalidKeyLength`
/// - 小程序启动：`InvalidFramework` / `TargetNotFound` / `LaunchFailed` / `NoPresentationContext` /
///   `InvalidUrl` / `LaunchInProgress` / `ResultError`
/// - 通用：`InvalidArguments` / `NotImplemented`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("载荷格式不正确: {0}")]
    MalformedPayload(String),
    #[error("解密失败: {0}")]
    DecryptionFailed(String),
    #[error("加密密钥长度无效: {len} 字节")]
    InvalidKeyLength { len: usize },
    #[error("Unsupported framework: {framework}")]
    InvalidFramework { framework: String },
    #[error("未找到启动目标: {app_id}（entryPath = {target}）")]
    TargetNotFound { app_id: String, target: String },
    #[error("启动小程序失败（{target}）: {reason}")]
    LaunchFailed {
        target: String,
        reason: String,
        details: Option<String>,
    },
    #[error("参数无效: {0}")]
    InvalidArguments(String),
    #[error("没有可用的展示上下文，无法启动小程序")]
    NoPresentationContext,
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
    #[error("已有小程序启动在等待结果: {launch_id}")]
    LaunchInProgress { launch_id: Uuid },
    #[error("处理小程序结果失败: {0}")]
    ResultError(String),
    #[error("未实现的方法: {method}")]
    NotImplemented { method: String },
}

impl BridgeError {
    /// 返回跨边界使用的错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            BridgeError::DecryptionFailed(_) => "DECRYPTION_FAILED",
            BridgeError::InvalidKeyLength { .. } => "INVALID_KEY_LENGTH",
            BridgeError::InvalidFramework { .. } => "INVALID_FRAMEWORK",
            BridgeError::TargetNotFound { .. } => "TARGET_NOT_FOUND",
            BridgeError::LaunchFailed { .. } => "LAUNCH_FAILED",
            BridgeError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            BridgeError::NoPresentationContext => "NO_PRESENTATION_CONTEXT",
            BridgeError::InvalidUrl { .. } => "INVALID_URL",
            BridgeError::LaunchInProgress { .. } => "LAUNCH_IN_PROGRESS",
            BridgeError::ResultError(_) => "RESULT_ERROR",
            BridgeError::NotImplemented { .. } => "NOT_IMPLEMENTED",
        }
    }

    /// 返回错误详情（可选）。
    ///
    /// 说明：
    /// - 仅 `LaunchFailed` 携带底层失败描述，其余返回 `None`
    pub fn details(&self) -> Option<String> {
        match self {
            BridgeError::LaunchFailed { details, .. } => details.clone(),
            _ => None,
        }
    }
}

/// 桥接层统一 `Result` 别名。
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_not_found_message_mentions_both_identifiers() {
        let err = BridgeError::TargetNotFound {
            app_id: "com.x.Y".to_string(),
            target: "com.x.Z".to_string(),
        };
        assert_eq!(err.code(), "TARGET_NOT_FOUND");
        let msg = err.to_string();
        assert!(msg.contains("com.x.Y") && msg.contains("com.x.Z"), "{msg}");
    }

    #[test]
    fn invalid_framework_message_names_value() {
        let err = BridgeError::InvalidFramework {
            framework: "unknown".to_string(),
        };
        assert_eq!(err.code(), "INVALID_FRAMEWORK");
        assert_eq!(err.to_string(), "Unsupported framework: unknown");
        assert_eq!(err.details(), None);
    }
}
