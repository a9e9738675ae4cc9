//! 宿主 <-> 原生桥接协议定义（方法调用、事件信封、IPC 帧）。
//!
//! 协议形态：
//! - 边界操作按“通道 + 方法名 + 参数”组织（见 [`channels`] / [`methods`]）
//! - 本机 IPC 以 JSON 序列化 [`IpcRequest`] / [`IpcResponse`]，按“单行一条消息”的方式传输
//! - 每条请求携带 `request_id`，响应回传同一 ID 用于请求-响应关联
//! - 原生侧主动下发的消息（`invoke` / `event`）不携带 `request_id`
//!
//! 约束与注意事项：
//! - `message` 字段不应包含敏感信息（密钥明文等）
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BridgeError;

/// 通道名称。
pub mod channels {
    /// 事件总线（`dispatch` / `setEncryptionKey`）。
    pub const EVENT_BUS: &str = "com.supperapp_sdk/event_bus";
    /// 小程序启动（`openMiniApp`）。
    pub const MINI_APP: &str = "com.supperapp_sdk/mini_app";
    /// 事件流（原生侧主动推送）。
    pub const EVENT_BUS_STREAM: &str = "com.supperapp_sdk/event_bus_stream";
}

/// 方法名称。
pub mod methods {
    pub const DISPATCH: &str = "dispatch";
    pub const SET_ENCRYPTION_KEY: &str = "setEncryptionKey";
    pub const OPEN_MINI_APP: &str = "openMiniApp";
}

/// 事件信封：跨边界传输的 `{type, data}` 单元。
///
/// 说明：
/// - `payload` 为 JSON 文本；启用密钥后为其密文（Base64）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "data")]
    pub payload: String,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }
}

/// 小程序框架类型。
///
/// 取值：
/// - `native` / `react_native` / `web`：已支持
/// - `flutter_web` / `unknown` 及其他任意字符串：归入 [`Framework::Unknown`]，保留原始值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framework {
    Native,
    ReactNative,
    Web,
    Unknown(String),
}

impl Framework {
    pub const NATIVE: &'static str = "native";
    pub const REACT_NATIVE: &'static str = "react_native";
    pub const WEB: &'static str = "web";
    pub const FLUTTER_WEB: &'static str = "flutter_web";
    pub const UNKNOWN: &'static str = "unknown";

    /// 按框架标识字符串分类。
    pub fn parse(raw: &str) -> Self {
        match raw {
            Self::NATIVE => Framework::Native,
            Self::REACT_NATIVE => Framework::ReactNative,
            Self::WEB => Framework::Web,
            other => Framework::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Framework::Native => Self::NATIVE,
            Framework::ReactNative => Self::REACT_NATIVE,
            Framework::Web => Self::WEB,
            Framework::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 边界错误结构 `{code, message, details}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl From<&BridgeError> for ErrorBody {
    fn from(e: &BridgeError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

/// IPC 请求消息（宿主 -> 原生）。
///
/// 序列化格式：
/// - 使用 `#[serde(tag = "type")]`，在 JSON 中通过 `type` 字段区分请求类型。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// 方法调用。
    ///
    /// 参数：
    /// - `request_id`：请求 ID
    /// - `channel`：通道名（见 [`channels`]）
    /// - `method`：方法名（见 [`methods`]）
    /// - `arguments`：方法参数（通常为 JSON 对象）
    Call {
        request_id: Uuid,
        channel: String,
        method: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    /// 开始监听事件流。
    Listen { request_id: Uuid },
    /// 取消监听事件流。
    Cancel { request_id: Uuid },
}

/// IPC 响应/下发消息（原生 -> 宿主）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// 调用成功；`result` 为空表示无返回值。
    Success {
        request_id: Uuid,
        #[serde(default)]
        result: serde_json::Value,
    },
    /// 调用失败（字段与 [`ErrorBody`] 一致）。
    Error {
        request_id: Uuid,
        code: String,
        message: String,
        #[serde(default)]
        details: Option<String>,
    },
    /// 方法或通道未实现。
    NotImplemented { request_id: Uuid, method: String },
    /// 原生侧主动调用宿主方法（例如 `dispatch` 回复）。
    Invoke {
        channel: String,
        method: String,
        arguments: serde_json::Value,
    },
    /// 事件流推送。
    ///
    /// 注意：
    /// - `type` 已被帧类型占用，事件类型使用 `event_type` 字段
    Event {
        channel: String,
        event_type: String,
        data: String,
    },
}

impl IpcResponse {
    /// 构造失败响应。
    pub fn error(request_id: Uuid, error: &BridgeError) -> Self {
        let body = ErrorBody::from(error);
        IpcResponse::Error {
            request_id,
            code: body.code,
            message: body.message,
            details: body.details,
        }
    }

    /// 构造事件流推送帧。
    pub fn event(envelope: EventEnvelope) -> Self {
        IpcResponse::Event {
            channel: channels::EVENT_BUS_STREAM.to_string(),
            event_type: envelope.event_type,
            data: envelope.payload,
        }
    }
}
