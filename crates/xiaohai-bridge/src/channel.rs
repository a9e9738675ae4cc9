//! 方法通道入口：把“通道 + 方法 + 参数”形式的宿主调用分发给事件路由与启动路由。
//!
//! 通道与方法：
//! - `com.supperapp_sdk/event_bus`：`dispatch`、`setEncryptionKey`
//! - `com.supperapp_sdk/mini_app`：`openMiniApp`
//! - 其他通道或方法：返回“未实现”，不视为错误
//!
//! 说明：
//! - 每个 [`BridgeHost`] 持有自己的密钥槽与启动结果桥，由组装方决定生命周期
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::sync::Arc;

use tracing::{debug, warn};
use xiaohai_core::cipher::PayloadCipher;
use xiaohai_core::error::BridgeError;
use xiaohai_core::ipc::{channels, methods, ErrorBody, EventEnvelope};
use xiaohai_core::manifest::BridgeManifest;

use crate::event_router::{EncryptionKeySlot, EventHandler, EventRouter, NativeReplyHandler, Peer};
use crate::launch_bridge::{LaunchBridge, LaunchOutcome};
use crate::launch_router::{LaunchDisposition, LaunchRequest, LaunchRouter, PendingLaunch};
use crate::launcher::{CommandUrlOpener, LoggingUrlOpener, UrlOpener};
use crate::registry::LaunchRegistry;

/// 一次宿主方法调用。
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub channel: String,
    pub method: String,
    pub arguments: serde_json::Value,
}

impl MethodCall {
    pub fn new(
        channel: impl Into<String>,
        method: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            channel: channel.into(),
            method: method.into(),
            arguments,
        }
    }
}

/// 方法调用的答复。
#[derive(Debug)]
pub enum MethodReply {
    /// 成功；`Null` 表示无返回值。
    Success(serde_json::Value),
    /// 失败 `{code, message, details}`。
    Error(ErrorBody),
    NotImplemented,
    /// 小程序已拉起，结果稍后回传。
    Pending(PendingLaunch),
}

impl MethodReply {
    pub fn error(error: &BridgeError) -> Self {
        MethodReply::Error(ErrorBody::from(error))
    }

    /// 由启动结果构造答复（异步回传的结果同样经此转换）。
    pub fn from_outcome(outcome: LaunchOutcome) -> Self {
        match outcome {
            LaunchOutcome::Failure {
                code,
                message,
                details,
            } => MethodReply::Error(ErrorBody {
                code,
                message,
                details,
            }),
            success => MethodReply::Success(success.to_json()),
        }
    }
}

/// 桥接宿主：组合事件路由与启动路由。
pub struct BridgeHost {
    events: EventRouter,
    launches: LaunchRouter,
}

impl BridgeHost {
    pub fn new(events: EventRouter, launches: LaunchRouter) -> Self {
        Self { events, launches }
    }

    /// 按清单组装（使用默认处理器 [`NativeReplyHandler`]）。
    ///
    /// 参数：
    /// - `manifest`：加解密、启动策略与回复事件类型
    /// - `registry`：启动目标注册表（通常由 `manifest.miniapps` 构建）
    /// - `peer`：下发目标
    pub fn from_manifest(
        manifest: &BridgeManifest,
        registry: LaunchRegistry,
        peer: Arc<dyn Peer>,
    ) -> Self {
        Self::with_handler(manifest, registry, Arc::new(NativeReplyHandler), peer)
    }

    /// 按清单组装并指定本地事件处理器。
    pub fn with_handler(
        manifest: &BridgeManifest,
        registry: LaunchRegistry,
        handler: Arc<dyn EventHandler>,
        peer: Arc<dyn Peer>,
    ) -> Self {
        let events = EventRouter::new(
            EncryptionKeySlot::new(),
            PayloadCipher::new(manifest.cipher),
            handler,
            peer,
        )
        .with_reply_event_type(manifest.reply_event_type.clone());

        let url_opener: Arc<dyn UrlOpener> =
            match CommandUrlOpener::from_command_line(&manifest.url_opener) {
                Some(opener) => Arc::new(opener),
                None => Arc::new(LoggingUrlOpener),
            };
        let launches = LaunchRouter::new(
            registry,
            Arc::new(LaunchBridge::new(manifest.launch.rearm_policy)),
        )
        .with_url_opener(url_opener)
        .with_environment(manifest.launch.environment);

        Self::new(events, launches)
    }

    pub fn events(&self) -> &EventRouter {
        &self.events
    }

    pub fn launches(&self) -> &LaunchRouter {
        &self.launches
    }

    /// 宿主开始监听事件流。
    pub fn listen(&self) {
        debug!("宿主开始监听事件流");
        self.events.listen();
    }

    /// 宿主取消监听事件流。
    pub fn cancel(&self) {
        debug!("宿主取消监听事件流");
        self.events.cancel();
    }

    /// 处理一次宿主方法调用。
    pub fn handle(&self, call: &MethodCall) -> MethodReply {
        match (call.channel.as_str(), call.method.as_str()) {
            (channels::EVENT_BUS, methods::DISPATCH) => self.dispatch(&call.arguments),
            (channels::EVENT_BUS, methods::SET_ENCRYPTION_KEY) => {
                self.set_encryption_key(&call.arguments)
            }
            (channels::MINI_APP, methods::OPEN_MINI_APP) => self.open_mini_app(&call.arguments),
            (channel, method) => {
                warn!(channel, method, "未实现的方法调用");
                MethodReply::NotImplemented
            }
        }
    }

    fn dispatch(&self, arguments: &serde_json::Value) -> MethodReply {
        let Some(object) = arguments.as_object() else {
            return invalid_arguments("dispatch 参数必须是对象");
        };
        let field = |name: &str| {
            object
                .get(name)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let envelope = EventEnvelope::new(field("type"), field("data"));
        match self.events.dispatch(&envelope) {
            Ok(()) => MethodReply::Success(serde_json::Value::Null),
            Err(error) => {
                warn!(event_type = %envelope.event_type, code = error.code(), "事件分发失败: {error}");
                MethodReply::error(&error)
            }
        }
    }

    fn set_encryption_key(&self, arguments: &serde_json::Value) -> MethodReply {
        let Some(object) = arguments.as_object() else {
            return invalid_arguments("setEncryptionKey 参数必须是对象");
        };
        match object.get("key") {
            None | Some(serde_json::Value::Null) => self.events.set_key(None),
            Some(serde_json::Value::String(key)) => self.events.set_key(Some(key.clone())),
            Some(_) => return invalid_arguments("key 必须是字符串"),
        }
        MethodReply::Success(serde_json::Value::Null)
    }

    fn open_mini_app(&self, arguments: &serde_json::Value) -> MethodReply {
        let request = match LaunchRequest::from_arguments(arguments) {
            Ok(request) => request,
            Err(error) => return MethodReply::error(&error),
        };
        match self.launches.open(&request) {
            LaunchDisposition::Completed(outcome) => MethodReply::from_outcome(outcome),
            LaunchDisposition::Pending(pending) => MethodReply::Pending(pending),
            LaunchDisposition::Rejected(error) => MethodReply::error(&error),
        }
    }
}

fn invalid_arguments(message: &str) -> MethodReply {
    MethodReply::error(&BridgeError::InvalidArguments(message.to_string()))
}
