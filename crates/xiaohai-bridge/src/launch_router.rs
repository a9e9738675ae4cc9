//! 小程序启动路由：按框架分类启动请求，解析启动目标并拉起，必要时挂起等待结果。
//!
//! 状态流转（每个请求）：
//! - `Received -> Classified -> Dispatched | Rejected`
//! - `Dispatched` 在结果回传后进入 `Completed`（立即完成的启动直接进入 `Completed`）
//!
//! 约束：
//! - 未知框架直接拒绝，不调用任何启动动作
//! - 启动目标以 `params.entryPath` 优先，其次 `appId`
//! - 可回传结果的环境中，先登记结果回调再拉起目标；拉起失败或 panic 时撤销登记并返回 `LaunchFailed`
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use xiaohai_core::codec::{self, Payload, Value};
use xiaohai_core::error::{BridgeError, Result};
use xiaohai_core::ipc::Framework;
use xiaohai_core::manifest::LaunchEnvironment;

use crate::launch_bridge::{LaunchBridge, LaunchOutcome};
use crate::launcher::{
    Completion, LaunchAction, LaunchContext, LaunchExtras, LoggingUrlOpener, UrlOpener,
};
use crate::registry::LaunchRegistry;

/// `params` 中覆盖 `appId` 的保留键。
pub const ENTRY_PATH_KEY: &str = "entryPath";

/// 一次小程序启动请求。
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub framework: Framework,
    pub app_id: String,
    pub params: Payload,
}

impl LaunchRequest {
    pub fn new(framework: Framework, app_id: impl Into<String>, params: Payload) -> Self {
        Self {
            framework,
            app_id: app_id.into(),
            params,
        }
    }

    /// 由边界参数 `{framework, appId, params}` 构建。
    ///
    /// 异常处理：
    /// - 参数不是对象、缺少 `framework`/`appId` 或类型不符、`params` 不是对象：`InvalidArguments`
    /// - `params` 缺省或为 `null` 时视为空映射
    pub fn from_arguments(arguments: &serde_json::Value) -> Result<Self> {
        let object = arguments
            .as_object()
            .ok_or_else(|| BridgeError::InvalidArguments("参数必须是对象".to_string()))?;
        let framework = required_str(object, "framework")?;
        let app_id = required_str(object, "appId")?;
        let params = match object.get("params") {
            None | Some(serde_json::Value::Null) => Payload::new(),
            Some(serde_json::Value::Object(map)) => codec::from_json_object(map.clone()),
            Some(_) => {
                return Err(BridgeError::InvalidArguments(
                    "params 必须是对象".to_string(),
                ))
            }
        };
        Ok(Self::new(Framework::parse(framework), app_id, params))
    }

    /// 实际启动目标：字符串类型的 `params.entryPath` 优先，否则 `appId`。
    ///
    /// 说明：
    /// - `entryPath` 为空值、数字等非字符串时不覆盖 `appId`
    pub fn target(&self) -> String {
        match self.params.get(ENTRY_PATH_KEY) {
            Some(Value::String(s)) => s.clone(),
            _ => self.app_id.clone(),
        }
    }
}

fn required_str<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<&'a str> {
    object
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| BridgeError::InvalidArguments(format!("缺少字符串参数 {field}")))
}

/// 请求状态（仅用于日志）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchState {
    Received,
    Classified,
    Dispatched,
    Rejected,
    Completed,
}

/// 等待中的启动结果（一次性）。
#[derive(Debug)]
pub struct PendingLaunch {
    launch_id: Uuid,
    rx: oneshot::Receiver<LaunchOutcome>,
}

impl PendingLaunch {
    pub fn launch_id(&self) -> Uuid {
        self.launch_id
    }

    /// 等待启动结果。
    ///
    /// 返回值：
    /// - `Some(outcome)`：结果已回传
    /// - `None`：回调在投递前被丢弃（例如被新的启动覆盖），调用方不会再收到结果
    pub async fn wait(self) -> Option<LaunchOutcome> {
        let launch_id = self.launch_id;
        match self.rx.await {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!(%launch_id, "启动回调已被丢弃，不会再有结果");
                None
            }
        }
    }

    /// 同步等待启动结果（不得在异步运行时内调用）。
    pub fn blocking_wait(self) -> Option<LaunchOutcome> {
        self.rx.blocking_recv().ok()
    }
}

/// 启动请求的处理结果。
#[derive(Debug)]
pub enum LaunchDisposition {
    /// 已完成（立即成功）。
    Completed(LaunchOutcome),
    /// 已拉起，结果稍后经 [`PendingLaunch`] 回传。
    Pending(PendingLaunch),
    /// 被拒绝（分类、解析或拉起失败）。
    Rejected(BridgeError),
}

/// 小程序启动路由。
pub struct LaunchRouter {
    registry: LaunchRegistry,
    bridge: Arc<LaunchBridge>,
    url_opener: Arc<dyn UrlOpener>,
    environment: Mutex<LaunchEnvironment>,
}

impl LaunchRouter {
    /// 创建启动路由（URL 打开器默认仅记录日志，环境默认可回传结果）。
    pub fn new(registry: LaunchRegistry, bridge: Arc<LaunchBridge>) -> Self {
        Self {
            registry,
            bridge,
            url_opener: Arc::new(LoggingUrlOpener),
            environment: Mutex::new(LaunchEnvironment::default()),
        }
    }

    pub fn with_url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.url_opener = opener;
        self
    }

    pub fn with_environment(self, environment: LaunchEnvironment) -> Self {
        self.set_environment(environment);
        self
    }

    pub fn bridge(&self) -> &Arc<LaunchBridge> {
        &self.bridge
    }

    pub fn registry(&self) -> &LaunchRegistry {
        &self.registry
    }

    pub fn environment(&self) -> LaunchEnvironment {
        *self.environment.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 切换启动环境（对应展示上下文的挂载/卸载）。
    pub fn set_environment(&self, environment: LaunchEnvironment) {
        info!(?environment, "启动环境已切换");
        *self.environment.lock().unwrap_or_else(|e| e.into_inner()) = environment;
    }

    /// 处理一次启动请求。
    ///
    /// 返回值：
    /// - `Completed`：Web 小程序已打开，或前台拉起成功
    /// - `Pending`：已登记回调并拉起，结果稍后回传
    /// - `Rejected`：`InvalidFramework` / `TargetNotFound` / `InvalidUrl` /
    ///   `NoPresentationContext` / `LaunchInProgress` / `LaunchFailed`
    pub fn open(&self, request: &LaunchRequest) -> LaunchDisposition {
        let launch_id = Uuid::new_v4();
        let target = request.target();
        trace_state(launch_id, LaunchState::Received, &request.framework, &target);

        let disposition = match &request.framework {
            Framework::Unknown(raw) => Err(BridgeError::InvalidFramework {
                framework: raw.clone(),
            }),
            Framework::Web => {
                trace_state(launch_id, LaunchState::Classified, &request.framework, &target);
                self.open_web(&target)
            }
            Framework::Native | Framework::ReactNative => {
                trace_state(launch_id, LaunchState::Classified, &request.framework, &target);
                self.open_registered(launch_id, request, target.clone())
            }
        };

        match disposition {
            Ok(LaunchDisposition::Rejected(error)) | Err(error) => {
                warn!(%launch_id, %target, code = error.code(), "启动请求被拒绝: {error}");
                trace_state(launch_id, LaunchState::Rejected, &request.framework, &target);
                LaunchDisposition::Rejected(error)
            }
            Ok(done @ LaunchDisposition::Completed(_)) => {
                trace_state(launch_id, LaunchState::Completed, &request.framework, &target);
                done
            }
            Ok(pending @ LaunchDisposition::Pending(_)) => {
                trace_state(launch_id, LaunchState::Dispatched, &request.framework, &target);
                pending
            }
        }
    }

    fn open_web(&self, target: &str) -> Result<LaunchDisposition> {
        let url = Url::parse(target).map_err(|_| BridgeError::InvalidUrl {
            url: target.to_string(),
        })?;
        self.url_opener.open(&url)?;
        Ok(LaunchDisposition::Completed(LaunchOutcome::immediate()))
    }

    fn open_registered(
        &self,
        launch_id: Uuid,
        request: &LaunchRequest,
        target: String,
    ) -> Result<LaunchDisposition> {
        let action = self
            .registry
            .resolve(&target)
            .ok_or_else(|| BridgeError::TargetNotFound {
                app_id: request.app_id.clone(),
                target: target.clone(),
            })?;
        let extras = LaunchExtras::from_params(&request.params, action.extras_mode());

        match self.environment() {
            LaunchEnvironment::Detached => Err(BridgeError::NoPresentationContext),
            LaunchEnvironment::Foreground => {
                let ctx = LaunchContext {
                    launch_id,
                    app_id: request.app_id.clone(),
                    target: target.clone(),
                    extras,
                    completion: None,
                };
                start_guarded(action.as_ref(), ctx, &target)?;
                Ok(LaunchDisposition::Completed(LaunchOutcome::immediate()))
            }
            LaunchEnvironment::ResultCapable => {
                let (tx, rx) = oneshot::channel();
                self.bridge.arm(
                    launch_id,
                    Box::new(move |outcome| {
                        if tx.send(outcome).is_err() {
                            debug!(%launch_id, "启动结果的接收方已离开");
                        }
                    }),
                )?;
                let ctx = LaunchContext {
                    launch_id,
                    app_id: request.app_id.clone(),
                    target: target.clone(),
                    extras,
                    completion: Some(Completion::new(self.bridge.clone(), launch_id)),
                };
                if let Err(error) = start_guarded(action.as_ref(), ctx, &target) {
                    self.bridge.disarm(launch_id);
                    return Err(error);
                }
                Ok(LaunchDisposition::Pending(PendingLaunch { launch_id, rx }))
            }
        }
    }
}

/// 调用启动动作，并把错误与 panic 统一转换为 `LaunchFailed`。
fn start_guarded(action: &dyn LaunchAction, ctx: LaunchContext, target: &str) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| action.start(ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error @ BridgeError::LaunchFailed { .. })) => Err(error),
        Ok(Err(error)) => Err(BridgeError::LaunchFailed {
            target: target.to_string(),
            reason: "启动动作返回错误".to_string(),
            details: Some(error.to_string()),
        }),
        Err(panic) => Err(BridgeError::LaunchFailed {
            target: target.to_string(),
            reason: "启动动作异常终止".to_string(),
            details: Some(panic_message(panic.as_ref())),
        }),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn trace_state(launch_id: Uuid, state: LaunchState, framework: &Framework, target: &str) {
    debug!(%launch_id, ?state, %framework, target, "启动请求状态");
}
