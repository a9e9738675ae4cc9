//! 小程序启动结果桥：至多一个挂起回调，结果至多投递一次。
//!
//! 行为：
//! - `arm`：登记挂起回调；已有挂起回调时按 [`RearmPolicy`] 拒绝或覆盖
//! - `complete` / `complete_error`：取出回调并调用一次，随后清空槽位；无挂起回调时丢弃结果并记录日志
//! - `complete_for`：仅当槽位属于指定启动时才投递，用于屏蔽被覆盖启动的迟到结果
//!
//! 并发：
//! - `arm` 与 `complete` 可能来自不同线程；槽位的读-改-写在同一把锁内完成
//! - 回调在锁外调用，回调内再次 `arm` 不会死锁
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::sync::Mutex;

use tracing::{debug, warn};
use uuid::Uuid;
use xiaohai_core::codec::{self, Payload};
use xiaohai_core::error::{BridgeError, Result};
use xiaohai_core::manifest::RearmPolicy;

/// 小程序启动的终态结果。
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    /// 成功：`result_code` 为空表示立即完成（无结果通道）。
    Success {
        result_code: Option<i64>,
        data: Option<Payload>,
    },
    /// 失败。
    Failure {
        code: String,
        message: String,
        details: Option<String>,
    },
}

impl LaunchOutcome {
    /// 立即完成（前台拉起、无结果通道）。
    pub fn immediate() -> Self {
        LaunchOutcome::Success {
            result_code: None,
            data: None,
        }
    }

    pub fn from_error(error: &BridgeError) -> Self {
        LaunchOutcome::Failure {
            code: error.code().to_string(),
            message: error.to_string(),
            details: error.details(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LaunchOutcome::Success { .. })
    }

    /// 成功结果在边界上的表示。
    ///
    /// 返回值：
    /// - 立即完成：`null`
    /// - 异步完成：`{"resultCode": .., "data": ..}`
    /// - 失败：`{"code": .., "message": .., "details": ..}`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LaunchOutcome::Success {
                result_code: None,
                data: None,
            } => serde_json::Value::Null,
            LaunchOutcome::Success { result_code, data } => serde_json::json!({
                "resultCode": result_code,
                "data": data.as_ref().map(|d| serde_json::Value::Object(codec::to_json_object(d))),
            }),
            LaunchOutcome::Failure {
                code,
                message,
                details,
            } => serde_json::json!({
                "code": code,
                "message": message,
                "details": details,
            }),
        }
    }
}

/// 挂起回调类型。
pub type LaunchCallback = Box<dyn FnOnce(LaunchOutcome) + Send + 'static>;

struct PendingCallback {
    launch_id: Uuid,
    callback: LaunchCallback,
}

/// 启动结果桥（由组装方持有，不是进程级单例）。
pub struct LaunchBridge {
    slot: Mutex<Option<PendingCallback>>,
    policy: RearmPolicy,
}

impl LaunchBridge {
    pub fn new(policy: RearmPolicy) -> Self {
        Self {
            slot: Mutex::new(None),
            policy,
        }
    }

    /// 登记挂起回调。
    ///
    /// 异常处理：
    /// - `Reject` 策略下已有挂起回调：返回 `LaunchInProgress`（携带在途启动 ID），新回调被丢弃
    /// - `Replace` 策略下已有挂起回调：旧回调被丢弃且永不调用（记录告警）
    pub fn arm(&self, launch_id: Uuid, callback: LaunchCallback) -> Result<()> {
        let replaced = {
            let mut slot = self.lock();
            if self.policy == RearmPolicy::Reject {
                if let Some(pending) = slot.as_ref() {
                    return Err(BridgeError::LaunchInProgress {
                        launch_id: pending.launch_id,
                    });
                }
            }
            slot.replace(PendingCallback { launch_id, callback })
        };
        if let Some(old) = replaced {
            warn!(
                replaced = %old.launch_id,
                %launch_id,
                "覆盖挂起的启动回调，旧调用方将收不到结果"
            );
        } else {
            debug!(%launch_id, "启动回调已登记");
        }
        Ok(())
    }

    /// 撤销指定启动的挂起回调（启动动作失败时使用）。
    ///
    /// 返回值：
    /// - `true`：槽位属于该启动并已清空
    /// - `false`：槽位为空或属于其他启动
    pub fn disarm(&self, launch_id: Uuid) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|p| p.launch_id == launch_id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// 当前挂起的启动 ID。
    pub fn pending(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|p| p.launch_id)
    }

    /// 投递结果给当前挂起回调。
    ///
    /// 返回值：
    /// - `true`：已投递
    /// - `false`：无挂起回调，结果被丢弃
    pub fn complete(&self, outcome: LaunchOutcome) -> bool {
        let pending = self.lock().take();
        Self::deliver(pending, outcome)
    }

    /// 投递失败结果。
    pub fn complete_error(&self, code: impl Into<String>, message: impl Into<String>) -> bool {
        self.complete(LaunchOutcome::Failure {
            code: code.into(),
            message: message.into(),
            details: None,
        })
    }

    /// 仅当挂起回调属于 `launch_id` 时投递结果。
    pub fn complete_for(&self, launch_id: Uuid, outcome: LaunchOutcome) -> bool {
        let pending = {
            let mut slot = self.lock();
            if slot.as_ref().is_some_and(|p| p.launch_id == launch_id) {
                slot.take()
            } else {
                None
            }
        };
        if pending.is_none() {
            warn!(%launch_id, "启动结果与挂起回调不匹配，已丢弃");
            return false;
        }
        Self::deliver(pending, outcome)
    }

    fn deliver(pending: Option<PendingCallback>, outcome: LaunchOutcome) -> bool {
        match pending {
            Some(p) => {
                debug!(launch_id = %p.launch_id, success = outcome.is_success(), "投递启动结果");
                (p.callback)(outcome);
                true
            }
            None => {
                warn!(?outcome, "没有挂起的启动回调，结果已丢弃");
                false
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingCallback>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LaunchBridge {
    fn default() -> Self {
        Self::new(RearmPolicy::default())
    }
}
