//! 启动动作：把已解析的启动目标真正拉起，并在可观察结果时回传结果。
//!
//! 组成：
//! - [`LaunchAction`]：注册表中的启动动作抽象（每个启动目标一个）
//! - [`LaunchExtras`]：传给启动目标的参数（按目标能力保留类型或转字符串）
//! - [`Completion`]：异步结果回传句柄（只在可回传结果的环境中提供）
//! - [`ProcessAction`]：以子进程形式启动小程序
//! - [`UrlOpener`]：Web 小程序的 URL 打开能力
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use xiaohai_core::codec::{self, Payload, Value};
use xiaohai_core::error::{BridgeError, Result};
use xiaohai_core::manifest::ExtrasMode;

use crate::launch_bridge::{LaunchBridge, LaunchOutcome};

/// 注入子进程的环境变量：启动请求中的 `appId`。
pub const ENV_MINIAPP_ID: &str = "XIAOHAI_MINIAPP_ID";
/// 注入子进程的环境变量：实际解析的启动目标（`entryPath` 或 `appId`）。
pub const ENV_MINIAPP_TARGET: &str = "XIAOHAI_MINIAPP_TARGET";
/// 注入子进程的环境变量：启动参数（JSON 对象）。
pub const ENV_MINIAPP_PARAMS: &str = "XIAOHAI_MINIAPP_PARAMS";

/// 单个启动参数值。
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    String(String),
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl ExtraValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            ExtraValue::String(s) => serde_json::Value::String(s.clone()),
            ExtraValue::Int(i) => serde_json::Value::from(*i),
            ExtraValue::Bool(b) => serde_json::Value::Bool(*b),
            ExtraValue::Float(f) => Value::Float(*f).to_json(),
        }
    }
}

/// 传给启动目标的参数集合。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchExtras(BTreeMap<String, ExtraValue>);

impl LaunchExtras {
    /// 由请求参数构建。
    ///
    /// 规则：
    /// - `Typed`：字符串/整数/布尔/浮点保留原生类型，空值与嵌套映射转为字符串
    /// - `Stringified`：全部转为字符串
    /// - `entryPath` 同样作为普通参数转发
    pub fn from_params(params: &Payload, mode: ExtrasMode) -> Self {
        let extras = params
            .iter()
            .map(|(k, v)| {
                let extra = match (mode, v) {
                    (ExtrasMode::Typed, Value::String(s)) => ExtraValue::String(s.clone()),
                    (ExtrasMode::Typed, Value::Int(i)) => ExtraValue::Int(*i),
                    (ExtrasMode::Typed, Value::Bool(b)) => ExtraValue::Bool(*b),
                    (ExtrasMode::Typed, Value::Float(f)) => ExtraValue::Float(*f),
                    (_, other) => ExtraValue::String(other.to_string()),
                };
                (k.clone(), extra)
            })
            .collect();
        Self(extras)
    }

    pub fn get(&self, key: &str) -> Option<&ExtraValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 序列化为 JSON 对象文本。
    pub fn to_json_string(&self) -> String {
        let object: serde_json::Map<String, serde_json::Value> =
            self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        serde_json::Value::Object(object).to_string()
    }
}

/// 异步结果回传句柄。
///
/// 说明：
/// - 结果只会投递给登记时的同一次启动；若该启动已被覆盖，结果被丢弃
/// - 句柄消费即完成，保证同一句柄最多回传一次
pub struct Completion {
    bridge: Arc<LaunchBridge>,
    launch_id: Uuid,
}

impl Completion {
    pub(crate) fn new(bridge: Arc<LaunchBridge>, launch_id: Uuid) -> Self {
        Self { bridge, launch_id }
    }

    pub fn launch_id(&self) -> Uuid {
        self.launch_id
    }

    /// 以成功结果完成。
    pub fn finish(self, result_code: Option<i64>, data: Option<Payload>) -> bool {
        self.bridge
            .complete_for(self.launch_id, LaunchOutcome::Success { result_code, data })
    }

    /// 以失败结果完成（错误码取自 [`BridgeError::code`]）。
    pub fn fail(self, error: BridgeError) -> bool {
        self.bridge
            .complete_for(self.launch_id, LaunchOutcome::from_error(&error))
    }
}

/// 一次启动的上下文。
pub struct LaunchContext {
    pub launch_id: Uuid,
    /// 请求中的 `appId`。
    pub app_id: String,
    /// 实际解析的启动目标（`entryPath` 优先）。
    pub target: String,
    pub extras: LaunchExtras,
    /// 仅在可回传结果的环境中提供；为空表示前台拉起、无结果通道。
    pub completion: Option<Completion>,
}

/// 启动动作。
pub trait LaunchAction: Send + Sync {
    /// 启动目标是否支持带类型的参数。
    fn extras_mode(&self) -> ExtrasMode {
        ExtrasMode::Typed
    }

    /// 拉起启动目标。
    ///
    /// 约定：
    /// - 返回 `Ok` 后，若上下文带有 [`Completion`]，实现方必须在目标结束时调用它
    /// - 返回 `Err` 时不得再调用 [`Completion`]
    fn start(&self, ctx: LaunchContext) -> Result<()>;
}

/// 以子进程形式启动小程序。
///
/// 行为：
/// - 通过环境变量注入 `appId`、启动目标与参数（见 `ENV_MINIAPP_*`）
/// - 有结果通道时在独立线程等待子进程结束：退出码 -> `resultCode`，
///   标准输出最后一个非空行若为 JSON 对象 -> `data`
/// - 无结果通道时不捕获输出，仅在后台回收子进程
#[derive(Debug, Clone)]
pub struct ProcessAction {
    exe: PathBuf,
    args: Vec<String>,
    extras_mode: ExtrasMode,
}

impl ProcessAction {
    pub fn new(exe: impl Into<PathBuf>, args: Vec<String>, extras_mode: ExtrasMode) -> Self {
        Self {
            exe: exe.into(),
            args,
            extras_mode,
        }
    }
}

impl LaunchAction for ProcessAction {
    fn extras_mode(&self) -> ExtrasMode {
        self.extras_mode
    }

    fn start(&self, ctx: LaunchContext) -> Result<()> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args)
            .env(ENV_MINIAPP_ID, &ctx.app_id)
            .env(ENV_MINIAPP_TARGET, &ctx.target)
            .env(ENV_MINIAPP_PARAMS, ctx.extras.to_json_string())
            .stdin(Stdio::null());
        if ctx.completion.is_some() {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|e| BridgeError::LaunchFailed {
            target: ctx.target.clone(),
            reason: format!("启动进程失败: {}", self.exe.display()),
            details: Some(e.to_string()),
        })?;
        info!(launch_id = %ctx.launch_id, target = %ctx.target, pid = child.id(), "小程序进程已启动");

        let target = ctx.target;
        let completion = ctx.completion;
        std::thread::spawn(move || {
            let mut stdout = String::new();
            if let Some(mut out) = child.stdout.take() {
                if let Err(e) = out.read_to_string(&mut stdout) {
                    warn!(%target, "读取小程序输出失败: {e}");
                }
            }
            let status = child.wait();
            let Some(completion) = completion else {
                debug!(%target, ?status, "小程序进程已退出");
                return;
            };
            match status {
                Ok(status) => match status.code() {
                    Some(code) => {
                        let data = last_payload_line(&stdout);
                        completion.finish(Some(i64::from(code)), data);
                    }
                    None => {
                        completion.fail(BridgeError::ResultError(format!(
                            "进程未返回退出码 ({status})"
                        )));
                    }
                },
                Err(e) => {
                    completion.fail(BridgeError::ResultError(format!("等待进程退出失败: {e}")));
                }
            }
        });
        Ok(())
    }
}

/// 取标准输出最后一个非空行，若为 JSON 对象则作为结果数据。
fn last_payload_line(stdout: &str) -> Option<Payload> {
    stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .and_then(|l| codec::decode(l).ok())
}

/// Web 小程序的 URL 打开能力。
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &Url) -> Result<()>;
}

/// 只记录日志的 URL 打开器（未配置打开命令时使用）。
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingUrlOpener;

impl UrlOpener for LoggingUrlOpener {
    fn open(&self, url: &Url) -> Result<()> {
        info!(%url, "未配置 URL 打开命令，仅记录");
        Ok(())
    }
}

/// 通过外部命令打开 URL（例如 `xdg-open` / `open`）。
///
/// 说明：
/// - URL 作为最后一个参数追加；不等待命令结束
#[derive(Debug, Clone)]
pub struct CommandUrlOpener {
    program: String,
    args: Vec<String>,
}

impl CommandUrlOpener {
    /// 由命令行（程序 + 参数）构建；为空返回 `None`。
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl UrlOpener for CommandUrlOpener {
    fn open(&self, url: &Url) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::LaunchFailed {
                target: url.to_string(),
                reason: format!("执行 URL 打开命令失败: {}", self.program),
                details: Some(e.to_string()),
            })?;
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Payload {
        let mut p = Payload::new();
        p.insert("entryPath".to_string(), "com.x.Z".into());
        p.insert("count".to_string(), 3i64.into());
        p.insert("ratio".to_string(), 0.5f64.into());
        p.insert("flag".to_string(), true.into());
        p.insert("nothing".to_string(), Value::Null);
        let mut nested = Payload::new();
        nested.insert("a".to_string(), 1i64.into());
        p.insert("nested".to_string(), Value::Map(nested));
        p
    }

    #[test]
    fn typed_extras_preserve_scalar_types() {
        let extras = LaunchExtras::from_params(&params(), ExtrasMode::Typed);
        assert_eq!(extras.get("count"), Some(&ExtraValue::Int(3)));
        assert_eq!(extras.get("ratio"), Some(&ExtraValue::Float(0.5)));
        assert_eq!(extras.get("flag"), Some(&ExtraValue::Bool(true)));
        assert_eq!(extras.get("entryPath"), Some(&ExtraValue::String("com.x.Z".to_string())));
        assert_eq!(extras.get("nothing"), Some(&ExtraValue::String("null".to_string())));
        assert_eq!(extras.get("nested"), Some(&ExtraValue::String(r#"{"a":1}"#.to_string())));
    }

    #[test]
    fn stringified_extras_convert_everything() {
        let extras = LaunchExtras::from_params(&params(), ExtrasMode::Stringified);
        assert_eq!(extras.get("count"), Some(&ExtraValue::String("3".to_string())));
        assert_eq!(extras.get("flag"), Some(&ExtraValue::String("true".to_string())));
        assert_eq!(extras.len(), 6);
    }

    #[test]
    fn last_non_empty_json_line_becomes_data() {
        let out = "log line\n{\"status\":\"success\"}\n\n";
        let data = last_payload_line(out).unwrap();
        assert_eq!(data.get("status"), Some(&Value::from("success")));
        assert_eq!(last_payload_line("plain text\n"), None);
        assert_eq!(last_payload_line(""), None);
    }

    #[test]
    fn failed_completion_reports_result_error() {
        let bridge = Arc::new(LaunchBridge::default());
        let launch_id = Uuid::new_v4();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        bridge
            .arm(launch_id, Box::new(move |o| *seen2.lock().unwrap() = Some(o)))
            .unwrap();

        let completion = Completion::new(bridge.clone(), launch_id);
        assert!(completion.fail(BridgeError::ResultError("进程未返回退出码".to_string())));
        let outcome = seen.lock().unwrap().take().unwrap();
        assert_eq!(outcome.to_json()["code"], "RESULT_ERROR");
        assert_eq!(bridge.pending(), None);
    }

    #[test]
    fn command_url_opener_requires_program() {
        assert!(CommandUrlOpener::from_command_line(&[]).is_none());
        assert!(CommandUrlOpener::from_command_line(&["xdg-open".to_string()]).is_some());
    }
}
