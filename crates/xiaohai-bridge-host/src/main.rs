//! 桥接宿主进程：以本机回环 TCP 承载“单行一条 JSON”的方法调用，并转交桥接层处理。
//!
//! 职责：
//! - 读取 `bridge-manifest.json`（可选），组装小程序注册表与加解密/启动策略
//! - 每个连接拥有独立的桥接上下文（密钥、启动结果桥、事件流监听状态）
//! - 原生侧主动下发的消息（`dispatch` 回复、事件流推送）与响应共用同一写通道，保证提交顺序
//! - 事件流推送由嵌入桥接库的原生代码调用 `EventRouter::push` 产生；本进程只处理 `listen`/`cancel` 并转发 `event` 帧
//!
//! 输出约定：
//! - 监听成功后向标准输出打印一行 `listening = <addr>`
//! - 日志写入标准错误（`RUST_LOG` 可调整级别）
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use xiaohai_bridge::channel::{BridgeHost, MethodCall, MethodReply};
use xiaohai_bridge::event_router::{Outbound, Peer};
use xiaohai_bridge::registry::LaunchRegistry;
use xiaohai_core::error::BridgeError;
use xiaohai_core::ipc::{channels, methods, ErrorBody, IpcRequest, IpcResponse};
use xiaohai_core::manifest::{BridgeManifest, LaunchEnvironment, RearmPolicy};
use xiaohai_core::paths;

/// 命令行参数。
///
/// 说明：
/// - `manifest` 缺省时使用默认策略与空注册表
/// - `environment` / `rearm_policy` 覆盖清单中的启动策略
#[derive(Debug, Parser)]
#[command(name = "xiaohai-bridge-host", version)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: String,

    #[arg(long)]
    manifest: Option<PathBuf>,

    #[arg(long, value_enum)]
    environment: Option<EnvironmentArg>,

    #[arg(long, value_enum)]
    rearm_policy: Option<RearmPolicyArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvironmentArg {
    ResultCapable,
    Foreground,
    Detached,
}

impl From<EnvironmentArg> for LaunchEnvironment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::ResultCapable => LaunchEnvironment::ResultCapable,
            EnvironmentArg::Foreground => LaunchEnvironment::Foreground,
            EnvironmentArg::Detached => LaunchEnvironment::Detached,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RearmPolicyArg {
    Reject,
    Replace,
}

impl From<RearmPolicyArg> for RearmPolicy {
    fn from(arg: RearmPolicyArg) -> Self {
        match arg {
            RearmPolicyArg::Reject => RearmPolicy::Reject,
            RearmPolicyArg::Replace => RearmPolicy::Replace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (manifest, registry) = load_config(&cli)?;
    info!(
        miniapps = registry.len(),
        environment = ?manifest.launch.environment,
        rearm_policy = ?manifest.launch.rearm_policy,
        "桥接配置已加载"
    );
    if registry.is_empty() {
        warn!("未配置任何小程序，openMiniApp 将返回 TARGET_NOT_FOUND");
    }

    let listener = TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("监听失败: {}", cli.listen))?;
    let addr = listener.local_addr().context("读取监听地址失败")?;
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "listening = {addr}")?;
        stdout.flush()?;
    }
    info!(%addr, "桥接宿主已启动");

    run_ipc_loop(listener, Arc::new(manifest), registry).await
}

/// 读取清单并应用命令行覆盖项。
fn load_config(cli: &Cli) -> Result<(BridgeManifest, LaunchRegistry)> {
    let (mut manifest, base_dir) = match &cli.manifest {
        Some(path) => (BridgeManifest::load(path)?, paths::manifest_base_dir(path)),
        None => (BridgeManifest::default(), PathBuf::from(".")),
    };
    if let Some(environment) = cli.environment {
        manifest.launch.environment = environment.into();
    }
    if let Some(policy) = cli.rearm_policy {
        manifest.launch.rearm_policy = policy.into();
    }
    let registry = build_registry(&manifest, &base_dir)?;
    Ok((manifest, registry))
}

fn build_registry(manifest: &BridgeManifest, base_dir: &Path) -> Result<LaunchRegistry> {
    LaunchRegistry::from_manifest(&manifest.miniapps, base_dir).context("构建小程序注册表失败")
}

/// IPC 监听主循环：接收连接并为每个连接启动异步任务。
///
/// 异常处理：
/// - `accept()` 失败会直接向上传播（通常为系统资源问题）
async fn run_ipc_loop(
    listener: TcpListener,
    manifest: Arc<BridgeManifest>,
    registry: LaunchRegistry,
) -> Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        debug!(%peer_addr, "宿主连接已建立");
        let manifest = manifest.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            serve_connection(stream, &manifest, registry).await;
            debug!(%peer_addr, "宿主连接已关闭");
        });
    }
}

/// 经写通道下发消息的对端。
struct ChannelPeer {
    tx: mpsc::UnboundedSender<IpcResponse>,
}

impl Peer for ChannelPeer {
    fn deliver(&self, outbound: Outbound) {
        let frame = match outbound {
            Outbound::Reply(envelope) => IpcResponse::Invoke {
                channel: channels::EVENT_BUS.to_string(),
                method: methods::DISPATCH.to_string(),
                arguments: serde_json::json!({
                    "type": envelope.event_type,
                    "data": envelope.payload,
                }),
            },
            Outbound::Push(envelope) => IpcResponse::event(envelope),
        };
        if self.tx.send(frame).is_err() {
            debug!("连接已关闭，丢弃下发消息");
        }
    }
}

/// 处理单个连接：逐行读取请求，响应与下发消息统一经写任务发送。
async fn serve_connection(stream: TcpStream, manifest: &BridgeManifest, registry: LaunchRegistry) {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(writer, rx));

    let host = BridgeHost::from_manifest(manifest, registry, Arc::new(ChannelPeer { tx: tx.clone() }));
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        let n = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(e) => {
                warn!("读取请求失败: {e}");
                return;
            }
        };
        if n == 0 {
            return;
        }
        if line.trim().is_empty() {
            continue;
        }
        let req: IpcRequest = match serde_json::from_str(line.trim()) {
            Ok(v) => v,
            Err(e) => {
                let error = BridgeError::MalformedPayload(format!("bad request: {e}"));
                let _ = tx.send(IpcResponse::error(Uuid::nil(), &error));
                continue;
            }
        };
        handle_request(&host, req, &tx);
    }
}

/// 处理单条请求；挂起的小程序启动在后台任务中等待结果再应答。
fn handle_request(host: &BridgeHost, req: IpcRequest, tx: &mpsc::UnboundedSender<IpcResponse>) {
    let resp = match req {
        IpcRequest::Listen { request_id } => {
            host.listen();
            IpcResponse::Success {
                request_id,
                result: serde_json::Value::Null,
            }
        }
        IpcRequest::Cancel { request_id } => {
            host.cancel();
            IpcResponse::Success {
                request_id,
                result: serde_json::Value::Null,
            }
        }
        IpcRequest::Call {
            request_id,
            channel,
            method,
            arguments,
        } => {
            let call = MethodCall::new(channel, method, arguments);
            match host.handle(&call) {
                MethodReply::Pending(pending) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let launch_id = pending.launch_id();
                        match pending.wait().await {
                            Some(outcome) => {
                                let reply = MethodReply::from_outcome(outcome);
                                if let Some(resp) = reply_frame(request_id, &call.method, reply) {
                                    let _ = tx.send(resp);
                                }
                            }
                            None => warn!(%request_id, %launch_id, "启动结果已被丢弃，请求不会得到应答"),
                        }
                    });
                    return;
                }
                reply => match reply_frame(request_id, &call.method, reply) {
                    Some(resp) => resp,
                    None => return,
                },
            }
        }
    };
    let _ = tx.send(resp);
}

/// 将答复转换为响应帧（`Pending` 没有即时响应帧）。
fn reply_frame(request_id: Uuid, method: &str, reply: MethodReply) -> Option<IpcResponse> {
    match reply {
        MethodReply::Success(result) => Some(IpcResponse::Success { request_id, result }),
        MethodReply::Error(ErrorBody {
            code,
            message,
            details,
        }) => Some(IpcResponse::Error {
            request_id,
            code,
            message,
            details,
        }),
        MethodReply::NotImplemented => Some(IpcResponse::NotImplemented {
            request_id,
            method: method.to_string(),
        }),
        MethodReply::Pending(_) => None,
    }
}

/// 写任务：按提交顺序逐行写出响应帧。
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<IpcResponse>) {
    while let Some(resp) = rx.recv().await {
        if let Err(e) = write_resp(&mut writer, &resp).await {
            debug!("写出响应失败: {e}");
            return;
        }
    }
}

async fn write_resp(writer: &mut OwnedWriteHalf, resp: &IpcResponse) -> Result<()> {
    let mut s = serde_json::to_string(resp)?;
    s.push('\n');
    writer.write_all(s.as_bytes()).await?;
    Ok(())
}
