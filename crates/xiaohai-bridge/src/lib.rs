//! 小海智能助手原生桥接层（与传输无关）。
//!
//! 功能：
//! - 事件通道：解密/解码宿主事件，交给本地处理器并加密回复，支持主动推送
//! - 小程序启动：按框架分类请求、经注册表解析启动目标并拉起
//! - 启动结果桥：至多一个挂起回调，结果至多投递一次
//! - 方法通道入口：按“通道 + 方法”分发宿主调用
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

pub mod channel;
pub mod event_router;
pub mod launch_bridge;
pub mod launch_router;
pub mod launcher;
pub mod registry;
