//! 小海智能助手桥接核心库（跨平台/业务无关）。
//!
//! 功能：
//! - 定义事件载荷编解码（JSON 文本 <-> 结构化映射）
//! - 提供事件载荷对称加解密（AES-256-CBC）
//! - 定义宿主 <-> 原生桥接协议（方法调用、事件信封、本机 IPC 帧）
//! - 定义桥接清单（加解密/启动策略与小程序注册表）与统一错误码
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

pub mod cipher;
pub mod codec;
pub mod error;
pub mod ipc;
pub mod manifest;
pub mod paths;
