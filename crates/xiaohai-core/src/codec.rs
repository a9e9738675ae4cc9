//! 事件载荷编解码（JSON 文本 <-> 结构化映射）。
//!
//! 值模型：
//! - 顶层必须是对象（映射），键为字符串
//! - 值支持：字符串、整数、浮点、布尔、嵌套映射、空值
//!
//! 宽松策略：
//! - 解码时遇到不支持的类型（如数组）不报错，按其 JSON 文本降级为字符串
//! - 编码永不失败；无法用 JSON 数字表示的浮点（NaN/Infinity）降级为字符串
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BridgeError, Result};

/// 结构化载荷：字符串键到 [`Value`] 的有序映射。
pub type Payload = BTreeMap<String, Value>;

/// 载荷中的单个值。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 空值（JSON `null`）。
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// 嵌套映射。
    Map(Payload),
}

impl Value {
    /// 转换为 `serde_json::Value`。
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => serde_json::Value::Number(n),
                None => serde_json::Value::String(f.to_string()),
            },
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Map(m) => serde_json::Value::Object(to_json_object(m)),
        }
    }

    /// 若为字符串则返回其内容。
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// 字符串原样输出，其余类型输出其 JSON 文本（与“降级为字符串”的规则一致）。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or_else(|| Value::String(n.to_string())),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Object(o) => Value::Map(from_json_object(o)),
            // 数组不在值模型内：保留其 JSON 文本
            arr @ serde_json::Value::Array(_) => Value::String(arr.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Payload> for Value {
    fn from(m: Payload) -> Self {
        Value::Map(m)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// 将 JSON 对象转换为 [`Payload`]。
pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Payload {
    object.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

/// 将 [`Payload`] 转换为 JSON 对象。
pub fn to_json_object(payload: &Payload) -> serde_json::Map<String, serde_json::Value> {
    payload.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// 将载荷编码为 JSON 文本。
///
/// 返回值：
/// - 紧凑格式的 JSON 对象文本（键按字典序）
pub fn encode(payload: &Payload) -> String {
    serde_json::Value::Object(to_json_object(payload)).to_string()
}

/// 将 JSON 文本解码为载荷。
///
/// 异常处理：
/// - 文本不是合法 JSON：`MalformedPayload`
/// - 顶层不是对象：`MalformedPayload`
pub fn decode(text: &str) -> Result<Payload> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
    match value {
        serde_json::Value::Object(o) => Ok(from_json_object(o)),
        other => Err(BridgeError::MalformedPayload(format!(
            "顶层应为 JSON 对象，实际为: {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
