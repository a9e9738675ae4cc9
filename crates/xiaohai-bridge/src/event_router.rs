//! 事件路由：解密/解码宿主事件，交给本地处理器，并加密回复或主动推送。
//!
//! 流程：
//! - `dispatch`：（有密钥时）解密 -> 解码 -> 本地处理器 -> 编码 ->（有密钥时）加密 -> 以固定回复类型下发
//! - `push`：编码 ->（有密钥时）加密 -> 经事件流下发，不等待任何请求
//!
//! 约束：
//! - 单次 `dispatch` 内只读取一次密钥快照，解密与加密使用同一密钥，不受并发 `set_key` 影响
//! - 解密/解码失败时不调用处理器、不发送任何回复，错误同步返回给调用方
//! - 下发顺序即提交顺序，路由本身不做重排或批量合并
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use xiaohai_core::cipher::PayloadCipher;
use xiaohai_core::codec::{self, Payload, Value};
use xiaohai_core::error::Result;
use xiaohai_core::ipc::EventEnvelope;
use xiaohai_core::manifest::DEFAULT_REPLY_EVENT_TYPE;

/// 本地事件处理器。
///
/// 说明：
/// - 输入为事件类型与解码后的载荷，返回值作为回复载荷
pub trait EventHandler: Send + Sync {
    fn handle(&self, event_type: &str, payload: &Payload) -> Payload;
}

impl<F> EventHandler for F
where
    F: Fn(&str, &Payload) -> Payload + Send + Sync,
{
    fn handle(&self, event_type: &str, payload: &Payload) -> Payload {
        self(event_type, payload)
    }
}

/// 默认处理器：记录事件并回复固定载荷 `{"key": "value from native plugin"}`。
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeReplyHandler;

impl EventHandler for NativeReplyHandler {
    fn handle(&self, event_type: &str, payload: &Payload) -> Payload {
        info!(event_type, ?payload, "收到宿主事件");
        let mut reply = Payload::new();
        reply.insert("key".to_string(), Value::from("value from native plugin"));
        reply
    }
}

/// 下发给宿主的消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// `dispatch` 的回复（经方法通道调用宿主的 `dispatch`）。
    Reply(EventEnvelope),
    /// 主动推送（经事件流）。
    Push(EventEnvelope),
}

/// 宿主端（对端）抽象：按提交顺序投递下发消息。
pub trait Peer: Send + Sync {
    fn deliver(&self, outbound: Outbound);
}

/// 当前加密密钥槽（由组装方持有并注入，不是进程级单例）。
///
/// 安全注意：
/// - `Debug` 输出不包含密钥明文
#[derive(Clone, Default)]
pub struct EncryptionKeySlot(Arc<Mutex<Option<String>>>);

impl EncryptionKeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换当前密钥；`None` 表示此后明文传输。
    pub fn set(&self, key: Option<String>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = key;
    }

    /// 当前密钥快照。
    pub fn current(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl fmt::Debug for EncryptionKeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeySlot").field("is_set", &self.is_set()).finish()
    }
}

/// 事件路由。
pub struct EventRouter {
    key: EncryptionKeySlot,
    cipher: PayloadCipher,
    handler: Arc<dyn EventHandler>,
    peer: Arc<dyn Peer>,
    reply_event_type: String,
    listening: AtomicBool,
}

impl EventRouter {
    /// 创建事件路由。
    ///
    /// 参数：
    /// - `key`：密钥槽（可与其他组件共享）
    /// - `cipher`：加解密器（决定密文布局）
    /// - `handler`：本地事件处理器
    /// - `peer`：下发目标
    ///
    /// 说明：
    /// - 回复事件类型默认为 `nativeData`；事件流默认未监听
    pub fn new(
        key: EncryptionKeySlot,
        cipher: PayloadCipher,
        handler: Arc<dyn EventHandler>,
        peer: Arc<dyn Peer>,
    ) -> Self {
        Self {
            key,
            cipher,
            handler,
            peer,
            reply_event_type: DEFAULT_REPLY_EVENT_TYPE.to_string(),
            listening: AtomicBool::new(false),
        }
    }

    pub fn with_reply_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.reply_event_type = event_type.into();
        self
    }

    /// 无条件替换当前密钥（不校验强度，不迁移已发送数据）。
    pub fn set_key(&self, key: Option<String>) {
        if key.is_some() {
            info!("事件通道密钥已设置");
        } else {
            info!("事件通道密钥已清除");
        }
        self.key.set(key);
    }

    /// 处理一条宿主事件并下发回复。
    ///
    /// 异常处理：
    /// - 解密失败：`DecryptionFailed`（不调用处理器，不回复）
    /// - 解码失败：`MalformedPayload`（不调用处理器，不回复）
    pub fn dispatch(&self, envelope: &EventEnvelope) -> Result<()> {
        let key = self.key.current();
        let payload = self.open(key.as_deref(), &envelope.payload)?;
        debug!(event_type = %envelope.event_type, encrypted = key.is_some(), "分发宿主事件");

        let reply = self.handler.handle(&envelope.event_type, &payload);
        let sealed = self.seal(key.as_deref(), &reply)?;
        self.peer
            .deliver(Outbound::Reply(EventEnvelope::new(self.reply_event_type.clone(), sealed)));
        Ok(())
    }

    /// 主动推送一条事件。
    ///
    /// 返回值：
    /// - `Ok(true)`：已投递
    /// - `Ok(false)`：宿主未监听事件流，事件被丢弃（记录日志，不排队）
    pub fn push(&self, event_type: &str, payload: &Payload) -> Result<bool> {
        if !self.is_listening() {
            warn!(event_type, "事件流未被监听，丢弃推送");
            return Ok(false);
        }
        let key = self.key.current();
        let sealed = self.seal(key.as_deref(), payload)?;
        self.peer.deliver(Outbound::Push(EventEnvelope::new(event_type, sealed)));
        Ok(true)
    }

    /// 宿主开始监听事件流。
    pub fn listen(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    /// 宿主取消监听事件流。
    pub fn cancel(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn open(&self, key: Option<&str>, text: &str) -> Result<Payload> {
        match key {
            Some(key) => codec::decode(&self.cipher.decrypt(text, key)?),
            None => codec::decode(text),
        }
    }

    fn seal(&self, key: Option<&str>, payload: &Payload) -> Result<String> {
        let text = codec::encode(payload);
        match key {
            Some(key) => self.cipher.encrypt(&text, key),
            None => Ok(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xiaohai_core::error::BridgeError;

    #[derive(Default)]
    struct RecordingPeer(Mutex<Vec<Outbound>>);

    impl Peer for RecordingPeer {
        fn deliver(&self, outbound: Outbound) {
            self.0.lock().unwrap().push(outbound);
        }
    }

    fn router(peer: Arc<RecordingPeer>) -> EventRouter {
        EventRouter::new(
            EncryptionKeySlot::new(),
            PayloadCipher::default(),
            Arc::new(NativeReplyHandler),
            peer,
        )
    }

    #[test]
    fn clear_text_dispatch_replies_with_native_data() {
        let peer = Arc::new(RecordingPeer::default());
        let r = router(peer.clone());
        r.dispatch(&EventEnvelope::new("ping", r#"{"a":1}"#)).unwrap();
        let sent = peer.0.lock().unwrap();
        assert_eq!(
            *sent,
            vec![Outbound::Reply(EventEnvelope::new(
                "nativeData",
                r#"{"key":"value from native plugin"}"#
            ))]
        );
    }

    #[test]
    fn plain_text_after_set_key_fails_without_reply() {
        let peer = Arc::new(RecordingPeer::default());
        let r = router(peer.clone());
        r.set_key(Some("secret".to_string()));
        let err = r.dispatch(&EventEnvelope::new("ping", r#"{"a":1}"#)).unwrap_err();
        assert!(matches!(err, BridgeError::DecryptionFailed(_)));
        assert!(peer.0.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_payload_fails_without_reply() {
        let peer = Arc::new(RecordingPeer::default());
        let r = router(peer.clone());
        let err = r.dispatch(&EventEnvelope::new("ping", "[]")).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedPayload(_)));
        assert!(peer.0.lock().unwrap().is_empty());
    }

    #[test]
    fn push_without_listener_is_dropped() {
        let peer = Arc::new(RecordingPeer::default());
        let r = router(peer.clone());
        assert!(!r.push("tick", &Payload::new()).unwrap());
        r.listen();
        assert!(r.push("tick", &Payload::new()).unwrap());
        r.cancel();
        assert!(!r.push("tick", &Payload::new()).unwrap());
        assert_eq!(peer.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn push_is_sealed_under_current_key() {
        let peer = Arc::new(RecordingPeer::default());
        let r = router(peer.clone());
        r.set_key(Some("k".to_string()));
        r.listen();
        let mut payload = Payload::new();
        payload.insert("n".to_string(), 1i64.into());
        assert!(r.push("tick", &payload).unwrap());

        let sent = std::mem::take(&mut *peer.0.lock().unwrap());
        let [Outbound::Push(envelope)] = sent.as_slice() else {
            panic!("expected exactly one push, got {sent:?}");
        };
        assert_eq!(envelope.event_type, "tick");
        assert_ne!(envelope.payload, r#"{"n":1}"#);
        let opened = PayloadCipher::default().decrypt(&envelope.payload, "k").unwrap();
        assert_eq!(opened, r#"{"n":1}"#);
    }

    #[test]
    fn key_slot_debug_hides_key() {
        let slot = EncryptionKeySlot::new();
        slot.set(Some("top-secret".to_string()));
        let text = format!("{slot:?}");
        assert!(!text.contains("top-secret"), "{text}");
    }
}
