use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

mod message;

pub use message::{
    ActionButton, ActionCard, ActionCardButtons, BtnOrientation, FeedCard, FeedLink, LinkContent,
    MarkdownContent, MessageJson, MessageKind, MessageRequest, Payload, Targeting,
};

/// 推送平台错误类型
///
/// 只有调用方误用（配置错误、请求格式错误）才会以错误返回；
/// 远端拒绝和网络故障都通过 [`DeliveryResult`] 以数据形式返回。
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Validation error on '{field}': {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Platform '{0}' not found")]
    PlatformNotFound(String),
}

impl PushError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PushError::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PushError::ConfigError(msg.into())
    }

    /// 校验错误对应的字段名
    pub fn field(&self) -> Option<&str> {
        match self {
            PushError::ValidationError { field, .. } => Some(field),
            _ => None,
        }
    }
}

use serde::{Deserialize, Serialize};

/// 投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Ok,
    Rejected,
    TransportError,
}

/// 单次投递的结果，构造后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// 投递状态
    pub status: DeliveryStatus,
    /// 远端错误码，仅在 rejected 时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_code: Option<i64>,
    /// 远端错误信息，仅在 rejected 时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_message: Option<String>,
    /// 传输失败的描述，仅在 transport_error 时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// 时间戳
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            status: DeliveryStatus::Ok,
            remote_code: None,
            remote_message: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Rejected,
            remote_code: Some(code),
            remote_message: Some(message.into()),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn transport_error(detail: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::TransportError,
            remote_code: None,
            remote_message: None,
            detail: Some(detail.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == DeliveryStatus::Ok
    }
}

/// 初始化配置trait
pub trait PushInitConfig: Send + Sync {
    /// 获取平台名称
    fn platform_name(&self) -> &str;

    /// 获取webhook URL
    fn webhook_url(&self) -> Result<String, PushError>;

    /// 获取密钥
    fn secret(&self) -> Option<&str>;

    /// 获取超时时间（秒）
    fn timeout(&self) -> u64;
}

/// 推送平台能力trait（用于dyn兼容）
///
/// 每次 `send` 最多发起一次网络请求，不做内部重试；重试策略由调用方决定。
#[async_trait]
pub trait PushPlatformCapabilities: Send + Sync {
    /// 通用发送方法
    async fn send(&self, request: MessageRequest) -> Result<DeliveryResult, PushError>;

    /// 获取平台信息
    fn platform_info(&self) -> PlatformInfo;

    /// 发送纯文本消息
    async fn send_text(&self, content: &str) -> Result<DeliveryResult, PushError> {
        self.send(MessageBuilder::text(content).build()).await
    }

    async fn send_text_with_mention(
        &self,
        content: &str,
        mention_list: Vec<String>,
    ) -> Result<DeliveryResult, PushError> {
        self.send(MessageBuilder::text(content).mentions(mention_list).build())
            .await
    }

    /// 发送Markdown消息
    async fn send_markdown(&self, title: &str, text: &str) -> Result<DeliveryResult, PushError> {
        self.send(MessageBuilder::markdown(title, text).build()).await
    }

    /// 发送链接消息
    async fn send_link(
        &self,
        title: &str,
        text: &str,
        message_url: &str,
        pic_url: &str,
    ) -> Result<DeliveryResult, PushError> {
        self.send(MessageBuilder::link(title, text, message_url, pic_url).build())
            .await
    }
}

/// 推送平台trait（用于具体实现）
pub trait PushPlatform<C: PushInitConfig>: PushPlatformCapabilities {
    /// 创建一个新的推送平台实例，配置有误时返回 ConfigError
    fn try_new(config: C) -> Result<Self, PushError>
    where
        Self: Sized;
}

/// 平台信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// 平台名称
    pub name: String,
    /// 版本
    pub version: String,
    /// 支持的消息类型
    pub message_kinds: Vec<MessageKind>,
    /// 是否支持请求签名
    pub supports_signing: bool,
    /// 是否支持@提及
    pub supports_mentions: bool,
}

/// 消息构建器
pub struct MessageBuilder {
    payload: Payload,
    mentions: Vec<String>,
    at_all: bool,
}

impl MessageBuilder {
    fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            mentions: Vec::new(),
            at_all: false,
        }
    }

    /// 创建文本消息构建器
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_payload(Payload::Text(content.into()))
    }

    /// 创建Markdown消息构建器
    pub fn markdown(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_payload(Payload::Markdown(MarkdownContent {
            title: title.into(),
            text: text.into(),
        }))
    }

    /// 创建链接消息构建器
    pub fn link(
        title: impl Into<String>,
        text: impl Into<String>,
        message_url: impl Into<String>,
        pic_url: impl Into<String>,
    ) -> Self {
        Self::with_payload(Payload::Link(LinkContent {
            title: title.into(),
            text: text.into(),
            message_url: message_url.into(),
            pic_url: pic_url.into(),
        }))
    }

    pub fn action_card(card: ActionCard) -> Self {
        Self::with_payload(Payload::ActionCard(card))
    }

    pub fn feed_card(links: Vec<FeedLink>) -> Self {
        Self::with_payload(Payload::FeedCard(FeedCard { links }))
    }

    /// 添加@提及
    pub fn mention(mut self, user: impl Into<String>) -> Self {
        self.mentions.push(user.into());
        self
    }

    /// 添加多个@提及
    pub fn mentions(mut self, users: Vec<String>) -> Self {
        self.mentions.extend(users);
        self
    }

    /// @所有人
    pub fn at_all(mut self) -> Self {
        self.at_all = true;
        self
    }

    /// 构建消息
    pub fn build(self) -> MessageRequest {
        MessageRequest {
            message_type: self.payload.kind(),
            payload: self.payload,
            at_mobiles: self.mentions,
            at_all: self.at_all,
        }
    }
}

/// 平台工厂trait
pub trait PlatformFactory: Send + Sync {
    /// 根据JSON Value创建平台实例
    fn create(&self, config: Value) -> Result<Box<dyn PushPlatformCapabilities>, PushError>;

    /// 获取平台名称
    fn name(&self) -> &'static str;
}

/// 平台注册表
#[derive(Default)]
pub struct PlatformRegistry {
    factories: std::collections::HashMap<String, Box<dyn PlatformFactory>>,
}

impl PlatformRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册平台工厂
    pub fn register(&mut self, factory: Box<dyn PlatformFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    /// 获取平台工厂
    pub fn get_factory(&self, name: &str) -> Option<&dyn PlatformFactory> {
        self.factories.get(name).map(|f| f.as_ref())
    }

    /// 根据平台名称和配置创建平台实例
    pub fn create(
        &self,
        name: &str,
        config: Value,
    ) -> Result<Box<dyn PushPlatformCapabilities>, PushError> {
        self.get_factory(name)
            .ok_or_else(|| PushError::PlatformNotFound(name.to_string()))?
            .create(config)
    }

    /// 获取所有支持的平台名称
    pub fn list_platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockPlatform {
        sent: Mutex<Vec<MessageRequest>>,
    }

    #[async_trait]
    impl PushPlatformCapabilities for MockPlatform {
        async fn send(&self, request: MessageRequest) -> Result<DeliveryResult, PushError> {
            request.validate()?;
            self.sent.lock().unwrap().push(request);
            Ok(DeliveryResult::ok())
        }

        fn platform_info(&self) -> PlatformInfo {
            PlatformInfo {
                name: "mock".to_string(),
                version: "0.0.0".to_string(),
                message_kinds: MessageKind::ALL.to_vec(),
                supports_signing: false,
                supports_mentions: true,
            }
        }
    }

    struct MockFactory;

    impl PlatformFactory for MockFactory {
        fn create(&self, config: Value) -> Result<Box<dyn PushPlatformCapabilities>, PushError> {
            if config.is_null() {
                return Err(PushError::config("mock config missing"));
            }
            Ok(Box::new(MockPlatform {
                sent: Mutex::new(Vec::new()),
            }))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[test]
    fn test_message_builder() {
        let text_msg = MessageBuilder::text("Hello World")
            .mention("156XXXXXXXX")
            .build();
        assert_eq!(text_msg.message_type, MessageKind::Text);
        assert_eq!(text_msg.at_mobiles, vec!["156XXXXXXXX".to_string()]);
        match text_msg.payload {
            Payload::Text(content) => assert_eq!(content, "Hello World"),
            _ => panic!("Expected text message"),
        }

        let md_msg = MessageBuilder::markdown("Title", "# Hello").at_all().build();
        assert_eq!(md_msg.message_type, MessageKind::Markdown);
        assert!(md_msg.at_all);
    }

    #[test]
    fn test_delivery_result_constructors() {
        let ok = DeliveryResult::ok();
        assert!(ok.is_ok());
        assert!(ok.remote_code.is_none());

        let rejected = DeliveryResult::rejected(310000, "invalid mobile");
        assert_eq!(rejected.status, DeliveryStatus::Rejected);
        assert_eq!(rejected.remote_code, Some(310000));

        let json = serde_json::to_value(DeliveryResult::transport_error("timed out")).unwrap();
        assert_eq!(json["status"], "transport_error");
        assert!(json.get("remote_code").is_none());
    }

    #[test]
    fn test_platform_registry() {
        let mut registry = PlatformRegistry::new();
        assert!(registry.list_platforms().is_empty());

        registry.register(Box::new(MockFactory));
        assert_eq!(registry.list_platforms(), vec!["mock".to_string()]);
        assert!(matches!(
            registry.create("missing", Value::Null),
            Err(PushError::PlatformNotFound(_))
        ));
        assert!(matches!(
            registry.create("mock", Value::Null),
            Err(PushError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_provided_send_helpers() {
        let platform = MockPlatform {
            sent: Mutex::new(Vec::new()),
        };
        platform
            .send_text_with_mention("hi", vec!["130XXXXXXXX".to_string()])
            .await
            .unwrap();
        platform
            .send_link("t", "x", "https://a", "https://b/p.png")
            .await
            .unwrap();
        assert!(platform.send_markdown("", "body").await.is_err());

        let sent = platform.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].message_type, MessageKind::Link);
    }
}
