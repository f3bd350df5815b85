use async_trait::async_trait;
use chrono::Utc;
use common::{
    DeliveryResult, MessageKind, MessageRequest, PlatformFactory, PlatformInfo, PushError,
    PushInitConfig, PushPlatform, PushPlatformCapabilities, Targeting,
};
use log::*;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use url::Url;

mod sign;
mod wire;

pub use sign::{compute_signature, signed_url};
use wire::{WireMessage, WireResponse};

const PLATFORM_NAME: &str = "dingding";
const BASE_URL: &str = "https://oapi.dingtalk.com/robot/send";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// 错误信息中保留的响应体长度上限
const MAX_BODY_IN_DETAIL: usize = 256;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// 钉钉群机器人配置
///
/// `webhook_url` 与 `token` 二选一：`token` 会拼接成官方的
/// `robot/send?access_token=...` 地址。
#[derive(Clone, Serialize, Deserialize)]
pub struct DingdingConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// 加签密钥
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 请求未指定 @ 目标时使用的默认手机号
    #[serde(default)]
    pub at_mobiles: Vec<String>,
    /// 请求未指定 @ 目标时默认 @所有人
    #[serde(default)]
    pub at_all: bool,
}

impl DingdingConfig {
    fn empty() -> Self {
        Self {
            webhook_url: None,
            token: None,
            secret: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            at_mobiles: Vec::new(),
            at_all: false,
        }
    }

    pub fn from_webhook_url(url: impl Into<String>) -> Self {
        Self {
            webhook_url: Some(url.into()),
            ..Self::empty()
        }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::empty()
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_default_mentions(mut self, at_mobiles: Vec<String>) -> Self {
        self.at_mobiles = at_mobiles;
        self
    }

    pub fn with_default_at_all(mut self) -> Self {
        self.at_all = true;
        self
    }
}

impl fmt::Debug for DingdingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DingdingConfig")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("at_mobiles", &self.at_mobiles)
            .field("at_all", &self.at_all)
            .finish()
    }
}

impl PushInitConfig for DingdingConfig {
    fn platform_name(&self) -> &str {
        PLATFORM_NAME
    }

    fn webhook_url(&self) -> Result<String, PushError> {
        match (&self.webhook_url, &self.token) {
            (Some(url), None) => Ok(url.trim().to_string()),
            (None, Some(token)) if token.trim().is_empty() => {
                Err(PushError::config("token must not be empty"))
            }
            (None, Some(token)) => {
                Url::parse_with_params(BASE_URL, &[("access_token", token.trim())])
                    .map(String::from)
                    .map_err(|e| PushError::config(format!("invalid token: {e}")))
            }
            (Some(_), Some(_)) => Err(PushError::config(
                "webhook_url and token are mutually exclusive",
            )),
            (None, None) => Err(PushError::config("either webhook_url or token is required")),
        }
    }

    fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    fn timeout(&self) -> u64 {
        self.timeout_secs
    }
}

/// 钉钉群机器人推送平台
///
/// 只持有不可变的端点配置，可以在多个任务间并发调用 `send`。
pub struct DingdingGroupBotPlatform {
    webhook_url: Url,
    secret: Option<String>,
    timeout: Duration,
    default_targeting: Targeting,
    http_client: Client,
}

#[async_trait]
impl PushPlatformCapabilities for DingdingGroupBotPlatform {
    async fn send(&self, request: MessageRequest) -> Result<DeliveryResult, PushError> {
        request.validate()?;

        if !request.message_type.supports_mentions()
            && (request.at_all || !request.at_mobiles.is_empty())
        {
            warn!(
                "Ignoring @ targeting for {} message, only text and markdown support it",
                request.message_type
            );
        }

        let targeting = request.targeting(&self.default_targeting);
        let payload = WireMessage::new(&request, &targeting);
        Ok(self.send_request(request.message_type, &payload).await)
    }

    fn platform_info(&self) -> PlatformInfo {
        PlatformInfo {
            name: PLATFORM_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            message_kinds: MessageKind::ALL.to_vec(),
            supports_signing: true,
            supports_mentions: true,
        }
    }
}

impl PushPlatform<DingdingConfig> for DingdingGroupBotPlatform {
    fn try_new(config: DingdingConfig) -> Result<Self, PushError>
    where
        Self: Sized,
    {
        let webhook_url = Url::parse(&config.webhook_url()?)
            .map_err(|e| PushError::config(format!("invalid webhook_url: {e}")))?;
        if !matches!(webhook_url.scheme(), "http" | "https") {
            return Err(PushError::config(format!(
                "webhook_url must use http or https, got '{}'",
                webhook_url.scheme()
            )));
        }

        if config.timeout() == 0 {
            return Err(PushError::config("timeout_secs must be greater than zero"));
        }
        let timeout = Duration::from_secs(config.timeout());

        let secret = match config.secret() {
            Some(secret) if secret.trim().is_empty() => {
                return Err(PushError::config("secret must not be empty when set"));
            }
            secret => secret.map(str::to_string),
        };

        let default_targeting =
            Targeting::resolve(&config.at_mobiles, config.at_all, &Targeting::Nobody);

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::config(format!("failed to build http client: {e}")))?;

        debug!(
            "Created {} platform for host {:?}, signing {}",
            config.platform_name(),
            webhook_url.host_str(),
            if secret.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            webhook_url,
            secret,
            timeout,
            default_targeting,
            http_client,
        })
    }
}

impl DingdingGroupBotPlatform {
    /// 本次请求实际使用的地址，配置了密钥时带上 timestamp 与 sign
    pub fn request_url(&self, timestamp: i64) -> Url {
        match &self.secret {
            Some(secret) => signed_url(&self.webhook_url, secret, timestamp),
            None => self.webhook_url.clone(),
        }
    }

    async fn send_request<T: Serialize + Sync>(
        &self,
        kind: MessageKind,
        payload: &T,
    ) -> DeliveryResult {
        let url = self.request_url(Utc::now().timestamp_millis());
        debug!("Sending {} message to {:?}", kind, url.host_str());

        let response = match self.http_client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                let detail = if e.is_timeout() {
                    format!("request timed out after {:?}", self.timeout)
                } else {
                    format!("request failed: {e}")
                };
                warn!("DingDing {} message not delivered: {}", kind, detail);
                return DeliveryResult::transport_error(detail);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read DingDing response body: {}", e);
                return DeliveryResult::transport_error(format!(
                    "failed to read response body: {e}"
                ));
            }
        };

        let result = interpret_response(status, &text);
        match (result.remote_code, &result.detail) {
            (Some(code), _) => warn!(
                "DingDing rejected {} message: code={}, message={}",
                kind,
                code,
                result.remote_message.as_deref().unwrap_or_default()
            ),
            (None, Some(detail)) => warn!("DingDing {} message not delivered: {}", kind, detail),
            (None, None) => info!("DingDing {} message delivered", kind),
        }
        result
    }
}

/// 解析钉钉返回的 `{errcode, errmsg}`
///
/// 只有 2xx 且 errcode 为 0 才算投递成功；非 2xx 时非零 errcode 仍按拒绝处理，
/// 其余情况（含 errcode 为 0）一律视为传输错误。
fn interpret_response(status: StatusCode, body: &str) -> DeliveryResult {
    match serde_json::from_str::<WireResponse>(body) {
        Ok(resp) if resp.errcode == 0 && status.is_success() => DeliveryResult::ok(),
        Ok(resp) if resp.errcode != 0 => DeliveryResult::rejected(resp.errcode, resp.errmsg),
        Ok(_) => DeliveryResult::transport_error(format!(
            "request failed with status: {status}, body reports success"
        )),
        Err(e) if status.is_success() => {
            DeliveryResult::transport_error(format!("malformed response body: {e}"))
        }
        Err(_) => DeliveryResult::transport_error(format!(
            "request failed with status: {}, body: {}",
            status,
            truncate(body, MAX_BODY_IN_DETAIL)
        )),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// --- Platform Factory ---

pub struct DingdingPlatformFactory;

impl PlatformFactory for DingdingPlatformFactory {
    fn create(&self, config: Value) -> Result<Box<dyn PushPlatformCapabilities>, PushError> {
        let config: DingdingConfig =
            serde_json::from_value(config).map_err(|e| PushError::ConfigError(e.to_string()))?;
        let platform = DingdingGroupBotPlatform::try_new(config)?;
        Ok(Box::new(platform))
    }

    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }
}
