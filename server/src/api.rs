use common::{DeliveryResult, MessageJson, PushError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 推送请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// 目标平台
    pub platform: String,
    /// 平台的配置信息 (e.g., webhook url, secret)
    /// 使用 serde_json::Value 以支持不同平台的异构配置
    pub config: Value,
    /// 消息内容
    pub message: MessageJson,
}

/// 推送响应体，远端拒绝和传输失败同样以 200 返回
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    /// 推送结果
    pub result: DeliveryResult,
}

/// 调用方错误（平台不存在、配置错误、消息校验失败）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&PushError> for ErrorResponse {
    fn from(err: &PushError) -> Self {
        Self {
            error: err.to_string(),
            field: err.field().map(str::to_string),
        }
    }
}

/// 健康检查响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub platforms: Vec<String>,
}
