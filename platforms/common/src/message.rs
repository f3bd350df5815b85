use crate::PushError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "link")]
    Link,
    #[serde(rename = "markdown")]
    Markdown,
    #[serde(rename = "actionCard")]
    ActionCard,
    #[serde(rename = "feedCard")]
    FeedCard,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Text,
        MessageKind::Link,
        MessageKind::Markdown,
        MessageKind::ActionCard,
        MessageKind::FeedCard,
    ];

    /// 线上协议中的 msgtype 名称
    pub fn wire_name(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Link => "link",
            MessageKind::Markdown => "markdown",
            MessageKind::ActionCard => "actionCard",
            MessageKind::FeedCard => "feedCard",
        }
    }

    /// 是否支持 @ 提及
    pub fn supports_mentions(self) -> bool {
        matches!(self, MessageKind::Text | MessageKind::Markdown)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for MessageKind {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == s)
            .ok_or_else(|| {
                PushError::validation(
                    "message_type",
                    format!(
                        "unsupported message type '{s}', expected one of text, link, markdown, actionCard, feedCard"
                    ),
                )
            })
    }
}

/// 链接消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkContent {
    pub title: String,
    pub text: String,
    #[serde(rename = "messageUrl")]
    pub message_url: String,
    #[serde(rename = "picURL")]
    pub pic_url: String,
}

/// Markdown消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownContent {
    pub title: String,
    pub text: String,
}

/// 按钮排列方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BtnOrientation {
    #[default]
    Vertical,
    Horizontal,
}

impl BtnOrientation {
    pub fn as_flag(self) -> &'static str {
        match self {
            BtnOrientation::Vertical => "0",
            BtnOrientation::Horizontal => "1",
        }
    }
}

impl Serialize for BtnOrientation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_flag())
    }
}

impl<'de> Deserialize<'de> for BtnOrientation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(if deserialize_flag(deserializer)? {
            BtnOrientation::Horizontal
        } else {
            BtnOrientation::Vertical
        })
    }
}

/// 独立跳转按钮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub title: String,
    #[serde(rename = "actionURL")]
    pub action_url: String,
}

/// ActionCard 的按钮形式：整体跳转或多按钮，二选一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionCardButtons {
    Single {
        single_title: String,
        single_url: String,
    },
    Multi(Vec<ActionButton>),
}

/// ActionCard消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawActionCard")]
pub struct ActionCard {
    pub title: String,
    pub text: String,
    pub hide_avatar: bool,
    pub btn_orientation: BtnOrientation,
    pub buttons: ActionCardButtons,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActionCard {
    title: String,
    text: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    hide_avatar: bool,
    #[serde(default)]
    btn_orientation: BtnOrientation,
    single_title: Option<String>,
    #[serde(rename = "singleURL")]
    single_url: Option<String>,
    btns: Option<Vec<ActionButton>>,
}

impl TryFrom<RawActionCard> for ActionCard {
    type Error = String;

    fn try_from(raw: RawActionCard) -> Result<Self, Self::Error> {
        let buttons = match (raw.single_title, raw.single_url, raw.btns) {
            (Some(single_title), Some(single_url), None) => ActionCardButtons::Single {
                single_title,
                single_url,
            },
            (None, None, Some(btns)) => ActionCardButtons::Multi(btns),
            (None, None, None) => {
                return Err("actionCard needs singleTitle/singleURL or btns".to_string());
            }
            (_, _, Some(_)) => {
                return Err("actionCard accepts either singleTitle/singleURL or btns, not both".to_string());
            }
            _ => return Err("actionCard single form needs both singleTitle and singleURL".to_string()),
        };
        Ok(ActionCard {
            title: raw.title,
            text: raw.text,
            hide_avatar: raw.hide_avatar,
            btn_orientation: raw.btn_orientation,
            buttons,
        })
    }
}

/// FeedCard 中的单条链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLink {
    pub title: String,
    #[serde(rename = "messageURL")]
    pub message_url: String,
    #[serde(rename = "picURL")]
    pub pic_url: String,
}

/// FeedCard消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCard {
    pub links: Vec<FeedLink>,
}

/// 消息内容，形状由消息类型决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Link(LinkContent),
    Markdown(MarkdownContent),
    ActionCard(ActionCard),
    FeedCard(FeedCard),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Text(_) => MessageKind::Text,
            Payload::Link(_) => MessageKind::Link,
            Payload::Markdown(_) => MessageKind::Markdown,
            Payload::ActionCard(_) => MessageKind::ActionCard,
            Payload::FeedCard(_) => MessageKind::FeedCard,
        }
    }

    /// 按声明的消息类型解析 JSON 内容
    pub fn from_value(kind: MessageKind, value: Value) -> Result<Self, PushError> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: MessageKind,
            value: Value,
        ) -> Result<T, PushError> {
            serde_json::from_value(value).map_err(|e| {
                PushError::validation("message", format!("invalid {kind} payload: {e}"))
            })
        }

        match kind {
            MessageKind::Text => match value {
                Value::String(content) => Ok(Payload::Text(content)),
                other => Err(PushError::validation(
                    "message",
                    format!("text payload must be a string, got {}", json_type(&other)),
                )),
            },
            MessageKind::Link => parse(kind, value).map(Payload::Link),
            MessageKind::Markdown => parse(kind, value).map(Payload::Markdown),
            MessageKind::ActionCard => parse(kind, value).map(Payload::ActionCard),
            MessageKind::FeedCard => parse(kind, value).map(Payload::FeedCard),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 接收 "0"/"1"、0/1 或布尔值
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u8),
        Str(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Str(s) if s == "0" => Ok(false),
        Flag::Str(s) if s == "1" => Ok(true),
        _ => Err(serde::de::Error::custom("expected \"0\", \"1\" or a boolean")),
    }
}

/// 归一化后的 @ 目标
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Targeting {
    #[default]
    Nobody,
    Mobiles(Vec<String>),
    All,
}

impl Targeting {
    /// at_all 覆盖 at_mobiles；请求未指定任何人时回落到默认目标
    pub fn resolve(at_mobiles: &[String], at_all: bool, fallback: &Targeting) -> Targeting {
        if at_all {
            return Targeting::All;
        }
        let mut mobiles: Vec<String> = Vec::with_capacity(at_mobiles.len());
        for mobile in at_mobiles {
            let mobile = mobile.trim();
            if !mobile.is_empty() && !mobiles.iter().any(|m| m == mobile) {
                mobiles.push(mobile.to_string());
            }
        }
        if mobiles.is_empty() {
            fallback.clone()
        } else {
            Targeting::Mobiles(mobiles)
        }
    }

    pub fn mobiles(&self) -> &[String] {
        match self {
            Targeting::Mobiles(mobiles) => mobiles,
            _ => &[],
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Targeting::All)
    }
}

/// 推送请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    pub message_type: MessageKind,
    pub payload: Payload,
    pub at_mobiles: Vec<String>,
    pub at_all: bool,
}

impl MessageRequest {
    pub fn new(payload: Payload) -> Self {
        Self {
            message_type: payload.kind(),
            payload,
            at_mobiles: Vec::new(),
            at_all: false,
        }
    }

    /// 从 JSON 形式构建请求，类型名未知或内容与类型不符时返回校验错误
    pub fn from_json(message: MessageJson) -> Result<Self, PushError> {
        let message_type: MessageKind = message.message_type.parse()?;
        let payload = Payload::from_value(message_type, message.message)?;
        Ok(Self {
            message_type,
            payload,
            at_mobiles: message.at_mobiles.unwrap_or_default(),
            at_all: message.at_all,
        })
    }

    /// 在任何网络调用之前校验请求
    pub fn validate(&self) -> Result<(), PushError> {
        if self.payload.kind() != self.message_type {
            return Err(PushError::validation(
                "message",
                format!(
                    "message_type is {} but payload is {}",
                    self.message_type,
                    self.payload.kind()
                ),
            ));
        }

        match &self.payload {
            Payload::Text(content) => require("text.content", content),
            Payload::Link(link) => {
                require("link.title", &link.title)?;
                require("link.text", &link.text)?;
                require("link.messageUrl", &link.message_url)?;
                require("link.picURL", &link.pic_url)
            }
            Payload::Markdown(markdown) => {
                require("markdown.title", &markdown.title)?;
                require("markdown.text", &markdown.text)
            }
            Payload::ActionCard(card) => {
                require("actionCard.title", &card.title)?;
                require("actionCard.text", &card.text)?;
                match &card.buttons {
                    ActionCardButtons::Single {
                        single_title,
                        single_url,
                    } => {
                        require("actionCard.singleTitle", single_title)?;
                        require("actionCard.singleURL", single_url)
                    }
                    ActionCardButtons::Multi(btns) => {
                        if btns.is_empty() {
                            return Err(PushError::validation(
                                "actionCard.btns",
                                "at least one button is required",
                            ));
                        }
                        for (i, btn) in btns.iter().enumerate() {
                            require(&format!("actionCard.btns[{i}].title"), &btn.title)?;
                            require(&format!("actionCard.btns[{i}].actionURL"), &btn.action_url)?;
                        }
                        Ok(())
                    }
                }
            }
            Payload::FeedCard(feed) => {
                if feed.links.is_empty() {
                    return Err(PushError::validation(
                        "feedCard.links",
                        "at least one link is required",
                    ));
                }
                for (i, link) in feed.links.iter().enumerate() {
                    require(&format!("feedCard.links[{i}].title"), &link.title)?;
                    require(&format!("feedCard.links[{i}].messageURL"), &link.message_url)?;
                    require(&format!("feedCard.links[{i}].picURL"), &link.pic_url)?;
                }
                Ok(())
            }
        }
    }

    /// 解析本次请求的 @ 目标，非 text/markdown 消息始终为 Nobody
    pub fn targeting(&self, fallback: &Targeting) -> Targeting {
        if !self.message_type.supports_mentions() {
            return Targeting::Nobody;
        }
        Targeting::resolve(&self.at_mobiles, self.at_all, fallback)
    }
}

fn require(field: &str, value: &str) -> Result<(), PushError> {
    if value.trim().is_empty() {
        Err(PushError::validation(field, "must be a non-empty string"))
    } else {
        Ok(())
    }
}

/// 推送请求的 JSON 形式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageJson {
    /// 消息类型名，如 text、actionCard
    pub message_type: String,
    /// 消息内容：text 为字符串，其余类型为对象
    pub message: Value,
    #[serde(default)]
    pub at_mobiles: Option<Vec<String>>,
    #[serde(default)]
    pub at_all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_link(title: &str) -> FeedLink {
        FeedLink {
            title: title.to_string(),
            message_url: "https://airflow.apache.org".to_string(),
            pic_url: "https://airflow.apache.org/_images/dags.png".to_string(),
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("actionCard".parse::<MessageKind>().unwrap(), MessageKind::ActionCard);
        assert_eq!("feedCard".parse::<MessageKind>().unwrap(), MessageKind::FeedCard);

        let err = "not_support_msg_type".parse::<MessageKind>().unwrap_err();
        assert_eq!(err.field(), Some("message_type"));
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let request = MessageRequest {
            message_type: MessageKind::Link,
            payload: Payload::Text("plain".to_string()),
            at_mobiles: vec![],
            at_all: false,
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.field(), Some("message"));

        let err = MessageRequest::from_json(MessageJson {
            message_type: "link".to_string(),
            message: json!("plain"),
            at_mobiles: None,
            at_all: false,
        })
        .unwrap_err();
        assert!(matches!(err, PushError::ValidationError { .. }));
    }

    #[test]
    fn test_empty_feed_card() {
        let request = MessageRequest::new(Payload::FeedCard(FeedCard { links: vec![] }));
        assert_eq!(request.validate().unwrap_err().field(), Some("feedCard.links"));

        let request = MessageRequest::new(Payload::FeedCard(FeedCard {
            links: vec![feed_link("ok"), feed_link(" ")],
        }));
        assert_eq!(
            request.validate().unwrap_err().field(),
            Some("feedCard.links[1].title")
        );
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let request = MessageRequest::new(Payload::Text("   ".to_string()));
        assert_eq!(request.validate().unwrap_err().field(), Some("text.content"));
    }

    #[test]
    fn test_action_card_from_json() {
        let single = Payload::from_value(
            MessageKind::ActionCard,
            json!({
                "title": "single",
                "text": "body",
                "hideAvatar": "0",
                "btnOrientation": "1",
                "singleTitle": "read more",
                "singleURL": "https://airflow.apache.org"
            }),
        )
        .unwrap();
        let Payload::ActionCard(card) = single else {
            panic!("Expected action card");
        };
        assert!(!card.hide_avatar);
        assert_eq!(card.btn_orientation, BtnOrientation::Horizontal);
        assert!(matches!(card.buttons, ActionCardButtons::Single { .. }));

        let multi = Payload::from_value(
            MessageKind::ActionCard,
            json!({
                "title": "multi",
                "text": "body",
                "hideAvatar": true,
                "btns": [
                    {"title": "Docs", "actionURL": "https://airflow.apache.org"},
                    {"title": "GitHub", "actionURL": "https://github.com/apache/airflow"}
                ]
            }),
        )
        .unwrap();
        let Payload::ActionCard(card) = multi else {
            panic!("Expected action card");
        };
        assert!(card.hide_avatar);
        match card.buttons {
            ActionCardButtons::Multi(btns) => assert_eq!(btns[1].title, "GitHub"),
            _ => panic!("Expected multi-button card"),
        }
    }

    #[test]
    fn test_action_card_with_both_forms() {
        let err = Payload::from_value(
            MessageKind::ActionCard,
            json!({
                "title": "both",
                "text": "body",
                "singleTitle": "read more",
                "singleURL": "https://airflow.apache.org",
                "btns": []
            }),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("message"));
    }

    #[test]
    fn test_targeting_resolution() {
        let mobiles = vec!["156XXXXXXXX".to_string(), "130XXXXXXXX".to_string()];

        assert_eq!(
            Targeting::resolve(&mobiles, true, &Targeting::Nobody),
            Targeting::All
        );
        assert_eq!(
            Targeting::resolve(&mobiles, false, &Targeting::All),
            Targeting::Mobiles(mobiles.clone())
        );
        assert_eq!(
            Targeting::resolve(&[], false, &Targeting::All),
            Targeting::All
        );

        let dupes = vec!["123".to_string(), " 123 ".to_string(), "".to_string()];
        assert_eq!(
            Targeting::resolve(&dupes, false, &Targeting::Nobody),
            Targeting::Mobiles(vec!["123".to_string()])
        );
    }

    #[test]
    fn test_targeting_ignored_for_cards() {
        let mut request = MessageRequest::new(Payload::FeedCard(FeedCard {
            links: vec![feed_link("a")],
        }));
        request.at_all = true;
        assert_eq!(request.targeting(&Targeting::Nobody), Targeting::Nobody);
    }
}
