// --- DingDing robot API payload structs ---

use common::{
    ActionButton, ActionCard, ActionCardButtons, FeedCard, LinkContent, MarkdownContent,
    MessageRequest, Payload, Targeting,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    msgtype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<WireText<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a LinkContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown: Option<&'a MarkdownContent>,
    #[serde(rename = "actionCard", skip_serializing_if = "Option::is_none")]
    action_card: Option<WireActionCard<'a>>,
    #[serde(rename = "feedCard", skip_serializing_if = "Option::is_none")]
    feed_card: Option<&'a FeedCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    at: Option<WireAt<'a>>,
}

#[derive(Debug, Serialize)]
struct WireText<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireActionCard<'a> {
    title: &'a str,
    text: &'a str,
    hide_avatar: &'static str,
    btn_orientation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    single_title: Option<&'a str>,
    #[serde(rename = "singleURL", skip_serializing_if = "Option::is_none")]
    single_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    btns: Option<&'a [ActionButton]>,
}

impl<'a> From<&'a ActionCard> for WireActionCard<'a> {
    fn from(card: &'a ActionCard) -> Self {
        let (single_title, single_url, btns) = match &card.buttons {
            ActionCardButtons::Single {
                single_title,
                single_url,
            } => (Some(single_title.as_str()), Some(single_url.as_str()), None),
            ActionCardButtons::Multi(btns) => (None, None, Some(btns.as_slice())),
        };
        Self {
            title: &card.title,
            text: &card.text,
            hide_avatar: if card.hide_avatar { "1" } else { "0" },
            btn_orientation: card.btn_orientation.as_flag(),
            single_title,
            single_url,
            btns,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireAt<'a> {
    #[serde(rename = "atMobiles")]
    at_mobiles: &'a [String],
    #[serde(rename = "isAtAll")]
    is_at_all: bool,
}

impl<'a> WireMessage<'a> {
    /// `targeting` 应当已经由 [`MessageRequest::targeting`] 解析
    pub(crate) fn new(request: &'a MessageRequest, targeting: &'a Targeting) -> Self {
        let mut message = WireMessage {
            msgtype: request.message_type.wire_name(),
            text: None,
            link: None,
            markdown: None,
            action_card: None,
            feed_card: None,
            at: None,
        };
        match &request.payload {
            Payload::Text(content) => message.text = Some(WireText {
                content: content.as_str(),
            }),
            Payload::Link(link) => message.link = Some(link),
            Payload::Markdown(markdown) => message.markdown = Some(markdown),
            Payload::ActionCard(card) => message.action_card = Some(card.into()),
            Payload::FeedCard(feed) => message.feed_card = Some(feed),
        }
        if request.message_type.supports_mentions() {
            message.at = Some(WireAt {
                at_mobiles: targeting.mobiles(),
                is_at_all: targeting.is_all(),
            });
        }
        message
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}
