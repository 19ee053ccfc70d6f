//! Outbound replies
//!
//! The daemon does not talk to the chat gateway itself. It hands back a list of
//! replies and where each should go; the gateway relay renders and posts them.

use serde::{Deserialize, Serialize};

/// Where a reply should be posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyRoute {
    /// Private message to the invoking user
    Direct,
    /// The channel the command came from
    Current,
}

/// Rich embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyBody {
    Text { content: String },
    Embed { embed: Embed },
}

/// A single message to post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub route: ReplyRoute,
    #[serde(flatten)]
    pub body: ReplyBody,
}

impl Reply {
    pub fn direct(content: impl Into<String>) -> Self {
        Self {
            route: ReplyRoute::Direct,
            body: ReplyBody::Text {
                content: content.into(),
            },
        }
    }

    pub fn current(content: impl Into<String>) -> Self {
        Self {
            route: ReplyRoute::Current,
            body: ReplyBody::Text {
                content: content.into(),
            },
        }
    }

    pub fn embed(route: ReplyRoute, embed: Embed) -> Self {
        Self {
            route,
            body: ReplyBody::Embed { embed },
        }
    }

    /// Text content, if this is a text reply
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ReplyBody::Text { content } => Some(content),
            ReplyBody::Embed { .. } => None,
        }
    }
}
