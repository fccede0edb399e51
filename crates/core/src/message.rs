//! Message domain types.
//!
//! These are the value objects that flow through every generation run:
//! caller supplies user/system messages → provider produces assistant
//! messages → the loop appends tool results → everything is sent back
//! upstream on the next step.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;
use crate::tool::{ToolCall, ToolResult};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Tool execution results
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(Error::MessageMapping(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a transcript.
///
/// Closed over the four roles. Tool results for one provider turn travel
/// together in a single [`Message::ToolResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    System {
        content: String,
    },
    #[serde(rename = "tool")]
    ToolResult {
        tool_results: Vec<ToolResult>,
    },
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create a new assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a message carrying the results of one batch of tool calls.
    pub fn tool_results(tool_results: Vec<ToolResult>) -> Self {
        Self::ToolResult { tool_results }
    }

    /// Build a message from a raw role string and text content, as received
    /// over the wire. Tool messages cannot be expressed this way.
    pub fn from_role(role: &str, content: impl Into<String>) -> Result<Self, Error> {
        match role.parse::<Role>()? {
            Role::User => Ok(Self::user(content)),
            Role::Assistant => Ok(Self::assistant(content)),
            Role::System => Ok(Self::system(content)),
            Role::Tool => Err(Error::MessageMapping(role.to_string())),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::System { .. } => Role::System,
            Self::ToolResult { .. } => Role::Tool,
        }
    }

    /// The text content. Tool result messages have none.
    pub fn text(&self) -> &str {
        match self {
            Self::User { content } | Self::Assistant { content, .. } | Self::System { content } => {
                content
            }
            Self::ToolResult { .. } => "",
        }
    }

    /// Tool calls requested by an assistant message.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Results carried by a tool result message.
    pub fn results(&self) -> &[ToolResult] {
        match self {
            Self::ToolResult { tool_results } => tool_results,
            _ => &[],
        }
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        match self {
            Self::ToolResult { tool_results } => {
                tool_results.iter().map(|r| r.result.len() / 4).sum()
            }
            other => other.text().len() / 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, model!");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.text(), "Hello, model!");
        assert!(msg.tool_calls().is_empty());
    }

    #[test]
    fn role_parsing_rejects_unknown() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        let err = "wizard".parse::<Role>().unwrap_err();
        assert!(matches!(err, Error::MessageMapping(ref r) if r == "wizard"));
    }

    #[test]
    fn from_role_maps_wire_roles() {
        assert_eq!(
            Message::from_role("system", "be brief").unwrap(),
            Message::system("be brief")
        );
        assert!(Message::from_role("tool", "x").is_err());
        assert!(Message::from_role("robot", "x").is_err());
    }

    #[test]
    fn tool_result_message_serializes_with_tool_role() {
        let msg = Message::tool_results(vec![ToolResult {
            tool_call_id: "call_1".into(),
            tool_name: "get_weather".into(),
            args: serde_json::Map::new(),
            result: "sunny".into(),
            is_error: false,
        }]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_results"][0]["tool_call_id"], "call_1");
        assert_eq!(msg.text(), "");
        assert_eq!(msg.results().len(), 1);
    }

    #[test]
    fn assistant_without_calls_omits_field() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Message::assistant("hi"));
    }

    #[test]
    fn token_estimate() {
        // 20 chars ≈ 5 tokens
        assert_eq!(Message::user("12345678901234567890").estimated_tokens(), 5);
    }
}
