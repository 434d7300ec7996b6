//! Chat request/response DTOs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use tsumugi::{ConversationTurn, ToolCallDescriptor, ToolResult, TurnRole};

use crate::application::{ChatInput, ChatTurnRequest, ClientArgSpec, ClientToolSpec};

/// Plain text, or explicit role-tagged messages
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ChatInputPayload {
    Text(String),
    Messages(Vec<InputMessage>),
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InputMessage {
    /// `user`, `assistant` or `system`
    pub role: String,
    pub content: String,
}

/// Argument declaration: `{type, description?}`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ToolArgPayload {
    /// One of string, number, integer, boolean
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: Option<String>,
}

/// A tool the client executes itself
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClientToolPayload {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, ToolArgPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolCallPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ToolResultPayload {
    pub tool_call_id: String,
    #[serde(default)]
    pub name: String,
    pub result: serde_json::Value,
}

/// Chat completion request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatCompletionRequest {
    pub thread_id: String,
    pub input: ChatInputPayload,
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<ClientToolPayload>,
    /// Calls previously received in a `tool_call` event, echoed back on resume
    #[serde(default)]
    pub tool_calls: Vec<ToolCallPayload>,
    #[serde(default)]
    pub tool_results: Vec<ToolResultPayload>,
}

impl ChatCompletionRequest {
    pub fn into_turn_request(self, user_id: String) -> Result<ChatTurnRequest, String> {
        if self.thread_id.trim().is_empty() {
            return Err("thread_id is required".to_string());
        }

        let input = match self.input {
            ChatInputPayload::Text(text) => ChatInput::Text(text),
            ChatInputPayload::Messages(messages) => ChatInput::Turns(
                messages
                    .into_iter()
                    .map(|m| -> Result<ConversationTurn, String> {
                        match m.role.parse::<TurnRole>()? {
                            TurnRole::User => Ok(ConversationTurn::user(m.content)),
                            TurnRole::Assistant => Ok(ConversationTurn::assistant(m.content)),
                            TurnRole::System => Ok(ConversationTurn::system(m.content)),
                            TurnRole::Tool => Err("Tool messages go in tool_results".to_string()),
                        }
                    })
                    .collect::<Result<_, String>>()?,
            ),
        };

        if input.is_blank() && self.tool_results.is_empty() {
            return Err("input is required".to_string());
        }

        let client_tools = self
            .tools
            .into_iter()
            .map(|tool| ClientToolSpec {
                name: tool.name,
                description: tool.description,
                args: tool
                    .args
                    .into_iter()
                    .map(|(field, arg)| {
                        (
                            field,
                            ClientArgSpec {
                                type_name: arg.type_name,
                                description: arg.description,
                            },
                        )
                    })
                    .collect(),
            })
            .collect();

        Ok(ChatTurnRequest {
            conversation_id: self.thread_id,
            user_id,
            input,
            instructions: self.instructions,
            client_tools,
            tool_calls: self.tool_calls.into_iter().map(Into::into).collect(),
            tool_results: self
                .tool_results
                .into_iter()
                .map(|r| ToolResult::ok(r.tool_call_id, r.name, r.result))
                .collect(),
        })
    }
}

impl From<ToolCallPayload> for ToolCallDescriptor {
    fn from(payload: ToolCallPayload) -> Self {
        Self {
            id: payload.id,
            name: payload.name,
            arguments: payload.arguments,
            signature: payload.signature,
        }
    }
}

impl From<ToolCallDescriptor> for ToolCallPayload {
    fn from(call: ToolCallDescriptor) -> Self {
        Self {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
            signature: call.signature,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MessagesQuery {
    /// Conversation to read back
    pub thread_id: String,
}

/// A stored conversation turn
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallPayload>,
}

impl From<ConversationTurn> for MessageResponse {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            role: turn.role.to_string(),
            content: turn.content,
            tool_call_id: turn.tool_call_id,
            tool_calls: turn.tool_calls.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessagesResponse {
    pub thread_id: String,
    pub messages: Vec<MessageResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "thread_id": "t1",
            "input": "hello",
            "tools": [{
                "name": "bookFlight",
                "description": "Book a flight",
                "args": {"to": {"type": "string"}, "seats": {"type": "integer", "description": "How many"}}
            }]
        }))
        .unwrap();

        let turn = request.into_turn_request("u1".to_string()).unwrap();

        assert_eq!(turn.conversation_id, "t1");
        assert!(matches!(turn.input, ChatInput::Text(ref t) if t == "hello"));
        assert_eq!(turn.client_tools[0].args["seats"].type_name, "integer");
        assert!(turn.tool_results.is_empty());
    }

    #[test]
    fn test_message_input_and_resume() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "thread_id": "t1",
            "input": [{"role": "user", "content": "book it"}],
            "tool_calls": [{"id": "tc_1", "name": "bookFlight", "arguments": {"to": "HND"}}],
            "tool_results": [{"tool_call_id": "tc_1", "name": "bookFlight", "result": {"ok": true}}]
        }))
        .unwrap();

        let turn = request.into_turn_request("u1".to_string()).unwrap();

        let ChatInput::Turns(turns) = turn.input else {
            panic!("expected message input");
        };
        assert_eq!(turns, vec![ConversationTurn::user("book it")]);
        assert_eq!(turn.tool_calls[0].arguments, json!({"to": "HND"}));
        assert_eq!(turn.tool_results[0].result, json!({"ok": true}));
    }

    #[test]
    fn test_invalid_roles_are_rejected() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "thread_id": "t1",
            "input": [{"role": "tool", "content": "x"}]
        }))
        .unwrap();
        assert!(request.into_turn_request("u1".to_string()).is_err());

        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "thread_id": "t1",
            "input": [{"role": "narrator", "content": "x"}]
        }))
        .unwrap();
        assert!(request.into_turn_request("u1".to_string()).is_err());
    }

    #[test]
    fn test_blank_input_without_tool_results_is_rejected() {
        for input in [json!("   "), json!([]), json!([{"role": "user", "content": " "}])] {
            let request: ChatCompletionRequest =
                serde_json::from_value(json!({"thread_id": "t1", "input": input})).unwrap();
            assert_eq!(
                request.into_turn_request("u1".to_string()).unwrap_err(),
                "input is required"
            );
        }

        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "thread_id": "t1",
            "input": "",
            "tool_results": [{"tool_call_id": "tc_1", "result": {"ok": true}}]
        }))
        .unwrap();
        assert!(request.into_turn_request("u1".to_string()).is_ok());
    }
}
