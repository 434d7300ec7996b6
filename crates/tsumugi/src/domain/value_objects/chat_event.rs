//! ChatEvent - Events written to a turn's output sink

use serde::Serialize;

use crate::domain::entities::ToolCallDescriptor;

/// Event emitted while a chat turn is processed.
///
/// Within one turn the order is: at most one `Started`, any number of
/// `Delta`, then exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "text_created")]
    Started,
    #[serde(rename = "text_delta")]
    Delta { content: String },
    /// Client tools the caller must execute and resubmit
    #[serde(rename = "tool_call")]
    ToolCallDetected {
        #[serde(rename = "tool_call")]
        calls: Vec<ToolCallDescriptor>,
    },
    #[serde(rename = "text_done")]
    Completed { content: String },
    /// The turn failed after the stream was opened
    #[serde(rename = "error")]
    Failed { message: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatEvent::ToolCallDetected { .. } | ChatEvent::Completed { .. } | ChatEvent::Failed { .. }
        )
    }
}
