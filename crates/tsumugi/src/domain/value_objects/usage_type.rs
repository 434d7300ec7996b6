//! UsageType - What kind of call a usage record meters

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    #[default]
    Chat,
    Embedding,
    Image,
}

impl std::fmt::Display for UsageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageType::Chat => write!(f, "chat"),
            UsageType::Embedding => write!(f, "embedding"),
            UsageType::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for UsageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(UsageType::Chat),
            "embedding" => Ok(UsageType::Embedding),
            "image" => Ok(UsageType::Image),
            _ => Err(format!("Unknown usage type: {}", s)),
        }
    }
}
