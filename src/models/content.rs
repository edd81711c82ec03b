/// Typed content blocks for authored email bodies
use serde::{Deserialize, Serialize};

/// Block kinds the renderer understands. Anything else deserializes to
/// `Unknown` and contributes nothing to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Header,
    Text,
    Divider,
    Footer,
    #[serde(other)]
    Unknown,
}

/// One ordered unit of email body content. `content` is trusted HTML: it is
/// emitted verbatim, so it must be sanitized before it reaches this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub id: String,
    pub content: String,
}

impl ContentBlock {
    pub fn new(block_type: BlockType, id: &str, content: &str) -> Self {
        Self {
            block_type,
            id: id.to_string(),
            content: content.to_string(),
        }
    }
}
