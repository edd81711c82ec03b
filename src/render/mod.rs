//! Content renderer: ordered typed blocks -> one HTML document.

use tracing::warn;

use crate::models::content::{BlockType, ContentBlock};

/// Default rule style when a divider block carries no style of its own.
const DEFAULT_DIVIDER_STYLE: &str = "border:none;border-top:1px solid #e0e0e0;margin:24px 0;";

/// Body used when a serialized block list cannot be parsed. Sends stay
/// non-blocking at the cost of dropping the authored content.
const FALLBACK_BODY: &str = "<p>Hello! Thanks for reading our updates.</p>";

/// Render one block to its HTML fragment. Block content is emitted verbatim:
/// it is trusted, pre-sanitized HTML by contract with the authoring side.
fn render_block(block: &ContentBlock) -> Option<String> {
    match block.block_type {
        BlockType::Header => Some(format!(
            "<h2 style=\"margin:0 0 16px;font-size:24px;line-height:1.3;\">{}</h2>",
            block.content
        )),
        BlockType::Text => Some(format!(
            "<p style=\"margin:0 0 16px;font-size:15px;line-height:1.6;\">{}</p>",
            block.content
        )),
        BlockType::Divider => {
            let style = if block.content.is_empty() {
                DEFAULT_DIVIDER_STYLE
            } else {
                &block.content
            };
            Some(format!("<hr style=\"{}\">", style))
        }
        BlockType::Footer => Some(format!(
            "<div style=\"margin-top:24px;font-size:12px;color:#888;\">{}</div>",
            block.content
        )),
        BlockType::Unknown => None,
    }
}

/// Wrap an already-rendered fragment in the document shell. The shell always
/// carries a `<body>` element; the tracking injector anchors on its close tag.
fn wrap_document(fragment: &str) -> String {
    format!(
        "<html><head><meta charset=\"utf-8\"></head><body>\
         <div style=\"max-width:600px;margin:0 auto;font-family:Arial,Helvetica,sans-serif;color:#222;\">\
         {}</div></body></html>",
        fragment
    )
}

/// Render an ordered block sequence into a full HTML document. Pure: the same
/// input always yields byte-identical output.
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    let fragment: String = blocks.iter().filter_map(render_block).collect();
    wrap_document(&fragment)
}

/// Render a serialized block list. Malformed input falls back to a fixed
/// greeting document instead of failing the send.
pub fn render_serialized(serialized: &str) -> String {
    match serde_json::from_str::<Vec<ContentBlock>>(serialized) {
        Ok(blocks) => render_blocks(&blocks),
        Err(e) => {
            warn!(error = %e, "content blocks failed to parse, using fallback body");
            wrap_document(FALLBACK_BODY)
        }
    }
}
