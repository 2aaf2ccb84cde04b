//! Labeled fenced-block grammar
//!
//! Uses pulldown-cmark to walk the model's markdown. A file block is a marker
//! line `File: <path>` directly followed by a fenced code block:
//!
//! ````text
//! ### File: `src/main.js`
//! ```js
//! console.log("hi");
//! ```
//! ````
//!
//! The marker may be a paragraph, a heading, a list item, bold or inline code.
//! Any other text, and any fence without a marker, is ignored.

use crate::artifact::ParsedArtifact;
use crate::error::ParseError;
use crate::path::ArtifactPath;
use pulldown_cmark::{CodeBlockKind, Event, Parser as MdParser, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

/// Marker prefix, matched case-sensitively
pub const FILE_MARKER: &str = "File:";

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"^\s*File:[ \t]*(?P<path>.*?)\s*$").unwrap_or_else(|e| panic!("marker regex: {e}"))
    })
}

/// Extract the declared path from the last line of a text run
fn marker_path(text: &str) -> Option<String> {
    let line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    let captures = marker_regex().captures(line)?;
    let path = captures
        .name("path")
        .map_or("", |m| m.as_str())
        .trim_matches(|c| matches!(c, '`' | '"' | '\''));
    Some(path.trim().to_string())
}

/// Parse labeled blocks into an artifact
///
/// # Errors
/// [`ParseError::EmptyArtifact`] when no valid block remains.
pub fn parse_blocks(text: &str) -> Result<ParsedArtifact, ParseError> {
    let mut artifact = ParsedArtifact::new();

    // Text of the paragraph, heading or list item being read
    let mut inline_text: Option<String> = None;
    // Path declared by the most recent marker, until the next block consumes it
    let mut pending: Option<String> = None;
    // Body of the fenced block being read
    let mut code: Option<String> = None;

    for event in MdParser::new(text) {
        match event {
            Event::Start(Tag::Paragraph | Tag::Heading { .. } | Tag::Item) => {
                inline_text = Some(String::new());
            }
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                if let Some(run) = inline_text.take() {
                    pending = marker_path(&run);
                }
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                // A fence nested in a list item follows the item's own text
                if let Some(run) = inline_text.take() {
                    pending = marker_path(&run);
                }
                match kind {
                    CodeBlockKind::Fenced(_) => code = Some(String::new()),
                    CodeBlockKind::Indented => {
                        code = None;
                        pending = None;
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let (Some(path), Some(body)) = (pending.take(), code.take()) {
                    accept_block(&mut artifact, &path, body);
                }
            }
            Event::Text(chunk) => {
                if let Some(body) = code.as_mut() {
                    body.push_str(&chunk);
                } else if let Some(run) = inline_text.as_mut() {
                    run.push_str(&chunk);
                }
            }
            Event::Code(chunk) => {
                if let Some(run) = inline_text.as_mut() {
                    run.push_str(&chunk);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(run) = inline_text.as_mut() {
                    run.push('\n');
                }
            }
            Event::Rule => pending = None,
            _ => {}
        }
    }

    if artifact.is_empty() {
        return Err(ParseError::empty("no labeled file blocks found"));
    }
    Ok(artifact)
}

fn accept_block(artifact: &mut ParsedArtifact, raw_path: &str, body: String) {
    if raw_path.is_empty() {
        tracing::debug!("dropping file block with empty path");
        return;
    }
    if body.trim().is_empty() {
        tracing::debug!(path = raw_path, "dropping file block with empty content");
        return;
    }
    match raw_path.parse::<ArtifactPath>() {
        Ok(path) => {
            if artifact.insert(path, body).is_some() {
                tracing::debug!(path = raw_path, "later block replaces earlier block");
            }
        }
        Err(e) => tracing::warn!(path = raw_path, error = %e, "dropping file block with invalid path"),
    }
}
