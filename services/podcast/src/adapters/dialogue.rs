//! services/podcast/src/adapters/dialogue.rs
//!
//! Reads dialogue scripts written in Markdown or Word and turns them into
//! spoken lines. It implements the `DialogueSource` port from the `core` crate.
//!
//! Recognised line shapes:
//!
//! ```text
//! Speaker: text            Speaker：text           Speaker（note）：“text”
//! [Speaker] text           【Speaker】text
//! ```
//!
//! Stage directions in `（…）`/`(…)`, scene markers such as `【开场场景音】` and
//! Markdown decoration are removed before the lines are read. Word documents
//! contribute one line per non-empty paragraph.

use std::path::Path;

use async_trait::async_trait;
use podcast_core::ports::{DialogueSource, PortError, PortResult};
use podcast_core::DialogueLine;
use regex::Regex;
use tracing::debug;

use super::docx;

/// File extensions `ScriptDialogueSource` can read, lowercase.
pub const SCRIPT_EXTENSIONS: [&str; 3] = ["md", "markdown", "docx"];

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `DialogueSource` port for `.md`/`.markdown`/`.docx` files.
pub struct ScriptDialogueSource {
    markdown: MarkdownPatterns,
    dialogue: DialoguePatterns,
}

struct MarkdownPatterns {
    fenced_code: Regex,
    image: Regex,
    link: Regex,
    quote_marker: Regex,
    list_marker: Regex,
    heading_marker: Regex,
    inline_code: Regex,
    html_tag: Regex,
}

struct DialoguePatterns {
    scene_marker: Regex,
    full_width_note: Regex,
    ascii_note: Regex,
    stage_direction_line: Regex,
    colon_before_quote: Regex,
    colon_line: Regex,
    bracket_line: Regex,
    lenticular_line: Regex,
}

impl ScriptDialogueSource {
    /// Compiles the script patterns.
    pub fn new() -> PortResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PortError::Unexpected(format!("bad pattern {}: {}", pattern, e)))
        };

        Ok(Self {
            markdown: MarkdownPatterns {
                fenced_code: compile(r"(?s)```.*?```")?,
                image: compile(r"!\[[^\]]*\]\([^)]+\)")?,
                link: compile(r"\[([^\]]+)\]\([^)]+\)")?,
                quote_marker: compile(r"(?m)^\s*>\s*")?,
                list_marker: compile(r"(?m)^\s*[-*]\s+")?,
                heading_marker: compile(r"(?m)^\s*#{1,6}\s*")?,
                inline_code: compile(r"`([^`]*)`")?,
                html_tag: compile(r"<.*?>")?,
            },
            dialogue: DialoguePatterns {
                scene_marker: compile(r"【[^】]*场景[^】]*】")?,
                full_width_note: compile(r"（[^）]*）")?,
                ascii_note: compile(r"\([^)]*\)")?,
                stage_direction_line: compile(r"^\s*[（(][^）)]*[）)]\s*$")?,
                colon_before_quote: compile(r#"\s*[：:]\s*""#)?,
                colon_line: compile(r"^\s*([^：:（(]+?)\s*(?:（[^）]*）)?\s*[：:]\s*(.+?)\s*$")?,
                bracket_line: compile(r"^\s*\[([^\]]+)\]\s*(.+)$")?,
                lenticular_line: compile(r"^\s*【([^】]+)】\s*(.+)$")?,
            },
        })
    }

    /// Parses a Markdown script into spoken lines, in document order.
    pub fn parse_markdown(&self, text: &str) -> Vec<DialogueLine> {
        self.parse_dialogue(&self.strip_markdown(text))
    }

    /// Parses plain text, one candidate line per line, in document order.
    pub fn parse_text(&self, text: &str) -> Vec<DialogueLine> {
        self.parse_dialogue(text)
    }

    fn strip_markdown(&self, text: &str) -> String {
        let p = &self.markdown;
        let text = p.fenced_code.replace_all(text, "");
        let text = p.image.replace_all(&text, "");
        let text = p.link.replace_all(&text, "$1");
        let text = p.quote_marker.replace_all(&text, "");
        let text = p.list_marker.replace_all(&text, "");
        let text = p.heading_marker.replace_all(&text, "");
        let text = p.inline_code.replace_all(&text, "$1");
        let text = p.html_tag.replace_all(&text, "");
        let text = text.replace('*', "");

        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn parse_dialogue(&self, text: &str) -> Vec<DialogueLine> {
        let cleaned = self.strip_stage_directions(text);
        cleaned
            .lines()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Removes scene markers and parenthesised notes.
    fn strip_stage_directions(&self, text: &str) -> String {
        let p = &self.dialogue;
        let text = p.scene_marker.replace_all(text, "");
        let text = p.full_width_note.replace_all(&text, "");
        let text = p.ascii_note.replace_all(&text, "");
        text.trim().to_string()
    }

    fn parse_line(&self, line: &str) -> Option<DialogueLine> {
        let p = &self.dialogue;
        let line = line.trim();
        if line.is_empty() || p.stage_direction_line.is_match(line) {
            return None;
        }

        let line = normalize_quotes(line);
        let line = p.colon_before_quote.replace_all(&line, ": \"");

        let (speaker, content) = [&p.colon_line, &p.bracket_line, &p.lenticular_line]
            .into_iter()
            .find_map(|pattern| {
                pattern
                    .captures(&line)
                    .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
            })?;

        let content = unwrap_quotes(&self.strip_stage_directions(&content)).to_string();
        let speaker = p.ascii_note.replace_all(&p.full_width_note.replace_all(&speaker, ""), "")
            .trim()
            .to_string();

        if speaker.is_empty() || content.is_empty() {
            debug!(line = %line, "Skipping line without speaker or text");
            return None;
        }
        Some(DialogueLine { speaker, text: content })
    }
}

/// Folds CJK quotation marks into plain double quotes.
fn normalize_quotes(line: &str) -> String {
    line.chars()
        .map(|c| match c {
            '“' | '”' | '「' | '」' | '『' | '』' => '"',
            other => other,
        })
        .collect()
}

/// Drops one pair of matching outer quotes, keeping anything nested inside.
fn unwrap_quotes(content: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = content
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    content
}

//=========================================================================================
// `DialogueSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl DialogueSource for ScriptDialogueSource {
    async fn load_dialogue(&self, path: &Path) -> PortResult<Vec<DialogueLine>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let lines = match extension.as_str() {
            "md" | "markdown" => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => PortError::NotFound(path.display().to_string()),
                    _ => PortError::Unexpected(format!("Failed to read {}: {}", path.display(), e)),
                })?;
                self.parse_markdown(&text)
            }
            "docx" => {
                let owned = path.to_path_buf();
                let text = tokio::task::spawn_blocking(move || docx::read_document_text(&owned))
                    .await
                    .map_err(|e| PortError::Unexpected(format!("Document read task failed: {}", e)))??;
                self.parse_text(&text)
            }
            _ => {
                return Err(PortError::Unsupported(format!(
                    "{} (supported scripts: .md, .markdown, .docx)",
                    path.display()
                )))
            }
        };

        if lines.is_empty() {
            return Err(PortError::NotFound(format!("no dialogue lines in {}", path.display())));
        }
        Ok(lines)
    }
}
