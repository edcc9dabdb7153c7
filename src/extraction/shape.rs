//! Result shapes: what the model is asked to return and how it is parsed.

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Which JSON structure the model is asked to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// Labeled blocks in reading order.
    #[default]
    Segmented,
    /// A single run of text.
    #[serde(rename = "flat")]
    FlatText,
}

const SEGMENTED_INSTRUCTION: &str = "Transcribe all text in this scanned document image. \
Respond with JSON only, no commentary, using exactly this structure: \
{\"blocks\": [{\"label\": \"...\", \"text\": \"...\"}], \"notes\": [\"...\"]}. \
Use one block per visually distinct region (heading, paragraph, table, address, signature, ...) \
in reading order, labeled by what the region is. Preserve line breaks inside each block. \
Use notes for illegible, cut-off or uncertain sections and omit notes when there are none.";

const FLAT_INSTRUCTION: &str = "Transcribe all text in this scanned document image. \
Respond with JSON only, no commentary, using exactly this structure: \
{\"text\": \"...\", \"notes\": [\"...\"]}. \
Preserve the original reading order and line breaks in text. \
Use notes for illegible, cut-off or uncertain sections and omit notes when there are none.";

impl ResultShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultShape::Segmented => "segmented",
            ResultShape::FlatText => "flat",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "segmented" | "blocks" => Some(ResultShape::Segmented),
            "flat" | "text" => Some(ResultShape::FlatText),
            _ => None,
        }
    }

    /// Fixed instruction sent alongside the image.
    pub fn instruction(&self) -> &'static str {
        match self {
            ResultShape::Segmented => SEGMENTED_INSTRUCTION,
            ResultShape::FlatText => FLAT_INSTRUCTION,
        }
    }

    /// Parse the model's answer into a result of this shape.
    pub fn parse(&self, raw: &str) -> Result<ExtractionResult, ExtractionError> {
        let json = strip_code_fence(raw);
        match self {
            ResultShape::Segmented => {
                let payload: SegmentedPayload = serde_json::from_str(json)
                    .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
                if payload.blocks.is_empty() {
                    return Err(ExtractionError::Empty);
                }
                Ok(ExtractionResult::Segmented {
                    blocks: payload.blocks,
                    notes: payload.notes.unwrap_or_default(),
                })
            }
            ResultShape::FlatText => {
                let payload: FlatPayload = serde_json::from_str(json)
                    .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
                if payload.text.trim().is_empty() {
                    return Err(ExtractionError::Empty);
                }
                Ok(ExtractionResult::FlatText {
                    text: payload.text,
                    notes: payload.notes.unwrap_or_default(),
                })
            }
        }
    }
}

impl std::fmt::Display for ResultShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One labeled region of recognized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub label: String,
    pub text: String,
}

impl TextBlock {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SegmentedPayload {
    blocks: Vec<TextBlock>,
    #[serde(default)]
    notes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FlatPayload {
    text: String,
    #[serde(default)]
    notes: Option<Vec<String>>,
}

/// Structured text returned by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Segmented {
        blocks: Vec<TextBlock>,
        notes: Vec<String>,
    },
    FlatText {
        text: String,
        notes: Vec<String>,
    },
}

impl ExtractionResult {
    pub fn shape(&self) -> ResultShape {
        match self {
            ExtractionResult::Segmented { .. } => ResultShape::Segmented,
            ExtractionResult::FlatText { .. } => ResultShape::FlatText,
        }
    }

    /// Segment texts in order; the flat variant is a single segment.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            ExtractionResult::Segmented { blocks, .. } => {
                blocks.iter().map(|b| b.text.as_str()).collect()
            }
            ExtractionResult::FlatText { text, .. } => vec![text.as_str()],
        }
    }

    pub fn notes(&self) -> &[String] {
        match self {
            ExtractionResult::Segmented { notes, .. } | ExtractionResult::FlatText { notes, .. } => {
                notes
            }
        }
    }

    /// Render the segment part of the text artifact.
    pub fn render_segments(&self) -> String {
        match self {
            ExtractionResult::Segmented { blocks, .. } => blocks
                .iter()
                .map(|b| format!("[{}]\n{}", b.label.trim(), b.text.trim_end()))
                .collect::<Vec<_>>()
                .join("\n\n"),
            ExtractionResult::FlatText { text, .. } => text.trim_end().to_string(),
        }
    }

    /// Section contents for the batch document.
    pub fn sections(&self) -> Vec<String> {
        self.texts().into_iter().map(str::to_string).collect()
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
