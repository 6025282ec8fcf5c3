//! §3 data model: the types that flow between the orchestrator and its
//! tool providers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One slide's structured content.
///
/// Invariant: if `bullets` is non-empty, every element is non-empty after
/// trimming; `script` is right-trimmed to `max_script_chars` by the
/// summarizer tool before this type is constructed (see
/// `reportdeck-tools::summarizer`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub bullets: Vec<String>,
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_SUBTITLE_CHARS: usize = 160;
pub const MAX_IMAGE_PROMPT_CHARS: usize = 200;
pub const DEFAULT_MAX_SCRIPT_CHARS: usize = 700;
pub const MIN_BULLETS: usize = 3;
pub const MAX_BULLETS: usize = 8;

impl Section {
    /// Validate against the §3 Section invariants, trimming bullets in place.
    pub fn validate(&mut self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::invalid_output("section title is empty"));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            self.title = truncate_chars(&self.title, MAX_TITLE_CHARS);
        }
        if let Some(sub) = &self.subtitle {
            if sub.chars().count() > MAX_SUBTITLE_CHARS {
                self.subtitle = Some(truncate_chars(sub, MAX_SUBTITLE_CHARS));
            }
        }
        self.bullets = self
            .bullets
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if self.bullets.is_empty() {
            return Err(Error::invalid_output(
                "section bullets must contain at least one non-empty entry",
            ));
        }
        if let Some(prompt) = &self.image_prompt {
            if prompt.chars().count() > MAX_IMAGE_PROMPT_CHARS {
                self.image_prompt = Some(truncate_chars(prompt, MAX_IMAGE_PROMPT_CHARS));
            }
        }
        Ok(())
    }

    /// Right-trim `script` to at most `max_chars`, per §4.6 step 5.
    pub fn clamp_script(&mut self, max_chars: usize) {
        if self.script.chars().count() > max_chars {
            self.script = truncate_chars(&self.script, max_chars);
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Output of the summarizer tool (C6). §3: length in `1..=10`.
///
/// A legacy single-section wire form (the `Section` fields hoisted to the
/// top level) is accepted via [`SummarizerOutput::from_json_value`] and
/// normalized into a one-element `sections` vec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerOutput {
    pub sections: Vec<Section>,
}

pub const MAX_SECTIONS: usize = 10;

impl SummarizerOutput {
    /// Parse a backend response that may be:
    /// - a single JSON object in the legacy single-section shape,
    /// - a single JSON object in the `{sections: [...]}` shape,
    /// - a one-element array wrapping either of the above.
    ///
    /// Rejects list forms with a length other than 1 (§9 "one-or-list"
    /// normalizer).
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let obj = match value {
            serde_json::Value::Array(mut items) => {
                if items.len() != 1 {
                    return Err(Error::invalid_output(format!(
                        "expected a single object or a one-element array, got {} elements",
                        items.len()
                    )));
                }
                items.remove(0)
            }
            other => other,
        };

        if let Some(map) = obj.as_object() {
            if map.contains_key("sections") {
                let mut out: SummarizerOutput = serde_json::from_value(obj)
                    .map_err(|e| Error::invalid_output(format!("malformed sections: {e}")))?;
                out.validate_and_normalize()?;
                return Ok(out);
            }
        }

        // Legacy single-section form: the Section fields are top-level.
        let section: Section = serde_json::from_value(obj)
            .map_err(|e| Error::invalid_output(format!("malformed section: {e}")))?;
        let mut out = SummarizerOutput {
            sections: vec![section],
        };
        out.validate_and_normalize()?;
        Ok(out)
    }

    fn validate_and_normalize(&mut self) -> Result<()> {
        if self.sections.is_empty() || self.sections.len() > MAX_SECTIONS {
            return Err(Error::invalid_output(format!(
                "sections length must be 1..={MAX_SECTIONS}, got {}",
                self.sections.len()
            )));
        }
        for section in &mut self.sections {
            section.validate()?;
        }
        Ok(())
    }
}

/// Image artifact produced by the image generator (C7). Exactly one
/// transport form is populated per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageArtifact {
    Local { value: String },
    Url { value: String },
    Handle { value: String },
}

/// Reference to a presentation built during one request. Append-only
/// `slide_ids` within that request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckRef {
    pub presentation_id: String,
    pub url: String,
    pub slide_ids: Vec<String>,
}

impl DeckRef {
    pub fn new(presentation_id: impl Into<String>) -> Self {
        let presentation_id = presentation_id.into();
        let url = format!("https://slides.example/presentation/{presentation_id}");
        Self {
            presentation_id,
            url,
            slide_ids: Vec::new(),
        }
    }
}

/// A content-addressed cache entry (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub namespace: String,
    pub value: serde_json::Value,
    pub created_at: i64,
}

/// A recorded idempotent operation (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyEntry {
    pub client_key: String,
    pub deck_ref: DeckRef,
    pub recorded_at: i64,
}

/// One column's declared type in a [`Dataset`] sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
}

/// One sheet within an ingested dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Path to the sheet's backing table file (a SQLite database
    /// containing a single table named `t`; see DESIGN.md for why
    /// reportdeck stores sheets this way instead of a columnar format).
    pub table_path: String,
}

/// A dataset ingested by C9. `dataset_id` is globally unique
/// (`ds_<8hex>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_id: String,
    pub source_name: String,
    pub sheets: Vec<SheetInfo>,
    pub created_at: i64,
}

impl Dataset {
    pub fn sheet(&self, name: Option<&str>) -> Option<&SheetInfo> {
        match name {
            Some(n) => self.sheets.iter().find(|s| s.name == n),
            None => self.sheets.first(),
        }
    }
}

/// Result of the NL→SQL→chart/insights pipeline (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub sql: String,
    pub rows: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_path: Option<String>,
    pub insights: Vec<String>,
}
