//! matrix-profile.json parser and typed accessors
//!
//! Embeds matrix-profile.json at compile time via `include_str!` and provides
//! the single source of truth for the reply format, prompt template,
//! generation parameters and user-facing messages.

use std::sync::LazyLock;
use serde::Deserialize;

/// Raw JSON embedded at compile time
const PROFILE_JSON: &str = include_str!("../matrix-profile.json");

/// Parsed matrix-profile.json (singleton)
pub static PROFILE: LazyLock<MatrixProfile> = LazyLock::new(|| {
    serde_json::from_str(PROFILE_JSON).expect("Failed to parse embedded matrix-profile.json")
});

/// Top-level matrix profile
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MatrixProfile {
    pub version: String,
    pub format: ReplyFormat,
    pub default_template: String,
    pub default_instructions: String,
    pub prompt_format: String,
    pub generation: GenerationParams,
    pub export: ExportParams,
    pub messages: Messages,
}

/// Markers of the line-oriented reply format
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFormat {
    pub section_marker: String,
    pub header_prefix: String,
    pub row_prefix: String,
    pub cell_delimiter: String,
    pub default_title: String,
}

/// Fixed generation parameters sent with every prompt
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub model: String,
    pub endpoint: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub thinking_budget: u32,
}

/// Workbook export settings
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub file_name: String,
    pub sheet_name_max_chars: usize,
}

/// User-facing error texts
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Messages {
    pub missing_reference: String,
    pub empty_result: String,
    pub generation_failed: String,
    pub busy: String,
}

// === Accessor functions ===

/// Get the reply format markers
pub fn reply_format() -> &'static ReplyFormat {
    &PROFILE.format
}

/// Get the title used when a section has no title line
pub fn default_title() -> &'static str {
    &PROFILE.format.default_title
}

/// Get the default column template
pub fn default_template() -> &'static str {
    &PROFILE.default_template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parses() {
        let profile = &*PROFILE;
        assert_eq!(profile.version, "1.0.0");
        assert!(!profile.prompt_format.is_empty());
        assert!(!profile.default_template.is_empty());
    }

    #[test]
    fn test_reply_format_markers() {
        let f = reply_format();
        assert_eq!(f.section_marker, "SECTION:");
        assert_eq!(f.header_prefix, "HEADERS:");
        assert_eq!(f.row_prefix, "ROW:");
        assert_eq!(f.cell_delimiter, "|||");
        assert_eq!(default_title(), "Ma trận");
    }

    #[test]
    fn test_prompt_format_has_placeholders() {
        let p = &PROFILE.prompt_format;
        assert!(p.contains("{instructions}"));
        assert!(p.contains("{columns}"));
        assert!(p.contains("{reference}"));
    }

    #[test]
    fn test_generation_params() {
        let g = &PROFILE.generation;
        assert_eq!(g.model, "gemini-3-pro-preview");
        assert!((g.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(g.max_output_tokens, 20000);
        assert_eq!(g.thinking_budget, 8000);
    }

    #[test]
    fn test_export_params() {
        let e = &PROFILE.export;
        assert_eq!(e.sheet_name_max_chars, 30);
        assert!(e.file_name.ends_with(".xlsx"));
    }
}
