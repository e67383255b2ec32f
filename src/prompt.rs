//! Prompt building from matrix-profile.json
//!
//! Interpolates the column template, the custom instructions and the
//! reference material into the profile's promptFormat.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::extract::ReferenceSet;
use crate::profile::PROFILE;

static TEMPLATE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\t\n]").expect("separator pattern must compile"));

static PLACEHOLDERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(instructions|columns|reference)\}").expect("placeholder pattern must compile")
});

/// Split a raw column template into column names.
///
/// Accepts `,` `;` tab or newline as separators; blank entries are dropped.
pub fn parse_template_columns(template: &str) -> Vec<String> {
    TEMPLATE_SEPARATORS
        .split(template)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Build the generation prompt.
///
/// Replaces `{instructions}`, `{columns}` and `{reference}` in the
/// promptFormat string in one pass, so placeholder-like text inside user
/// input is never expanded. Empty instructions fall back to the profile
/// default. The reference text is passed through whole.
pub fn build_matrix_prompt(columns: &[String], instructions: &str, reference: &ReferenceSet) -> String {
    let instructions = if instructions.trim().is_empty() {
        PROFILE.default_instructions.as_str()
    } else {
        instructions
    };

    let columns = columns.join(" | ");
    let reference = reference.combined();
    PLACEHOLDERS
        .replace_all(&PROFILE.prompt_format, |caps: &Captures| match &caps[1] {
            "instructions" => instructions.to_string(),
            "columns" => columns.clone(),
            _ => reference.clone(),
        })
        .into_owned()
}

/// WASM-friendly version
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "parseTemplateColumns")]
pub fn parse_template_columns_wasm(template: &str) -> String {
    serde_json::to_string(&parse_template_columns(template)).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "buildMatrixPrompt")]
pub fn build_matrix_prompt_wasm(request_json: &str) -> String {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct WasmRequest {
        #[serde(default)]
        reference_text: String,
        #[serde(default)]
        file_texts: Vec<String>,
        #[serde(default)]
        template: String,
        #[serde(default)]
        instructions: String,
    }

    let parsed: WasmRequest = match serde_json::from_str(request_json) {
        Ok(p) => p,
        Err(_) => return String::new(),
    };
    let mut reference = ReferenceSet::new(parsed.reference_text);
    for (i, text) in parsed.file_texts.into_iter().enumerate() {
        reference.push(format!("file-{}", i + 1), text);
    }
    let columns = parse_template_columns(&parsed.template);
    build_matrix_prompt(&columns, &parsed.instructions, &reference)
}
