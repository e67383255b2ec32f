//! blueprint-matrix: exam blueprint matrix generator core library
//!
//! This crate turns reference material and a column template into
//! section-delimited matrix tables via an AI backend, parses the reply
//! into tables and exports them as an xlsx workbook.
//!
//! Compiles to both native (rlib) and WebAssembly (cdylib via wasm-pack).

pub mod profile;
pub mod table;
pub mod parse;
pub mod prompt;
pub mod extract;
pub mod pipeline;
pub mod validation;
pub mod export;
pub mod render;
#[cfg(feature = "gemini")]
pub mod gemini;

// Re-exports for convenience
pub use profile::{MatrixProfile, ReplyFormat, GenerationParams, ExportParams, Messages, PROFILE};
pub use table::{Table, RowFit, normalize_row};
pub use parse::{parse_matrices, parse_matrices_report, ParseIssue, ParseReport};
pub use prompt::{build_matrix_prompt, parse_template_columns};
pub use extract::{
    extract_batch, extract_paths, DocumentExtractor, ExtractError, FileExtractor, ReferenceFile, ReferenceSet,
    UploadedFile,
};
pub use pipeline::{
    generate_matrices, AiBackend, GenerateConfig, InFlightGuard, MatrixRequest, MatrixResult,
    MatrixSession, PipelineError,
};
pub use validation::{validate_request, validate_tables, ValidationError};
pub use export::{export_to_buffer, export_to_file, sheet_name, ExportError};
pub use render::render_tables;
#[cfg(feature = "gemini")]
pub use gemini::GeminiBackend;
