use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use blueprint_matrix::{
    export::{default_file_name, export_to_file},
    extract::{DocumentExtractor, FileExtractor, ReferenceSet, UploadedFile},
    gemini::GeminiBackend,
    parse::parse_matrices_report,
    pipeline::{GenerateConfig, MatrixRequest, MatrixSession, PipelineError},
    profile::default_template,
    prompt::{build_matrix_prompt, parse_template_columns},
    render::render_tables,
    validation::{check_strict, validate_request},
};

#[derive(Parser)]
#[command(name = "blueprint-matrix")]
#[command(about = "Generate exam blueprint matrices from reference material", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call the generation service and export the resulting matrices
    Generate {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        template: TemplateArgs,
        /// Model name, overriding the profile default
        #[arg(long)]
        model: Option<String>,
        /// Request timeout in seconds (no timeout when omitted)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Workbook path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also write the raw reply to this path
        #[arg(long)]
        save_response: Option<PathBuf>,
        /// Fail when the reply needed row padding, truncation or fallback headers
        #[arg(long)]
        strict: bool,
    },

    /// Parse a saved reply offline, render it and export the workbook
    Parse {
        /// Saved reply text
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        template: TemplateArgs,
        /// Workbook path
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        strict: bool,
    },

    /// Print the assembled prompt without calling the service
    Prompt {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        template: TemplateArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Inline reference text
    #[arg(long, default_value = "")]
    reference: String,
    /// Reference file (pdf, docx, xlsx, xls or plain text); repeatable
    #[arg(long = "file")]
    files: Vec<PathBuf>,
    /// Extra instructions appended to the prompt
    #[arg(long, default_value = "")]
    instructions: String,
}

#[derive(Args)]
struct TemplateArgs {
    /// Column template, e.g. "STT, Nội dung, Số câu"
    #[arg(long, conflicts_with = "template_file")]
    template: Option<String>,
    /// Read the column template from a file
    #[arg(long)]
    template_file: Option<PathBuf>,
}

fn main() {
    // ─── init logging ────────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        match err.downcast_ref::<PipelineError>() {
            Some(pipeline_err) => eprintln!("{}\n({:#})", pipeline_err.user_message(), err),
            None => eprintln!("error: {:#}", err),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate {
            source,
            template,
            model,
            timeout_secs,
            output,
            save_response,
            strict,
        } => {
            let request = build_request(&FileExtractor, &source, &template)?;

            let mut backend = GeminiBackend::from_env()?;
            if let Some(model) = model {
                backend = backend.with_model(model);
            }
            if let Some(secs) = timeout_secs {
                backend = backend.with_timeout(Some(Duration::from_secs(secs)))?;
            }

            let session = MatrixSession::new();
            let result = session.generate(&backend, &request, &GenerateConfig { strict })?;

            if let Some(path) = save_response {
                fs::write(&path, &result.raw_response)
                    .with_context(|| format!("writing reply to {}", path.display()))?;
                info!(path = %path.display(), "raw reply saved");
            }

            print!("{}", render_tables(&result.tables));
            let path = output_path(output);
            export_to_file(&result.tables, &path)
                .with_context(|| format!("exporting {}", path.display()))?;
        }

        Commands::Parse {
            input,
            template,
            output,
            strict,
        } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("reading reply from {}", input.display()))?;
            let columns = parse_template_columns(&load_template(&FileExtractor, &template)?);

            let report = parse_matrices_report(&raw, &columns);
            for issue in &report.issues {
                warn!(%issue, "reply normalized");
            }
            if report.tables.is_empty() {
                return Err(PipelineError::EmptyResult.into());
            }
            if strict {
                check_strict(&report)?;
            }

            print!("{}", render_tables(&report.tables));
            let path = output_path(output);
            export_to_file(&report.tables, &path)
                .with_context(|| format!("exporting {}", path.display()))?;
        }

        Commands::Prompt { source, template } => {
            let request = build_request(&FileExtractor, &source, &template)?;
            let columns = validate_request(&request)?;
            println!(
                "{}",
                build_matrix_prompt(&columns, &request.instructions, &request.reference)
            );
        }
    }
    Ok(())
}

/// Assemble a request from flags: inline text, extracted files and template.
fn build_request(
    extractor: &dyn DocumentExtractor,
    source: &SourceArgs,
    template: &TemplateArgs,
) -> Result<MatrixRequest> {
    let mut reference = ReferenceSet::new(source.reference.clone());
    let added = reference.add_paths(extractor, &source.files);
    if added < source.files.len() {
        warn!(skipped = source.files.len() - added, "some reference files could not be read");
    }

    Ok(MatrixRequest {
        reference,
        template: load_template(extractor, template)?,
        instructions: source.instructions.clone(),
    })
}

/// Template text from `--template`, `--template-file`, or the profile default.
fn load_template(extractor: &dyn DocumentExtractor, args: &TemplateArgs) -> Result<String> {
    if let Some(text) = &args.template {
        return Ok(text.clone());
    }
    match &args.template_file {
        Some(path) => {
            let file = UploadedFile::from_path(path)?;
            let text = extractor
                .extract(&file)
                .with_context(|| format!("reading template from {}", path.display()))?;
            Ok(text)
        }
        None => Ok(default_template().to_string()),
    }
}

fn output_path(output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| PathBuf::from(default_file_name()))
}
