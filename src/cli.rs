//! CLI: extract (raw pages → Doc) and schema (Doc → JSON Schema)
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use data_raw_schema::compile::split_reference;
use data_raw_schema::{CompileOptions, Doc, RawDoc, extract};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// turn the Factorio API documentation into a JSON Schema for Data.raw
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,

    /// log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// parse the type prose of scraped documentation pages into a Doc
    Extract(ExtractOut),
    /// compile a Doc into a JSON Schema
    Schema(SchemaOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JQ pre-process filter for each input document (the place for
    /// corrections of known documentation mistakes)
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns.
    /// Several inputs are concatenated.
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct ExtractOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// inputs are raw documentation pages; extract them first
    #[arg(long)]
    raw: bool,

    /// type or prototype names to leave out, along with everything that
    /// becomes empty without them
    #[arg(long, num_args = 1..)]
    forbid: Vec<String>,

    /// only describe these prototypes (by name, name without the "Prototype"
    /// suffix, or Data.raw key)
    #[arg(long, num_args = 1..)]
    prototype: Vec<String>,

    /// with --prototype, also describe every prototype inheriting from them
    #[arg(long)]
    descendants: bool,

    /// reject undocumented properties
    #[arg(long)]
    strict: bool,

    /// root URL of the documentation, for each definition's description
    #[arg(long, default_value = "https://lua-api.factorio.com/stable/")]
    doc_root: String,

    /// JQ post-process filter for the emitted schema
    #[arg(long)]
    post_jq_expr: Option<String>,

    /// output .json file (stdout if omitted)
    #[arg(short, long, conflicts_with = "split_dir")]
    out: Option<PathBuf>,

    /// write schema.json and definitions/<name>.json under this directory
    #[arg(long)]
    split_dir: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    /// Every input document, pre-processed and decoded as `T`.
    fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .context("failed to resolve input file paths")?;
        let mut out = Vec::with_capacity(source_paths.len());
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            debug!(path = %source_path_str, "reading input");
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            let sources = match self.jq_expr.as_ref() {
                None => vec![source],
                Some(jq_expr) => {
                    let json_value = data_raw_schema::path_de::from_str_with_path::<Value>(&source)
                        .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                    data_raw_schema::jq_exec::run_jaq(jq_expr, &json_value)
                        .with_context(|| format!("failed to apply jq expression to source file ({source_path_str})"))?
                        .iter()
                        .map(Value::to_string)
                        .collect()
                }
            };
            for source in sources {
                let document = data_raw_schema::path_de::from_str_with_path::<T>(&source)
                    .with_context(|| format!("failed to decode source file ({source_path_str})"))?;
                out.push(document);
            }
        }
        Ok(out)
    }

    fn load_raw_doc(&self) -> Result<RawDoc> {
        let mut raw = RawDoc::default();
        for part in self.load::<RawDoc>()? {
            raw.types.extend(part.types);
            raw.prototypes.extend(part.prototypes);
        }
        Ok(raw)
    }

    fn load_doc(&self) -> Result<Doc> {
        let mut doc = Doc::default();
        for part in self.load::<Doc>()? {
            doc.merge(part);
        }
        Ok(doc)
    }
}

impl SchemaOut {
    fn compile_options(&self) -> CompileOptions {
        let mut options = CompileOptions::default()
            .forbid(self.forbid.iter().cloned())
            .with_descendants(self.descendants);
        if !self.prototype.is_empty() {
            options = options.limit_to(self.prototype.iter().cloned());
        }
        if self.split_dir.is_some() {
            options = options.with_make_reference(split_reference);
        }
        options.doc_root = self.doc_root.clone();
        options.strict_properties = self.strict;
        options
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        let command_line_interface = Self::parse();
        init_tracing(command_line_interface.verbose);
        command_line_interface
    }
    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Extract(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(())
                }

                let raw = target.input_settings.load_raw_doc()?;
                let doc = extract_reporting(&raw)?;
                write_json(target.out.as_deref(), &doc)
            }
            Command::Schema(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(())
                }

                // 1) load (and possibly extract) the documentation
                let doc = if target.raw {
                    extract_reporting(&target.input_settings.load_raw_doc()?)?
                } else {
                    target.input_settings.load_doc()?
                };

                // 2) compile
                let options = target.compile_options();
                info!(?options, "compiling");
                let schema = data_raw_schema::compile(&doc, &options)?;
                info!(definitions = schema.definitions.len(), "compiled");

                // 3) write, either as one document or split per definition
                if let Some(dir) = target.split_dir.as_ref() {
                    for (relative_path, document) in schema.split_files() {
                        let document = post_process(target.post_jq_expr.as_deref(), document)?;
                        write_json(Some(dir.join(relative_path).as_path()), &document)?;
                    }
                    Ok(())
                } else {
                    let document = post_process(target.post_jq_expr.as_deref(), schema.to_json())?;
                    write_json(target.out.as_deref(), &document)
                }
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Extract, printing every diagnostic to stderr.
fn extract_reporting(raw: &RawDoc) -> Result<Doc> {
    let extraction = extract(raw)?;
    for diagnostic in &extraction.diagnostics {
        eprintln!("{}: {diagnostic}", "placeholder".yellow().bold());
    }
    if !extraction.diagnostics.is_empty() {
        eprintln!(
            "{} {} part(s) could not be parsed and accept any value",
            "note:".cyan(),
            extraction.diagnostics.len(),
        );
    }
    Ok(extraction.doc)
}

fn post_process(jq_expr: Option<&str>, document: Value) -> Result<Value> {
    match jq_expr {
        None => Ok(document),
        Some(jq_expr) => data_raw_schema::jq_exec::rewrite(jq_expr, &document)
            .context("failed to apply jq expression to the emitted schema"),
    }
}

fn write_json<T: Serialize>(out: Option<&Path>, value: &T) -> Result<()> {
    let src = serde_json::to_string_pretty(value)?;
    if let Some(out) = out {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(out, &src).with_context(|| format!("failed to write {}", out.display()))?;
    } else {
        println!("{src}");
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched = glob::glob(pattern)
                .with_context(|| format!("invalid glob pattern: {pattern}"))?
                .collect::<Result<Vec<_>, _>>()?;
            if matched.is_empty() {
                bail!("glob pattern matched no files: {pattern}");
            }
            matched.sort();
            out.extend(matched);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
