use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cardforge_contracts::generation::{outcome_payload, GenerationRequest};
use cardforge_contracts::templates::{JsonTemplateStore, MemoryTemplateStore, TemplateStore};
use cardforge_engine::{CardEngine, EngineConfig, ImageNormalizer, TemplateResolver};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cardforge", version, about = "Template-driven greeting card generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a card image and print the structured result.
    Generate(GenerateArgs),
    /// Show how a template title resolves.
    Resolve(ResolveArgs),
    /// Canonicalize an image into a square RGBA PNG.
    Normalize(NormalizeArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    template: String,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    size: Option<String>,
    #[arg(long, env = "CARDFORGE_TEMPLATES")]
    templates: Option<PathBuf>,
    /// Where to write the decoded result image.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, env = "CARDFORGE_EVENTS")]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ResolveArgs {
    #[arg(long)]
    template: String,
    #[arg(long, env = "CARDFORGE_TEMPLATES")]
    templates: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    square_size: Option<u32>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("cardforge error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Resolve(args) => run_resolve(args),
        Command::Normalize(args) => run_normalize(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut config = EngineConfig::from_env();
    if let Some(path) = &args.templates {
        config = config.with_templates(path);
    }
    if let Some(path) = &args.events {
        config = config.with_events(path);
    }
    let engine = CardEngine::from_config(&config)?;

    let mut request = GenerationRequest::new(args.template.clone());
    if let Some(text) = &args.text {
        request = request.with_text(text.clone());
    }
    if let Some(size) = &args.size {
        request = request.with_size(size.clone());
    }
    if let Some(path) = &args.image {
        let bytes =
            fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        request = request.with_image(bytes, image_format_for(path));
    }

    let outcome = engine.process_image_generation(&request);
    let mut payload = outcome_payload(&outcome)?;
    if let (Ok(result), Some(out)) = (&outcome, &args.out) {
        let bytes = BASE64
            .decode(&result.image_base64)
            .context("result image is not valid base64")?;
        write_output(out, &bytes)?;
        info!(path = %out.display(), bytes = bytes.len(), "wrote result image");
        if let Value::Object(fields) = &mut payload {
            fields.insert("image_base64".to_string(), Value::String(String::new()));
            fields.insert("output_path".to_string(), json!(out.display().to_string()));
        }
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(if outcome.is_ok() { 0 } else { 1 })
}

fn run_resolve(args: ResolveArgs) -> Result<i32> {
    let store: Arc<dyn TemplateStore> = match &args.templates {
        Some(path) => Arc::new(JsonTemplateStore::new(path)),
        None => Arc::new(MemoryTemplateStore::default()),
    };
    let resolved = TemplateResolver::new(store).resolve(&args.template);
    let payload = json!({
        "title": resolved.title,
        "prompt": resolved.prompt,
        "reference_image": resolved
            .reference_image
            .as_ref()
            .map(|path| path.display().to_string()),
        "has_template_image": resolved.existing_reference_image().is_some(),
        "default_size": resolved.default_size,
        "source": resolved.source.as_str(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(0)
}

fn run_normalize(args: NormalizeArgs) -> Result<i32> {
    let square_size = args
        .square_size
        .unwrap_or_else(|| EngineConfig::from_env().square_size);
    let canonical = ImageNormalizer::new(square_size).canonicalize_file(&args.input)?;
    write_output(&args.out, &canonical.bytes)?;
    let payload = json!({
        "output_path": args.out.display().to_string(),
        "width": canonical.width,
        "height": canonical.height,
        "source_mode": canonical.source_mode.as_str(),
        "squared": canonical.squared,
        "size_bytes": canonical.bytes.len(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(0)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed writing {}", path.display()))
}

fn image_format_for(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime.to_string())
}
