//! CLI binary for rex-report.
//!
//! A thin shim over the library crate: maps CLI flags to `ReportConfig`,
//! drives one `Session` and renders its state on the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rex_report::{
    load_image, Credentials, Phase, ReportConfig, ReportId, ReportWriter, Session,
    SessionObserver, Stage, VisionExtractor,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type CliSession = Session<VisionExtractor, ReportWriter>;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ───────────────────────────────────

/// Terminal observer: shows a spinner while a model call is in flight and
/// one summary line when it ends.
struct CliSpinner {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliSpinner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn start(&self, prefix: &str, msg: String) {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        bar.set_message(msg);
        bar.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut slot) = self.bar.lock() {
            if let Some(old) = slot.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut slot| slot.take()) {
            bar.finish_and_clear();
        }
    }
}

impl SessionObserver for CliSpinner {
    fn on_extraction_start(&self, image_name: &str, image_bytes: usize) {
        self.start(
            "Extracting",
            format!("{image_name} {}", dim(&format!("({image_bytes} bytes)"))),
        );
    }

    fn on_extraction_complete(&self, text_len: usize) {
        self.finish();
        eprintln!(
            "{} Extracted {}",
            green("✔"),
            bold(&format!("{text_len} chars"))
        );
    }

    fn on_generation_start(&self, text_len: usize) {
        self.start(
            "Generating",
            format!("pathology report from {text_len} chars"),
        );
    }

    fn on_generation_complete(&self, id: &ReportId, report_len: usize) {
        self.finish();
        eprintln!(
            "{} Report {}  {}",
            green("✔"),
            bold(&id.to_string()),
            dim(&format!("{report_len} chars"))
        );
    }

    fn on_stage_error(&self, _stage: Stage, _message: &str) {
        // The caller prints the error itself.
        self.finish();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract, review interactively, generate and download
  # (a failed upload keeps the prompt open; use `upload <path>` to retry)
  rex-report lab_slip.jpg

  # Straight through: extract, generate, write the report file
  rex-report --no-review lab_slip.jpg -o reports/

  # Only transcribe the image
  rex-report --extract-only scan.png

  # JSON output for scripting
  rex-report --json scan.png > report.json

  # Other models
  rex-report --vision-model gpt-4o --generation-provider openai \
             --generation-model gpt-4o scan.png

INTERACTIVE COMMANDS:
  u, upload <path>  Load another image and extract its text
  e, edit           Open the current text in $VISUAL / $EDITOR
  s, show           Print the current text (and report, if any)
  g, generate       Generate a report from the current text
  d, download       Write the report to the output directory
  q, quit           Exit

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (default vision provider)
  ANTHROPIC_API_KEY       Anthropic API key (default generation provider)
  GEMINI_API_KEY          Google Gemini API key
  REX_VISION_PROVIDER     Override vision provider
  REX_VISION_MODEL        Override vision model ID
  REX_GENERATION_PROVIDER Override generation provider
  REX_GENERATION_MODEL    Override generation model ID
  RUST_LOG                Log filter (overrides -v / -q)

  Variables may also be placed in a .env file in the working directory.
"#;

/// Turn medical report images into structured pathology reports.
#[derive(Parser, Debug)]
#[command(
    name = "rex-report",
    version,
    about = "Turn medical report images into structured pathology reports",
    long_about = "Extract the text of a photographed or scanned medical report with a vision \
model, review and correct it, then have a second model write a structured pathology report \
that can be saved as a plain-text file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JPEG or PNG image of the medical report.
    input: PathBuf,

    /// Directory the report file is written to.
    #[arg(short, long, env = "REX_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Provider for text extraction: openai, anthropic, gemini, ollama, …
    #[arg(long, env = "REX_VISION_PROVIDER", default_value = "openai")]
    vision_provider: String,

    /// Vision model ID.
    #[arg(long, env = "REX_VISION_MODEL", default_value = rex_report::config::DEFAULT_VISION_MODEL)]
    vision_model: String,

    /// Provider for report generation.
    #[arg(long, env = "REX_GENERATION_PROVIDER", default_value = "anthropic")]
    generation_provider: String,

    /// Generation model ID.
    #[arg(long, env = "REX_GENERATION_MODEL", default_value = rex_report::config::DEFAULT_GENERATION_MODEL)]
    generation_model: String,

    /// Max output tokens for both model calls.
    #[arg(long, env = "REX_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Generation temperature (0.0–2.0).
    #[arg(long, env = "REX_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Generate straight from the extracted text and write the report file.
    #[arg(long, env = "REX_NO_REVIEW")]
    no_review: bool,

    /// Print the extracted text and exit.
    #[arg(long, conflicts_with = "no_review")]
    extract_only: bool,

    /// Output structured JSON instead of plain text (non-interactive).
    #[arg(long, env = "REX_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "REX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "REX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "REX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so .env values act as flag fallbacks.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports stage boundaries; keep INFO logs out of
    // its way unless explicitly asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;

    let mut session = Session::from_config(&config);
    if show_progress {
        session = session.with_observer(CliSpinner::new());
    }

    let interactive = !(cli.extract_only || cli.no_review || cli.json);
    if interactive {
        upload_from(&mut session, &cli.input).await;
        return run_interactive(&cli, &config, &mut session).await;
    }

    // ── Upload ───────────────────────────────────────────────────────────
    let image = load_image(&cli.input)
        .await
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;
    session
        .upload(image)
        .await
        .context("Text extraction failed")?;

    if cli.extract_only {
        let text = session.current_text().unwrap_or_default();
        if cli.json {
            let value = serde_json::json!({
                "image": cli.input.display().to_string(),
                "extracted_text": text,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).context("Failed to serialise output")?
            );
        } else {
            print_block(text)?;
        }
        return Ok(());
    }

    run_straight_through(&cli, &config, &mut session).await
}

/// Map CLI args to `ReportConfig`, then pick up the keys for the chosen
/// providers.
fn build_config(cli: &Cli) -> Result<ReportConfig> {
    let mut config = ReportConfig::builder()
        .vision_provider(&cli.vision_provider)
        .vision_model(&cli.vision_model)
        .vision_max_tokens(cli.max_tokens)
        .generation_provider(&cli.generation_provider)
        .generation_model(&cli.generation_model)
        .generation_max_tokens(cli.max_tokens)
        .generation_temperature(cli.temperature)
        .output_dir(&cli.output_dir)
        .build()
        .context("Invalid configuration")?;

    config.credentials = Credentials::from_env(&config.vision, &config.generation);
    Ok(config)
}

/// Generate from the unedited extraction and write the file.
async fn run_straight_through(cli: &Cli, config: &ReportConfig, session: &mut CliSession) -> Result<()> {
    session
        .generate()
        .await
        .context("Report generation failed")?;
    let path = session
        .download(&config.output_dir)
        .await
        .context("Failed to save report")?;

    if cli.json {
        let value = serde_json::json!({
            "image": cli.input.display().to_string(),
            "extracted_text": session.extracted_text(),
            "report": session.artifact()?,
            "path": path.display().to_string(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialise output")?
        );
    } else {
        if let Some(report) = session.report() {
            print_block(&report.render())?;
        }
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }
    Ok(())
}

// ── Interactive loop ─────────────────────────────────────────────────────────

async fn run_interactive(cli: &Cli, config: &ReportConfig, session: &mut CliSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_menu(session)?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let (command, argument) = split_command(&line);

        match command.as_str() {
            "" => continue,
            "u" | "upload" => {
                if argument.is_empty() {
                    report_error("Usage: upload <path to .jpg/.jpeg/.png>");
                } else {
                    upload_from(session, Path::new(argument)).await;
                }
            }
            "e" | "edit" => {
                let Some(current) = session.current_text().map(str::to_string) else {
                    report_error("Nothing to edit yet: upload an image first");
                    continue;
                };
                match edit_in_editor(&current).await {
                    Ok(edited) => match session.edit(edited) {
                        Ok(()) if session.current_text() == Some(current.as_str()) => {
                            eprintln!("{}", dim("(no changes)"));
                        }
                        Ok(()) => eprintln!("{} Text updated", green("✔")),
                        Err(e) => report_error(&e.to_string()),
                    },
                    Err(e) => report_error(&format!("{e:#}")),
                }
            }
            "s" | "show" => {
                if let Some(text) = session.current_text() {
                    print_section("Current text", text)?;
                }
                if let Some(report) = session.report() {
                    print_section("Report", &report.render())?;
                }
            }
            "g" | "generate" => match session.generate().await {
                Ok(_) => {
                    if let Some(report) = session.report() {
                        print_section("Report", &report.render())?;
                    }
                }
                Err(e) => report_error(&e.to_string()),
            },
            "d" | "download" => match session.download(&config.output_dir).await {
                Ok(path) => eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string())),
                Err(e) => report_error(&e.to_string()),
            },
            "q" | "quit" | "exit" => break,
            other => report_error(&format!("Unknown command '{other}'")),
        }
    }

    if !cli.quiet && session.can_download() {
        eprintln!("{}", dim("Report not saved unless downloaded."));
    }
    Ok(())
}

/// Load `path` and run extraction. Failures are printed; the session stays
/// usable and the user can upload again.
async fn upload_from(session: &mut CliSession, path: &Path) {
    let image = match load_image(path).await {
        Ok(image) => image,
        Err(e) => return report_error(&e.to_string()),
    };
    match session.upload(image).await {
        Ok(()) => {
            if let Some(text) = session.current_text() {
                if let Err(e) = print_section("Extracted text", text) {
                    report_error(&format!("{e:#}"));
                }
            }
        }
        Err(e) => report_error(&e.to_string()),
    }
}

/// `"upload scans/a.png"` → `("upload", "scans/a.png")`, command lowercased.
fn split_command(line: &str) -> (String, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command.to_ascii_lowercase(), argument.trim()),
        None => (line.to_ascii_lowercase(), ""),
    }
}

fn menu_items(phase: Phase, can_generate: bool, can_download: bool) -> Vec<&'static str> {
    if matches!(phase, Phase::Idle) {
        return vec!["[u]pload <path>", "[q]uit"];
    }
    let mut items = vec!["[u]pload <path>", "[e]dit", "[s]how"];
    if can_generate {
        items.push("[g]enerate");
    }
    if can_download {
        items.push("[d]ownload");
    }
    items.push("[q]uit");
    items
}

fn print_menu(session: &CliSession) -> Result<()> {
    let items = menu_items(
        session.phase(),
        session.can_generate(),
        session.can_download(),
    );

    let phase = match session.phase() {
        Phase::Reporting => cyan("report ready"),
        other => dim(other.as_str()),
    };
    eprint!("{} {}  {} ", phase, items.join("  "), cyan("›"));
    io::stderr().flush().context("Failed to flush stderr")
}

fn print_section(title: &str, body: &str) -> Result<()> {
    eprintln!("\n{} {}", cyan("◆"), bold(title));
    print_block(body)
}

/// Write `text` to stdout with a trailing newline.
fn print_block(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

fn report_error(message: &str) {
    eprintln!("{} {}", red("✗"), red(message));
}

/// Open `text` in the user's editor and return what they saved.
async fn edit_in_editor(text: &str) -> Result<String> {
    let file = tempfile::Builder::new()
        .prefix("rex-review-")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create temp file")?;
    tokio::fs::write(file.path(), text)
        .await
        .context("Failed to write temp file")?;

    launch_editor(file.path()).await?;

    tokio::fs::read_to_string(file.path())
        .await
        .context("Failed to read edited text")
}

async fn launch_editor(path: &Path) -> Result<()> {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());
    let mut parts = editor.split_whitespace();
    let program = parts.next().context("$EDITOR is empty")?;

    let status = tokio::process::Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .await
        .with_context(|| format!("Failed to launch editor '{editor}'"))?;

    if !status.success() {
        anyhow::bail!("Editor '{editor}' exited with {status}");
    }
    Ok(())
}
