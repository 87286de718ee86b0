use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use portrait_contracts::chat::{parse_intent, Intent, STUDIO_HELP_COMMANDS};
use portrait_contracts::events::{EventPayload, SessionEventLog};
use portrait_contracts::gallery::FileStorage;
use portrait_contracts::{
    Artifact, CharacterSession, FileBlob, GalleryStore, SessionStatus, StudioError,
};
use portrait_engine::config::DEFAULT_RELAY_ADDR;
use portrait_engine::relay::GENERATE_PATH;
use portrait_engine::{Orchestrator, RelayServer, StudioConfig};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "portrait-studio",
    version,
    about = "Generate and iterate on character portraits"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive editing session with undo and a saved gallery.
    Studio(StudioArgs),
    /// Generate a single image and write it to disk.
    Generate(GenerateArgs),
    /// Run the generation relay (`POST /api/generate`).
    Serve(ServeArgs),
    /// Inspect or maintain the saved gallery.
    Gallery(GalleryArgs),
}

#[derive(Debug, Args)]
struct ServiceArgs {
    /// Generation backend: gemini, relay or dryrun.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    relay_url: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,
}

#[derive(Debug, Parser)]
struct StudioArgs {
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    /// Image to edit instead of generating from scratch.
    #[arg(long)]
    base: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_RELAY_ADDR)]
    addr: String,
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Parser)]
struct GalleryArgs {
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    action: GalleryAction,
}

#[derive(Debug, Subcommand)]
enum GalleryAction {
    List,
    /// Write every saved image into a directory.
    Export { dir: PathBuf },
    /// Delete the image at a 1-based position.
    Delete { position: usize },
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("portrait-studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PORTRAIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Studio(args) => {
            run_studio(args)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(args),
        Command::Serve(args) => run_serve(args),
        Command::Gallery(args) => run_gallery(args),
    }
}

fn resolve_config(args: &ServiceArgs) -> Result<StudioConfig> {
    let mut config = StudioConfig::from_env();
    if let Some(provider) = args.provider.as_deref() {
        config.provider = provider.trim().to_ascii_lowercase();
    }
    if let Some(model) = args.model.as_deref() {
        config.model = model.trim().to_string();
    }
    if let Some(relay_url) = args.relay_url.as_deref() {
        config.relay_url = relay_url.trim().to_string();
    }
    if let Some(timeout) = args.timeout {
        if !timeout.is_finite() || timeout <= 0.0 {
            bail!("--timeout must be a positive number of seconds");
        }
        config.request_timeout = Duration::from_secs_f64(timeout);
    }
    Ok(config)
}

fn resolve_data_dir(requested: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = requested {
        return Ok(dir.to_path_buf());
    }
    let Some(base) = dirs::data_dir() else {
        bail!("no platform data directory; pass --data-dir");
    };
    Ok(base.join("portrait-studio"))
}

fn run_studio(args: StudioArgs) -> Result<()> {
    let config = resolve_config(&args.service)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let data_dir = resolve_data_dir(args.data_dir.as_deref())?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| data_dir.join("events.jsonl"));
    let events = SessionEventLog::new(&events_path);
    let mut gallery = GalleryStore::load(FileStorage::new(&data_dir));
    let mut session = CharacterSession::new();

    record(
        &events,
        "session_started",
        &session,
        json_object(json!({
            "service": orchestrator.service_name(),
            "data_dir": data_dir.to_string_lossy().to_string(),
            "gallery_len": gallery.len(),
        })),
    );

    println!(
        "Portrait studio ({}). Type a prompt to generate, /help for commands.",
        orchestrator.service_name()
    );
    if !orchestrator.is_configured() {
        println!("Warning: {} is missing an API key.", orchestrator.service_name());
    }
    print_status(&session, &gallery);

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        tracing::debug!(action = %intent.action, "studio intent");
        match intent.action.as_str() {
            "noop" => continue,
            "quit" => break,
            "help" => println!("Commands: {}", STUDIO_HELP_COMMANDS.join(" ")),
            "status" => print_status(&session, &gallery),
            "set_prompt" => {
                session.set_prompt(intent.prompt.clone().unwrap_or_default());
                println!("Prompt: {}", session.prompt());
            }
            "generate" => {
                if let Some(prompt) = intent.prompt.clone() {
                    session.set_prompt(prompt);
                }
                run_generation(&mut session, &orchestrator, &events);
            }
            "upload" => handle_upload(&intent, &mut session, &events),
            "new_character" => {
                if session.new_character() {
                    record(&events, "new_character", &session, EventPayload::new());
                    println!("Started a new character.");
                    println!("Prompt: {}", session.prompt());
                }
            }
            "undo" => {
                if session.undo() {
                    record(&events, "undo", &session, EventPayload::new());
                    println!("Undone. {}", describe_artifact(session.artifact()));
                    println!("Prompt: {}", session.prompt());
                } else {
                    println!("Nothing to undo.");
                }
            }
            "save_to_gallery" => {
                let Some(artifact) = session.artifact().cloned() else {
                    println!("No image to save.");
                    continue;
                };
                let outcome = gallery.save(&artifact);
                if !outcome.changed {
                    println!("Already in the gallery.");
                    continue;
                }
                record(
                    &events,
                    "gallery_saved",
                    &session,
                    json_object(json!({
                        "persisted": outcome.persisted,
                        "gallery_len": gallery.len(),
                    })),
                );
                println!("Saved to gallery ({} images).", gallery.len());
                if !outcome.persisted {
                    println!("Warning: the gallery could not be written to disk.");
                }
            }
            "list_gallery" => print_gallery(&gallery),
            "select_from_gallery" => {
                let Some(artifact) = intent.index().and_then(|idx| gallery.get(idx)).cloned()
                else {
                    println!("{}", position_hint("/select", &gallery));
                    continue;
                };
                if session.select_from_gallery(artifact) {
                    record(&events, "gallery_selected", &session, EventPayload::new());
                    println!("Selected {}", describe_artifact(session.artifact()));
                    println!("Prompt: {}", session.prompt());
                }
            }
            "delete_from_gallery" => {
                let Some(index) = intent.index() else {
                    println!("{}", position_hint("/delete", &gallery));
                    continue;
                };
                let outcome = gallery.delete(index);
                if outcome.changed {
                    record(
                        &events,
                        "gallery_deleted",
                        &session,
                        json_object(json!({
                            "index": index,
                            "persisted": outcome.persisted,
                            "gallery_len": gallery.len(),
                        })),
                    );
                    println!("Deleted. {} images left.", gallery.len());
                } else {
                    println!("No gallery image at position {}.", index + 1);
                }
            }
            "download" => {
                let Some(path) = intent.path() else {
                    println!("/download requires a path");
                    continue;
                };
                match session.artifact() {
                    Some(artifact) => {
                        let written = write_artifact(artifact, Path::new(path))?;
                        println!("Wrote {}", written.display());
                    }
                    None => println!("No image to download."),
                }
            }
            _ => {
                let command = intent
                    .command_args
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
        }
    }

    record(
        &events,
        "session_finished",
        &session,
        json_object(json!({ "gallery_len": gallery.len() })),
    );
    Ok(())
}

/// Runs one generation on a worker thread; the session stays busy until the
/// worker reports back.
fn run_generation(
    session: &mut CharacterSession,
    orchestrator: &Orchestrator,
    events: &SessionEventLog,
) {
    let Some(ticket) = session.begin_generation() else {
        println!("Nothing to generate: the prompt is empty or a generation is running.");
        return;
    };
    record(events, "generation_started", session, EventPayload::new());
    println!("Generating with {}...", orchestrator.service_name());

    let (tx, rx) = mpsc::channel();
    let worker_orchestrator = orchestrator.clone();
    let worker_ticket = ticket.clone();
    let worker = thread::spawn(move || {
        let _ = tx.send(worker_orchestrator.run_ticket(&worker_ticket));
    });
    let result = rx.recv().unwrap_or_else(|_| {
        Err(StudioError::GenerationServiceError(
            "generation worker stopped without a result".to_string(),
        ))
    });
    let _ = worker.join();

    session.finish_generation(&ticket, result);
    match session.status() {
        SessionStatus::Error(message) => {
            record(events, "generation_failed", session, EventPayload::new());
            println!("{message}");
        }
        _ => {
            record(events, "generation_succeeded", session, EventPayload::new());
            println!("Generated {}", describe_artifact(session.artifact()));
            println!("Next prompt: {}", session.prompt());
        }
    }
}

fn handle_upload(
    intent: &Intent,
    session: &mut CharacterSession,
    events: &SessionEventLog,
) {
    let Some(path) = intent.path() else {
        println!("/upload requires a path");
        return;
    };
    let blob = match FileBlob::from_path(Path::new(path)) {
        Ok(blob) => blob,
        Err(err) => {
            println!("Upload failed: {err:#}");
            return;
        }
    };
    match session.upload(&blob) {
        Ok(true) => {
            record(events, "upload_succeeded", session, EventPayload::new());
            println!("Loaded {}", describe_artifact(session.artifact()));
        }
        Ok(false) => println!("Busy; try again when the current operation finishes."),
        Err(err) => {
            record(
                events,
                "upload_failed",
                session,
                json_object(json!({ "reason": err.to_string() })),
            );
            println!("{}", session.last_error().unwrap_or("Upload failed."));
        }
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let config = resolve_config(&args.service)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let base = match args.base.as_deref() {
        Some(path) => Some(FileBlob::from_path(path)?.decode()?),
        None => None,
    };
    match orchestrator.generate(&args.prompt, base.as_ref()) {
        Ok(artifact) => {
            let written = write_artifact(&artifact, &args.out)?;
            println!("{}", written.display());
            Ok(0)
        }
        Err(err) => {
            eprintln!("Failed to generate image. {err}");
            Ok(2)
        }
    }
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let config = resolve_config(&args.service)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    if !orchestrator.is_configured() {
        eprintln!(
            "Warning: {} has no API key; requests will get a 500.",
            orchestrator.service_name()
        );
    }
    let server = RelayServer::bind(&args.addr, orchestrator)?;
    let shown = server
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or(args.addr);
    println!("Relay listening on http://{shown}{GENERATE_PATH}");
    server.serve();
    Ok(0)
}

fn run_gallery(args: GalleryArgs) -> Result<i32> {
    let data_dir = resolve_data_dir(args.data_dir.as_deref())?;
    let mut gallery = GalleryStore::load(FileStorage::new(&data_dir));
    match args.action {
        GalleryAction::List => print_gallery(&gallery),
        GalleryAction::Export { dir } => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed creating {}", dir.display()))?;
            for (idx, artifact) in gallery.artifacts().iter().enumerate() {
                let path = dir.join(format!("gallery-{:02}-{}", idx + 1, artifact.short_id()));
                let written = write_artifact(artifact, &path)?;
                println!("{}", written.display());
            }
        }
        GalleryAction::Delete { position } => {
            let outcome = match position.checked_sub(1) {
                Some(index) => gallery.delete(index),
                None => bail!("positions start at 1"),
            };
            if !outcome.changed {
                bail!("no gallery image at position {position}");
            }
            if !outcome.persisted {
                bail!("gallery could not be written to {}", data_dir.display());
            }
            println!("Deleted. {} images left.", gallery.len());
        }
    }
    Ok(0)
}

/// Appends to the event log; a failed write is logged and skipped.
fn record(
    events: &SessionEventLog,
    event_type: &str,
    session: &CharacterSession,
    payload: EventPayload,
) {
    if let Err(err) = events.emit_session(event_type, session, payload) {
        tracing::warn!(
            event_type,
            path = %events.path().display(),
            error = %err,
            "event log write failed"
        );
    }
}

fn position_hint(command: &str, gallery: &GalleryStore) -> String {
    if gallery.is_empty() {
        return "Gallery is empty.".to_string();
    }
    format!("{command} needs a position between 1 and {}", gallery.len())
}

/// Writes the decoded image, adding an extension when `path` has none.
fn write_artifact(artifact: &Artifact, path: &Path) -> Result<PathBuf> {
    let bytes = artifact.decode_bytes()?;
    let path = if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(artifact.file_extension())
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    std::fs::write(&path, bytes).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}

fn print_status(session: &CharacterSession, gallery: &GalleryStore) {
    println!("Image: {}", describe_artifact(session.artifact()));
    println!("Prompt: {}", session.prompt());
    if let Some(error) = session.last_error() {
        println!("Error: {error}");
    }
    println!(
        "Undo steps: {}  Gallery: {}",
        session.history().len(),
        gallery.len()
    );
}

fn print_gallery(gallery: &GalleryStore) {
    if gallery.is_empty() {
        println!("Gallery is empty.");
        return;
    }
    for (idx, artifact) in gallery.artifacts().iter().enumerate() {
        println!("[{}] {artifact}", idx + 1);
    }
}

fn describe_artifact(artifact: Option<&Artifact>) -> String {
    artifact
        .map(Artifact::to_string)
        .unwrap_or_else(|| "none".to_string())
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
