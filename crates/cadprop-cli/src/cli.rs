use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cadprop::{
    DocumentWriter, EngineConnection, EngineProvider, FieldStatus, FieldValues, Heartbeat,
    Settings, SimEngineProvider, WriteReport,
};

/// Writes the Project / Reference / Module custom properties into CAD
/// documents by driving the installed application.
#[derive(Debug, Parser)]
#[command(name = "cadprop", version, about)]
pub struct Cli {
    /// Documents to update (.ipt, .iam, .idw, .ipn).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Value for the Project custom property.
    #[arg(long)]
    pub project: Option<String>,

    /// Value for the Reference custom property.
    #[arg(long)]
    pub reference: Option<String>,

    /// Value for the Module custom property.
    #[arg(long)]
    pub module: Option<String>,

    /// Settings file (JSON).
    #[arg(long, default_value = "cadprop.settings.json")]
    pub settings: PathBuf,

    /// Append logs to a timestamped file under this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Run against the built-in simulated engine instead of the live
    /// application; validates paths and attributes without touching CAD data.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Settings come first so logDirectory can steer logging; the flag wins.
    let (settings, settings_err) = match Settings::load(&cli.settings) {
        Ok(settings) => (settings, None),
        Err(err) => (Settings::default(), Some(err)),
    };
    let log_dir = cli.log_dir.as_deref().or(settings.log_directory.as_deref());
    init_tracing(log_dir);
    if let Some(err) = settings_err {
        tracing::warn!(%err, "settings unreadable, using defaults");
    }

    let fields = FieldValues {
        project: cli.project.clone(),
        reference: cli.reference.clone(),
        module: cli.module.clone(),
    };
    if fields.is_empty() {
        eprintln!("at least one of --project, --reference or --module is required");
        return ExitCode::from(2);
    }

    let heartbeat = if settings.telemetry.enabled {
        match Heartbeat::start(&settings.telemetry, env!("CARGO_PKG_VERSION")) {
            Ok(heartbeat) => Some(heartbeat),
            Err(err) => {
                tracing::warn!(%err, "telemetry disabled");
                None
            }
        }
    } else {
        None
    };

    let succeeded = if cli.dry_run {
        run_dry(&cli.files, &fields)
    } else {
        run_live(&cli.files, &fields)
    };

    if let Some(heartbeat) = heartbeat {
        heartbeat.stop();
    }

    println!("{succeeded}/{} file(s) written", cli.files.len());
    if succeeded == cli.files.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_dry(files: &[PathBuf], fields: &FieldValues) -> usize {
    let provider = SimEngineProvider::new();
    // Seed every candidate with an empty custom set so the whole workflow
    // runs; validation still rejects bad paths before the engine is touched.
    for file in files {
        provider.seed_document(file);
    }
    run_files(provider, files, fields)
}

#[cfg(windows)]
fn run_live(files: &[PathBuf], fields: &FieldValues) -> usize {
    run_files(cadprop::ComEngineProvider::default(), files, fields)
}

#[cfg(not(windows))]
fn run_live(_files: &[PathBuf], _fields: &FieldValues) -> usize {
    eprintln!("live mode drives the installed CAD application and requires Windows; use --dry-run elsewhere");
    0
}

fn run_files<P: EngineProvider>(provider: P, files: &[PathBuf], fields: &FieldValues) -> usize {
    let writer = DocumentWriter::new(Arc::new(EngineConnection::new(provider)));

    let mut succeeded = 0;
    for file in files {
        let report = writer.write(file, fields);
        print_report(file, &report);
        if report.success {
            succeeded += 1;
        }
    }

    writer.connection().dispose();
    succeeded
}

fn print_report(file: &Path, report: &WriteReport) {
    if !report.success {
        println!("failed  {}", file.display());
        return;
    }
    for outcome in &report.fields {
        match &outcome.status {
            FieldStatus::Updated => println!("  set   {}", outcome.name),
            FieldStatus::Created => println!("  new   {}", outcome.name),
            FieldStatus::Failed(reason) => println!("  fail  {}: {reason}", outcome.name),
            FieldStatus::Skipped => {}
        }
    }
    println!("ok      {}", file.display());
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn init_tracing(log_dir: Option<&Path>) {
    if let Some(dir) = log_dir {
        match open_log_file(dir) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .try_init();
                return;
            }
            Err(err) => eprintln!("cannot open log file in {}: {err}", dir.display()),
        }
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_log_file(dir: &Path) -> std::io::Result<fs::File> {
    fs::create_dir_all(dir)?;
    let name = format!("cadprop_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(name))
}
