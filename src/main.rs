use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use nilbx_client::app::App;
use nilbx_client::commands::{self, Command};
use nilbx_client::config::Config;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "nilbx")]
#[command(about = "Command-line client for the NILBx marketplace services")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/nilbx/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.verbose, args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let app = App::new(&config)?;

  let mut stdout = std::io::stdout();
  match commands::run(&app, args.command, &mut stdout).await {
    Ok(true) => Ok(ExitCode::SUCCESS),
    Ok(false) => Ok(ExitCode::FAILURE),
    Err(report) => {
      eprintln!("Error: {}", commands::user_message(&report));
      tracing::debug!("{:?}", report);
      Ok(ExitCode::FAILURE)
    }
  }
}

/// Stderr logging filtered by `RUST_LOG` (or `-v`), plus an optional log file.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let default = match verbose {
    0 => "nilbx_client=warn",
    1 => "nilbx_client=debug",
    _ => "nilbx_client=trace",
  };
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .compact();

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
      };
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(&dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(env_filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
