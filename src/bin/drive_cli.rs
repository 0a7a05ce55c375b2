//! Drive Ops CLI - list, upload and download Google Drive files
//!
//! Usage:
//!   drive-ops ls                                   List every visible file
//!   drive-ops put <local> [--mime M] [--parent ID]  Upload a file
//!   drive-ops get <file-id> [local] [--mime M]      Download (or export) a file
//!
//! The access token is read from `--token` or `DRIVE_ACCESS_TOKEN`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use drive_ops::drive_config::{config_path, load_config, load_config_from, DriveConfig};
use drive_ops::operations::{guess_mime_type, suggested_local_name};
use drive_ops::providers::DownloadPlan;
use drive_ops::session_manager::DriveSession;
use drive_ops::transfer::ProgressCallback;

const TOKEN_ENV: &str = "DRIVE_ACCESS_TOKEN";

#[derive(Parser)]
#[command(
    name = "drive-ops",
    about = "Drive Ops - list, upload and download Google Drive files",
    version,
    long_about = "Operates on Google Drive with an OAuth access token obtained elsewhere.\nThe token is taken from --token or the DRIVE_ACCESS_TOKEN environment variable."
)]
struct Cli {
    /// OAuth access token with Drive scope
    #[arg(long, global = true)]
    token: Option<String>,
    /// Config file (default: <config dir>/drive-ops/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every file owned by or shared with you
    Ls {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Upload a local file
    Put {
        /// Local file path
        local: PathBuf,
        /// Mime type (default: guessed from the extension)
        #[arg(long)]
        mime: Option<String>,
        /// Parent folder id (default: root)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Download a file by id; Docs and Sheets are exported to docx/xlsx
    Get {
        /// Remote file id
        file_id: String,
        /// Local destination (default: download dir + remote name)
        local: Option<PathBuf>,
        /// Remote mime type; with a destination, skips the lookup listing
        #[arg(long)]
        mime: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar() -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {bytes}/{total_bytes} {bytes_per_sec}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let handle = bar.clone();
    let callback: ProgressCallback = Box::new(move |done, total| {
        if total > 0 {
            handle.set_length(total);
        }
        handle.set_position(done);
    });
    (bar, callback)
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(),
    };
    let token = match cli.token.or_else(|| std::env::var(TOKEN_ENV).ok()) {
        Some(token) => token,
        None => bail!("No access token: pass --token or set {}", TOKEN_ENV),
    };

    let session = DriveSession::open(token, &config).context("Failed to open Drive session")?;
    let result = execute(&session, cli.command, &config).await;
    session.shutdown().await;
    result
}

async fn execute(session: &DriveSession, command: Commands, config: &DriveConfig) -> Result<()> {
    match command {
        Commands::Ls { json } => {
            let files = session.list_all_files().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in &files {
                    println!("{:<44} {:<48} {}", file.id, file.mime_type, file.name);
                }
                eprintln!("{} files", files.len());
            }
        }
        Commands::Put { local, mime, parent } => {
            let mime = mime.unwrap_or_else(|| guess_mime_type(&local));
            let uploaded = session.upload_file(&local, &mime, parent.as_deref()).await?;
            println!("Uploaded {} → {} ({})", local.display(), uploaded.name, uploaded.id);
        }
        Commands::Get { file_id, local, mime } => {
            let (mime_type, destination) = match (mime, local) {
                (Some(mime), Some(local)) => (mime, local),
                (mime, local) => {
                    // The listing supplies the mime type and a local name
                    let files = session.list_all_files().await?;
                    let Some(file) = files.iter().find(|f| f.id == file_id) else {
                        bail!("No visible file with id {}", file_id);
                    };
                    if file.is_folder() {
                        bail!("{} is a folder", file.name);
                    }
                    let destination = match local {
                        Some(path) => path,
                        None => {
                            std::fs::create_dir_all(&config.download_dir).with_context(|| {
                                format!("Failed to create {}", config.download_dir.display())
                            })?;
                            config.download_dir.join(suggested_local_name(file))
                        }
                    };
                    (mime.unwrap_or_else(|| file.mime_type.clone()), destination)
                }
            };

            let (bar, on_progress) = progress_bar();
            let outcome = session
                .download_file(&file_id, &mime_type, destination, Some(on_progress))
                .await;
            bar.finish_and_clear();
            let outcome = outcome?;

            match outcome.plan {
                DownloadPlan::Direct => println!("Saved {}", outcome.path.display()),
                DownloadPlan::ExportAs(format) => {
                    println!("Exported as {} to {}", format, outcome.path.display())
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!("Using config {:?}", cli.config.clone().unwrap_or_else(config_path));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
