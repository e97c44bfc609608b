mod commands;

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use sysprov::{ArtifactFormat, InitSystem};

#[derive(Parser)]
#[command(name = "sysprov")]
#[command(about = "First-boot provisioning and service reconciliation")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the provisioning artifact for a manifest
    Render {
        /// Path to the manifest
        manifest: PathBuf,

        /// Artifact form: cloud-config or script
        #[arg(long, short = 'f', default_value = "cloud-config")]
        format: ArtifactFormat,

        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Install (or converge) the manifest's service on this machine
    Install {
        manifest: PathBuf,

        /// Init system: systemd, systemd-user, upstart or windows
        #[arg(long)]
        init: Option<InitSystem>,
    },

    /// Start the manifest's service
    Start {
        manifest: PathBuf,

        #[arg(long)]
        init: Option<InitSystem>,
    },

    /// Stop the manifest's service
    Stop {
        manifest: PathBuf,

        #[arg(long)]
        init: Option<InitSystem>,
    },

    /// Stop the manifest's service and remove its unit files
    Remove {
        manifest: PathBuf,

        #[arg(long)]
        init: Option<InitSystem>,
    },

    /// Show the manifest's service status
    Status {
        manifest: PathBuf,

        #[arg(long)]
        init: Option<InitSystem>,
    },

    /// List services known to the init system
    List {
        #[arg(long)]
        init: Option<InitSystem>,

        /// Unit directory to scan (upstart)
        #[arg(long)]
        init_dir: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let args = Args::parse();

    match args.command {
        Command::Render { manifest, format, output } => {
            commands::render(&manifest, format, output.as_deref())?;
        }
        Command::Install { manifest, init } => {
            commands::install(&manifest, init)?;
        }
        Command::Start { manifest, init } => {
            commands::start(&manifest, init)?;
        }
        Command::Stop { manifest, init } => {
            commands::stop(&manifest, init)?;
        }
        Command::Remove { manifest, init } => {
            commands::remove(&manifest, init)?;
        }
        Command::Status { manifest, init } => {
            commands::status(&manifest, init)?;
        }
        Command::List { init, init_dir } => {
            commands::list(init, init_dir.as_deref())?;
        }
    }

    Ok(())
}
