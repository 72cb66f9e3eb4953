mod commands;

use clap::{Parser, Subcommand};
use commands::{exit_code_for, EXIT_FAILURE};
use corral_core::{Engine, Settings};
use corral_exec::{join_quoted, select_runner, Runner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "corral",
    version,
    about = "Lifecycle orchestration for LXD system containers"
)]
struct Cli {
    /// Settings file (defaults to ~/.config/corral/corral.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Staging directory for launch scripts, sessions and image jobs.
    #[arg(long, global = true)]
    staging: Option<String>,

    /// Command runner: "system" runs the control plane, "mock" simulates it.
    #[arg(long, default_value = "system", global = true)]
    runner: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Launch a container and wait until it is ready.
    Create {
        name: String,
        /// Distribution, e.g. ubuntu.
        #[arg(long)]
        os: String,
        /// Release, e.g. jammy.
        #[arg(long)]
        release: String,
        /// Storage pool (defaults to the profile's pool).
        #[arg(long)]
        storage: Option<String>,
        /// Cloud-config file passed as user-data on first boot.
        #[arg(long)]
        bootstrap: Option<PathBuf>,
        /// SSH login to provision; the password is read from CORRAL_PASSWORD.
        #[arg(long)]
        user: Option<String>,
        /// SSH port to configure in the guest.
        #[arg(long, default_value_t = 22)]
        port: u16,
    },
    /// List containers with their status and address.
    List,
    /// Show one container.
    Inspect {
        name: String,
        /// Skip the extra network refresh at the point of read.
        #[arg(long, default_value_t = false)]
        cached: bool,
    },
    /// Wait until a container's init system reports running.
    Wait { name: String },
    /// Stop a container.
    Stop { name: String },
    /// Start a stopped container.
    Boot { name: String },
    /// Restart a container.
    Reboot { name: String },
    /// Stop and delete a container.
    Delete { name: String },
    /// Take a timestamped snapshot.
    Snapshot { name: String },
    /// List a container's snapshots.
    Snapshots { name: String },
    /// Delete one snapshot.
    DeleteSnapshot { name: String, snapshot: String },
    /// Restore a container to a snapshot.
    Restore { name: String, snapshot: String },
    /// Publish a container or snapshot as an image.
    Publish {
        name: String,
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Snapshot, publish and export a container's image files.
    Export {
        name: String,
        /// Directory receiving the image files.
        #[arg(long)]
        out: PathBuf,
    },
    /// Import image files and launch a container from them.
    Import {
        /// Directory holding the image files.
        dir: PathBuf,
        #[arg(long)]
        alias: String,
        name: String,
    },
    /// List images in the control plane's store.
    Images,
    /// Run an instruction in a container over SSH.
    Exec {
        name: String,
        /// SSH login; the password is read from CORRAL_PASSWORD.
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 22)]
        port: u16,
        /// Run as this user's login shell.
        #[arg(long)]
        login_user: Option<String>,
        /// Instruction to run (after --).
        #[arg(required = true, last = true)]
        instruction: Vec<String>,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CORRAL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let engine = match build_engine(&cli) {
        Ok(engine) => engine,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let json = cli.json;

    let result = match cli.command {
        Commands::Create {
            name,
            os,
            release,
            storage,
            bootstrap,
            user,
            port,
        } => commands::create::run(
            &engine,
            &commands::create::CreateArgs {
                name: &name,
                os: &os,
                release: &release,
                storage: storage.as_deref(),
                bootstrap: bootstrap.as_deref(),
                user: user.as_deref(),
                port,
            },
            json,
        ),
        Commands::List => commands::list::run(&engine, json),
        Commands::Inspect { name, cached } => commands::inspect::run(&engine, &name, cached, json),
        Commands::Wait { name } => commands::wait::run(&engine, &name, json),
        Commands::Stop { name } => {
            commands::power::run(&engine, &name, commands::power::Action::Stop, json)
        }
        Commands::Boot { name } => {
            commands::power::run(&engine, &name, commands::power::Action::Boot, json)
        }
        Commands::Reboot { name } => {
            commands::power::run(&engine, &name, commands::power::Action::Reboot, json)
        }
        Commands::Delete { name } => commands::delete::run(&engine, &name, json),
        Commands::Snapshot { name } => commands::snapshots::take(&engine, &name, json),
        Commands::Snapshots { name } => commands::snapshots::list(&engine, &name, json),
        Commands::DeleteSnapshot { name, snapshot } => {
            commands::snapshots::delete(&engine, &name, &snapshot, json)
        }
        Commands::Restore { name, snapshot } => {
            commands::snapshots::restore(&engine, &name, &snapshot, json)
        }
        Commands::Publish { name, snapshot } => {
            commands::images::publish(&engine, &name, snapshot.as_deref(), json)
        }
        Commands::Export { name, out } => commands::images::export(&engine, &name, &out, json),
        Commands::Import { dir, alias, name } => {
            commands::images::import(&engine, &dir, &alias, &name, json)
        }
        Commands::Images => commands::images::list(&engine, json),
        Commands::Exec {
            name,
            user,
            port,
            login_user,
            instruction,
        } => commands::exec::run(
            &engine,
            &name,
            &user,
            port,
            login_user.as_deref(),
            &join_quoted(&instruction),
        ),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn build_engine(cli: &Cli) -> Result<Engine, String> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path),
        None => Settings::load_default(),
    }
    .map_err(|e| e.to_string())?;
    if let Some(staging) = &cli.staging {
        settings = settings.with_staging_root(expand_tilde(staging));
    }
    let runner: Arc<dyn Runner> = Arc::from(select_runner(&cli.runner).map_err(|e| e.to_string())?);
    tracing::debug!(
        "runner {}, staging root {}",
        runner.name(),
        settings.staging_root.display()
    );
    Ok(Engine::new(runner, settings))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
