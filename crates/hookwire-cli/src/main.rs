//! Hookwire CLI - run proxy hook scripts from the command line.

mod call;
mod colors;
mod eval;
mod hooks;
mod host;
mod serve;
mod session;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::session::Options;

#[derive(Parser)]
#[command(name = "hookwire")]
#[command(about = "Run proxy hook scripts through the hookwire coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct GlobalArgs {
    /// Framework script loaded before the user script (defaults to the bundled prelude)
    #[arg(long, global = true)]
    framework: Option<PathBuf>,

    /// Environment file exposed to scripts through env_path()
    #[arg(long, global = true)]
    env: Option<PathBuf>,

    /// JSON file with executor settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the installed framework
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Load scripts that define no hook functions
    #[arg(long, global = true)]
    allow_missing_hooks: bool,
}

impl GlobalArgs {
    fn options(&self) -> Options {
        Options {
            framework: self.framework.clone(),
            env: self.env.clone(),
            config: self.config.clone(),
            data_dir: self.data_dir.clone(),
            allow_missing_hooks: self.allow_missing_hooks,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Call one script function and print its result
    Call {
        /// Path to the script (.rhai file)
        script: String,

        /// Function to call
        function: String,

        /// Positional arguments, each parsed as JSON (bare words are strings)
        args: Vec<String>,

        /// Keyword arguments as a JSON object
        #[arg(long)]
        kwargs: Option<String>,
    },

    /// List the functions and hooks a script defines
    Hooks {
        /// Path to the script (.rhai file)
        script: String,
    },

    /// Evaluate a snippet with the script loaded and print its output
    Eval {
        /// Path to the script (.rhai file)
        script: String,

        /// Code to evaluate
        code: String,
    },

    /// Serve calls read as JSON lines from stdin, reloading on changes
    Serve {
        /// Path to the script (.rhai file)
        script: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Attach recovery hints to hookwire-core errors
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        match err.downcast_ref::<hookwire_core::Error>() {
            Some(core_err) => match core_err.hint() {
                Some(hint) => anyhow::anyhow!("{}\n  hint: {}", core_err, hint),
                None => err,
            },
            None => err,
        }
    };

    let options = cli.global.options();

    match cli.command {
        Commands::Call {
            script,
            function,
            args,
            kwargs,
        } => {
            call::execute(&script, &function, &args, kwargs.as_deref(), &options)
                .map_err(format_error)?;
        }

        Commands::Hooks { script } => {
            hooks::execute(&script, &options).map_err(format_error)?;
        }

        Commands::Eval { script, code } => {
            eval::execute(&script, &code, &options).map_err(format_error)?;
        }

        Commands::Serve { script } => {
            serve::execute(&script, &options).await.map_err(format_error)?;
        }
    }

    Ok(())
}
