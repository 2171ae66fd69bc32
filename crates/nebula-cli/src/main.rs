mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{DestroyArgs, ProvisionArgs, StatusArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "nebula",
    about = "Provision, update and tear down Orbs node constellations",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding constellation working directories (default: ~/.nebula)
    #[arg(long, global = true, env = "NEBULA_CACHE")]
    cache: Option<PathBuf>,

    /// Terraform binary (default: `terraform` found on PATH)
    #[arg(long, global = true, env = "NEBULA_TERRAFORM")]
    tool: Option<PathBuf>,

    /// Template root containing `<provider>/` and `<provider>-eip/`
    #[arg(long, global = true, env = "NEBULA_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every target in a deployment file
    Create {
        #[command(flatten)]
        args: ProvisionArgs,

        /// After a successful create, wait for every chain to reach this block height
        #[arg(long)]
        sync_height: Option<u64>,
    },

    /// Re-apply a deployment file to existing constellations
    Update {
        #[command(flatten)]
        args: ProvisionArgs,

        /// Wait for every chain to report a semantic version with this prefix
        #[arg(long)]
        version_prefix: Option<String>,

        /// Wait for every chain to report a commit hash with this prefix
        #[arg(long)]
        commit_prefix: Option<String>,
    },

    /// Tear down constellations, keeping any static IP allocated
    Destroy(DestroyArgs),

    /// Report block height, liveness and version of running nodes
    Status(StatusArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Create { .. } | Commands::Update { .. } | Commands::Destroy(_) => {
            tracing::Level::INFO
        }
        Commands::Status(_) => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let global = settings::GlobalArgs {
        cache: cli.cache,
        tool: cli.tool,
        templates: cli.templates,
    };

    let result = match cli.command {
        Commands::Create { args, sync_height } => {
            cmd::create::run(&global, &args, sync_height, cli.json)
        }
        Commands::Update {
            args,
            version_prefix,
            commit_prefix,
        } => cmd::update::run(&global, &args, version_prefix, commit_prefix, cli.json),
        Commands::Destroy(args) => cmd::destroy::run(&global, &args, cli.json),
        Commands::Status(args) => cmd::status::run(&args, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
