use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "crudstack",
    about = "crudstack: declarative serverless CRUD stacks",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the stack and render its deployment template
    Synth {
        #[arg(short, long, default_value = "stack.toml")]
        config: String,
        /// Write the template here instead of stdout
        #[arg(short, long)]
        out: Option<String>,
    },
    /// Print the HTTP surface and the reachable endpoint
    Routes {
        #[arg(short, long, default_value = "stack.toml")]
        config: String,
    },
    /// Print every declaration in dependency order
    Graph {
        #[arg(short, long, default_value = "stack.toml")]
        config: String,
    },
    /// Scaffold a stack.toml.
    ///
    /// Without flags the stack has a single handler serving every route.
    /// --split declares one handler per operation; --secure-domain adds
    /// the mTLS custom domain and implies --split.
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
        #[arg(long)]
        split: bool,
        #[arg(long)]
        secure_domain: bool,
        /// Overwrite an existing stack.toml
        #[arg(long)]
        force: bool,
    },
    /// Manage the client trust bundle for the secure domain
    Trust {
        #[command(subcommand)]
        action: TrustAction,
    },
}

#[derive(Subcommand)]
enum TrustAction {
    /// Generate a client CA and one client certificate
    Init {
        /// Where the CA bundle is written; keys go next to it
        #[arg(short, long, default_value = crudstack_core::config::DEFAULT_TRUST_ARTIFACT)]
        out: String,
        #[arg(long, default_value = "client")]
        common_name: String,
        #[arg(long, default_value = "crudstack")]
        organization: String,
    },
    /// Validate a PEM trust bundle and print its fingerprint
    Inspect {
        file: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("crudstack=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Synth { config, out } => commands::synth::synth(&config, out.as_deref()),
        Commands::Routes { config } => commands::routes::routes(&config),
        Commands::Graph { config } => commands::graph::graph(&config),
        Commands::Init {
            path,
            split,
            secure_domain,
            force,
        } => commands::init::init(&path, split, secure_domain, force),
        Commands::Trust { action } => match action {
            TrustAction::Init {
                out,
                common_name,
                organization,
            } => commands::trust::init(&out, &common_name, &organization),
            TrustAction::Inspect { file } => commands::trust::inspect(&file),
        },
    }
}
