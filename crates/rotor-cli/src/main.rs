use clap::{Parser, Subcommand};

mod commands;

use commands::RolloutArgs;

#[derive(Parser)]
#[command(
    name = "rotor",
    about = "Rotor: rolling node replacement and restart",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which nodes a rolling update would replace, oldest first.
    ///
    /// Nothing is cordoned, created or terminated.
    Plan {
        #[command(flatten)]
        args: RolloutArgs,
    },
    /// Replace nodes one at a time with freshly provisioned machines.
    ///
    /// Control-plane nodes leave etcd before they are cordoned. The rollout
    /// aborts if cluster health does not recover after a replacement.
    Update {
        #[command(flatten)]
        args: RolloutArgs,
    },
    /// Drain, reboot and uncordon worker nodes one at a time.
    Restart {
        #[command(flatten)]
        args: RolloutArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,rotor=debug")),
        )
        .init();

    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Plan { args } => commands::plan::plan(&args).await?,
        Commands::Update { args } => commands::update::update(&args).await?,
        Commands::Restart { args } => commands::restart::restart(&args).await?,
    };
    println!("{output}");
    Ok(())
}
