mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::AwsKeys;
use muster_inventory::{InventoryStore, ManagerRole};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "muster")]
#[command(version)]
#[command(about = "Mirror and manage EC2/VPC resources from a local inventory", long_about = None)]
struct Cli {
    /// Inventory file
    #[arg(long, global = true, default_value = ".muster/inventory.json")]
    inventory: PathBuf,
    /// Access key id, used when a manager entity has to be created
    #[arg(short = 'k', long = "aws-key", global = true, env = "AWS_ACCESS_KEY_ID")]
    aws_key: Option<String>,
    /// Secret access key, used when a manager entity has to be created
    #[arg(
        short = 's',
        long = "aws-secret-key",
        global = true,
        env = "AWS_SECRET_ACCESS_KEY"
    )]
    aws_secret_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage classic EC2 instances
    Ec2(commands::ec2::Ec2Args),
    /// Manage VPC instances
    Vpc(commands::vpc::VpcArgs),
    /// Import the whole account into the inventory
    Bootstrap(commands::bootstrap::BootstrapArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let keys = AwsKeys {
        access_key_id: cli.aws_key.clone(),
        secret_access_key: cli.aws_secret_key.clone(),
    };

    let store = InventoryStore::new(&cli.inventory);
    let mut inventory = store.load().await?;

    // Save whatever was recorded even when a command fails partway; a
    // launched instance must never be lost from the store.
    let result = match cli.command {
        Commands::Ec2(args) => {
            commands::ec2::handle(
                args.verb,
                ManagerRole::Ec2,
                "ec2connman",
                false,
                &keys,
                &mut inventory,
            )
            .await
        }
        Commands::Vpc(args) => commands::vpc::handle(args, &keys, &mut inventory).await,
        Commands::Bootstrap(args) => {
            commands::bootstrap::handle(&args, &keys, &mut inventory).await
        }
    };

    store.save(&inventory).await?;
    result
}
