use crate::commands::{connect, AwsKeys};
use colored::Colorize;
use muster_aws::{Bootstrap, BootstrapOptions};
use muster_inventory::{Inventory, ManagerRole};
use std::sync::Arc;

#[derive(clap::Args, Debug)]
pub struct BootstrapArgs {
    /// VPC connection manager entity
    #[arg(short = 'V', long, default_value = "vpcconnman")]
    pub vpc_manager: String,
    /// EC2 connection manager entity
    #[arg(short = 'c', long, default_value = "ec2connman")]
    pub conn_manager: String,
    /// Insert imported regions into this pool
    #[arg(short = 'p', long = "add-to-pool")]
    pub pool: Option<String>,
    /// Skip the instance import pass
    #[arg(long)]
    pub no_import: bool,
}

pub async fn handle(
    args: &BootstrapArgs,
    keys: &AwsKeys,
    inventory: &mut Inventory,
) -> anyhow::Result<()> {
    let ec2 = connect(inventory, &args.conn_manager, ManagerRole::Ec2, keys)?;
    let vpc = connect(inventory, &args.vpc_manager, ManagerRole::Vpc, keys)?;

    println!("importing account into the inventory...");
    let bootstrap = Bootstrap::new(Arc::new(ec2), Arc::new(vpc));
    let report = bootstrap
        .run(
            inventory,
            &BootstrapOptions {
                pool: args.pool.clone(),
                import_instances: !args.no_import,
            },
        )
        .await?;

    println!();
    println!("{} import finished", "✓".green());
    println!("  regions:         {}", report.regions);
    println!("  vpcs:            {}", report.vpcs);
    println!("  subnets:         {}", report.subnets);
    println!("  zones:           {}", report.zones);
    println!("  security groups: {}", report.security_groups);
    println!("  instances:       {}", report.instances);
    println!("  {} new entities", report.total().to_string().cyan());
    Ok(())
}
