use crate::commands::{ec2, AwsKeys};
use muster_inventory::{Inventory, ManagerRole};

#[derive(clap::Args, Debug)]
pub struct VpcArgs {
    #[command(subcommand)]
    pub verb: ec2::Verb,
}

/// VPC instances share the EC2 verbs; only the default manager changes and
/// create requires a subnet.
pub async fn handle(
    args: VpcArgs,
    keys: &AwsKeys,
    inventory: &mut Inventory,
) -> anyhow::Result<()> {
    ec2::handle(args.verb, ManagerRole::Vpc, "vpcconnman", true, keys, inventory).await
}
