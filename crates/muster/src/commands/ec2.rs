use crate::commands::{connect, AwsKeys};
use crate::output::{render, Format};
use anyhow::bail;
use colored::Colorize;
use muster_aws::{DEFAULT_POLL_INTERVAL, MAX_POLL_COUNT};
use muster_inventory::{InstanceRecord, Inventory, ManagerRole, Record};
use std::collections::BTreeMap;

#[derive(clap::Args, Debug)]
pub struct Ec2Args {
    #[command(subcommand)]
    pub verb: Verb,
}

#[derive(clap::Subcommand, Debug)]
pub enum Verb {
    /// Launch the named instances
    Create(CommandOpts),
    /// Start stopped instances
    Start(CommandOpts),
    /// Stop running instances
    Stop(CommandOpts),
    /// Print the recorded resource for each instance
    Show(CommandOpts),
    /// Print the live cloud state of each instance
    State(CommandOpts),
}

#[derive(clap::Args, Debug)]
pub struct CommandOpts {
    /// Instance entity names
    #[arg(required = true)]
    pub instances: Vec<String>,
    /// Connection manager entity
    #[arg(short = 'c', long)]
    pub conn_manager: Option<String>,
    /// Insert created instances into this pool (repeatable)
    #[arg(short = 'p', long = "pool")]
    pub pools: Vec<String>,
    /// Security group names for created instances (repeatable)
    #[arg(long = "security-group")]
    pub security_groups: Vec<String>,
    /// Subnet for created instances
    #[arg(long)]
    pub subnet_id: Option<String>,
    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = Format::Pprint)]
    pub format: Format,
    /// Poll until the target state is reached
    #[arg(long)]
    pub wait: bool,
}

pub async fn handle(
    verb: Verb,
    role: ManagerRole,
    default_manager: &str,
    require_subnet: bool,
    keys: &AwsKeys,
    inventory: &mut Inventory,
) -> anyhow::Result<()> {
    match verb {
        Verb::Create(opts) => create(&opts, role, default_manager, require_subnet, keys, inventory).await,
        Verb::Start(opts) => {
            transition(&opts, role, default_manager, keys, inventory, "running").await
        }
        Verb::Stop(opts) => {
            transition(&opts, role, default_manager, keys, inventory, "stopped").await
        }
        Verb::Show(opts) => show(&opts, role, default_manager, keys, inventory).await,
        Verb::State(opts) => state(&opts, role, default_manager, keys, inventory).await,
    }
}

fn manager_name<'a>(opts: &'a CommandOpts, default_manager: &'a str) -> &'a str {
    opts.conn_manager.as_deref().unwrap_or(default_manager)
}

/// Known instance entities among the requested names. Unknown names are
/// warned about and skipped.
fn resolve_existing(inventory: &Inventory, names: &[String]) -> anyhow::Result<Vec<String>> {
    let mut resolved = Vec::new();
    for name in names {
        if inventory.get(name).is_some() {
            resolved.push(name.clone());
        } else {
            eprintln!("{} unknown instance '{}', skipping", "warning:".yellow(), name);
        }
    }
    if resolved.is_empty() {
        bail!("Cannot run with an empty list of instances");
    }
    Ok(resolved)
}

/// For create, missing entities are declared on the fly from the flags.
fn resolve_or_declare(
    inventory: &mut Inventory,
    opts: &CommandOpts,
    require_subnet: bool,
) -> anyhow::Result<Vec<String>> {
    for name in &opts.instances {
        if inventory.get(name).is_none() {
            if require_subnet && opts.subnet_id.is_none() {
                bail!("--subnet-id is required to create instance '{}'", name);
            }
            let mut rec = InstanceRecord::default();
            rec.security_groups = opts.security_groups.clone();
            rec.subnet_id = opts.subnet_id.clone();
            inventory.get_or_create(name, Record::Instance(Box::new(rec)))?;
        }
        for pool in &opts.pools {
            inventory.get_or_create(pool, Record::Pool)?;
            inventory.insert(pool, name)?;
        }
    }
    Ok(opts.instances.clone())
}

async fn create(
    opts: &CommandOpts,
    role: ManagerRole,
    default_manager: &str,
    require_subnet: bool,
    keys: &AwsKeys,
    inventory: &mut Inventory,
) -> anyhow::Result<()> {
    let conn = connect(inventory, manager_name(opts, default_manager), role, keys)?;
    let names = resolve_or_declare(inventory, opts, require_subnet)?;

    let mut failures = 0;
    for name in &names {
        match conn.create_instance(inventory, name, opts.wait).await {
            Ok(outcome) => {
                println!(
                    "{} {} ({})",
                    "✓".green(),
                    name,
                    outcome.resource.instance_id
                );
                if let Some(wait) = outcome.wait {
                    if !wait.reached() {
                        eprintln!("{} {}: {}", "warning:".yellow(), name, wait);
                    }
                }
            }
            Err(err) => {
                failures += 1;
                eprintln!("{} {}: {}", "✗".red(), name, err);
            }
        }
    }
    if failures > 0 {
        bail!("{} of {} instances failed to launch", failures, names.len());
    }
    Ok(())
}

async fn transition(
    opts: &CommandOpts,
    role: ManagerRole,
    default_manager: &str,
    keys: &AwsKeys,
    inventory: &mut Inventory,
    target: &str,
) -> anyhow::Result<()> {
    let conn = connect(inventory, manager_name(opts, default_manager), role, keys)?;
    let names = resolve_existing(inventory, &opts.instances)?;

    for name in &names {
        match target {
            "running" => conn.start_instance(inventory, name).await?,
            _ => conn.stop_instance(inventory, name).await?,
        }
        println!("{} {}", "✓".green(), name);
    }

    if opts.wait {
        for name in &names {
            let outcome = conn
                .wait_for_state(inventory, name, target, DEFAULT_POLL_INTERVAL, MAX_POLL_COUNT)
                .await?;
            if !outcome.reached() {
                eprintln!("{} {}: {}", "warning:".yellow(), name, outcome);
            }
        }
    }
    Ok(())
}

async fn show(
    opts: &CommandOpts,
    role: ManagerRole,
    default_manager: &str,
    keys: &AwsKeys,
    inventory: &mut Inventory,
) -> anyhow::Result<()> {
    let conn = connect(inventory, manager_name(opts, default_manager), role, keys)?;
    let names = resolve_existing(inventory, &opts.instances)?;

    for name in &names {
        let snapshot = conn.resource_snapshot(inventory, name)?;
        println!("{}:", name.cyan());
        println!("{}", render(&snapshot, opts.format)?);
    }
    Ok(())
}

async fn state(
    opts: &CommandOpts,
    role: ManagerRole,
    default_manager: &str,
    keys: &AwsKeys,
    inventory: &mut Inventory,
) -> anyhow::Result<()> {
    let conn = connect(inventory, manager_name(opts, default_manager), role, keys)?;
    let names = resolve_existing(inventory, &opts.instances)?;

    let mut states = BTreeMap::new();
    for name in &names {
        states.insert(name.clone(), conn.instance_state(inventory, name).await?);
    }
    println!("{}", render(&states, opts.format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::output::{render, Format};
    use std::collections::BTreeMap;

    #[test]
    fn state_output_follows_the_format_table() {
        let mut states = BTreeMap::new();
        states.insert("web01".to_string(), "running".to_string());
        states.insert("web02".to_string(), "stopped".to_string());

        let yaml = render(&states, Format::Yaml).unwrap();
        assert!(yaml.contains("web01: running"));
        assert!(yaml.contains("web02: stopped"));

        let json = render(&states, Format::Json).unwrap();
        assert!(json.contains("\"web01\": \"running\""));
    }
}
