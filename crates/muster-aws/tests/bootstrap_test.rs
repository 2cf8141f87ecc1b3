//! Account import against an in-memory cloud.

mod common;

use common::FakeCloud;
use muster_aws::{Bootstrap, BootstrapOptions, CloudInstance, ConnectionManager};
use muster_inventory::{EntityKind, Inventory, ManagerRole};
use std::sync::Arc;

fn seeded_cloud() -> Arc<FakeCloud> {
    let cloud = Arc::new(FakeCloud::new());
    cloud.add_region("us-east-1");
    cloud.add_zone("us-east-1", "us-east-1a");
    cloud.add_vpc("us-east-1", "vpc-aaa", "10.0.0.0/16");
    cloud.add_subnet("us-east-1", "vpc-aaa", "subnet-bbb", "us-east-1a");
    cloud.add_group("us-east-1", "sg-ccc", "web", Some("vpc-aaa"));

    // One VPC instance with a Name tag, one classic instance without.
    let mut vpc_instance = CloudInstance {
        instance_id: "i-0001".to_string(),
        instance_type: Some("m1.small".to_string()),
        region: "us-east-1".to_string(),
        placement: Some("us-east-1a".to_string()),
        subnet_id: Some("subnet-bbb".to_string()),
        vpc_id: Some("vpc-aaa".to_string()),
        state: "running".to_string(),
        private_ip: Some("10.0.0.5".to_string()),
        security_group_ids: vec!["sg-ccc".to_string()],
        ..Default::default()
    };
    vpc_instance
        .tags
        .insert("Name".to_string(), "Web Server".to_string());
    cloud.add_instance(vpc_instance);

    cloud.add_instance(CloudInstance {
        instance_id: "i-0002".to_string(),
        instance_type: Some("m1.large".to_string()),
        region: "us-east-1".to_string(),
        placement: Some("us-east-1a".to_string()),
        state: "running".to_string(),
        private_ip: Some("10.0.0.9".to_string()),
        ..Default::default()
    });
    cloud
}

fn managers(cloud: &Arc<FakeCloud>) -> Bootstrap {
    let ec2 = ConnectionManager::new(
        "ec2connman",
        ManagerRole::Ec2,
        "us-east-1",
        cloud.clone() as Arc<dyn muster_aws::Ec2Api>,
    );
    let vpc = ConnectionManager::new(
        "vpcconnman",
        ManagerRole::Vpc,
        "us-east-1",
        cloud.clone() as Arc<dyn muster_aws::Ec2Api>,
    );
    Bootstrap::new(Arc::new(ec2), Arc::new(vpc))
}

#[tokio::test]
async fn import_builds_the_resource_graph() {
    let cloud = seeded_cloud();
    let bootstrap = managers(&cloud);
    let mut inventory = Inventory::default();

    let opts = BootstrapOptions {
        pool: Some("production".to_string()),
        import_instances: true,
    };
    let report = bootstrap.run(&mut inventory, &opts).await.unwrap();

    assert_eq!(report.regions, 1);
    assert_eq!(report.vpcs, 1);
    assert_eq!(report.subnets, 1);
    assert_eq!(report.zones, 1);
    assert_eq!(report.security_groups, 1);
    assert_eq!(report.instances, 2);

    // Location hierarchy.
    assert!(inventory.expect_kind("us-east-1", EntityKind::Region).is_ok());
    assert!(inventory.contains("us-east-1", "vpc-aaa"));
    assert!(inventory.contains("vpc-aaa", "subnet-bbb"));
    assert!(inventory.contains("us-east-1", "us-east-1a"));
    assert!(inventory.contains("us-east-1a", "subnet-bbb"));
    assert!(inventory.contains("production", "us-east-1"));
    assert!(inventory.contains("vpc-aaa", "sg-ccc"));

    // Converted records.
    let vpc = inventory.expect("vpc-aaa").unwrap();
    match &vpc.record {
        muster_inventory::Record::Vpc(rec) => {
            assert_eq!(rec.cidr_block.as_deref(), Some("10.0.0.0/16"));
            assert_eq!(rec.region.as_deref(), Some("us-east-1"));
        }
        other => panic!("vpc-aaa holds a {} record", other.kind()),
    }

    // The tagged instance imports under its normalized name, bound to the
    // VPC manager.
    let rec = inventory.instance("web_server").unwrap();
    assert_eq!(rec.instance_id.as_deref(), Some("i-0001"));
    assert_eq!(rec.instance_type.as_deref(), Some("m1.small"));
    assert_eq!(rec.manager.as_deref(), Some("vpcconnman"));
    assert_eq!(
        rec.private_ip,
        Some(muster_aws::encode_ip("10.0.0.5".parse().unwrap()))
    );
    assert!(inventory.contains("subnet-bbb", "web_server"));
    assert!(inventory.contains("sg-ccc", "web_server"));

    // The untagged classic instance keeps its id as the entity name and
    // goes to the EC2 manager.
    let rec = inventory.instance("i-0002").unwrap();
    assert_eq!(rec.manager.as_deref(), Some("ec2connman"));
    assert!(inventory.contains("us-east-1a", "i-0002"));
}

#[tokio::test]
async fn import_is_idempotent() {
    let cloud = seeded_cloud();
    let bootstrap = managers(&cloud);
    let mut inventory = Inventory::default();

    let opts = BootstrapOptions {
        pool: Some("production".to_string()),
        import_instances: true,
    };
    let first = bootstrap.run(&mut inventory, &opts).await.unwrap();
    assert_eq!(first.total(), 7);

    let names: Vec<String> = inventory
        .of_kind(EntityKind::Instance)
        .map(|e| e.name.clone())
        .collect();

    let second = bootstrap.run(&mut inventory, &opts).await.unwrap();
    assert_eq!(second.total(), 0);

    let names_after: Vec<String> = inventory
        .of_kind(EntityKind::Instance)
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names, names_after);
}

#[tokio::test]
async fn reimport_refreshes_ip_metadata() {
    use muster_aws::Ec2Api;

    let cloud = seeded_cloud();
    let bootstrap = managers(&cloud);
    let mut inventory = Inventory::default();

    let opts = BootstrapOptions::default();
    bootstrap.run(&mut inventory, &opts).await.unwrap();
    assert!(inventory.instance("web_server").unwrap().public_ip.is_none());

    // The instance picks up a public address between imports.
    cloud
        .associate_address("us-east-1", "i-0001", "54.234.0.40")
        .await
        .unwrap();

    bootstrap.run(&mut inventory, &opts).await.unwrap();
    assert_eq!(
        inventory.instance("web_server").unwrap().public_ip,
        Some(muster_aws::encode_ip("54.234.0.40".parse().unwrap()))
    );
}

#[tokio::test]
async fn import_can_skip_instances() {
    let cloud = seeded_cloud();
    let bootstrap = managers(&cloud);
    let mut inventory = Inventory::default();

    let opts = BootstrapOptions {
        pool: None,
        import_instances: false,
    };
    let report = bootstrap.run(&mut inventory, &opts).await.unwrap();

    assert_eq!(report.instances, 0);
    assert!(inventory.get("web_server").is_none());
    assert!(inventory.get("i-0002").is_none());
    assert!(inventory.get("vpc-aaa").is_some());
}
