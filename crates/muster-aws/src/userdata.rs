//! User-data template rendering.
//!
//! The record's `user_data` field holds a Tera template; the entity name
//! and the launch-relevant record fields become template variables, using
//! the `ec2_*` names operators already write in templates.

use crate::error::Result;
use muster_inventory::InstanceRecord;
use tera::{Context, Tera};

pub fn render_user_data(name: &str, rec: &InstanceRecord) -> Result<Option<String>> {
    let Some(template) = &rec.user_data else {
        return Ok(None);
    };

    let mut ctx = Context::new();
    ctx.insert("name", name);
    if let Some(v) = &rec.image_id {
        ctx.insert("ec2_ami", v);
    }
    if let Some(v) = &rec.instance_type {
        ctx.insert("ec2_instance_type", v);
    }
    if let Some(v) = &rec.key_name {
        ctx.insert("ec2_key_name", v);
    }
    if let Some(v) = &rec.region {
        ctx.insert("ec2_region", v);
    }
    if let Some(v) = &rec.placement {
        ctx.insert("ec2_placement", v);
    }
    if let Some(v) = &rec.subnet_id {
        ctx.insert("ec2_subnet_id", v);
    }
    if let Some(v) = &rec.vpc_id {
        ctx.insert("vpc_id", v);
    }

    let rendered = Tera::one_off(template, &ctx, false)?;
    Ok(Some(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_record_fields() {
        let rec = InstanceRecord {
            user_data: Some("#!/bin/sh\nhostname {{ name }} # {{ ec2_instance_type }}".into()),
            instance_type: Some("m1.small".into()),
            ..Default::default()
        };
        let out = render_user_data("web01", &rec).unwrap().unwrap();
        assert_eq!(out, "#!/bin/sh\nhostname web01 # m1.small");
    }

    #[test]
    fn no_template_renders_nothing() {
        assert!(render_user_data("web01", &InstanceRecord::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn bad_template_is_an_error() {
        let rec = InstanceRecord {
            user_data: Some("{{ unclosed".into()),
            ..Default::default()
        };
        assert!(render_user_data("web01", &rec).is_err());
    }
}
