//! EC2 resource adapters: instances and security groups

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::types::{AttributeBooleanValue, Filter};
use aws_sdk_ec2::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use sandsweep_common::FeatureFlags;

use super::{Lister, Properties, PropertyError, Resource, SelfFilter};
use crate::aws::is_not_found;
use crate::region::Region;

/// Instance states worth deleting; `terminated` and `shutting-down`
/// instances are already on their way out.
const LIVE_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping", "stopped"];

pub struct Ec2InstanceLister;

#[async_trait]
impl Lister for Ec2InstanceLister {
    async fn list(&self, region: &Region) -> Result<Vec<Box<dyn Resource>>> {
        let client: Client = region.client().await;

        let mut resources: Vec<Box<dyn Resource>> = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = client.describe_instances().filters(
                Filter::builder()
                    .name("instance-state-name")
                    .set_values(Some(
                        LIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
                    ))
                    .build(),
            );
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }

            let response = request.send().await.context("Failed to describe instances")?;

            for reservation in response.reservations() {
                for instance in reservation.instances() {
                    let Some(instance_id) = instance.instance_id() else {
                        continue;
                    };
                    resources.push(Box::new(Ec2Instance {
                        client: client.clone(),
                        instance_id: instance_id.to_string(),
                        instance_type: instance
                            .instance_type()
                            .map(|t| t.as_str().to_string())
                            .unwrap_or_default(),
                        launch_time: instance.launch_time().and_then(|dt| {
                            DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
                        }),
                        tags: tag_map(instance.tags()),
                        clear_termination_protection: false,
                    }));
                }
            }

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        debug!(region = %region, count = resources.len(), "Found EC2 instances");
        Ok(resources)
    }
}

pub struct Ec2Instance {
    client: Client,
    instance_id: String,
    instance_type: String,
    launch_time: Option<DateTime<Utc>>,
    tags: HashMap<String, String>,
    clear_termination_protection: bool,
}

impl Ec2Instance {
    /// Clear `disableApiTermination` so the terminate call can succeed.
    async fn disable_termination_protection(&self) -> Result<()> {
        let result = self
            .client
            .modify_instance_attribute()
            .instance_id(&self.instance_id)
            .disable_api_termination(AttributeBooleanValue::builder().value(false).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => {
                Err(anyhow::Error::from(err).context("Failed to disable termination protection"))
            }
        }
    }
}

#[async_trait]
impl Resource for Ec2Instance {
    async fn remove(&self) -> Result<()> {
        if self.clear_termination_protection {
            self.disable_termination_protection().await?;
        }

        let result = self
            .client
            .terminate_instances()
            .instance_ids(&self.instance_id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(anyhow::Error::from(err).context("Failed to terminate instance")),
        }
    }

    fn id(&self) -> String {
        self.instance_id.clone()
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn set_feature_flags(&mut self, flags: &FeatureFlags) {
        self.clear_termination_protection = flags.disable_deletion_protection.ec2_instance;
    }
}

impl Properties for Ec2Instance {
    fn get(&self, name: &str) -> Result<String, PropertyError> {
        match name {
            "InstanceId" => Ok(self.instance_id.clone()),
            "InstanceType" => Ok(self.instance_type.clone()),
            "LaunchTime" => Ok(self
                .launch_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()),
            _ => tag_property(&self.tags, name),
        }
    }
}

pub struct Ec2SecurityGroupLister;

#[async_trait]
impl Lister for Ec2SecurityGroupLister {
    async fn list(&self, region: &Region) -> Result<Vec<Box<dyn Resource>>> {
        let client: Client = region.client().await;

        let mut resources: Vec<Box<dyn Resource>> = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = client.describe_security_groups();
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .context("Failed to describe security groups")?;

            for group in response.security_groups() {
                let Some(group_id) = group.group_id() else {
                    continue;
                };
                resources.push(Box::new(Ec2SecurityGroup {
                    client: client.clone(),
                    group_id: group_id.to_string(),
                    group_name: group.group_name().unwrap_or_default().to_string(),
                    tags: tag_map(group.tags()),
                }));
            }

            next_token = response.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }

        debug!(region = %region, count = resources.len(), "Found security groups");
        Ok(resources)
    }
}

pub struct Ec2SecurityGroup {
    client: Client,
    group_id: String,
    group_name: String,
    tags: HashMap<String, String>,
}

#[async_trait]
impl Resource for Ec2SecurityGroup {
    async fn remove(&self) -> Result<()> {
        let result = self
            .client
            .delete_security_group()
            .group_id(&self.group_id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(anyhow::Error::from(err).context("Failed to delete security group")),
        }
    }

    fn id(&self) -> String {
        self.group_id.clone()
    }

    fn self_filter(&self) -> Option<&dyn SelfFilter> {
        Some(self)
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }
}

impl SelfFilter for Ec2SecurityGroup {
    fn protected(&self) -> Result<Option<String>> {
        // Every VPC carries a `default` group AWS will not let go of.
        if self.group_name == "default" {
            Ok(Some("cannot delete group 'default'".to_string()))
        } else {
            Ok(None)
        }
    }
}

impl Properties for Ec2SecurityGroup {
    fn get(&self, name: &str) -> Result<String, PropertyError> {
        match name {
            "GroupId" => Ok(self.group_id.clone()),
            "Name" => Ok(self.group_name.clone()),
            _ => tag_property(&self.tags, name),
        }
    }
}

fn tag_map(tags: &[aws_sdk_ec2::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
            _ => None,
        })
        .collect()
}

/// Resolve `tag:<key>` property names against a tag map.
fn tag_property(tags: &HashMap<String, String>, name: &str) -> Result<String, PropertyError> {
    match name.strip_prefix("tag:") {
        Some(key) => Ok(tags.get(key).cloned().unwrap_or_default()),
        None => Err(PropertyError::Unsupported(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_property_lookup() {
        let tags = HashMap::from([("Name".to_string(), "web".to_string())]);
        assert_eq!(tag_property(&tags, "tag:Name").unwrap(), "web");
        assert_eq!(tag_property(&tags, "tag:Missing").unwrap(), "");
        assert!(matches!(
            tag_property(&tags, "Bogus"),
            Err(PropertyError::Unsupported(_))
        ));
    }
}
