//! IAM adapters: roles and instance profiles
//!
//! IAM is a global service; both kinds are registered with global scope and
//! enumerated once per scan through the `global` pseudo-region.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_iam::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Lister, Properties, PropertyError, Resource, SelfFilter};
use crate::aws::is_not_found;
use crate::region::Region;

/// Roles under this path belong to AWS services and cannot be deleted.
const SERVICE_ROLE_PATH: &str = "/aws-service-role/";

pub struct IamRoleLister;

#[async_trait]
impl Lister for IamRoleLister {
    async fn list(&self, region: &Region) -> Result<Vec<Box<dyn Resource>>> {
        let client: Client = region.client().await;

        let mut resources: Vec<Box<dyn Resource>> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = client.list_roles();
            if let Some(m) = &marker {
                request = request.marker(m);
            }

            let response = request.send().await.context("Failed to list roles")?;

            for role in response.roles() {
                resources.push(Box::new(IamRole {
                    client: client.clone(),
                    name: role.role_name().to_string(),
                    path: role.path().to_string(),
                    create_date: DateTime::from_timestamp(
                        role.create_date().secs(),
                        role.create_date().subsec_nanos(),
                    ),
                }));
            }

            if response.is_truncated() {
                marker = response.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        debug!(count = resources.len(), "Found IAM roles");
        Ok(resources)
    }
}

pub struct IamRole {
    client: Client,
    name: String,
    path: String,
    create_date: Option<DateTime<Utc>>,
}

impl IamRole {
    /// Managed policies must be detached and inline policies deleted before
    /// DeleteRole succeeds.
    async fn strip_policies(&self) -> Result<()> {
        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(&self.name)
            .send()
            .await;
        match attached {
            Ok(response) => {
                for policy in response.attached_policies() {
                    if let Some(arn) = policy.policy_arn() {
                        if let Err(err) = self
                            .client
                            .detach_role_policy()
                            .role_name(&self.name)
                            .policy_arn(arn)
                            .send()
                            .await
                        {
                            if !is_not_found(&err) {
                                return Err(anyhow::Error::from(err)
                                    .context("Failed to detach role policy"));
                            }
                        }
                    }
                }
            }
            Err(err) if is_not_found(&err) => return Ok(()),
            Err(err) => {
                return Err(anyhow::Error::from(err).context("Failed to list attached policies"))
            }
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(&self.name)
            .send()
            .await;
        match inline {
            Ok(response) => {
                for policy_name in response.policy_names() {
                    if let Err(err) = self
                        .client
                        .delete_role_policy()
                        .role_name(&self.name)
                        .policy_name(policy_name)
                        .send()
                        .await
                    {
                        if !is_not_found(&err) {
                            return Err(
                                anyhow::Error::from(err).context("Failed to delete role policy")
                            );
                        }
                    }
                }
                Ok(())
            }
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(anyhow::Error::from(err).context("Failed to list inline policies")),
        }
    }
}

#[async_trait]
impl Resource for IamRole {
    async fn remove(&self) -> Result<()> {
        self.strip_policies().await?;

        match self.client.delete_role().role_name(&self.name).send().await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(anyhow::Error::from(err).context("Failed to delete role")),
        }
    }

    fn id(&self) -> String {
        self.name.clone()
    }

    fn self_filter(&self) -> Option<&dyn SelfFilter> {
        Some(self)
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }
}

impl SelfFilter for IamRole {
    fn protected(&self) -> Result<Option<String>> {
        if self.path.starts_with(SERVICE_ROLE_PATH) {
            Ok(Some("cannot delete service-linked role".to_string()))
        } else {
            Ok(None)
        }
    }
}

impl Properties for IamRole {
    fn get(&self, name: &str) -> Result<String, PropertyError> {
        match name {
            "Name" => Ok(self.name.clone()),
            "Path" => Ok(self.path.clone()),
            "CreateDate" => Ok(self
                .create_date
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()),
            _ => Err(PropertyError::Unsupported(name.to_string())),
        }
    }
}

pub struct IamInstanceProfileLister;

#[async_trait]
impl Lister for IamInstanceProfileLister {
    async fn list(&self, region: &Region) -> Result<Vec<Box<dyn Resource>>> {
        let client: Client = region.client().await;

        let mut resources: Vec<Box<dyn Resource>> = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = client.list_instance_profiles();
            if let Some(m) = &marker {
                request = request.marker(m);
            }

            let response = request
                .send()
                .await
                .context("Failed to list instance profiles")?;

            for profile in response.instance_profiles() {
                resources.push(Box::new(IamInstanceProfile {
                    client: client.clone(),
                    name: profile.instance_profile_name().to_string(),
                    path: profile.path().to_string(),
                    roles: profile
                        .roles()
                        .iter()
                        .map(|r| r.role_name().to_string())
                        .collect(),
                }));
            }

            if response.is_truncated() {
                marker = response.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        debug!(count = resources.len(), "Found IAM instance profiles");
        Ok(resources)
    }
}

pub struct IamInstanceProfile {
    client: Client,
    name: String,
    path: String,
    roles: Vec<String>,
}

#[async_trait]
impl Resource for IamInstanceProfile {
    async fn remove(&self) -> Result<()> {
        // Attached roles block profile deletion.
        for role in &self.roles {
            if let Err(err) = self
                .client
                .remove_role_from_instance_profile()
                .instance_profile_name(&self.name)
                .role_name(role)
                .send()
                .await
            {
                if !is_not_found(&err) {
                    return Err(anyhow::Error::from(err)
                        .context("Failed to remove role from instance profile"));
                }
            }
        }

        let result = self
            .client
            .delete_instance_profile()
            .instance_profile_name(&self.name)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(anyhow::Error::from(err).context("Failed to delete instance profile")),
        }
    }

    fn id(&self) -> String {
        self.name.clone()
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }
}

impl Properties for IamInstanceProfile {
    fn get(&self, name: &str) -> Result<String, PropertyError> {
        match name {
            "Name" => Ok(self.name.clone()),
            "Path" => Ok(self.path.clone()),
            _ => Err(PropertyError::Unsupported(name.to_string())),
        }
    }
}
