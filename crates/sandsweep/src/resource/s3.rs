//! S3 bucket adapter

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Lister, Properties, PropertyError, Resource};
use crate::aws::is_not_found;
use crate::region::Region;

pub struct S3BucketLister;

#[async_trait]
impl Lister for S3BucketLister {
    async fn list(&self, region: &Region) -> Result<Vec<Box<dyn Resource>>> {
        let client: Client = region.client().await;

        // ListBuckets is account-wide; keep only the buckets homed in this
        // region so each bucket shows up exactly once across the scan.
        let response = client
            .list_buckets()
            .send()
            .await
            .context("Failed to list buckets")?;

        let mut resources: Vec<Box<dyn Resource>> = Vec::new();
        for bucket in response.buckets() {
            let Some(name) = bucket.name() else {
                continue;
            };

            let location = client
                .get_bucket_location()
                .bucket(name)
                .send()
                .await
                .with_context(|| format!("Failed to get location of bucket {name:?}"))?;
            let bucket_region = location
                .location_constraint()
                .map(|c| c.as_str().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "us-east-1".to_string());
            if bucket_region != region.name() {
                continue;
            }

            resources.push(Box::new(S3Bucket {
                client: client.clone(),
                name: name.to_string(),
                creation_date: bucket
                    .creation_date()
                    .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())),
            }));
        }

        debug!(region = %region, count = resources.len(), "Found S3 buckets");
        Ok(resources)
    }
}

pub struct S3Bucket {
    client: Client,
    name: String,
    creation_date: Option<DateTime<Utc>>,
}

impl S3Bucket {
    /// Delete every object in the bucket; the bucket must be empty before
    /// DeleteBucket can succeed.
    async fn empty_bucket(&self) -> Result<()> {
        let mut continuation_token = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.name);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if is_not_found(&err) => return Ok(()),
                Err(err) => return Err(anyhow::Error::from(err).context("Failed to list objects")),
            };

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                if let Err(err) = self
                    .client
                    .delete_object()
                    .bucket(&self.name)
                    .key(key)
                    .send()
                    .await
                {
                    if !is_not_found(&err) {
                        return Err(anyhow::Error::from(err).context("Failed to delete object"));
                    }
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl Resource for S3Bucket {
    async fn remove(&self) -> Result<()> {
        self.empty_bucket().await?;

        match self.client.delete_bucket().bucket(&self.name).send().await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(anyhow::Error::from(err).context("Failed to delete bucket")),
        }
    }

    fn id(&self) -> String {
        self.name.clone()
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }
}

impl Properties for S3Bucket {
    fn get(&self, name: &str) -> Result<String, PropertyError> {
        match name {
            "Name" => Ok(self.name.clone()),
            "CreationDate" => Ok(self
                .creation_date
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()),
            _ => Err(PropertyError::Unsupported(name.to_string())),
        }
    }
}
