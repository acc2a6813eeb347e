//! AWS account identity resolution
//!
//! The live account id and aliases are captured once at startup and checked
//! against the configuration before anything is scanned or deleted.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::session::Session;

/// Strongly-typed AWS account ID (12-digit string)
///
/// This newtype prevents accidentally mixing account IDs with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Get the account ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The resolved identity of the account this run operates on.
#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    aliases: Vec<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, aliases: Vec<String>) -> Self {
        Self {
            id: AccountId(id.into()),
            aliases,
        }
    }

    /// Resolve the live account from credentials.
    ///
    /// The id comes from STS GetCallerIdentity, which always succeeds when
    /// credentials are valid. Aliases come from IAM ListAccountAliases; a
    /// failure there degrades to an empty alias list rather than aborting,
    /// since alias checks are opt-in per account block.
    pub async fn resolve(session: &Session) -> Result<Self> {
        let sts: aws_sdk_sts::Client = session.client().await;
        let identity = sts
            .get_caller_identity()
            .send()
            .await
            .context("Failed to get AWS caller identity - check credentials")?;

        let id = identity
            .account()
            .context("No account ID returned from STS GetCallerIdentity")?
            .to_string();

        let iam: aws_sdk_iam::Client = session.client().await;
        let aliases = match iam.list_account_aliases().send().await {
            Ok(response) => response.account_aliases().to_vec(),
            Err(e) => {
                warn!(error = ?e, "Failed to list account aliases");
                Vec::new()
            }
        };

        info!(account_id = %id, aliases = ?aliases, "AWS account resolved");

        Ok(Self::new(id, aliases))
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The primary alias, for operator-facing messages.
    pub fn alias(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or("none")
    }
}
