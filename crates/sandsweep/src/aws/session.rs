//! Lazily created AWS sessions
//!
//! A [`Session`] owns the credential and region configuration for one
//! region. Nothing is loaded until the first client is requested; afterwards
//! every client shares the same loaded config.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tokio::sync::OnceCell;

/// Service clients that can be constructed from a loaded session.
pub trait FromSession {
    fn from_session(config: &SdkConfig) -> Self;
}

impl FromSession for aws_sdk_ec2::Client {
    fn from_session(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

impl FromSession for aws_sdk_iam::Client {
    fn from_session(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

impl FromSession for aws_sdk_s3::Client {
    fn from_session(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

impl FromSession for aws_sdk_sts::Client {
    fn from_session(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

/// One authenticated session, bound to a region and an optional named
/// credentials profile.
///
/// Credentials, region configuration, and other SDK settings come from the
/// environment, config files, and IAM roles. Loading happens on first use;
/// the loaded config is safe to share across concurrent requests.
pub struct Session {
    region: String,
    profile: Option<String>,
    config: OnceCell<SdkConfig>,
}

impl Session {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            region: region.into(),
            profile,
            config: OnceCell::new(),
        }
    }

    /// The region this session signs requests against.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The loaded SDK config, created on first call and reused afterwards.
    pub async fn sdk_config(&self) -> &SdkConfig {
        self.config
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()));
                if let Some(profile) = &self.profile {
                    loader = loader.profile_name(profile);
                }
                loader.load().await
            })
            .await
    }

    /// A service client backed by this session.
    pub async fn client<C: FromSession>(&self) -> C {
        C::from_session(self.sdk_config().await)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
