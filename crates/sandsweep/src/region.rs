//! Per-region handles
//!
//! A region handle carries the region name and the lazily created session
//! shared by every lister and resource handle bound to it. Global services
//! (IAM and friends) are scanned through the `global` pseudo-region, which
//! signs its requests against us-east-1.

use crate::aws::{FromSession, Session};

/// Pseudo-region hosting global (non-regional) services.
pub const GLOBAL_REGION: &str = "global";

/// Region the SDK signs global-service requests against.
const GLOBAL_SDK_REGION: &str = "us-east-1";

/// One region of the target account.
pub struct Region {
    name: String,
    session: Session,
}

impl Region {
    pub fn new(name: impl Into<String>, profile: Option<String>) -> Self {
        let name = name.into();
        let sign_region = if name == GLOBAL_REGION {
            GLOBAL_SDK_REGION.to_string()
        } else {
            name.clone()
        };
        Self {
            name,
            session: Session::new(sign_region, profile),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the pseudo-region for global services.
    pub fn is_global(&self) -> bool {
        self.name == GLOBAL_REGION
    }

    /// A service client signed for this region, creating the session on
    /// first use.
    pub async fn client<C: FromSession>(&self) -> C {
        self.session.client().await
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_region() {
        assert!(Region::new(GLOBAL_REGION, None).is_global());
        assert!(!Region::new("us-east-1", None).is_global());
    }

    #[test]
    fn test_global_signs_against_us_east_1() {
        assert_eq!(
            Region::new(GLOBAL_REGION, None).session.region(),
            "us-east-1"
        );
        assert_eq!(Region::new("eu-west-1", None).session.region(), "eu-west-1");
    }
}
