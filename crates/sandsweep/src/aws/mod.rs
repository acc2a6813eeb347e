//! AWS session, identity, and error plumbing

pub mod account;
pub mod error;
pub mod session;

pub use account::{Account, AccountId};
pub use error::{classify_aws_error, is_not_found, AwsError};
pub use session::{FromSession, Session};
