//! Request signing and the work-queue client for AWS-style APIs.

pub mod credentials;
pub mod error;
pub mod signer;
pub mod sqs;

pub use credentials::Credentials;
pub use error::{QueueError, SigningError};
pub use signer::{SignableRequest, SignedHeaders, Signer};
pub use sqs::{QueueClient, QueueMessage};
