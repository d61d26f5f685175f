//! Remote storage support.
//!
//! - `CredentialProvider`: resolves cloud credentials at call time
//! - `StaticCredentialProvider`: fixed key pair (configuration, tests)
//! - `AwsCredentialChain`: AWS default chain (environment, profile, instance role)

pub mod credentials;

pub use credentials::{
    provider_from_config, AwsCredentialChain, AwsCredentials, CredentialProvider,
    StaticCredentialProvider,
};
