use std::fmt;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use tracing::{debug, instrument};

use crate::config::WrapperConfig;
use crate::error::WrapperError;

/// Credentials registered as an S3 secret inside the connection.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .finish()
    }
}

/// Source of cloud credentials, consulted every time remote storage is enabled.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self) -> Result<AwsCredentials, WrapperError>;
}

#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: AwsCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn resolve(&self) -> Result<AwsCredentials, WrapperError> {
        Ok(self.credentials.clone())
    }
}

/// The AWS SDK default credential chain.
///
/// Resolution drives the SDK on a private current-thread runtime. Calling it
/// from inside an async runtime fails with `CredentialsUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct AwsCredentialChain {
    region: Option<String>,
}

impl AwsCredentialChain {
    pub fn new(region: Option<String>) -> Self {
        Self { region }
    }
}

impl CredentialProvider for AwsCredentialChain {
    #[instrument(skip(self))]
    fn resolve(&self) -> Result<AwsCredentials, WrapperError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(WrapperError::CredentialsUnavailable(
                "the AWS credential chain cannot block inside an async runtime; \
                 resolve credentials outside it or configure a static key pair"
                    .into(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                WrapperError::CredentialsUnavailable(format!(
                    "failed to start credential runtime: {err}"
                ))
            })?;

        runtime.block_on(async {
            let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            let provider = sdk_config.credentials_provider().ok_or_else(|| {
                WrapperError::CredentialsUnavailable("no credential provider configured".into())
            })?;
            let creds = provider
                .provide_credentials()
                .await
                .map_err(|err| WrapperError::CredentialsUnavailable(err.to_string()))?;
            let region = self
                .region
                .clone()
                .or_else(|| sdk_config.region().map(|region| region.to_string()));

            debug!(
                region = ?region,
                has_session_token = creds.session_token().is_some(),
                "resolved AWS credentials"
            );
            Ok::<_, WrapperError>(AwsCredentials {
                access_key_id: creds.access_key_id().to_string(),
                secret_access_key: creds.secret_access_key().to_string(),
                session_token: creds.session_token().map(str::to_string),
                region,
            })
        })
    }
}

/// Static credentials when the configuration carries a key pair, the AWS
/// default chain otherwise.
pub fn provider_from_config(config: &WrapperConfig) -> Arc<dyn CredentialProvider> {
    match (&config.s3_access_key_id, &config.s3_secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => {
            Arc::new(StaticCredentialProvider::new(AwsCredentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: config.s3_session_token.clone(),
                region: config.s3_region.clone(),
            }))
        }
        _ => Arc::new(AwsCredentialChain::new(config.s3_region.clone())),
    }
}
