use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use duckwrap_core::storage::{AwsCredentials, CredentialProvider};
use duckwrap_core::{DuckDbWrapper, ErrorKind, ReadOptions, Record, WrapperConfig, WrapperError};

/// Provider with no credential source behind it.
struct Unavailable {
    calls: AtomicUsize,
}

impl CredentialProvider for Unavailable {
    fn resolve(&self) -> Result<AwsCredentials, WrapperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WrapperError::CredentialsUnavailable(
            "no credential source resolved".to_string(),
        ))
    }
}

#[test]
fn unresolvable_credentials_fail_before_loading_extensions() -> Result<()> {
    let provider = Arc::new(Unavailable {
        calls: AtomicUsize::new(0),
    });
    let mut wrapper = DuckDbWrapper::new(WrapperConfig::default())
        .with_credential_provider(provider.clone());
    wrapper.open()?;

    let err = wrapper.enable_remote_storage().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialsUnavailable);

    // each call asks the provider again
    let err = wrapper.enable_remote_storage().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialsUnavailable);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    let secrets = wrapper.execute_query("SELECT count(*) AS n FROM duckdb_secrets()", &[])?;
    assert_eq!(secrets.records()?[0].get("n"), Some(&duckwrap_core::Value::BigInt(0)));
    Ok(())
}

#[test]
fn closed_wrapper_does_not_consult_provider() -> Result<()> {
    let provider = Arc::new(Unavailable {
        calls: AtomicUsize::new(0),
    });
    let mut wrapper = DuckDbWrapper::new(WrapperConfig::default())
        .with_credential_provider(provider.clone());

    let err = wrapper.enable_remote_storage().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

/// Round trip through a real bucket.
///
/// Set `DUCKWRAP_TEST_S3_PREFIX` (for example `s3://my-bucket/duckwrap-tests`)
/// and make AWS credentials available through the usual environment or profile.
#[test]
#[ignore = "requires network access and AWS credentials"]
fn s3_round_trip() -> Result<()> {
    let prefix = std::env::var("DUCKWRAP_TEST_S3_PREFIX")?;
    let config = WrapperConfig {
        s3_region: std::env::var("AWS_REGION").ok(),
        ..WrapperConfig::default()
    };
    let mut wrapper = DuckDbWrapper::connect(config)?;
    wrapper.enable_remote_storage()?;
    // refreshing the secret is allowed
    wrapper.enable_remote_storage()?;

    let records: Vec<Record> = (0..10i64)
        .map(|i| Record::new().with("id", i).with("half", i as f64 / 2.0))
        .collect();
    wrapper.create_table("remote_rows", &records)?;

    let path = wrapper.save_table_to_directory("remote_rows", &prefix, "round_trip")?;
    let reread = wrapper.read_file(&path, &ReadOptions::new().filter("id >= 5"))?;
    assert_eq!(reread.total_rows, 5);
    Ok(())
}
