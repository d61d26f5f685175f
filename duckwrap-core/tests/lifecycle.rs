use anyhow::Result;
use duckwrap_core::{
    ConnectionStatus, DuckDbWrapper, ErrorKind, ExportSource, ReadOptions, Record, Value,
    WrapperConfig, WrapperError,
};

fn assert_not_connected<T: std::fmt::Debug>(result: Result<T, WrapperError>) {
    match result {
        Err(err) => assert_eq!(err.kind(), ErrorKind::NotConnected, "{err}"),
        Ok(value) => panic!("expected NotConnected, got {value:?}"),
    }
}

fn every_operation_is_rejected(wrapper: &mut DuckDbWrapper) {
    let records = vec![Record::new().with("id", 1i64)];
    assert_not_connected(wrapper.execute_query("SELECT 1", &[]).map(|r| r.total_rows));
    assert_not_connected(
        wrapper
            .execute_query_streamed("SELECT 1", &[])
            .map(|stream| stream.rows_yielded()),
    );
    assert_not_connected(wrapper.read_file("data.parquet", &ReadOptions::new()).map(|r| r.total_rows));
    assert_not_connected(wrapper.read_file("data.txt", &ReadOptions::new()).map(|r| r.total_rows));
    assert_not_connected(wrapper.create_table("t", &records));
    assert_not_connected(wrapper.create_table("t", &[]));
    assert_not_connected(wrapper.execute_statement("CREATE TABLE t (id INTEGER)"));
    assert_not_connected(wrapper.drop_table("t"));
    assert_not_connected(wrapper.enable_remote_storage());
    assert_not_connected(wrapper.save_as_parquet(ExportSource::Table("t"), "/tmp/never.parquet"));
    assert_not_connected(wrapper.save_table_to_directory("t", "/tmp", "never"));
}

fn count(wrapper: &mut DuckDbWrapper, sql: &str) -> Result<i64> {
    let rows = wrapper.execute_query(sql, &[])?.records()?;
    match rows.first().and_then(|row| row.values().next()) {
        Some(Value::BigInt(n)) => Ok(*n),
        other => anyhow::bail!("unexpected count value {other:?}"),
    }
}

#[test]
fn operations_before_open_fail() {
    let mut wrapper = DuckDbWrapper::in_memory();
    every_operation_is_rejected(&mut wrapper);
    assert_eq!(wrapper.status(), ConnectionStatus::Unopened);
}

#[test]
fn operations_after_close_fail() -> Result<()> {
    let mut wrapper = DuckDbWrapper::connect(WrapperConfig::default())?;
    assert_eq!(wrapper.status(), ConnectionStatus::Open);
    wrapper.execute_query("SELECT 1", &[])?;

    wrapper.close()?;
    assert_eq!(wrapper.status(), ConnectionStatus::Closed);
    every_operation_is_rejected(&mut wrapper);
    Ok(())
}

#[test]
fn close_is_idempotent_and_terminal() -> Result<()> {
    let mut wrapper = DuckDbWrapper::in_memory();
    wrapper.open()?;
    wrapper.open()?;
    assert!(wrapper.is_open());

    wrapper.close()?;
    wrapper.close()?;
    assert_not_connected(wrapper.open());
    assert_eq!(wrapper.status(), ConnectionStatus::Closed);
    Ok(())
}

#[test]
fn lazy_open_promotes_unopened_on_first_use() -> Result<()> {
    let config = WrapperConfig {
        lazy_open: true,
        ..WrapperConfig::default()
    };
    let mut wrapper = DuckDbWrapper::new(config);
    assert_eq!(wrapper.status(), ConnectionStatus::Unopened);

    let result = wrapper.execute_query("SELECT 42 AS answer", &[])?;
    assert_eq!(result.total_rows, 1);
    assert_eq!(wrapper.status(), ConnectionStatus::Open);

    wrapper.close()?;
    assert_not_connected(wrapper.execute_query("SELECT 1", &[]).map(|r| r.total_rows));
    Ok(())
}

#[test]
fn file_database_survives_wrapper_instances() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lifecycle.duckdb");
    let path = path.to_string_lossy().to_string();

    {
        let mut wrapper = DuckDbWrapper::with_file(path.clone());
        wrapper.open()?;
        let records: Vec<Record> = (0..4i64).map(|i| Record::new().with("id", i)).collect();
        wrapper.create_table("kept", &records)?;
        // dropped without an explicit close
    }
    assert!(std::path::Path::new(&path).exists());

    let mut wrapper = DuckDbWrapper::with_file(path);
    wrapper.open()?;
    assert_eq!(count(&mut wrapper, "SELECT count(*) FROM kept")?, 4);
    Ok(())
}

#[test]
fn read_only_database_rejects_writes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ro.duckdb").to_string_lossy().to_string();
    {
        let mut wrapper = DuckDbWrapper::with_file(path.clone());
        wrapper.open()?;
        wrapper.execute_statement("CREATE TABLE fixed AS SELECT 1 AS id")?;
    }

    let config = WrapperConfig {
        read_only: true,
        ..WrapperConfig::with_database_path(path)
    };
    let mut wrapper = DuckDbWrapper::connect(config)?;
    assert_eq!(count(&mut wrapper, "SELECT count(*) FROM fixed")?, 1);
    let err = wrapper
        .execute_statement("INSERT INTO fixed VALUES (2)")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    Ok(())
}
