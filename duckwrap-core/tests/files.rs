use std::path::Path;

use anyhow::Result;
use duckwrap_core::{
    DuckDbWrapper, ErrorKind, ExportSource, FileFormat, ReadOptions, Record, Value, WrapperConfig,
    WrapperError,
};

fn open_wrapper() -> Result<DuckDbWrapper> {
    Ok(DuckDbWrapper::connect(WrapperConfig::default())?)
}

fn path_in(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().to_string()
}

fn write_cities_csv(dir: &Path, name: &str) -> Result<String> {
    let path = path_in(dir, name);
    std::fs::write(
        &path,
        "id,city,population\n1,Lisbon,545000\n2,Porto,232000\n3,Braga,193000\n",
    )?;
    Ok(path)
}

fn orders() -> Vec<Record> {
    (1..=5i64)
        .map(|i| {
            Record::new()
                .with("order_id", i)
                .with("customer", Value::Text(format!("c-{}", i % 2)))
                .with("amount", i as f64 * 10.0)
        })
        .collect()
}

#[test]
fn csv_is_read_with_projection_and_filters() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_cities_csv(dir.path(), "cities.csv")?;
    let mut wrapper = open_wrapper()?;

    let all = wrapper.read_file(&path, &ReadOptions::new())?;
    assert_eq!(all.total_rows, 3);
    assert_eq!(all.columns(), vec!["id", "city", "population"]);

    let options = ReadOptions::new()
        .columns(["city"])
        .filter("population > 200000")
        .filter("id <> 1 OR city = 'Lisbon'");
    let filtered = wrapper.read_file(&path, &options)?;
    assert_eq!(filtered.columns(), vec!["city"]);
    let cities: Vec<_> = filtered
        .records()?
        .into_iter()
        .filter_map(|row| row.get("city").cloned())
        .collect();
    assert_eq!(
        cities,
        vec![
            Value::Text("Lisbon".to_string()),
            Value::Text("Porto".to_string())
        ]
    );
    Ok(())
}

#[test]
fn unknown_extensions_are_unsupported() -> Result<()> {
    let mut wrapper = open_wrapper()?;
    let err = wrapper.read_file("data.txt", &ReadOptions::new()).unwrap_err();
    assert!(matches!(&err, WrapperError::UnsupportedFileType(path) if path == "data.txt"));
    assert_eq!(err.kind(), ErrorKind::UnsupportedFileType);
    Ok(())
}

#[test]
fn explicit_format_overrides_detection() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_cities_csv(dir.path(), "export.dat")?;
    let mut wrapper = open_wrapper()?;

    let result = wrapper.read_file(&path, &ReadOptions::new().format(FileFormat::Csv))?;
    assert_eq!(result.total_rows, 3);
    Ok(())
}

#[test]
fn missing_files_are_engine_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut wrapper = open_wrapper()?;
    let err = wrapper
        .read_file(&path_in(dir.path(), "absent.parquet"), &ReadOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    Ok(())
}

#[test]
fn saved_result_reads_back_identically() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = path_in(dir.path(), "orders.parquet");
    let mut wrapper = open_wrapper()?;
    wrapper.create_table("orders", &orders())?;

    let result = wrapper.execute_query("SELECT * FROM orders ORDER BY order_id", &[])?;
    wrapper.save_as_parquet(&result, &path)?;
    assert!(Path::new(&path).exists());

    let reread = wrapper.read_file(&path, &ReadOptions::new())?;
    assert_eq!(reread.total_rows, result.total_rows);
    assert_eq!(reread.columns(), result.columns());
    assert_eq!(reread.records()?, result.records()?);
    Ok(())
}

#[test]
fn filtered_result_export_keeps_only_selected_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = path_in(dir.path(), "big_orders.parquet");
    let mut wrapper = open_wrapper()?;
    wrapper.create_table("orders", &orders())?;

    let big = wrapper.execute_query(
        "SELECT order_id, amount FROM orders WHERE amount >= ? ORDER BY order_id",
        &[Value::Double(30.0)],
    )?;
    wrapper.save_as_parquet(&big, &path)?;

    let reread = wrapper.read_file(&path, &ReadOptions::new().filter("order_id > 3"))?;
    assert_eq!(reread.total_rows, 2);
    Ok(())
}

#[test]
fn tables_and_records_export_to_parquet() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut wrapper = open_wrapper()?;
    wrapper.create_table("orders", &orders())?;

    let table_path = path_in(dir.path(), "orders_table.parquet");
    wrapper.save_as_parquet("orders", &table_path)?;
    assert_eq!(
        wrapper.read_file(&table_path, &ReadOptions::new())?.total_rows,
        5
    );

    let records_path = path_in(dir.path(), "orders_records.parquet");
    let records = orders();
    wrapper.save_as_parquet(&records, &records_path)?;
    let reread = wrapper.read_file(&records_path, &ReadOptions::new())?;
    assert_eq!(reread.records()?, records);

    let err = wrapper
        .save_as_parquet(ExportSource::Records(&[]), &path_in(dir.path(), "empty.parquet"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyInput);
    Ok(())
}

#[test]
fn parquet_is_built_in_without_extension_autoloading() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = path_in(dir.path(), "offline.parquet");
    let config = WrapperConfig {
        autoload_extensions: false,
        ..WrapperConfig::default()
    };
    let mut wrapper = DuckDbWrapper::connect(config)?;

    let loaded = wrapper
        .execute_query(
            "SELECT loaded FROM duckdb_extensions() WHERE extension_name = 'parquet'",
            &[],
        )?
        .records()?;
    assert_eq!(loaded[0].get("loaded"), Some(&Value::Boolean(true)));

    wrapper.save_as_parquet(&orders(), &path)?;
    let back = wrapper.read_file(&path, &ReadOptions::new())?;
    assert_eq!(back.records()?, orders());
    Ok(())
}

#[test]
fn table_saved_into_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out_dir = format!("{}/", dir.path().to_string_lossy());
    let mut wrapper = open_wrapper()?;
    wrapper.create_table("orders", &orders())?;

    let path = wrapper.save_table_to_directory("orders", &out_dir, "snapshot")?;
    assert!(path.ends_with("/snapshot.parquet"));
    assert!(!path.contains("//"));
    assert!(Path::new(&path).exists());
    assert_eq!(wrapper.read_file(&path, &ReadOptions::new())?.total_rows, 5);
    Ok(())
}

#[test]
fn unwritable_destination_is_an_engine_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut wrapper = open_wrapper()?;
    wrapper.create_table("orders", &orders())?;

    let path = path_in(dir.path(), "missing/sub/dir/orders.parquet");
    let err = wrapper.save_as_parquet("orders", &path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    Ok(())
}
