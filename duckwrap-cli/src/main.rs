//! duckwrap CLI - run queries and file conversions against an embedded DuckDB

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, CellAlignment, Color,
    ContentArrangement, Table,
};
use duckdb::arrow::util::display::array_value_to_string;
use duckwrap_core::{
    records_from_json, DuckDbWrapper, FileFormat, QueryResult, ReadOptions, Value, WrapperConfig,
};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// duckwrap - embedded DuckDB with S3 and Parquet/CSV helpers
#[derive(Parser, Debug)]
#[command(name = "duckwrap")]
#[command(about = "Query files and tables with an embedded DuckDB", long_about = None)]
struct Args {
    /// Database file (in-memory when omitted); overrides DUCKWRAP_DATABASE_PATH
    #[arg(short = 'D', long, global = true)]
    database: Option<String>,

    /// Enable S3 access with credentials from the AWS default chain
    #[arg(long, global = true)]
    s3: bool,

    /// Print rows as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a query and print the materialized result
    Query {
        sql: String,
        /// Positional parameter for `?` placeholders (repeatable)
        #[arg(short, long = "param", conflicts_with = "named")]
        params: Vec<String>,
        /// Named parameter for `$name` placeholders, as name=value (repeatable)
        #[arg(short, long, value_parser = parse_named)]
        named: Vec<(String, String)>,
    },
    /// Run a query and print rows as newline-delimited JSON while they arrive
    Stream {
        sql: String,
        #[arg(short, long = "param", conflicts_with = "named")]
        params: Vec<String>,
        #[arg(short, long, value_parser = parse_named)]
        named: Vec<(String, String)>,
        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Read Parquet or CSV file(s); the path may be a glob or an s3:// URL
    Read {
        path: String,
        /// Columns to project (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Raw SQL predicate; repeat to AND several together
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        /// Format override when the path has no recognizable extension
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Create a table from a JSON array of objects
    Load { table: String, file: PathBuf },
    /// Write a query result to a Parquet file
    Export {
        sql: String,
        output: String,
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Write a table to <dir>/<name>.parquet
    ExportTable {
        table: String,
        dir: String,
        name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Parquet,
    Csv,
}

impl From<FormatArg> for FileFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Parquet => FileFormat::Parquet,
            FormatArg::Csv => FileFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = WrapperConfig::load().context("failed to load configuration")?;
    if let Some(path) = args.database.clone() {
        config.database_path = Some(path);
    }
    init_tracing(&config, args.debug);
    tracing::debug!(?args, "parsed arguments");

    let mut wrapper = DuckDbWrapper::connect(config).context("failed to open database")?;
    if args.s3 {
        wrapper
            .enable_remote_storage()
            .context("failed to enable remote storage")?;
    }

    run(&mut wrapper, &args)?;
    wrapper.close().context("failed to close database")?;
    Ok(())
}

fn run(wrapper: &mut DuckDbWrapper, args: &Args) -> Result<()> {
    let start = Instant::now();
    match &args.command {
        Command::Query { sql, params, named } => {
            let result = if named.is_empty() {
                wrapper.execute_query(sql, &parse_params(params))?
            } else {
                let named = typed_named(named);
                wrapper.execute_query_named(sql, &borrow_named(&named))?
            };
            print_result(&result, args.json, start)?;
        }
        Command::Stream {
            sql,
            params,
            named,
            limit,
        } => {
            let named = typed_named(named);
            let stream = if named.is_empty() {
                wrapper.execute_query_streamed(sql, &parse_params(params))?
            } else {
                wrapper.execute_query_streamed_named(sql, &borrow_named(&named))?
            };
            let mut printed = 0usize;
            for record in stream.take(limit.unwrap_or(usize::MAX)) {
                println!("{}", record?.to_json());
                printed += 1;
            }
            eprintln!("{} in {:.3}s", plural(printed, "row"), start.elapsed().as_secs_f64());
        }
        Command::Read {
            path,
            columns,
            filters,
            format,
        } => {
            let mut options = ReadOptions::new().columns(columns.iter().cloned());
            for filter in filters {
                options = options.filter(filter.clone());
            }
            if let Some(format) = format {
                options = options.format((*format).into());
            }
            let result = wrapper.read_file(path, &options)?;
            print_result(&result, args.json, start)?;
        }
        Command::Load { table, file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let json: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let records = records_from_json(&json)?;
            wrapper.create_table(table, &records)?;
            println!(
                "created {table} from {} in {:.3}s",
                plural(records.len(), "record"),
                start.elapsed().as_secs_f64()
            );
        }
        Command::Export {
            sql,
            output,
            params,
        } => {
            let params = parse_params(params);
            let result = wrapper.execute_query(sql, &params)?;
            wrapper.save_as_parquet(&result, output)?;
            println!(
                "wrote {} to {output} in {:.3}s",
                plural(result.total_rows, "row"),
                start.elapsed().as_secs_f64()
            );
        }
        Command::ExportTable { table, dir, name } => {
            let path = wrapper.save_table_to_directory(table, dir, name)?;
            println!("wrote {table} to {path} in {:.3}s", start.elapsed().as_secs_f64());
        }
    }
    Ok(())
}

fn init_tracing(config: &WrapperConfig, debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let spans = if debug {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_span_events(spans)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(false)
            .with_span_events(spans)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// `null`, booleans, integers and floats are typed; anything else binds as text.
fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::Boolean(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::BigInt(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Double(f)
    } else {
        Value::Text(raw.to_string())
    }
}

fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|p| parse_param(p)).collect()
}

fn parse_named(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

fn typed_named(raw: &[(String, String)]) -> Vec<(String, Value)> {
    raw.iter()
        .map(|(name, value)| (name.clone(), parse_param(value)))
        .collect()
}

fn borrow_named(named: &[(String, Value)]) -> Vec<(&str, Value)> {
    named
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect()
}

fn print_result(result: &QueryResult, json: bool, start: Instant) -> Result<()> {
    if json {
        let rows = result
            .records()?
            .iter()
            .map(|record| record.to_json())
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if result.is_empty() {
        println!("(No rows returned)");
    } else {
        display_results(result)?;
    }
    println!(
        "{} in {:.3}s",
        plural(result.total_rows, "row"),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn display_results(result: &QueryResult) -> Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header = result.schema.fields().iter().map(|field| {
        Cell::new(field.name())
            .fg(Color::Cyan)
            .set_alignment(CellAlignment::Center)
    });
    table.set_header(header);

    for batch in &result.batches {
        for row_idx in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for column in batch.columns() {
                cells.push(Cell::new(array_value_to_string(column.as_ref(), row_idx)?));
            }
            table.add_row(cells);
        }
    }

    println!("{table}");
    Ok(())
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
