use crate::export::{ExportFormat, save_results};
use crate::results::QueryResults;
use crate::runner::QueryRunner;
use crate::service::QueryRequest;
use clap::{Arg, ArgAction, ArgMatches, Command};
use common::config::{EnvSnapshot, QueryOverrides, QuerySettings};
use common::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info};

const PREVIEW_ROWS: usize = 5;

pub fn command() -> Command {
    Command::new("athena-query")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs SQL queries on Amazon Athena")
        .arg(
            Arg::new("query")
                .long("query")
                .value_name("SQL")
                .help("SQL query to run"),
        )
        .arg(
            Arg::new("query-file")
                .long("query-file")
                .value_name("FILE")
                .help("File containing the SQL query"),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .value_name("NAME")
                .help("Athena database [env: GLUE_DATABASE]"),
        )
        .arg(
            Arg::new("s3-output")
                .long("s3-output")
                .value_name("LOCATION")
                .help("S3 location for query results [env: ATHENA_RESULTS_BUCKET]"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Local file to save the results to"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .value_parser(["csv", "parquet", "xlsx"])
                .ignore_case(true)
                .default_value("csv")
                .help("Output file format"),
        )
        .arg(
            Arg::new("async")
                .long("async")
                .action(ArgAction::SetTrue)
                .help("Submit the query and exit without waiting"),
        )
        .arg(
            Arg::new("query-id")
                .long("query-id")
                .value_name("ID")
                .help("Execution id of an existing query to wait for and fetch"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Optional TOML file with settings"),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMode {
    /// Wait for an already submitted query and fetch its results.
    Resume(String),
    Submit(String),
    Run(String),
}

#[derive(Debug, Clone)]
pub struct QueryInvocation {
    pub mode: QueryMode,
    pub settings: QuerySettings,
    pub output_file: Option<PathBuf>,
    pub format: ExportFormat,
}

impl QueryInvocation {
    pub fn request(&self, sql: &str) -> QueryRequest {
        QueryRequest {
            sql: sql.to_string(),
            database: self.settings.database.clone(),
            output_location: self.settings.results_location.clone(),
            workgroup: self.settings.workgroup.clone(),
        }
    }
}

pub fn parse_invocation(matches: &ArgMatches, env: &EnvSnapshot) -> Result<QueryInvocation> {
    let overrides = QueryOverrides {
        database: matches.get_one::<String>("database").cloned(),
        results_location: matches.get_one::<String>("s3-output").cloned(),
    };
    let config_file = matches.get_one::<String>("config").map(String::as_str);
    let settings = QuerySettings::resolve(env, &overrides, config_file)?;

    let format = match matches.get_one::<String>("format") {
        Some(name) => name.parse()?,
        None => ExportFormat::default(),
    };

    let mode = match matches.get_one::<String>("query-id") {
        Some(id) => QueryMode::Resume(id.clone()),
        None => {
            let sql = query_text(matches)?;
            if matches.get_flag("async") {
                QueryMode::Submit(sql)
            } else {
                QueryMode::Run(sql)
            }
        }
    };

    Ok(QueryInvocation {
        mode,
        settings,
        output_file: matches.get_one::<String>("output-file").map(PathBuf::from),
        format,
    })
}

/// The literal `--query` wins; `--query-file` is only read without it.
fn query_text(matches: &ArgMatches) -> Result<String> {
    if let Some(sql) = matches.get_one::<String>("query").filter(|s| !s.trim().is_empty()) {
        return Ok(sql.clone());
    }

    let Some(path) = matches.get_one::<String>("query-file") else {
        return Err(Error::MissingQuery);
    };

    let sql = fs::read_to_string(path).map_err(|e| Error::Read {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    if sql.trim().is_empty() {
        return Err(Error::MissingQuery);
    }
    Ok(sql)
}

/// Runs the CLI and returns the process exit code. `connect` builds the
/// runner from resolved settings once the arguments are valid.
pub async fn execute<I, T, F, Fut>(argv: I, env: &EnvSnapshot, connect: F) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(QuerySettings) -> Fut,
    Fut: Future<Output = Result<QueryRunner>>,
{
    let matches = match command().try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return e.exit_code();
        }
    };

    let invocation = match parse_invocation(&matches, env) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!(error = %e, "Invalid arguments");
            return 1;
        }
    };

    let runner = match connect(invocation.settings.clone()).await {
        Ok(runner) => runner,
        Err(e) => {
            error!(error = %e, "Failed to initialize query client");
            return 1;
        }
    };

    match dispatch(&runner, &invocation).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Query failed");
            1
        }
    }
}

async fn dispatch(runner: &QueryRunner, invocation: &QueryInvocation) -> Result<()> {
    match &invocation.mode {
        QueryMode::Resume(execution_id) => {
            runner.wait_for_completion(execution_id).await?;
            let results = runner.fetch_results(execution_id).await?;
            print_preview(&results)?;
            save(invocation, &results)
        }
        QueryMode::Submit(sql) => {
            let execution_id = runner.submit(&invocation.request(sql)).await?;
            println!("Query started with ID: {}", execution_id);
            println!("To fetch the results later, run:");
            println!("athena-query --query-id {}", execution_id);
            Ok(())
        }
        QueryMode::Run(sql) => {
            let completed = runner.run(&invocation.request(sql)).await?;
            print_preview(&completed.results)?;
            save(invocation, &completed.results)
        }
    }
}

fn print_preview(results: &QueryResults) -> Result<()> {
    println!("\nFirst {} rows of the results:", PREVIEW_ROWS);
    println!("{}", results.preview(PREVIEW_ROWS)?);
    Ok(())
}

fn save(invocation: &QueryInvocation, results: &QueryResults) -> Result<()> {
    if let Some(path) = &invocation.output_file {
        let rows = save_results(results, path, invocation.format)?;
        info!(file = %path.display(), rows, "Saved query results");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Result<QueryInvocation> {
        let mut argv = vec!["athena-query"];
        argv.extend_from_slice(args);
        let matches = command().try_get_matches_from(argv).unwrap();
        parse_invocation(&matches, &EnvSnapshot::new())
    }

    #[test]
    fn test_literal_query_wins_over_file() {
        let invocation = parse(&["--query", "SELECT 1", "--query-file", "/no/such/file.sql"]).unwrap();
        assert_eq!(invocation.mode, QueryMode::Run("SELECT 1".into()));
    }

    #[test]
    fn test_query_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"SELECT * FROM vendas").unwrap();
        let path = file.path().display().to_string();

        let invocation = parse(&["--query-file", path.as_str(), "--async"]).unwrap();
        assert_eq!(invocation.mode, QueryMode::Submit("SELECT * FROM vendas".into()));
    }

    #[test]
    fn test_missing_query_is_an_error() {
        assert!(matches!(parse(&[]), Err(Error::MissingQuery)));
    }

    #[test]
    fn test_unreadable_query_file_is_an_error() {
        assert!(matches!(
            parse(&["--query-file", "/no/such/file.sql"]),
            Err(Error::Read { .. })
        ));
    }

    #[test]
    fn test_query_id_needs_no_sql() {
        let invocation = parse(&["--query-id", "abc", "--format", "XLSX"]).unwrap();
        assert_eq!(invocation.mode, QueryMode::Resume("abc".into()));
        assert_eq!(invocation.format, ExportFormat::Xlsx);
    }

    #[test]
    fn test_output_location_is_normalized() {
        let invocation = parse(&["--query", "SELECT 1", "--s3-output", "meu-bucket/athena"]).unwrap();
        let request = invocation.request("SELECT 1");

        assert_eq!(request.output_location, "s3://meu-bucket/athena/");
        assert_eq!(request.database, "meu_database");
    }
}
