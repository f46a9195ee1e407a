use crate::pipeline::EtlPipeline;
use crate::transform::PartitionKey;
use clap::{Arg, ArgMatches, Command};
use common::Result;
use common::config::{EnvSnapshot, EtlOverrides, EtlSettings};
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info};

pub fn command() -> Command {
    Command::new("etl-pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Loads a CSV file into the data lake: raw copy, partitioned Parquet and catalog crawl")
        .arg(
            Arg::new("csv-file")
                .long("csv-file")
                .value_name("FILE")
                .required(true)
                .help("Path of the CSV file to process"),
        )
        .arg(
            Arg::new("raw-bucket")
                .long("raw-bucket")
                .value_name("BUCKET")
                .help("Bucket for the raw copy [env: RAW_BUCKET]"),
        )
        .arg(
            Arg::new("processed-bucket")
                .long("processed-bucket")
                .value_name("BUCKET")
                .help("Bucket for the Parquet dataset [env: PROCESSED_BUCKET]"),
        )
        .arg(
            Arg::new("crawler-name")
                .long("crawler-name")
                .value_name("NAME")
                .help("Glue crawler to run [env: GLUE_CRAWLER_NAME]"),
        )
        .arg(
            Arg::new("date")
                .long("date")
                .value_name("YYYY-MM-DD")
                .help("Partition date, today when omitted"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Optional TOML file with settings"),
        )
}

/// Everything a run needs, resolved before any AWS resource is touched.
#[derive(Debug, Clone)]
pub struct EtlInvocation {
    pub csv_file: PathBuf,
    pub partition: PartitionKey,
    pub settings: EtlSettings,
}

pub fn parse_invocation(matches: &ArgMatches, env: &EnvSnapshot) -> Result<EtlInvocation> {
    let overrides = EtlOverrides {
        raw_bucket: matches.get_one::<String>("raw-bucket").cloned(),
        processed_bucket: matches.get_one::<String>("processed-bucket").cloned(),
        crawler_name: matches.get_one::<String>("crawler-name").cloned(),
    };
    let config_file = matches.get_one::<String>("config").map(String::as_str);
    let settings = EtlSettings::resolve(env, &overrides, config_file)?;

    let partition = match matches.get_one::<String>("date") {
        Some(date) => PartitionKey::parse(date)?,
        None => PartitionKey::today(),
    };

    let csv_file = matches
        .get_one::<String>("csv-file")
        .map(PathBuf::from)
        .unwrap_or_default();

    Ok(EtlInvocation {
        csv_file,
        partition,
        settings,
    })
}

/// Runs the CLI and returns the process exit code. `connect` builds the
/// pipeline from resolved settings; it is only called once the arguments are
/// valid.
pub async fn execute<I, T, F, Fut>(argv: I, env: &EnvSnapshot, connect: F) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(EtlSettings) -> Fut,
    Fut: Future<Output = Result<EtlPipeline>>,
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

    info!(
        file = %invocation.csv_file.display(),
        raw_bucket = %invocation.settings.raw_bucket,
        processed_bucket = %invocation.settings.processed_bucket,
        crawler = %invocation.settings.crawler_name,
        "Starting ETL pipeline"
    );

    let pipeline = match connect(invocation.settings).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to initialize pipeline");
            return 1;
        }
    };

    match pipeline.run(&invocation.csv_file, &invocation.partition).await {
        Ok(report) => {
            info!(
                rows = report.rows_written,
                crawl = %report.crawl_status,
                "ETL pipeline finished successfully"
            );
            0
        }
        Err(e) => {
            error!(error = %e, "ETL pipeline failed");
            1
        }
    }
}
