use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use taxi_ingest::compliance::{audit_leakage_for_year, compare_q1_volumes};
use taxi_ingest::error::EXIT_SUCCESS;
use taxi_ingest::{
    logger, IngestionDriver, MonthImputer, ParquetTripStore, PipelineConfig, PipelineResult,
    TaxiVendor, YearSummary,
};

#[derive(Parser)]
#[command(name = "taxi-ingest")]
#[command(about = "Ingest, clean and audit monthly taxi trip records")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a year of monthly files into one dataset
    Process {
        /// Year to process; defaults to the configured current year
        #[arg(long)]
        year: Option<i32>,
        /// Vendor categories (comma-separated): yellow, green
        #[arg(long, value_delimiter = ',')]
        vendors: Vec<TaxiVendor>,
        /// Rows per slice when reading a month
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Process the previous year and the current year
        #[arg(long)]
        all: bool,
    },
    /// Synthesise the imputation month of a year from the two years before
    Impute {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_delimiter = ',')]
        vendors: Vec<TaxiVendor>,
    },
    /// Congestion surcharge compliance for a processed year
    Audit {
        #[arg(long)]
        year: Option<i32>,
        /// First day of the toll (YYYY-MM-DD)
        #[arg(long)]
        policy_start: Option<NaiveDate>,
    },
    /// Compare Q1 congestion-zone trip volume of two processed years
    CompareQ1 {
        #[arg(long)]
        baseline: i32,
        #[arg(long)]
        current: i32,
    },
}

fn load_config(cli: &Cli) -> PipelineResult<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn print_summary(summary: &YearSummary) {
    println!("Year {}", summary.year);
    println!("   Months processed: {}", summary.months_processed);
    println!("   Months missing:   {}", summary.months_missing.len());
    println!("   Rows read:        {}", summary.rows_read);
    println!("   Rows kept:        {}", summary.rows_kept);
    println!("   Ghost trips:      {}", summary.audit.total_filtered);
    if !summary.imputed.is_empty() {
        let vendors: Vec<&str> = summary.imputed.iter().map(|v| v.as_str()).collect();
        println!("   Imputed month for: {}", vendors.join(", "));
    }
    match &summary.output_path {
        Some(path) => println!("   Output file:      {}", path.display()),
        None => println!("   Output file:      none (no source data)"),
    }
}

fn vendors_or_default(vendors: Vec<TaxiVendor>, config: &PipelineConfig) -> Vec<TaxiVendor> {
    if vendors.is_empty() {
        config.vendors.clone()
    } else {
        vendors
    }
}

fn run(cli: Cli, mut config: PipelineConfig) -> PipelineResult<()> {
    match cli.command {
        Commands::Process {
            year,
            vendors,
            chunk_size,
            all,
        } => {
            if let Some(chunk_size) = chunk_size {
                config.chunk_size = chunk_size;
            }
            config.validate()?;
            let vendors = vendors_or_default(vendors, &config);
            let years = if all {
                vec![config.current_year - 1, config.current_year]
            } else {
                vec![year.unwrap_or(config.current_year)]
            };

            let store = ParquetTripStore::from_config(&config);
            let driver = IngestionDriver::new(config, store);
            for year in years {
                let summary = driver.process_year(year, &vendors)?;
                print_summary(&summary);
            }
        }
        Commands::Impute { year, vendors } => {
            let year = year.unwrap_or(config.current_year);
            let vendors = vendors_or_default(vendors, &config);
            let store = ParquetTripStore::from_config(&config);
            let imputer = MonthImputer::new(&store, config.imputation.clone());
            for vendor in vendors {
                match imputer.impute(vendor, year)? {
                    Some(outcome) => println!(
                        "{} {}-{:02}: {} rows written to {}",
                        vendor,
                        year,
                        config.imputation.month,
                        outcome.total_rows(),
                        outcome.path.display()
                    ),
                    None => println!("{} {}: skipped, source month missing", vendor, year),
                }
            }
        }
        Commands::Audit { year, policy_start } => {
            let year = year.unwrap_or(config.current_year);
            let policy_start = policy_start.unwrap_or(config.policy_start);
            let store = ParquetTripStore::from_config(&config);
            let report = audit_leakage_for_year(&store, year, policy_start)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CompareQ1 { baseline, current } => {
            let store = ParquetTripStore::from_config(&config);
            let comparison = compare_q1_volumes(&store, baseline, current)?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    if let Err(e) = config.prepare_directories() {
        eprintln!("{}", e);
        return ExitCode::from(e.exit_code() as u8);
    }

    let log_dir = config.log_dir();
    let _log_guard = logger::init_logging(&cli.log_level, Some(log_dir.as_path()));
    info!(data_dir = %config.data_dir.display(), "taxi-ingest starting");

    match run(cli, config) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS as u8),
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
