//! Measure engine command-line interface

use clap::{Parser, Subcommand};
use octofhir_cqm::cli::{evaluate, output, sql, validate};
use octofhir_cqm::sql::SqlDialect;
use std::path::PathBuf;

/// Clinical quality measure tool
#[derive(Parser)]
#[command(name = "cqm")]
#[command(author, version, about = "Clinical quality measure evaluation tools", long_about = None)]
struct Cli {
    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate library syntax and supported constructs
    Validate {
        /// Library files to validate
        files: Vec<PathBuf>,

        /// Strict mode (warnings as errors)
        #[arg(short, long)]
        strict: bool,
    },

    /// Compile a library to SQL
    Sql {
        /// Library file to compile
        file: PathBuf,

        /// SQL dialect (ansi, spark)
        #[arg(short, long)]
        dialect: Option<SqlDialect>,

        /// Schema descriptor (JSON); defaults to the flattened layout
        #[arg(long)]
        schema: Option<PathBuf>,

        /// FHIR ValueSet resources with expansions (JSON)
        #[arg(long)]
        valuesets: Option<PathBuf>,

        /// Measurement period start (inclusive)
        #[arg(long, requires = "period_end")]
        period_start: Option<String>,

        /// Measurement period end (inclusive)
        #[arg(long, requires = "period_start")]
        period_end: Option<String>,
    },

    /// Evaluate a library over a data snapshot and print the MeasureReport
    Evaluate {
        /// Library file to evaluate
        file: PathBuf,

        /// Clinical data snapshot (JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// FHIR ValueSet resources with expansions (JSON)
        #[arg(long)]
        valuesets: Option<PathBuf>,

        /// Measurement period start (inclusive)
        #[arg(long, requires = "period_end")]
        period_start: Option<String>,

        /// Measurement period end (inclusive)
        #[arg(long, requires = "period_start")]
        period_end: Option<String>,

        /// Compile to SQL and run it on an in-memory SQLite copy of the data
        #[arg(long)]
        sql: bool,

        /// Schema descriptor for --sql (JSON)
        #[arg(long, requires = "sql")]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    output::setup_colors(&cli.color);

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Validate { files, strict } => validate::validate(validate::ValidateConfig {
            files,
            strict,
            verbose: cli.verbose,
        }),

        Commands::Sql {
            file,
            dialect,
            schema,
            valuesets,
            period_start,
            period_end,
        } => {
            sql::sql(sql::SqlConfig {
                file,
                dialect,
                schema,
                valuesets,
                period_start,
                period_end,
                config: cli.config,
                output_file: cli.output,
                verbose: cli.verbose,
            })
            .await
        }

        Commands::Evaluate {
            file,
            data,
            valuesets,
            period_start,
            period_end,
            sql,
            schema,
        } => {
            evaluate::evaluate(evaluate::EvaluateConfig {
                file,
                data,
                valuesets,
                period_start,
                period_end,
                sql,
                schema,
                config: cli.config,
                output_file: cli.output,
                verbose: cli.verbose,
            })
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}
