use std::io::IsTerminal;
use std::num::NonZeroU64;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use taxi_loader::config::{
    ConnectionArgsBuilder, DEFAULT_CHUNK_SIZE, DEFAULT_DB_HOST, DEFAULT_DB_NAME,
    DEFAULT_DB_PASSWORD, DEFAULT_DB_PORT, DEFAULT_DB_USER, DEFAULT_INSERT_BATCH_ROWS,
    DEFAULT_TRIPS_TABLE, DEFAULT_ZONES_TABLE,
};
use taxi_loader::dump::dump_directory;
use taxi_loader::formats::{Format, SourceMode};
use taxi_loader::generate::generate_passengers;
use taxi_loader::runner::{LoadConfigBuilder, run_load};
use taxi_loader::telemetry::{ConsoleProgress, LogProgress, NoProgress, ProgressSink};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(version, about = "Load NYC taxi trip and zone data into PostgreSQL")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load trip data in chunks, then replace the zone lookup table
    Load(LoadArgs),

    /// Write a two-row passenger parquet file for one month
    Generate {
        /// Month number (1-12)
        month: u32,

        /// Directory to write the file into
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print every file in a directory under a labelled banner
    Dump {
        /// Directory to read
        #[arg(default_value = "test")]
        dir: PathBuf,

        /// File name to leave out
        #[arg(long)]
        exclude: Option<String>,
    },
}

#[derive(ClapArgs)]
struct LoadArgs {
    /// Trip data file (.parquet, .csv or .tsv)
    #[arg(long)]
    trips: PathBuf,

    /// Zone lookup file (.csv, .tsv or .parquet)
    #[arg(long)]
    zones: PathBuf,

    /// Target table for trip data
    #[arg(long, default_value = DEFAULT_TRIPS_TABLE)]
    trips_table: String,

    /// Target table for zone lookup data
    #[arg(long, default_value = DEFAULT_ZONES_TABLE)]
    zones_table: String,

    /// Rows per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: NonZeroU64,

    /// Rows per INSERT statement
    #[arg(long, default_value_t = DEFAULT_INSERT_BATCH_ROWS)]
    insert_batch_rows: usize,

    /// Trip file format (csv, tsv, parquet) - auto-detected from extension if not specified
    #[arg(long)]
    trips_format: Option<Format>,

    /// Zone file format (csv, tsv, parquet) - auto-detected from extension if not specified
    #[arg(long)]
    zones_format: Option<Format>,

    /// Decode the whole trip file up front instead of per chunk
    #[arg(long)]
    in_memory: bool,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,

    /// Log progress as structured lines instead of a progress bar
    #[arg(long)]
    plain: bool,

    #[arg(long, env = "PGUSER", default_value = DEFAULT_DB_USER)]
    db_user: String,

    #[arg(long, env = "PGPASSWORD", default_value = DEFAULT_DB_PASSWORD, hide_env_values = true)]
    db_password: String,

    #[arg(long, env = "PGHOST", default_value = DEFAULT_DB_HOST)]
    db_host: String,

    #[arg(long, env = "PGPORT", default_value_t = DEFAULT_DB_PORT)]
    db_port: u16,

    #[arg(long, env = "PGDATABASE", default_value = DEFAULT_DB_NAME)]
    db_name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let quiet = matches!(&args.command, Command::Load(load) if load.quiet);
    init_tracing(quiet);

    match args.command {
        Command::Load(load) => run_loader(load).await?,
        Command::Generate { month, out_dir } => {
            let path = generate_passengers(month, &out_dir)?;
            println!("Wrote {}", path.display());
        }
        Command::Dump { dir, exclude } => {
            let mut stdout = std::io::stdout().lock();
            dump_directory(&dir, exclude.as_deref(), &mut stdout)?;
        }
    }
    Ok(())
}

/// Initialize tracing; `RUST_LOG` takes precedence over the quiet flag
fn init_tracing(quiet: bool) {
    let default = if quiet {
        "taxi_loader=warn,sqlx=off"
    } else {
        "taxi_loader=info,sqlx=off"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run_loader(args: LoadArgs) -> anyhow::Result<()> {
    let connection = ConnectionArgsBuilder::default()
        .user(args.db_user)
        .password(args.db_password)
        .host(args.db_host)
        .port(args.db_port)
        .database(args.db_name)
        .build()
        .context("Invalid connection arguments")?;

    let config = LoadConfigBuilder::default()
        .connection(connection)
        .trips_path(args.trips)
        .zones_path(args.zones)
        .trips_table(args.trips_table)
        .zones_table(args.zones_table)
        .chunk_size(args.chunk_size)
        .insert_batch_rows(args.insert_batch_rows)
        .trips_format(args.trips_format)
        .zones_format(args.zones_format)
        .source_mode(if args.in_memory {
            SourceMode::InMemory
        } else {
            SourceMode::Streaming
        })
        .build()
        .context("Invalid load configuration")?;

    if !args.quiet {
        let banner = "=".repeat(60);
        println!("{banner}");
        println!("Starting data loading process...");
        println!("{banner}");
        println!("Database: {}", config.connection.redacted());
        println!("Trips: {} -> {}", config.trips_path.display(), config.trips_table);
        println!("Zones: {} -> {}", config.zones_path.display(), config.zones_table);
    }

    let mut progress: Box<dyn ProgressSink> = if args.quiet {
        Box::new(NoProgress)
    } else if args.plain || !std::io::stdout().is_terminal() {
        Box::new(LogProgress)
    } else {
        Box::new(ConsoleProgress::new())
    };

    let summary = run_load(&config, progress.as_mut()).await?;

    println!();
    println!("{summary}");
    Ok(())
}
