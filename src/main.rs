#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::uninlined_format_args)]

mod binder;
mod geometry;
mod ml;
mod persist;
mod server;
mod session;
mod structs;
mod table;

use clap::{Args, Parser, Subcommand, ValueEnum};
use session::{FeatureSource, Session, SessionConfig};
use std::path::{Path, PathBuf};
use structs::{
    ColourStrategy, ColumnMapping, LassoError, Result, SizeSpec, Table, TableOptions,
    DEFAULT_MIN_SIZE,
};

/// LabelLasso - label scatter-plot points by lasso selection
#[derive(Parser, Debug)]
#[command(name = "labellasso")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Input file and the columns holding point names and coordinates
#[derive(Args, Debug)]
struct InputArgs {
    /// CSV file with at least name, x and y columns
    input: PathBuf,

    /// Name of the column to use for x-coordinates
    #[arg(long, default_value = "x")]
    x_column: String,

    /// Name of the column to use for y-coordinates
    #[arg(long, default_value = "y")]
    y_column: String,

    /// Name of the column to use for point names
    #[arg(long, default_value = "name")]
    name_column: String,

    /// Treat input as TSV instead of CSV
    #[arg(long)]
    tsv: bool,
}

impl InputArgs {
    fn columns(&self) -> ColumnMapping {
        ColumnMapping {
            name: self.name_column.clone(),
            x: self.x_column.clone(),
            y: self.y_column.clone(),
        }
    }
}

/// Where ranking features come from
#[derive(Args, Debug)]
struct FeatureArgs {
    /// CSV of per-row feature values, row-aligned with the input
    #[arg(long, conflicts_with = "feature_prefix")]
    features: Option<PathBuf>,

    /// Use input columns whose names start with this prefix as features
    #[arg(long)]
    feature_prefix: Option<String>,
}

impl FeatureArgs {
    fn source(&self) -> FeatureSource {
        match (&self.features, &self.feature_prefix) {
            (Some(path), _) => FeatureSource::File(path.clone()),
            (None, Some(prefix)) => FeatureSource::Prefix(prefix.clone()),
            (None, None) => FeatureSource::None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ColourBy {
    /// Colour by assigned label
    Label,
    /// Colour unlabelled points by whether they have a class
    Class,
    /// Colour by the raw value of a column
    Column,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve an interactive labelling session over HTTP
    Serve {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        features: FeatureArgs,

        /// Port to run the server on
        #[arg(long, default_value = "5006")]
        port: u16,

        /// Address to run the server on
        #[arg(long, default_value = "localhost")]
        address: String,

        /// How points are coloured
        #[arg(long, value_enum, default_value = "label")]
        colour_by: ColourBy,

        /// Class column used by `--colour-by class`
        #[arg(long, default_value = "class")]
        class_column: String,

        /// Column used by `--colour-by column`
        #[arg(long)]
        colour_column: Option<String>,

        /// Column of frequencies used for point size
        #[arg(long)]
        size_column: Option<String>,

        /// Smallest point size when sizing by frequency
        #[arg(long, default_value_t = DEFAULT_MIN_SIZE)]
        min_size: f64,

        /// Where labelled data is saved (default: <input>_labelled.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print labelling progress for a CSV
    Stats {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Rank features by correlation with the rows carrying a label
    Rank {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        features: FeatureArgs,

        /// Label whose rows form the cluster
        #[arg(short, long)]
        label: String,

        /// Number of features to report
        #[arg(short = 'k', long, default_value = "5")]
        top: usize,

        /// Write the ranking as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            input,
            features,
            port,
            address,
            colour_by,
            class_column,
            colour_column,
            size_column,
            min_size,
            output,
        }) => {
            let colour = match colour_by {
                ColourBy::Label => ColourStrategy::Label,
                ColourBy::Class => ColourStrategy::Class {
                    column: class_column,
                },
                ColourBy::Column => ColourStrategy::Column {
                    column: colour_column.ok_or_else(|| {
                        LassoError::Config("--colour-by column requires --colour-column".into())
                    })?,
                },
            };
            let config = SessionConfig {
                table: TableOptions {
                    columns: input.columns(),
                    colour,
                    size: size_column.map(|column| SizeSpec { column, min_size }),
                    tsv: input.tsv,
                },
                input: input.input,
                features: features.source(),
                output,
            };
            run_serve(&config, &server::ServeConfig { address, port })
        }

        Some(Commands::Stats { input }) => run_stats(&input),

        Some(Commands::Rank {
            input,
            features,
            label,
            top,
            output,
        }) => run_rank(&input, &features.source(), &label, top, output.as_deref()),

        None => {
            eprintln!("No subcommand provided. Use 'labellasso serve <INPUT>'.");
            eprintln!("Run 'labellasso --help' for usage information.");
            std::process::exit(1);
        }
    }
}

/// Load the session and serve it until shutdown
fn run_serve(config: &SessionConfig, serve: &server::ServeConfig) -> Result<()> {
    let session = Session::open(config)?;
    let stats = session.statistics();
    log::info!(
        "{} points, {:.1}% labelled, saving to {}",
        session.table().len(),
        stats.labeled_percentage(),
        session.output_path().display()
    );
    if session.has_features() {
        log::info!("Feature ranking enabled");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(session, serve))
}

/// Print labelling statistics
fn run_stats(input: &InputArgs) -> Result<()> {
    let options = TableOptions {
        columns: input.columns(),
        tsv: input.tsv,
        ..TableOptions::default()
    };
    let table = Table::load_file(&input.input, &options)?;
    let stats = table.statistics();

    println!("Rows: {}", table.len());
    println!("Labelled: {:.1}%", stats.labeled_percentage());
    println!("Unlabelled: {:.1}%", stats.unlabeled_percentage);
    let labels: Vec<&str> = stats.labels.iter().map(String::as_str).collect();
    println!("Labels: {}", labels.join(", "));
    Ok(())
}

/// Rank features against the rows carrying `label`
fn run_rank(
    input: &InputArgs,
    source: &FeatureSource,
    label: &str,
    top: usize,
    output: Option<&Path>,
) -> Result<()> {
    if *source == FeatureSource::None {
        return Err(LassoError::Config(
            "rank requires --features or --feature-prefix".into(),
        ));
    }

    let options = TableOptions {
        columns: input.columns(),
        tsv: input.tsv,
        ..TableOptions::default()
    };
    let table = Table::load_file(&input.input, &options)?;
    let features = session::load_features(source, &table, input.tsv)?
        .ok_or_else(|| LassoError::Config("No feature matrix loaded".into()))?;

    let membership = ml::correlation::membership_from_label(&table, label);
    let selected = membership.iter().filter(|&&m| m).count();
    if selected == 0 {
        log::warn!("No rows carry label '{label}'; every score will be undefined");
    }

    let ranked = ml::correlation::rank_features(&membership, &features, top)?;

    println!("Top {} features for '{label}' ({selected} rows):", ranked.len());
    for (i, score) in ranked.iter().enumerate() {
        match score.mcc {
            Some(mcc) => println!("  {}. {} (mcc={mcc:.4})", i + 1, score.name),
            None => println!("  {}. {} (mcc=undefined)", i + 1, score.name),
        }
    }

    if let Some(path) = output {
        persist::write_ranking(path, selected, &ranked)?;
        log::info!("Ranking written to {}", path.display());
    }

    Ok(())
}
