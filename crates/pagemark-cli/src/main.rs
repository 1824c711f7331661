mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pagemark",
    version,
    about = "Token-aligned layout annotation of PDFs: preannotation, consolidation and dataset export"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Object-detection dataset per annotator, with page images
    Coco,
    /// One CSV row per token, one column per annotator
    Token,
}

#[derive(Subcommand)]
enum Commands {
    /// Write model predictions into an annotator's annotation files
    Preannotate {
        /// Project folder
        root: PathBuf,

        /// Labeling configuration (JSON)
        config: PathBuf,

        /// Predictions: a JSON file keyed by PDF name, or a directory of <sha>.json files
        predictions: PathBuf,

        /// Annotator to preannotate for
        #[arg(short = 'u', long = "annotator")]
        annotator: String,
    },
    /// Print an annotator's consolidated annotations for one paper
    Consolidate {
        /// Project folder
        root: PathBuf,

        /// Paper sha
        sha: String,

        /// Annotator whose annotations to consolidate
        #[arg(short = 'u', long = "annotator")]
        annotator: String,

        /// Read text of free-form annotations from the PDF with pdftotext
        #[arg(long)]
        extract: bool,

        /// Search margin for free-form annotations, in PDF points
        #[arg(long, default_value_t = 3.0)]
        margin: f64,
    },
    /// Export a project as a COCO dataset or a token table
    Export {
        /// Project folder
        root: PathBuf,

        /// Labeling configuration (JSON)
        config: PathBuf,

        /// Output directory (coco) or CSV file (token)
        output: PathBuf,

        /// Annotator(s) to export (default: all)
        #[arg(short = 'u', long = "annotator", value_name = "NAME")]
        annotators: Vec<String>,

        #[arg(short, long, value_enum, default_value = "coco")]
        format: ExportFormat,

        /// Restrict to these categories (comma separated)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,

        /// Include papers not marked finished
        #[arg(long)]
        include_unfinished: bool,

        /// Do not render page images (coco only)
        #[arg(long)]
        no_images: bool,
    },
    /// Pairwise agreement between annotators: token accuracy over a token
    /// table, or box AP over COCO datasets
    Agreement {
        /// Token table CSV written by `pagemark export --format token`
        #[arg(required_unless_present = "coco", conflicts_with = "coco")]
        table: Option<PathBuf>,

        /// COCO datasets to compare instead, one per annotator
        #[arg(long, num_args = 2.., value_name = "DATASET")]
        coco: Vec<PathBuf>,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Inspect labeling configurations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a labeling configuration
    Validate {
        /// Path to JSON configuration
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Preannotate {
            root,
            config,
            predictions,
            annotator,
        } => commands::preannotate::run(&root, &config, &predictions, &annotator),
        Commands::Consolidate {
            root,
            sha,
            annotator,
            extract,
            margin,
        } => commands::consolidate::run(&root, &sha, &annotator, extract, margin),
        Commands::Export {
            root,
            config,
            output,
            annotators,
            format,
            categories,
            include_unfinished,
            no_images,
        } => commands::export::run(
            &root,
            &config,
            &output,
            pagemark_core::ExportOptions {
                annotators,
                categories,
                include_unfinished,
            },
            format,
            !no_images,
        ),
        Commands::Agreement {
            table,
            coco,
            output,
        } => match table {
            Some(table) => commands::agreement::run(&table, &output),
            None => commands::agreement::run_coco(&coco, &output),
        },
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => commands::config::validate(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
