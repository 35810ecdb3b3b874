//! `cart-tool`: compose, convert and inspect CART trees and CRT files.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use ttscart::compat::{
    filter_questions, id_to_string, string_to_id, ConversionError, FeatureCodecRegistry, PhoneTable,
};
use ttscart::io::crt::CRT_VERSION;
use ttscart::io::text::{read_text_file, write_text_file};
use ttscart::io::{BinaryFormatError, TextFormatError};
use ttscart::manager::load_question_file;
use ttscart::{CartTree, CartTreeManager, ComposeConfig, ConfigError, CrtError, CrtFile, CrtSummary};

#[derive(Parser)]
#[command(name = "cart-tool", about = "CART tree and CRT container tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log progress (honours RUST_LOG)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack pre-built .tree files into a CRT file
    Compose {
        /// Unit list, one unit name per line
        #[arg(long)]
        unit_list: PathBuf,

        /// Id-encoded question file
        #[arg(long)]
        questions: PathBuf,

        /// Directory of <unit>.<extension> tree files
        #[arg(long)]
        tree_dir: PathBuf,

        /// CRT file to write
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Header version field
        #[arg(long, default_value_t = CRT_VERSION)]
        format_version: u32,

        /// Tree file extension, without the dot
        #[arg(long, default_value = "tree")]
        extension: String,

        /// Language id stored in the metadata block
        #[arg(long, default_value_t = 0)]
        language: u32,

        /// Decode every tree before packing
        #[arg(long)]
        verify: bool,
    },

    /// Convert a text tree to a binary .tree file
    TextToBin {
        /// Id-encoded question file
        #[arg(long)]
        questions: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Convert a binary .tree file to a text tree
    BinToText {
        /// Id-encoded question file
        #[arg(long)]
        questions: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Print the header and index of a CRT file
    Inspect {
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Translate a symbolic question file to ids
    #[command(name = "string2id")]
    String2Id {
        /// Phone and tone table
        #[arg(long)]
        phones: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Translate an id-encoded question file to symbols
    #[command(name = "id2string")]
    Id2String {
        /// Phone and tone table
        #[arg(long)]
        phones: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Drop symbolic question lines that cannot be translated
    Filter {
        /// Phone and tone table
        #[arg(long)]
        phones: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Crt(#[from] CrtError),
    #[error(transparent)]
    Text(#[from] TextFormatError),
    #[error(transparent)]
    Binary(#[from] BinaryFormatError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct InspectReport<'a> {
    language: u32,
    features: usize,
    #[serde(flatten)]
    summary: &'a CrtSummary,
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn registry(phones: &Path) -> Result<FeatureCodecRegistry, CliError> {
    Ok(FeatureCodecRegistry::with_defaults(&PhoneTable::load(phones)?))
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Compose {
            unit_list,
            questions,
            tree_dir,
            output,
            format_version,
            extension,
            language,
            verify,
        } => {
            let config = ComposeConfig::builder()
                .unit_list(unit_list)
                .question_file(questions)
                .tree_dir(tree_dir)
                .output(output)
                .version(format_version)
                .tree_extension(extension)
                .language(language)
                .verify_trees(verify)
                .build()?;
            let summary = CartTreeManager::compose_crt_file(&config)?;
            println!(
                "composed {} units ({} bytes of tree data) into {}",
                summary.entries.len(),
                summary.data_size(),
                config.output.display()
            );
        }

        Commands::TextToBin {
            questions,
            input,
            output,
        } => {
            let meta = Arc::new(load_question_file(&questions)?);
            let tree = CartTree::load_text(&input, meta)?;
            tree.save_binary(&output)?;
            info!(nodes = tree.n_nodes(), leaves = tree.n_leaves(), "converted text tree");
        }

        Commands::BinToText {
            questions,
            input,
            output,
        } => {
            let meta = Arc::new(load_question_file(&questions)?);
            let tree = CartTree::load_binary(&input, meta)?;
            tree.save_text(&output)?;
            info!(nodes = tree.n_nodes(), leaves = tree.n_leaves(), "converted binary tree");
        }

        Commands::Inspect { input, json } => {
            let file = CrtFile::open(&input)?;
            let summary = file.summary();
            if json {
                let report = InspectReport {
                    language: file.meta().language(),
                    features: file.meta().len(),
                    summary: &summary,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&file, &summary);
            }
        }

        Commands::String2Id {
            phones,
            input,
            output,
        } => {
            let ids = string_to_id(&read_text_file(&input)?, &registry(&phones)?)?;
            write_text_file(&output, &ids)?;
        }

        Commands::Id2String {
            phones,
            input,
            output,
        } => {
            let symbols = id_to_string(&read_text_file(&input)?, &registry(&phones)?)?;
            write_text_file(&output, &symbols)?;
        }

        Commands::Filter {
            phones,
            input,
            output,
        } => {
            let outcome = filter_questions(&read_text_file(&input)?, &registry(&phones)?);
            write_text_file(&output, &outcome.text)?;
            println!(
                "kept {} question lines, dropped {}",
                outcome.kept,
                outcome.dropped.len()
            );
        }
    }
    Ok(())
}

fn print_summary(file: &CrtFile, summary: &CrtSummary) {
    let h = &summary.header;
    println!("version:          {}", h.version);
    println!("language:         {}", file.meta().language());
    println!("features:         {}", file.meta().len());
    println!("metadata block:   {} bytes at {}", h.feature_size, h.feature_offset);
    println!("index:            {} entries at {}", h.cart_idx_num, h.cart_idx_offset);
    println!("tree data:        {} bytes at {}", summary.data_size(), h.cart_data_offset);
    println!();
    println!("{:>6}  {:>10}  {:>10}", "unit", "offset", "size");
    for entry in &summary.entries {
        println!(
            "{:>6}  {:>10}  {:>10}",
            entry.unit_type_id, entry.start_offset, entry.size_in_bytes
        );
    }
}
