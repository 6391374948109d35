use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use brine_flat::{decode_to_json, encode_from_json, schema_to_json, Schema};
use brine_flat_compiler::{compile_file, compile_schema_to_json, encode_binary_schema, CompileOptions, FlatError};

#[derive(Parser)]
#[command(name = "bflat")]
#[command(about = "Compile Flat schemas and convert buffers to and from JSON", long_about = None)]
struct Cli {
    /// Log the compiler pipeline (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a `.fbs` IDL file to a binary `.bfbs` schema
    Compile {
        /// Input `.fbs` file
        #[arg(short, long)]
        input: PathBuf,

        /// Output `.bfbs` file (defaults to same name + `.bfbs`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory searched for included files
        #[arg(short = 'I', long = "include")]
        include_paths: Vec<PathBuf>,
    },

    /// Decode a `.bfbs` file to JSON (printed to stdout)
    Decode {
        /// Input `.bfbs` file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the computed layout of a `.fbs` schema as JSON
    Layout {
        /// Input `.fbs` file
        #[arg(short, long)]
        input: PathBuf,

        /// Directory searched for included files
        #[arg(short = 'I', long = "include")]
        include_paths: Vec<PathBuf>,
    },

    /// Build a buffer of the schema's root type from a JSON document
    Encode {
        /// Schema `.fbs` file
        #[arg(short, long)]
        schema: PathBuf,

        /// Input `.json` file
        #[arg(short, long)]
        input: PathBuf,

        /// Output buffer (defaults to the input name with the schema's file extension, or `.bin`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory searched for included files
        #[arg(short = 'I', long = "include")]
        include_paths: Vec<PathBuf>,
    },

    /// Print a buffer of the schema's root type as JSON
    Dump {
        /// Schema `.fbs` file
        #[arg(short, long)]
        schema: PathBuf,

        /// Input buffer
        #[arg(short, long)]
        input: PathBuf,

        /// Directory searched for included files
        #[arg(short = 'I', long = "include")]
        include_paths: Vec<PathBuf>,
    },
}

fn load_schema(path: &Path, include_paths: &[PathBuf]) -> Result<Schema, FlatError> {
    let options = CompileOptions {
        include_paths: include_paths.to_vec(),
    };
    compile_file(path, &options)
}

fn main() -> Result<(), FlatError> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Compile { input, output, include_paths } => {
            let schema = load_schema(input, include_paths)?;
            let bin = encode_binary_schema(&schema)?;
            let out_path = if let Some(o) = output {
                o.clone()
            } else {
                let mut p = input.clone();
                p.set_extension("bfbs");
                p
            };
            fs::write(&out_path, &bin)?;
            println!("Compiled {} → {}", input.display(), out_path.display());
            Ok(())
        }

        Commands::Decode { input } => {
            let data = fs::read(input)?;
            println!("{}", schema_to_json(&data)?);
            Ok(())
        }

        Commands::Layout { input, include_paths } => {
            let schema = load_schema(input, include_paths)?;
            println!("{}", compile_schema_to_json(&schema)?);
            Ok(())
        }

        Commands::Encode { schema, input, output, include_paths } => {
            let schema = load_schema(schema, include_paths)?;
            let text = fs::read_to_string(input)?;
            let bin = encode_from_json(&schema, &text)?;
            let out_path = if let Some(o) = output {
                o.clone()
            } else {
                let mut p = input.clone();
                p.set_extension(schema.file_extension().unwrap_or("bin"));
                p
            };
            debug!(bytes = bin.len(), path = %out_path.display(), "writing buffer");
            fs::write(&out_path, &bin)?;
            println!("Encoded {} → {}", input.display(), out_path.display());
            Ok(())
        }

        Commands::Dump { schema, input, include_paths } => {
            let schema = load_schema(schema, include_paths)?;
            let data = fs::read(input)?;
            println!("{}", decode_to_json(&schema, &data)?);
            Ok(())
        }
    }
}
