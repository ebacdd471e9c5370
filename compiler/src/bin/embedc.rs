// embedc CLI
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, Level};

use embedc::classify::classify;
use embedc::config::ExportConfig;
use embedc::engine::{capture_trace, RecordedEngine};
use embedc::export::export;
use embedc::params::{resolve_weight_map, ParameterTable};
use embedc::scratch::ScratchStrategy;

#[derive(Parser)]
#[command(name = "embedc")]
#[command(version = "0.1.0")]
#[command(about = "Export captured tensor-kernel traces as standalone C", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a recorded trace as <name>.h, <name>.c and a weight blob
    Export {
        /// Recorded trace (.json)
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Export configuration (.json)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Symbol prefix of the generated code (overrides the config)
        #[arg(short, long)]
        name: Option<String>,

        /// Directory receiving the artifacts
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,

        /// Keep scratch buffers in the struct, allocated by <name>_init
        #[arg(long, conflicts_with_all = ["stack", "static_scratch"])]
        heap: bool,

        /// Declare scratch buffers as locals of <name>_fn
        #[arg(long, conflicts_with = "static_scratch")]
        stack: bool,

        /// Declare scratch buffers as static locals of <name>_fn
        #[arg(long = "static")]
        static_scratch: bool,

        /// Byte alignment of weight offsets (power of two)
        #[arg(long)]
        align: Option<usize>,

        /// Also write the blob as a C array header
        #[arg(long)]
        weights_header: bool,

        /// Parameter table (.json, name -> buffer id) to resolve the weight map against
        #[arg(short, long, value_name = "PARAMS")]
        params: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print how every buffer of a recorded trace is classified
    Inspect {
        /// Recorded trace (.json)
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Byte alignment of weight offsets
        #[arg(long, default_value = "1")]
        align: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            trace,
            config,
            name,
            out_dir,
            heap,
            stack,
            static_scratch,
            align,
            weights_header,
            params,
            verbose,
        } => {
            init_logging(verbose);
            let scratch = match (heap, stack, static_scratch) {
                (true, _, _) => Some(ScratchStrategy::Heap),
                (_, true, _) => Some(ScratchStrategy::Stack),
                (_, _, true) => Some(ScratchStrategy::Static),
                _ => None,
            };
            export_command(ExportArgs {
                trace,
                config,
                name,
                out_dir,
                scratch,
                align,
                weights_header,
                params,
            })
        }
        Commands::Inspect {
            trace,
            align,
            verbose,
        } => {
            init_logging(verbose);
            inspect_command(trace, align)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct ExportArgs {
    trace: PathBuf,
    config: Option<PathBuf>,
    name: Option<String>,
    out_dir: PathBuf,
    scratch: Option<ScratchStrategy>,
    align: Option<usize>,
    weights_header: bool,
    params: Option<PathBuf>,
}

fn export_command(args: ExportArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ExportConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ExportConfig::default(),
    };
    if let Some(name) = args.name {
        config.name = name;
    }
    if let Some(scratch) = args.scratch {
        config.scratch = scratch;
    }
    if let Some(align) = args.align {
        config.weight_alignment = align;
    }
    if args.weights_header {
        config.weights_header = true;
    }
    debug!(?config, "effective export configuration");

    let mut engine = RecordedEngine::new();
    let trace = capture_trace(&mut engine, args.trace.as_path(), &())
        .with_context(|| format!("Failed to load trace: {}", args.trace.display()))?;

    let exported = export(&trace, &config).context("Export failed")?;

    if args.out_dir.exists() && !args.out_dir.is_dir() {
        bail!("Output path '{}' is not a directory", args.out_dir.display());
    }
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create output directory: {}", args.out_dir.display()))?;

    for (file_name, contents) in exported.artifacts().context("Failed to render artifacts")? {
        let path = args.out_dir.join(&file_name);
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write: {}", path.display()))?;
        info!(path = %path.display(), "wrote artifact");
    }

    if let Some(params_path) = &args.params {
        let table = ParameterTable::load(params_path)
            .with_context(|| format!("Failed to load parameter table: {}", params_path.display()))?;
        let report = resolve_weight_map(&exported.weights, &table);
        for line in report.lines() {
            println!("{}", line);
        }
    }
    println!("len(weights): {}", exported.weights.len());

    Ok(())
}

/// Configuration used by `inspect`, held to the same checks as `export`
fn inspect_config(align: usize) -> Result<ExportConfig> {
    let config = ExportConfig::default().with_weight_alignment(align);
    config.validate().context("Invalid --align")?;
    Ok(config)
}

fn inspect_command(trace_path: PathBuf, align: usize) -> Result<()> {
    let config = inspect_config(align)?;
    let mut engine = RecordedEngine::new();
    let trace = capture_trace(&mut engine, trace_path.as_path(), &())
        .with_context(|| format!("Failed to load trace: {}", trace_path.display()))?;
    let classification =
        classify(&trace, config.weight_alignment).context("Classification failed")?;

    println!(
        "{:<12} {:<8} {:<8} {:>10} {:>10}  {}",
        "name", "role", "dtype", "len", "offset", "buffer"
    );
    for buffer in classification.registry.iter() {
        let offset = buffer
            .offset
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<8} {:<8} {:>10} {:>10}  {}",
            buffer.name,
            buffer.role.to_string(),
            buffer.dtype.to_string(),
            buffer.len,
            offset,
            buffer.id
        );
    }
    println!(
        "{} kernels, {} calls, {} weight bytes",
        classification.kernels.len(),
        classification.calls.len(),
        classification.layout.total_len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_alignment_validated() {
        assert_eq!(inspect_config(16).unwrap().weight_alignment, 16);
        assert!(inspect_config(3).is_err());
        assert!(inspect_config(0).is_err());
    }
}
