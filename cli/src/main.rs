//! LineDigest CLI: digest every line of a file, one hex digest per line.
//!
//! # Usage
//! ```text
//! linedigest passwords.txt hashes.txt
//! linedigest - - < in.txt > out.txt
//! linedigest --backend opencl --kernel sha256_wrapper.cl big.txt out.txt
//! linedigest --whole-file firmware.bin
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use linedigest_batch::{digest_whole, PipelineDriver};
use linedigest_core::Algorithm;
use linedigest_observability::{init_tracing, PipelineMetrics};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod backend;
mod config;

use config::{AppConfig, BackendKind};

const IO_BUFFER: usize = 1 << 20;

#[derive(Parser)]
#[command(
    name = "linedigest",
    about = "Batch line digester: one SHA-256/SHA-512 digest per input line",
    long_about = "
LineDigest reads a newline-delimited file, hashes every line independently
on a parallel backend (CPU thread pool or OpenCL device), and writes one
lowercase hex digest per line, in input order. Only the trailing '\\n' is
stripped from each line.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter, overrides --verbose and the config file
",
    version
)]
struct Cli {
    /// Input file ('-' for stdin)
    input: String,

    /// Output file ('-' for stdout)
    #[arg(required_unless_present = "whole_file")]
    output: Option<String>,

    /// YAML config file with pipeline/backend/log sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Digest algorithm: sha256 or sha512
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Compute backend
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    /// Max records per batch
    #[arg(long)]
    batch_capacity: Option<usize>,

    /// Close a batch early once its packed buffer would exceed this size
    #[arg(long)]
    max_batch_bytes: Option<usize>,

    /// Read and pack the next batch while the current one is computed
    #[arg(long)]
    overlap: bool,

    /// CPU backend threads (0 = one per logical CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// OpenCL kernel source path
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// OpenCL kernel entry point
    #[arg(long)]
    kernel_name: Option<String>,

    /// Digest the whole input as a single record
    #[arg(long)]
    whole_file: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command-line flags override the config file.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(algorithm) = self.algorithm {
            config.backend.algorithm = algorithm;
        }
        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if let Some(n) = self.batch_capacity {
            config.pipeline.batch_capacity = n;
        }
        if let Some(bytes) = self.max_batch_bytes {
            config.pipeline.max_batch_bytes = Some(bytes);
        }
        if self.overlap {
            config.pipeline.overlap = true;
        }
        if let Some(threads) = self.threads {
            config.backend.threads = threads;
        }
        if let Some(kernel) = &self.kernel {
            config.backend.kernel = Some(kernel.clone());
        }
        if let Some(name) = &self.kernel_name {
            config.backend.kernel_name = Some(name.clone());
        }
        if self.json_logs {
            config.log.json = true;
        }
        match self.verbose {
            0 => {}
            1 => config.log.level = "debug".into(),
            _ => config.log.level = "trace".into(),
        }
    }
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    // A subscriber installed by an embedding process is fine to keep.
    let _ = init_tracing(&config.log);

    if cli.whole_file {
        cmd_whole_file(&cli, &config)
    } else {
        cmd_lines(&cli, config)
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_lines(cli: &Cli, config: AppConfig) -> Result<()> {
    let output = cli.output.as_deref().unwrap_or("-");
    info!("Input : {}", cli.input);
    info!("Output: {}", output);

    let backend = backend::build(&config.backend)?;
    let metrics = PipelineMetrics::global().with_backend(&backend.info());
    let mut driver =
        PipelineDriver::new(config.pipeline, backend)?.with_observer(Arc::new(metrics));

    let reader = open_input(&cli.input)?;
    let writer = open_output(output)?;
    let stats = driver.run(reader, writer)?;

    info!("Done: {} digests written to {}", stats.records, output);
    Ok(())
}

fn cmd_whole_file(cli: &Cli, config: &AppConfig) -> Result<()> {
    let mut data = Vec::new();
    open_input(&cli.input)?
        .read_to_end(&mut data)
        .with_context(|| format!("cannot read '{}'", cli.input))?;

    let mut backend = backend::build(&config.backend)?;
    let digest = digest_whole(&mut backend, &data, config.pipeline.alignment)?;

    let label = digest.algorithm().name().to_uppercase();
    let mut out = open_output(cli.output.as_deref().unwrap_or("-"))?;
    writeln!(out, "{label}({}) = {digest}", cli.input).context("cannot write digest")?;
    out.flush().context("cannot write digest")?;
    Ok(())
}

fn open_input(path: &str) -> Result<Box<dyn BufRead + Send>> {
    if path == "-" {
        let stdin = std::io::stdin();
        return Ok(Box::new(BufReader::with_capacity(IO_BUFFER, stdin)));
    }
    let file = File::open(path).with_context(|| format!("cannot open input '{path}'"))?;
    Ok(Box::new(BufReader::with_capacity(IO_BUFFER, file)))
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        let stdout = std::io::stdout().lock();
        return Ok(Box::new(BufWriter::with_capacity(IO_BUFFER, stdout)));
    }
    let file = File::create(path).with_context(|| format!("cannot open output '{path}'"))?;
    Ok(Box::new(BufWriter::with_capacity(IO_BUFFER, file)))
}
