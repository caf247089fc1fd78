use std::path::PathBuf;
use std::sync::{Arc, Once};

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use lican_core::{chunk::ChunkImage, dispatch::run_to_depletion, state::RunState};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "lican_core=info,lican_cli=info";

#[derive(Debug, Parser)]
#[command(
    name = "lican",
    author,
    version,
    about = "Run a lican bytecode chunk",
    long_about = None
)]
struct CliArgs {
    /// Chunk file to execute
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Trace filter expression (also honors LICAN_TRACE and RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    trace: Option<String>,
}

fn init_tracing(cli_filter: Option<&str>) {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = cli_filter
            .map(str::to_owned)
            .or_else(|| std::env::var("LICAN_TRACE").ok())
            .or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.trace.as_deref());

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read chunk '{}'", args.file.display()))?;
    let image =
        ChunkImage::decode(bytes).with_context(|| format!("'{}' is not a valid chunk", args.file.display()))?;

    let start = image.code_start;
    let state = Arc::new(RunState::new(image));
    debug!(target: "lican_cli", start, "chunk loaded");

    run_to_depletion(&state, start)
}
