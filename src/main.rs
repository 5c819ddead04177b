mod app;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::unbounded;
use tracing_subscriber::EnvFilter;

use muon::{select_backend, CellMetrics, Fetcher, HttpLoader, ImageProcessor};

use crate::app::Viewer;

/// View remote images in a sixel-capable terminal.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Image URLs to display.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Number of grid columns.
    #[arg(short, long, default_value_t = 2)]
    columns: u16,

    /// Skip the native resize library and scale on the CPU.
    #[arg(long)]
    cpu: bool,

    /// Path to the native resize library.
    #[arg(long, value_name = "PATH")]
    backend_lib: Option<PathBuf>,

    /// Log backend probing and fetch activity to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "muon=debug" } else { "muon=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    if !std::io::stdout().is_terminal() {
        return Err("stdout is not a terminal".into());
    }
    let metrics = CellMetrics::detect()?;

    let (event_tx, event_rx) = unbounded();
    let fetcher = Fetcher::new(Arc::new(HttpLoader::new()), event_tx);
    let backend = select_backend(cli.backend_lib.as_deref(), cli.cpu, cli.verbose);
    let processor = ImageProcessor::new(backend);

    let mut viewer = Viewer::new(fetcher, event_rx, processor, metrics, cli.urls, cli.columns);
    let mut terminal = ratatui::init();
    let result = viewer.run(&mut terminal);
    ratatui::restore();

    Ok(result?)
}
