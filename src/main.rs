// offzim CLI: convert a record manifest into an offline bundle directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use offzim::{ConversionConfig, Converter, DirSink, HttpUrl, JsonlRecordSource};

#[derive(Debug, Parser)]
#[command(
    name = "offzim",
    version,
    about = "Convert captured web-archive records into an offline content bundle"
)]
struct Args {
    /// JSON-lines record manifest (one captured record per line).
    manifest: PathBuf,

    /// Output directory for the bundle tree.
    #[arg(short, long)]
    output: PathBuf,

    /// URL of the main page; a warning is printed when it is not captured.
    #[arg(long)]
    url: Option<String>,

    /// Extra stylesheet linked at the end of every document's <head>.
    #[arg(long)]
    custom_css: Option<PathBuf>,

    /// File updated with {"written": n, "total": m} after each entry.
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = ConversionConfig::default();
    if let Some(url) = &args.url {
        config = config
            .with_main_url(HttpUrl::parse(url).with_context(|| format!("invalid --url {url:?}"))?);
    }
    if let Some(css_path) = &args.custom_css {
        let css = fs::read(css_path)
            .with_context(|| format!("cannot read custom CSS {}", css_path.display()))?;
        config = config.with_custom_css(css);
    }
    if let Some(progress) = &args.progress_file {
        config = config.with_progress_file(progress.clone());
    }

    let mut source = JsonlRecordSource::new(&args.manifest);
    let mut sink = DirSink::new(&args.output)?;
    let summary = Converter::new(config).run(&mut source, &mut sink)?;

    println!(
        "{} entries written, {} aliased, {} skipped -> {}",
        summary.written,
        summary.aliased,
        summary.skipped,
        args.output.display()
    );
    Ok(())
}
