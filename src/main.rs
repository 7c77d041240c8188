use clap::Parser;
use riloe::config::{self, RiloeConfig};
use riloe::fetch::HttpFetcher;
use riloe::{output, pipeline};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "riloe")]
#[command(version)]
#[command(about = "Bundle the oldest dated notes in a folder into an EPUB")]
#[command(long_about = "\
Bundle the oldest dated notes in a folder into an EPUB

Notes are markdown files with a frontmatter header carrying a date:

  ---
  date: 2024-01-05T09:30
  title: Morning walk
  ---
  Body text, ![pictures](https://example.com/dawn.jpg) included.

The N oldest notes become chapters. Linked pictures are downloaded, scaled
down and embedded. Afterwards the notes live in the output folder:

  notes/
  └── epub/
      ├── <moved notes>.md
      ├── YYYY-MM-DD.epub
      └── imaxes/               # downloaded pictures, reused on later runs

Settings are read from --config, or riloe.toml in the notes folder.
Run 'riloe --gen-config' to print a documented riloe.toml.")]
struct Cli {
    /// Folder containing the notes
    #[arg(required_unless_present = "gen_config")]
    path: Option<PathBuf>,

    /// Number of notes to include [default: 10, or selection.count]
    #[arg(
        short = 'n',
        long = "numero-ficheiros",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    count: Option<u32>,

    /// Config file [default: <PATH>/riloe.toml when present]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a stock riloe.toml with all options documented
    #[arg(long)]
    gen_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.gen_config {
        print!("{}", config::stock_config_toml());
        return ExitCode::SUCCESS;
    }

    let Some(path) = cli.path else {
        eprintln!("error: a notes folder is required");
        return ExitCode::FAILURE;
    };

    match build(&path, cli.count, cli.config.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build(
    path: &Path,
    count: Option<u32>,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config: RiloeConfig = config::resolve_config(config_path, path)?;
    let count = count.map_or(config.selection.count, |n| n as usize);
    let fetcher = HttpFetcher::new(&config.fetch)?;
    let today = chrono::Local::now().date_naive();

    let report = pipeline::run(path, count, &config, &fetcher, today)?;
    output::print_report(&report, path);
    Ok(())
}
