//! Command-line front end for `fontimize`.

use std::{collections::BTreeMap, io::Write, path::PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};
use fontimize::{
    FontAsset, NativeSubsetter, Optimiser, OutputFormat, SizeReport, SubsetError,
    DEFAULT_SUBSET_NAME,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// WOFF2 with Brotli compression.
    Woff2,
    /// Uncompressed TrueType.
    Ttf,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Woff2 => Self::Woff2,
            Format::Ttf => Self::TrueType,
        }
    }
}

/// Subsets web fonts to the characters used by HTML, CSS and text files.
///
/// Fonts referenced by `@font-face` rules in stylesheets linked from or embedded into
/// HTML files are discovered automatically. The resulting mapping of stylesheets and fonts
/// is printed to stdout as JSON.
#[derive(Debug, Parser)]
#[command(name = "fontimize", version)]
#[command(group(ArgGroup::new("input").required(true).args(["files", "text"])))]
struct Args {
    /// HTML, CSS or plain-text files to scan.
    files: Vec<PathBuf>,
    /// Raw text to subset fonts for, instead of scanning files.
    #[arg(long, conflicts_with = "files")]
    text: Option<String>,
    /// Additional font files to subset.
    #[arg(long = "font", short = 'f', value_name = "PATH")]
    fonts: Vec<PathBuf>,
    /// Directory for subset fonts. By default, each subset is placed next to its source font.
    #[arg(long, short = 'o', value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Name embedded into subset file names, as in `<font>.<name>.woff2`.
    #[arg(long, short = 's', default_value = DEFAULT_SUBSET_NAME)]
    subset_name: String,
    /// Format of subset fonts.
    #[arg(long, value_enum, default_value_t = Format::Woff2)]
    format: Format,
    /// Print total font sizes before and after subsetting to stderr.
    #[arg(long)]
    stats: bool,
    /// Log characters and ranges used for subsetting. `RUST_LOG` takes precedence.
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn optimiser(&self) -> Optimiser {
        let engine = NativeSubsetter::new(self.format.into());
        let optimiser = Optimiser::with_engine(engine).subset_name(&self.subset_name);
        match &self.output_dir {
            Some(dir) => optimiser.output_dir(dir),
            None => optimiser,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn report(
    fonts: &BTreeMap<FontAsset, PathBuf>,
    failures: &BTreeMap<FontAsset, SubsetError>,
    stats: bool,
) -> anyhow::Result<()> {
    if stats {
        let sizes = SizeReport::for_outputs(fonts).context("cannot read font sizes")?;
        eprintln!("{sizes}");
    }
    if !failures.is_empty() {
        anyhow::bail!("failed subsetting {} font(s)", failures.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let optimiser = args.optimiser();

    if let Some(text) = &args.text {
        let outputs = optimiser
            .optimise_text(text, &args.fonts)
            .context("failed optimising fonts")?;
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        report(&outputs.fonts, &outputs.failures, args.stats)
    } else {
        let result = optimiser
            .optimise_files(&args.files, &args.fonts)
            .context("failed optimising fonts")?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        report(&result.fonts, &result.failures, args.stats)
    }
}
