//! Command-line interface for the addon builder.

use addon_builder::config::CompilerConfig;
use addon_builder::logging::{init_logging, LoggingConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "addon-builder")]
#[command(author, version, about = "Compiles editor addon sources into framework descriptors", long_about = None)]
struct Cli {
    /// Directory holding addon.xq and the framework descriptor
    #[arg(requires_all = ["framework_id", "target_dir"])]
    addon_dir: Option<PathBuf>,

    /// Framework descriptor name, without the .framework extension
    framework_id: Option<String>,

    /// Directory receiving the generated artifacts
    target_dir: Option<PathBuf>,

    /// JSON configuration used when no positional arguments are given
    #[arg(short, long, default_value = "addon-builder.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn compiler_config(&self) -> Result<CompilerConfig> {
        match (&self.addon_dir, &self.framework_id, &self.target_dir) {
            (Some(addon_dir), Some(framework_id), Some(target_dir)) => Ok(CompilerConfig::new(
                addon_dir,
                framework_id,
                target_dir,
            )),
            (None, None, None) => CompilerConfig::from_file(&self.config)
                .with_context(|| format!("loading {}", self.config.display())),
            _ => anyhow::bail!("ADDON_DIR, FRAMEWORK_ID and TARGET_DIR must be given together"),
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.compiler_config()?;
    let model = addon_builder::compile_addon(&config)
        .with_context(|| format!("compiling {}", config.source_path().display()))?;

    log::info!(
        "{} templates, {} observers, {} dialogs",
        model.templates.len(),
        model.observers.len(),
        model.dialogs.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    });

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            for cause in error.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            ExitCode::FAILURE
        }
    }
}
