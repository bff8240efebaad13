use chrono::Datelike;
use city_pages::config::{self, DuplicatePolicy, FailurePolicy};
use city_pages::generate::{CancelFlag, GenerateError, GenerateOptions, Generator};
use city_pages::{compose, dataset, output, render, sections};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status for a run stopped by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

/// Flags that adjust a single build.
#[derive(clap::Args, Clone)]
struct BuildArgs {
    /// Records per progress batch (overrides config and BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Report failing records and keep generating the rest
    #[arg(long)]
    keep_going: bool,

    /// Refuse to build when two records map to the same filename
    #[arg(long)]
    reject_duplicates: bool,
}

impl BuildArgs {
    fn apply(&self, generation: &mut config::GenerationConfig) {
        if let Some(size) = self.batch_size {
            generation.batch_size = size;
        }
        if self.keep_going {
            generation.on_error = FailurePolicy::Continue;
        }
        if self.reject_duplicates {
            generation.on_duplicate = DuplicatePolicy::Reject;
        }
    }
}

#[derive(Parser)]
#[command(name = "city-pages")]
#[command(about = "Generate static city landing pages from a CSV dataset")]
#[command(long_about = "\
Generate static city landing pages from a CSV dataset

Every dataset row becomes one HTML page, rendered through a Tera template
and written as steel-buildings-<city>-<state>.html in the output directory.

Project layout:

  config.toml                      # Site values and generation policy (optional)
  data/
  └── city_data_sample.csv         # City,State,Latitude,Longitude,Introduction,CityIntro,
                                   # ResidentialContent,CommercialContent,
                                   # IndustrialContent,AgriculturalContent
  templates/
  ├── base.html                    # Page template
  └── partials/                    # Anything else *.html is available to include
  sections/                        # Optional <section>.txt boilerplate overrides

Logging goes to stderr (RUST_LOG to adjust) and optionally to --log-file.

Run 'city-pages gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory holding the dataset
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Dataset file name, relative to --data-dir
    #[arg(long, default_value = "city_data_sample.csv", global = true)]
    dataset: PathBuf,

    /// Templates directory
    #[arg(long, default_value = "templates", global = true)]
    templates: PathBuf,

    /// Output directory
    #[arg(long, default_value = "build", global = true)]
    output: PathBuf,

    /// Config file (optional; defaults apply when absent)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the dataset and generate every page
    Build(BuildArgs),
    /// Validate dataset, templates and records without writing pages
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return ExitCode::SUCCESS;
    }

    let _guard = match init_logging(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut site_config = config::load_config(&cli.config)?;
    let dataset_path = cli.data_dir.join(&cli.dataset);

    match &cli.command {
        Command::Build(args) => {
            args.apply(&mut site_config.generation);
            site_config.validate()?;
            init_thread_pool(&site_config.processing);

            let data = dataset::load_dataset(&dataset_path)?;
            let renderer = render::TeraRenderer::load(&cli.templates)?;
            let composer = build_composer(&site_config, &cli.config)?;

            let cancel = CancelFlag::new();
            install_ctrl_c(cancel.clone())?;

            println!("==> Generating pages \u{2192} {}", cli.output.display());
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_generate_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = Generator::new(
                &composer,
                &renderer,
                &cli.output,
                GenerateOptions::from_config(&site_config.generation),
            )
            .with_cancel(cancel)
            .with_events(tx)
            .run(&data);
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;

            match result {
                Ok(summary) => {
                    output::print_run_summary(&summary);
                    if summary.cancelled {
                        Ok(ExitCode::from(EXIT_CANCELLED))
                    } else if summary.failed() > 0 {
                        Ok(ExitCode::FAILURE)
                    } else {
                        println!("==> Build complete: {}", cli.output.display());
                        Ok(ExitCode::SUCCESS)
                    }
                }
                Err(err) => {
                    match &err {
                        GenerateError::Aborted { summary, .. } => output::print_run_summary(summary),
                        GenerateError::DuplicateSlugs(collisions) => {
                            output::print_collisions(collisions)
                        }
                        _ => {}
                    }
                    Err(err.into())
                }
            }
        }
        Command::Check => {
            println!("==> Checking {}", dataset_path.display());
            let data = dataset::load_dataset(&dataset_path)?;
            let renderer = render::TeraRenderer::load(&cli.templates)?;
            let composer = build_composer(&site_config, &cli.config)?;
            init_thread_pool(&site_config.processing);

            let report = Generator::new(
                &composer,
                &renderer,
                &cli.output,
                GenerateOptions::from_config(&site_config.generation),
            )
            .check(&data)?;
            output::print_check_report(&dataset_path, &renderer.template_names(), &report);

            if report.is_clean() {
                println!("==> Dataset is valid");
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Site globals for this run plus section boilerplate.
///
/// `sections_dir` is resolved relative to the config file's directory.
fn build_composer(
    site_config: &config::SiteConfig,
    config_path: &Path,
) -> Result<compose::Composer, sections::SectionError> {
    let year = chrono::Local::now().year();
    let globals = compose::SiteGlobals::from_config(site_config, year);
    let table = match &site_config.generation.sections_dir {
        Some(dir) => {
            let base = config_path.parent().unwrap_or(Path::new(""));
            sections::SectionTable::load(&base.join(dir))?
        }
        None => sections::SectionTable::stock(),
    };
    Ok(compose::Composer::new(globals, table))
}

/// Stderr logging filtered by `RUST_LOG` (default `city_pages=info`), and
/// an optional plain-text copy in `log_file`.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("city_pages=info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path.file_name().ok_or("log file path has no file name")?;
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(Some(guard))
}

/// First Ctrl-C raises `cancel` so in-flight pages finish; a second one
/// exits immediately.
fn install_ctrl_c(cancel: CancelFlag) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::warn!("interrupt received, finishing in-flight pages");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("interrupted");
                    std::process::exit(i32::from(EXIT_CANCELLED));
                }
            });
        })?;
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
