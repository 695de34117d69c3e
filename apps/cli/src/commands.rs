//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};

use reportflow_artifacts::{OutlineFormat, load_outline, load_outline_shape, outline_io, save_outline};
use reportflow_core::{Input, Pipeline, PipelineSettings, PipelineVariant, Services};
use reportflow_llm::OpenAiClient;
use reportflow_materials::list_materials;
use reportflow_shared::{AppConfig, Outline, init_config, load_config, load_config_from};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// reportflow: turn a folder of materials into a long-form report.
#[derive(Parser)]
#[command(
    name = "reportflow",
    version,
    about = "Generate long-form markdown reports from a folder of source materials.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.reportflow/reportflow.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Outline serialization accepted on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum FormatArg {
    Yaml,
    Json,
}

impl From<FormatArg> for OutlineFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Yaml => OutlineFormat::Yaml,
            FormatArg::Json => OutlineFormat::Json,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a report on a topic.
    Run {
        /// Report topic.
        #[arg(short, long)]
        topic: String,

        /// Materials directory (defaults to the configured one).
        #[arg(short, long)]
        materials: Option<PathBuf>,

        /// Output directory for reports and intermediates.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after the outline and print a summary.
        #[arg(long, conflicts_with = "outline_only")]
        minimal: bool,

        /// Stop after the outline.
        #[arg(long)]
        outline_only: bool,

        /// Use this outline file instead of designing one.
        #[arg(long)]
        outline: Option<PathBuf>,

        /// Where to write the report (defaults to a timestamped file).
        #[arg(long)]
        report: Option<PathBuf>,

        /// Sections written concurrently (1 keeps previous-section context).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List the files in a materials directory.
    List {
        /// Materials directory (defaults to the configured one).
        #[arg(short, long)]
        materials: Option<PathBuf>,
    },

    /// Inspect or convert outline files.
    Outline {
        #[command(subcommand)]
        action: OutlineAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Outline subcommands.
#[derive(Subcommand)]
pub(crate) enum OutlineAction {
    /// Print an outline as an indented tree.
    Show {
        /// Outline file (YAML or JSON, hierarchical or legacy).
        file: PathBuf,

        /// Print the flat legacy chapter list as JSON.
        #[arg(long, conflicts_with = "format")]
        legacy: bool,

        /// Print the outline serialized in this format instead of a tree.
        #[arg(long)]
        format: Option<FormatArg>,
    },
    /// Convert an outline between formats.
    Convert {
        /// Source outline file.
        input: PathBuf,

        /// Destination file.
        output: PathBuf,

        /// Output format (defaults to the destination extension, then yaml).
        #[arg(long)]
        format: Option<FormatArg>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "reportflow=info",
        1 => "reportflow=debug",
        _ => "reportflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            topic,
            materials,
            output,
            minimal,
            outline_only,
            outline,
            report,
            concurrency,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            let variant = if outline_only {
                PipelineVariant::OutlineOnly
            } else if minimal {
                PipelineVariant::Minimal
            } else {
                PipelineVariant::Full
            };
            let request = RunRequest {
                topic,
                materials,
                output,
                outline,
                report,
                concurrency,
            };
            cmd_run(&config, variant, request).await
        }
        Command::List { materials } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_list(&config, materials)
        }
        Command::Outline { action } => match action {
            OutlineAction::Show {
                file,
                legacy,
                format,
            } => cmd_outline_show(&file, legacy, format.map(Into::into)),
            OutlineAction::Convert {
                input,
                output,
                format,
            } => cmd_outline_convert(&input, &output, format.map(Into::into)),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

/// Config from `--config` when given, else the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = load_config_from(path)?;
            config.apply_env(|name| std::env::var(name).ok());
            Ok(config)
        }
        None => Ok(load_config()?),
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunRequest {
    topic: String,
    materials: Option<PathBuf>,
    output: Option<PathBuf>,
    outline: Option<PathBuf>,
    report: Option<PathBuf>,
    concurrency: Option<usize>,
}

async fn cmd_run(config: &AppConfig, variant: PipelineVariant, request: RunRequest) -> Result<()> {
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(eyre!("--topic must not be empty"));
    }

    let materials = request
        .materials
        .unwrap_or_else(|| PathBuf::from(&config.defaults.materials_dir));
    let output = request
        .output
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));

    let mut input = Input::new(topic, materials).with_output_dir(output);
    if let Some(outline) = request.outline {
        input = input.with_outline(outline);
    }
    if let Some(report) = request.report {
        input = input.with_report_path(report);
    }

    let mut settings = PipelineSettings::from_config(config, variant)?;
    if let Some(concurrency) = request.concurrency {
        settings = settings.with_writer_concurrency(concurrency);
    }

    let progress = Arc::new(CliProgress::new());
    let mut services = Services::from_config(config)?.with_summary_sink(progress.clone());
    match config.api_key() {
        Ok(key) => {
            let client = OpenAiClient::from_config(&config.llm, key)?;
            services = services.with_generator(Arc::new(client));
        }
        Err(err) if !variant.needs_generator(input.outline_path.is_some()) => {
            warn!(%err, "continuing without a text generator");
        }
        Err(err) => return Err(err.into()),
    }

    info!(
        topic,
        variant = %variant,
        materials = %input.materials_dir.display(),
        output = %input.output_dir.display(),
        "starting report run"
    );

    let pipeline = Pipeline::new(settings, services).with_observer(progress.clone());
    let result = pipeline.run(input).await;
    progress.finish();
    let outcome = result?;

    println!();
    println!("  Run:     {}", outcome.run_id);
    println!("  Stages:  {}", outcome.flow.path().join(" -> "));
    if let Some(path) = outcome.report_path() {
        println!("  Report:  {}", path.display());
    }
    println!("  Time:    {:.1}s", outcome.elapsed().as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn cmd_list(config: &AppConfig, materials: Option<PathBuf>) -> Result<()> {
    let dir = materials.unwrap_or_else(|| PathBuf::from(&config.defaults.materials_dir));
    let files = list_materials(&dir)?;

    if files.is_empty() {
        println!("No materials found in {}.", dir.display());
        return Ok(());
    }

    println!("Materials in {}:", dir.display());
    println!();
    for (i, file) in files.iter().enumerate() {
        println!(
            "  {:>3}. {:<48} {:>10}  {}",
            i + 1,
            file.path.display(),
            format_size(file.size),
            file.kind.as_str()
        );
    }
    let total: u64 = files.iter().map(|f| f.size).sum();
    println!();
    println!("  {} files, {}", files.len(), format_size(total));

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KB {
        format!("{bytes} B")
    } else if bytes_f < KB * KB {
        format!("{:.1} KB", bytes_f / KB)
    } else {
        format!("{:.1} MB", bytes_f / (KB * KB))
    }
}

// ---------------------------------------------------------------------------
// outline
// ---------------------------------------------------------------------------

fn cmd_outline_show(file: &Path, legacy: bool, format: Option<OutlineFormat>) -> Result<()> {
    let shape = load_outline_shape(file)?;
    if shape.is_legacy() {
        info!(file = %file.display(), "read legacy outline");
    }
    let outline = shape.into_outline();

    if legacy {
        println!("{}", serde_json::to_string_pretty(&outline.to_legacy())?);
    } else if let Some(format) = format {
        print!("{}", outline_io::to_string(&outline, format)?);
    } else {
        print!("{}", render_tree(&outline));
    }
    Ok(())
}

/// Indented `index title` lines, two spaces per level.
fn render_tree(outline: &Outline) -> String {
    let mut out = format!("{}\n", outline.title);
    for section in outline.walk() {
        out.push_str(&"  ".repeat(section.depth()));
        out.push_str(&format!("{} {}\n", section.index, section.title));
    }
    out.push_str(&format!(
        "({} sections, {} to write)\n",
        outline.walk().count(),
        outline.leaf_count()
    ));
    out
}

fn cmd_outline_convert(input: &Path, output: &Path, format: Option<OutlineFormat>) -> Result<()> {
    let outline = load_outline(input)?;
    let format = format
        .or_else(|| OutlineFormat::from_extension(output))
        .unwrap_or(OutlineFormat::Yaml);
    let written = save_outline(&outline, output, format)?;
    println!("Wrote {format} outline to {}", written.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use reportflow_shared::Section;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn minimal_and_outline_only_conflict() {
        let parsed = Cli::try_parse_from([
            "reportflow",
            "run",
            "--topic",
            "Tides",
            "--minimal",
            "--outline-only",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn run_accepts_outline_file() {
        let cli = Cli::try_parse_from([
            "reportflow",
            "run",
            "-t",
            "Tides",
            "--outline",
            "plan.yaml",
            "--minimal",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                outline, minimal, ..
            } => {
                assert_eq!(outline, Some(PathBuf::from("plan.yaml")));
                assert!(minimal);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn tree_indents_by_depth() {
        let outline = Outline::new(
            "Tides",
            vec![
                Section::new("1", "Basics", "")
                    .with_subsections(vec![Section::new("1.1", "Gravity", "")]),
                Section::new("2", "Outlook", ""),
            ],
        );
        assert_eq!(
            render_tree(&outline),
            "Tides\n1 Basics\n  1.1 Gravity\n2 Outlook\n(3 sections, 2 to write)\n"
        );
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
