// Command-line entry point for apex-log-graph.

use anyhow::{bail, Context, Result};
use apex_log_graph::application::{AnalyzeUsecase, View};
use apex_log_graph::config::{AppConfig, OutputFormat};
use apex_log_graph::infrastructure::concurrency::init_thread_pool;
use apex_log_graph::infrastructure::{exporter_for, LogLoader};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Call graph and call tree views of Apex debug logs", long_about = None)]
struct Cli {
    /// Debug log file(s)
    inputs: Vec<PathBuf>,

    /// Folder(s) searched recursively for *.log files
    #[arg(short = 'd', long)]
    folder: Vec<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file; a directory when several logs are given. Defaults to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (json, dot, text)
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// View: graph, tree, merge, backtrace, scope
    #[arg(long, default_value = "graph")]
    view: String,

    /// Signature (`Class#method(args)`) for merge/backtrace, node id for scope
    #[arg(short, long)]
    target: Option<String>,

    /// Stop after this many lines per log
    #[arg(long)]
    max_lines: Option<usize>,

    /// Hide System frames in the filtered frame list
    #[arg(long)]
    hide_system: bool,

    /// Fold consecutive repeated frames
    #[arg(long)]
    collapse_repeats: bool,

    /// Actor id to hide (e.g. Class:Logger)
    #[arg(long = "hide-actor")]
    hide_actor: Vec<String>,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Worker threads for batches
    #[arg(short, long)]
    jobs: Option<usize>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Config file values, overridden by flags that were given.
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(max) = self.max_lines {
            config.parse.max_lines = Some(max);
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        config.output.pretty |= self.pretty;
        config.filter.hide_system |= self.hide_system;
        config.filter.collapse_repeats |= self.collapse_repeats;
        config.filter.hidden_actors.extend(self.hide_actor.iter().cloned());
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.resolve_config()?;
    let view = View::from_parts(&cli.view, cli.target.as_deref())?;

    let paths = LogLoader::collect(&cli.inputs, &cli.folder)?;
    if paths.is_empty() {
        bail!("Please provide at least one log file or --folder <dir>");
    }
    let inputs = LogLoader::load(&paths)?;

    let exporter = exporter_for(config.output.format, config.output.pretty);
    let usecase = AnalyzeUsecase { config: &config, exporter: exporter.as_ref() };

    if inputs.len() == 1 {
        let (source, text) = &inputs[0];
        let rendered = usecase.run(source, text, &view)?;
        match &cli.output {
            Some(path) => {
                fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("{} -> {} ({} view, {})", source, path.display(), view, config.output.format);
            }
            None => println!("{rendered}"),
        }
        return Ok(());
    }

    let workers = init_thread_pool(cli.jobs)?;
    log::info!("analyzing {} logs on {} worker(s)", inputs.len(), workers);
    if let Some(dir) = &cli.output {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let sources: Vec<String> = inputs.iter().map(|(source, _)| source.clone()).collect();
    let names = LogLoader::output_names(&sources, exporter.extension());

    let mut failures = 0;
    for ((source, result), name) in usecase.run_batch(&inputs, &view).into_iter().zip(names) {
        let rendered = match result {
            Ok(rendered) => rendered,
            Err(e) => {
                log::error!("{source}: {e}");
                failures += 1;
                continue;
            }
        };
        match &cli.output {
            Some(dir) => {
                let path = dir.join(name);
                fs::write(&path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("{} -> {}", source, path.display());
            }
            None => println!("{rendered}"),
        }
    }
    if failures > 0 {
        bail!("{failures} of {} log(s) failed to render", inputs.len());
    }
    Ok(())
}
