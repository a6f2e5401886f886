use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{error, warn};
use playground_bundler_rs::compiler::CommandCompiler;
use playground_bundler_rs::{
    BundlerConfig, BundlerWorker, CompileOutcome, WorkerRequest, WorkerResponse,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use url::Url;

/// playground-bundler: Bundles a UI component and its CDN dependencies into one script
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the package registry mirror
    #[arg(long, global = true)]
    registry_url: Option<Url>,

    /// URL of the framework runtime's served source tree
    #[arg(long, global = true)]
    framework_root: Option<Url>,

    /// Program that compiles component source (JSON on stdin, JSON on stdout)
    #[arg(long, global = true, default_value = "node")]
    compiler: String,

    /// Argument passed to the compiler program (repeatable)
    #[arg(long = "compiler-arg", global = true, allow_hyphen_values = true)]
    compiler_args: Vec<String>,

    /// Maximum number of cached fetches
    #[arg(long, global = true)]
    cache_capacity: Option<usize>,

    /// Seconds before a cached fetch is refetched
    #[arg(long, global = true)]
    cache_ttl_secs: Option<u64>,

    /// Minify the bundled output
    #[arg(long, global = true)]
    minify: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer newline-delimited JSON requests from stdin on stdout
    Serve,

    /// Bundle a single component file
    Compile {
        /// Path to input component file
        #[arg(short, long)]
        input: PathBuf,

        /// Path to output script file to be created
        #[arg(short, long)]
        output: PathBuf,
    },
}

const DEFAULT_COMPILER_SCRIPT: &str = "scripts/compile-component.mjs";

fn build_config(cli: &Cli) -> anyhow::Result<BundlerConfig> {
    let mut config = match &cli.config {
        Some(path) => BundlerConfig::from_path(path)?,
        None => BundlerConfig::default(),
    };
    if let Some(url) = &cli.registry_url {
        config.registry_url = url.clone();
    }
    if let Some(url) = &cli.framework_root {
        config.framework.source_root = url.clone();
    }
    if cli.cache_capacity.is_some() {
        config.cache_capacity = cli.cache_capacity;
    }
    if cli.cache_ttl_secs.is_some() {
        config.cache_ttl_secs = cli.cache_ttl_secs;
    }
    config.minify |= cli.minify;
    Ok(config.normalized())
}

fn build_compiler(cli: &Cli) -> CommandCompiler {
    let args = if cli.compiler_args.is_empty() && cli.compiler == "node" {
        vec![DEFAULT_COMPILER_SCRIPT.to_string()]
    } else {
        cli.compiler_args.clone()
    };
    CommandCompiler::new(cli.compiler.clone(), args)
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err:#}");
            std::process::exit(1);
        }
    };
    let worker = BundlerWorker::new(config, Arc::new(build_compiler(&cli)));

    let result = match cli.command {
        Commands::Serve => serve(worker).await,
        Commands::Compile { input, output } => compile_file(worker, input, output).await,
    };
    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn serve(worker: BundlerWorker) -> anyhow::Result<()> {
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<WorkerResponse>();

    // Responses go out in completion order, one JSON object per line.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = out_rx.recv().await {
            let mut line = response.to_json()?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match WorkerRequest::from_json(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!("Ignoring malformed request: {err}");
                continue;
            }
        };
        let worker = worker.clone();
        let out_tx = out_tx.clone();
        pending.spawn(async move {
            let uid = request.uid().to_string();
            let response = match worker.handle(request).await {
                Ok(response) => response,
                Err(err) => {
                    error!("Bundler worker failed: {err}");
                    WorkerResponse::error(uid, err.to_string())
                }
            };
            out_tx.send(response).ok();
        });

        // Only requests still in flight stay in the set.
        while let Some(finished) = pending.try_join_next() {
            finished?;
        }
    }

    while let Some(finished) = pending.join_next().await {
        finished?;
    }
    drop(out_tx);
    writer.await??;
    Ok(())
}

async fn compile_file(
    worker: BundlerWorker,
    input: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    let response = worker.compile(input.display().to_string(), source).await?;
    match response.outcome {
        CompileOutcome::Code(code) => std::fs::write(&output, code)
            .with_context(|| format!("Failed to write output file: {}", output.display())),
        CompileOutcome::Error(message) => bail!("Bundling failed: {message}"),
    }
}
