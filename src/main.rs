use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{debug, error, warn};

mod config;
mod engine;
mod env;
mod error;
mod formula;
mod networking;
mod selector;
mod storage;
mod synth;
mod util;

use config::ProjectConfig;
use engine::GeneratorEngine;
use networking::GithubSource;
use networking::cache::ChecksumCache;
use storage::ManifestStore;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_PROJECT_FAILURES: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "tapgen",
    author,
    version,
    about = "Generate Homebrew tap formulas from GitHub releases"
)]
struct Cli {
    /// Path to the projects.yaml config file.
    #[arg(short, long, default_value = env::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory the formula files are written to.
    #[arg(short = 'd', long, default_value = env::DEFAULT_FORMULA_DIR)]
    formula_dir: PathBuf,

    /// Process only this project (repo, name, or repo name).
    #[arg(short, long)]
    project: Option<String>,

    /// List configured projects and exit.
    #[arg(short, long)]
    list: bool,

    /// Report what would change without touching the formula directory.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// How many projects to process concurrently.
    #[arg(short, long, default_value_t = engine::DEFAULT_JOBS)]
    jobs: usize,

    /// Forget cached checksums and hash every asset again.
    #[arg(long)]
    refresh_checksums: bool,

    /// Where the checksum cache is kept.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let projects = match config::load_config(&cli.config) {
        Ok(projects) => projects,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if cli.list {
        print_projects(&projects);
        return ExitCode::SUCCESS;
    }

    let projects = match config::select_projects(projects, cli.project.as_deref()) {
        Ok(projects) => projects,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let cache_path = ChecksumCache::path_in(&cli.cache_dir.unwrap_or_else(env::default_cache_dir));
    let mut cache = ChecksumCache::load(&cache_path);
    if cli.refresh_checksums {
        debug!("cache: dropping {} cached checksum(s)", cache.len());
        cache.clear();
    }

    let source = match GithubSource::new(env::github_token(), cache) {
        Ok(source) => source,
        Err(err) => {
            error!("github: {err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let engine = GeneratorEngine::new(
        source,
        ManifestStore::new(&cli.formula_dir),
        cli.dry_run,
        cli.jobs,
    );
    let report = engine.run(&projects).await;
    debug!("engine: {} file(s) written or removed", report.files_touched());

    let mut cache = engine.into_source().into_cache();
    if let Err(err) = cache.save(&cache_path) {
        warn!("cache: {err}");
    }

    println!("{}", report.summary(cli.dry_run));
    if report.has_failures() {
        ExitCode::from(EXIT_PROJECT_FAILURES)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_projects(projects: &[ProjectConfig]) {
    println!("Configured projects:");
    for project in projects {
        let versions_info = if project.keep_versions > 0 {
            format!(", keep_versions: {}", project.keep_versions)
        } else {
            String::new()
        };
        println!(
            "  - {} (name: {}{versions_info})",
            project.repo,
            project.display_name()
        );
    }
}
