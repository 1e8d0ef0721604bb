use crate::config::{build_dispatcher, DispatchConfig, Strategy};
use crate::dispatcher::{DispatchManager, MatchKind};
use crate::echo::{echo_factories, EchoHandler};
use crate::logging::{init_logging_with_config, LogConfig};
use crate::metrics::MetricsSnapshot;
use crate::registry::{register_manifest, route_registration, FactoryRegistry, RouteManifest};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Command-line interface for pathdispatch
#[derive(Parser)]
#[command(name = "pathdispatch")]
#[command(about = "Path-to-handler dispatch over a route manifest", long_about = None)]
pub struct Cli {
    /// Log level (default: PATHDISPATCH_LOG_LEVEL, else warn)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve request paths and print what served each one
    Resolve {
        /// Route manifest (YAML or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Dispatch strategy: plain, locked or optimistic
        #[arg(short, long, value_parser = parse_strategy)]
        strategy: Option<Strategy>,

        /// Request paths to resolve
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List the registered paths and their pools
    Routes {
        /// Route manifest (YAML or TOML)
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Resolve paths from many threads while a writer re-registers routes
    Stress {
        /// Route manifest (YAML or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Dispatch strategy: plain, locked or optimistic
        #[arg(short, long, value_parser = parse_strategy)]
        strategy: Option<Strategy>,

        /// Reader threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Resolutions per reader thread
        #[arg(short, long, default_value_t = 10_000)]
        iterations: usize,

        /// Request paths to resolve
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    Strategy::parse(s).ok_or_else(|| format!("unknown strategy '{s}' (plain, locked, optimistic)"))
}

/// Summary of a stress run
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub strategy: Strategy,
    pub threads: usize,
    pub iterations: usize,
    pub resolutions: u64,
    pub error_targets: u64,
    pub release_failures: u64,
    pub writer_cycles: u64,
    pub elapsed_ms: u128,
    pub metrics: MetricsSnapshot,
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    log_config.log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("PATHDISPATCH_LOG_LEVEL").ok())
        .unwrap_or_else(|| "warn".to_string());
    let _logging = init_logging_with_config(&log_config)?;

    match &cli.command {
        Commands::Resolve {
            manifest,
            strategy,
            paths,
        } => {
            let loaded = load_manager(manifest, env_config(*strategy))?;
            for line in resolve_paths(loaded.manager.as_ref(), paths)? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Routes { manifest } => {
            let loaded = load_manager(manifest, env_config(None))?;
            for path in loaded.manager.registered_paths() {
                let stats = loaded.manager.pool_stats(&path);
                println!("{}", serde_json::to_string(&stats)?);
            }
            Ok(())
        }
        Commands::Stress {
            manifest,
            strategy,
            threads,
            iterations,
            paths,
        } => {
            let loaded = load_manager(manifest, env_config(*strategy))?;
            let report = run_stress(
                loaded.manager.as_ref(),
                &loaded.manifest,
                &loaded.factories,
                &loaded.config,
                *threads,
                *iterations,
                paths,
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// A manager with a manifest registered, plus what built it
pub struct LoadedManifest {
    pub manager: Box<dyn DispatchManager<EchoHandler>>,
    pub manifest: RouteManifest,
    pub factories: FactoryRegistry<EchoHandler>,
    pub config: DispatchConfig,
}

fn env_config(strategy: Option<Strategy>) -> DispatchConfig {
    let mut config = DispatchConfig::from_env();
    if let Some(strategy) = strategy {
        config.strategy = strategy;
    }
    config
}

/// Build a manager for `config` and register a manifest with echo handlers
pub fn load_manager(manifest: &Path, config: DispatchConfig) -> anyhow::Result<LoadedManifest> {
    let route_manifest = RouteManifest::load(manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;

    let factories = echo_factories(&route_manifest);
    let manager = build_dispatcher::<EchoHandler>(&config);
    let report = register_manifest(manager.as_ref(), &route_manifest, &factories, &config);
    for (path, err) in &report.rejected {
        eprintln!("warning: route '{path}' not registered: {err}");
    }
    Ok(LoadedManifest {
        manager,
        manifest: route_manifest,
        factories,
        config,
    })
}

/// Resolve each path once, releasing as we go; one JSON value per path
pub fn resolve_paths(
    manager: &dyn DispatchManager<EchoHandler>,
    paths: &[String],
) -> anyhow::Result<Vec<Value>> {
    let mut lines = Vec::with_capacity(paths.len());
    for path in paths {
        let resolution = manager.resolve(path);
        let line = match (resolution.instance(), resolution.error()) {
            (Some(instance), _) => json!({
                "path": path,
                "matched": resolution.matched(),
                "kind": resolution.kind(),
                "instance_id": instance.id(),
                "response": instance.respond(path),
            }),
            (None, Some(error)) => json!({
                "path": path,
                "matched": resolution.matched(),
                "kind": resolution.kind(),
                "error": error.to_json(),
            }),
            (None, None) => json!({ "path": path }),
        };
        manager
            .release(resolution)
            .with_context(|| format!("Failed to release handler for {path}"))?;
        lines.push(line);
    }
    Ok(lines)
}

/// Hammer `manager` from `threads` readers while one writer thread
/// force-registers and unregisters manifest routes
pub fn run_stress(
    manager: &dyn DispatchManager<EchoHandler>,
    manifest: &RouteManifest,
    factories: &FactoryRegistry<EchoHandler>,
    config: &DispatchConfig,
    threads: usize,
    iterations: usize,
    paths: &[String],
) -> StressReport {
    let stop = AtomicBool::new(false);
    let resolutions = AtomicU64::new(0);
    let error_targets = AtomicU64::new(0);
    let release_failures = AtomicU64::new(0);
    let writer_cycles = AtomicU64::new(0);
    let started = Instant::now();

    info!(
        strategy = %manager.strategy(),
        threads = threads,
        iterations = iterations,
        "Stress run started"
    );

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut cycle = 0usize;
            while !stop.load(Ordering::Relaxed) && !manifest.routes.is_empty() {
                let route = &manifest.routes[cycle % manifest.routes.len()];
                let registration = route_registration(route, factories, config).force(true);
                if manager.register(registration).is_ok() {
                    manager.unregister(&route.path);
                }
                writer_cycles.fetch_add(1, Ordering::Relaxed);
                cycle += 1;
                std::thread::yield_now();
            }
        });

        let readers: Vec<_> = (0..threads.max(1))
            .map(|reader| {
                let (resolutions, error_targets, release_failures) =
                    (&resolutions, &error_targets, &release_failures);
                scope.spawn(move || {
                    if paths.is_empty() {
                        return;
                    }
                    for i in 0..iterations {
                        let path = &paths[(i + reader) % paths.len()];
                        let resolution = manager.resolve(path);
                        if resolution.is_error() && resolution.kind() != MatchKind::NotFound {
                            error_targets.fetch_add(1, Ordering::Relaxed);
                        }
                        if manager.release(resolution).is_err() {
                            release_failures.fetch_add(1, Ordering::Relaxed);
                        }
                        resolutions.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for reader in readers {
            if reader.join().is_err() {
                release_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        stop.store(true, Ordering::Relaxed);
    });

    let report = StressReport {
        strategy: manager.strategy(),
        threads: threads.max(1),
        iterations,
        resolutions: resolutions.load(Ordering::Relaxed),
        error_targets: error_targets.load(Ordering::Relaxed),
        release_failures: release_failures.load(Ordering::Relaxed),
        writer_cycles: writer_cycles.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis(),
        metrics: manager.metrics().snapshot(),
    };
    info!(
        resolutions = report.resolutions,
        elapsed_ms = report.elapsed_ms,
        "Stress run finished"
    );
    report
}
