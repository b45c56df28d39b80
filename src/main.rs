//! CLI Entry Point for redsun
//!
//! Provides command-line interface for:
//! - Building and running an application from a configuration file
//! - Listing installed plugins and the components they provide
//! - Checking a configuration file without building anything
//!
//! # Usage
//!
//! Run an application:
//! ```bash
//! redsun run config/mock_app.yaml --plugins plugins
//! ```
//!
//! List plugins:
//! ```bash
//! redsun plugins --plugins plugins
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use redsun::container::{Container, HeadlessLauncher};
use redsun::logging::{self, LogConfig, LogFormat};
use redsun::plugin::{DirectoryPluginSource, Manifest, ManifestResolver, PluginSource, SymbolTable};
use redsun::protocols::Group;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Searched after any `--plugins` directory.
const DEFAULT_PLUGIN_PATHS: [&str; 2] = ["plugins", "~/.redsun/plugins"];

#[derive(Parser)]
#[command(name = "redsun")]
#[command(about = "Plugin-based instrument control application", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", value_parser = logging::parse_log_level)]
    log_level: tracing::Level,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the application described by a configuration file and run it
    Run {
        /// Path to the YAML configuration file
        config: PathBuf,

        /// Additional plugin directory, searched before the defaults
        #[arg(long = "plugins", value_name = "DIR")]
        plugin_paths: Vec<PathBuf>,
    },

    /// List installed plugins and their components
    Plugins {
        /// Additional plugin directory, searched before the defaults
        #[arg(long = "plugins", value_name = "DIR")]
        plugin_paths: Vec<PathBuf>,
    },

    /// Resolve a configuration file and report its components without building
    Check {
        /// Path to the YAML configuration file
        config: PathBuf,

        /// Additional plugin directory, searched before the defaults
        #[arg(long = "plugins", value_name = "DIR")]
        plugin_paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(LogConfig::new(cli.log_level).with_format(cli.log_format))
        .map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { config, plugin_paths } => run(&config, plugin_paths),
        Commands::Plugins { plugin_paths } => list_plugins(plugin_paths),
        Commands::Check { config, plugin_paths } => check(&config, plugin_paths),
    }
}

fn plugin_source(extra: Vec<PathBuf>) -> DirectoryPluginSource {
    let mut source = DirectoryPluginSource::with_paths(extra);
    for path in DEFAULT_PLUGIN_PATHS {
        source.add_search_path(path);
    }
    source
}

fn resolver(extra: Vec<PathBuf>) -> ManifestResolver {
    let symbols = Arc::new(SymbolTable::new());
    redsun::mock::register_symbols(&symbols);
    ManifestResolver::new(Arc::new(plugin_source(extra)), symbols)
}

fn run(config: &Path, plugin_paths: Vec<PathBuf>) -> Result<()> {
    let resolver = resolver(plugin_paths);
    let mut container = Container::from_config(config, &resolver)
        .with_context(|| format!("Failed to load {}", config.display()))?;

    container.run(&HeadlessLauncher)
}

fn check(config: &Path, plugin_paths: Vec<PathBuf>) -> Result<()> {
    let resolver = resolver(plugin_paths);
    let container = Container::from_config(config, &resolver)
        .with_context(|| format!("Failed to load {}", config.display()))?;

    println!("Session:  {}", container.session());
    println!("Frontend: {}", container.frontend());
    for component in container.components() {
        println!("  {} [{}]", component, component.type_name());
    }
    Ok(())
}

fn list_plugins(plugin_paths: Vec<PathBuf>) -> Result<()> {
    let source = plugin_source(plugin_paths);
    let plugins = source.list_plugins();
    if plugins.is_empty() {
        println!("No plugins found in {:?}", source.search_paths());
        return Ok(());
    }

    for plugin in plugins {
        println!("{} ({})", plugin.name, plugin.manifest_path.display());
        let manifest = match Manifest::load(&plugin.manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                println!("  invalid manifest: {:#}", e);
                continue;
            }
        };
        for group in Group::ALL {
            let Some(entries) = manifest.group(group) else {
                continue;
            };
            println!("  {}:", group.as_str());
            for (id, entry) in entries {
                println!("    {} -> {}", id, entry.class.as_deref().unwrap_or("<no class>"));
            }
        }
    }
    Ok(())
}
