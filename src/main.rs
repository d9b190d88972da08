//! dynimport - Extension Module Loader
//!
//! CLI entry point for inspecting the loader's tables and loading extension
//! modules by hand.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dynimport::config::{DynImportConfig, CONFIG_FILE_NAME};
use dynimport::extensions::BuiltinStatus;
use dynimport::ffi::{extension_suffixes, platform_tag};
use dynimport::frozen::FrozenStatus;
use dynimport::interpreter::InterpreterConfig;
use dynimport::object::ModuleHandle;
use dynimport::runtime::{Runtime, RuntimeBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dynimport")]
#[command(version)]
#[command(about = "Extension module loader and cache engine", long_about = None)]
struct Cli {
    /// Log loader activity (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: dynimport.toml in this or a parent directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List builtin module names
    Builtins,

    /// Show the effective configuration or write a default one
    Config {
        /// Write a default dynimport.toml in the current directory
        #[arg(long)]
        init: bool,
    },

    /// Inspect frozen modules
    Frozen {
        #[command(subcommand)]
        command: FrozenCommands,
    },

    /// Load an extension module from a shared library and print its namespace
    Load {
        /// Path to the extension library
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Fully qualified module name (default: derived from the file name)
        #[arg(long)]
        name: Option<String>,

        /// Load into a fresh subinterpreter instead of the main interpreter
        #[arg(long)]
        subinterpreter: bool,

        /// Let the subinterpreter accept single-phase extensions
        #[arg(long, requires = "subinterpreter")]
        allow_legacy: bool,

        /// Print the namespace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the extension file suffixes, in search order
    Suffixes,
}

#[derive(Subcommand)]
enum FrozenCommands {
    /// List frozen module names
    List {
        /// List as if frozen standard and test modules were disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Show one frozen module
    Show {
        /// Module name (aliases are accepted)
        name: String,

        /// Dump the payload as hex
        #[arg(long)]
        hex: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => DynImportConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DynImportConfig::load_from_cwd().context("Failed to load config")?,
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    if cli.verbose > 0 {
        config.runtime.verbose = true;
    }

    match cli.command {
        Commands::Builtins => cmd_builtins(&config),
        Commands::Config { init } => cmd_config(&config, init),
        Commands::Frozen { command } => match command {
            FrozenCommands::List { disabled } => cmd_frozen_list(&config, disabled),
            FrozenCommands::Show { name, hex } => cmd_frozen_show(&config, &name, hex),
        },
        Commands::Load {
            path,
            name,
            subinterpreter,
            allow_legacy,
            json,
        } => cmd_load(&config, &path, name, subinterpreter, allow_legacy, json),
        Commands::Suffixes => cmd_suffixes(),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) if verbose == 0 => f,
        _ => EnvFilter::new(format!("dynimport={}", default_level)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn build_runtime(config: &DynImportConfig) -> Result<Arc<Runtime>> {
    let builder = RuntimeBuilder::from_config(config).context("Invalid configuration")?;
    builder.build().context("Failed to start runtime")
}

fn cmd_builtins(config: &DynImportConfig) -> Result<()> {
    let runtime = build_runtime(config)?;
    for name in runtime.builtin_module_names() {
        let marker = match runtime.is_builtin(&name) {
            BuiltinStatus::Core => " (core)",
            _ => "",
        };
        println!("{}{}", name, marker);
    }
    Ok(())
}

fn cmd_config(config: &DynImportConfig, init: bool) -> Result<()> {
    if init {
        let path = Path::new(CONFIG_FILE_NAME);
        if path.exists() {
            bail!("{} already exists", CONFIG_FILE_NAME);
        }
        DynImportConfig::default()
            .save(path)
            .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;
        println!("Wrote {}", CONFIG_FILE_NAME);
        return Ok(());
    }

    let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
    print!("{}", text);
    Ok(())
}

fn cmd_frozen_list(config: &DynImportConfig, disabled: bool) -> Result<()> {
    let runtime = build_runtime(config)?;
    let use_frozen = runtime.main_interpreter().use_frozen() && !disabled;
    for name in runtime.frozen().list_frozen_names(use_frozen) {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_frozen_show(config: &DynImportConfig, name: &str, hex_dump: bool) -> Result<()> {
    let runtime = build_runtime(config)?;
    let use_frozen = runtime.main_interpreter().use_frozen();
    let table = runtime.frozen();

    let hit = match table.lookup(name, use_frozen) {
        Ok(hit) => hit,
        Err(status) => {
            let err = status
                .into_error(name)
                .map(|e| e.to_string())
                .unwrap_or_else(|| status.to_string());
            bail!(err);
        }
    };

    println!("name:      {}", name);
    println!("status:    {}", hit.status);
    println!("set:       {}", hit.set);
    println!("package:   {}", hit.module.is_package());
    println!("origname:  {}", hit.origname);
    let aliases = table.aliases_of(hit.origname);
    if !aliases.is_empty() {
        println!("aliases:   {}", aliases.join(", "));
    }

    match (hit.status, hit.module.code()) {
        (FrozenStatus::Okay, Some(code)) | (FrozenStatus::Invalid, Some(code)) => {
            println!("size:      {} bytes", code.len());
            println!();
            if hex_dump {
                for chunk in code.chunks(32) {
                    println!("{}", hex::encode(chunk));
                }
            } else {
                print!("{}", String::from_utf8_lossy(code));
            }
        }
        _ => println!("size:      (excluded)"),
    }
    Ok(())
}

fn cmd_load(
    config: &DynImportConfig,
    path: &Path,
    name: Option<String>,
    subinterpreter: bool,
    allow_legacy: bool,
    json: bool,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => module_name_from_path(path)
            .with_context(|| format!("Cannot derive a module name from {}", path.display()))?,
    };
    let path = path
        .canonicalize()
        .with_context(|| format!("Extension not found: {}", path.display()))?;

    let runtime = build_runtime(config)?;
    let interp = if subinterpreter {
        let mut sub_config = runtime.config().subinterpreter.clone();
        if allow_legacy {
            sub_config = InterpreterConfig {
                dlopen_flags: sub_config.dlopen_flags,
                verbose: sub_config.verbose,
                ..InterpreterConfig::legacy()
            };
        }
        runtime
            .new_interpreter(sub_config)
            .context("Failed to create subinterpreter")?
    } else {
        Arc::clone(runtime.main_interpreter())
    };

    let module = runtime
        .import_dynamic(&interp, &name, &path)
        .with_context(|| format!("Failed to load {} from {}", name, path.display()))?;

    if json {
        println!("{}", namespace_json(&module)?);
    } else {
        println!("module {} (interpreter {})", module.name(), interp.id());
        module.with_namespace(|ns| {
            for (key, value) in ns.iter() {
                println!("  {} = {}", key, value);
            }
        });
    }
    Ok(())
}

fn cmd_suffixes() -> Result<()> {
    println!("# platform: {}", platform_tag());
    for suffix in extension_suffixes() {
        println!("{}", suffix);
    }
    Ok(())
}

/// `spam.cpython-x86_64-linux-gnu.so` -> `spam`
fn module_name_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

fn namespace_json(module: &ModuleHandle) -> Result<String> {
    let map = module.with_namespace(|ns| {
        ns.iter()
            .map(|(key, value)| Ok((key.clone(), serde_json::to_value(value)?)))
            .collect::<Result<serde_json::Map<_, _>, serde_json::Error>>()
    })?;
    serde_json::to_string_pretty(&serde_json::json!({
        "module": module.name(),
        "namespace": map,
    }))
    .context("Failed to serialize namespace")
}
