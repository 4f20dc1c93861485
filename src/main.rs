//! nsforge CLI: apply namespace definitions and inspect the result.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use nsforge::engine::{Engine, EngineConfig};
use nsforge::introspect::NamespaceSnapshot;
use nsforge::spec;

#[derive(Parser)]
#[command(name = "nsforge", version, about = "Namespace reconciliation engine")]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail on ambiguous mix inheritance (overrides the config file).
    #[arg(long, global = true)]
    strict_mix: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply definition files in order to a fresh registry and print snapshots.
    Apply {
        /// Files of `[[namespace]]` tables. Later files see earlier definitions.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Only print these namespaces (default: all).
        #[arg(long = "show")]
        show: Vec<String>,

        /// Apply every file twice and fail unless the second pass is a no-op.
        #[arg(long)]
        twice: bool,
    },

    /// Validate definition files without applying them.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the effective engine configuration.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Text,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if cli.strict_mix {
        config.strict_mix = true;
    }

    match cli.command {
        Commands::Apply {
            files,
            format,
            show,
            twice,
        } => {
            let engine = Engine::new(config)?;
            let texts = read_all(&files)?;
            for (path, text) in files.iter().zip(&texts) {
                let reports = engine.define_all(text)?;
                tracing::info!(file = %path.display(), namespaces = reports.len(), "applied");
            }

            if twice {
                let before = engine.snapshots()?;
                for text in &texts {
                    engine.define_all(text)?;
                }
                if engine.snapshots()? != before {
                    miette::bail!("second application changed the registry; definitions are not idempotent");
                }
            }

            let snapshots: Vec<NamespaceSnapshot> = engine
                .snapshots()?
                .into_iter()
                .filter(|s| show.is_empty() || show.contains(&s.name))
                .collect();

            match format {
                Format::Json => {
                    let json = serde_json::to_string_pretty(&snapshots).into_diagnostic()?;
                    println!("{json}");
                }
                Format::Text => {
                    for snapshot in &snapshots {
                        print_snapshot(snapshot);
                    }
                    println!("{}", engine.info());
                }
            }
        }

        Commands::Check { files } => {
            for (path, text) in files.iter().zip(read_all(&files)?) {
                let specs = spec::parse_spec_file(&text)?;
                println!("{}: {} namespace definition(s) ok", path.display(), specs.len());
            }
        }

        Commands::Config => {
            let text = toml::to_string_pretty(&config).into_diagnostic()?;
            print!("{text}");
        }
    }

    Ok(())
}

fn read_all(files: &[PathBuf]) -> Result<Vec<String>> {
    files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .into_diagnostic()
                .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))
        })
        .collect()
}

fn print_snapshot(snapshot: &NamespaceSnapshot) {
    println!("Namespace: \"{}\"", snapshot.name);
    if !snapshot.aliases.is_empty() {
        println!("  aliases:    {}", snapshot.aliases.join(", "));
    }
    if let Some(doc) = &snapshot.documentation {
        println!("  doc:        {doc}");
    }
    if !snapshot.uses.is_empty() {
        println!("  uses:       {}", snapshot.uses.join(", "));
    }
    if !snapshot.used_by.is_empty() {
        println!("  used by:    {}", snapshot.used_by.join(", "));
    }
    for (label, names) in [
        ("external", &snapshot.external),
        ("internal", &snapshot.internal),
        ("shadowed", &snapshot.shadowed),
    ] {
        if !names.is_empty() {
            println!("  {label}:{:width$}{}", "", names.join(", "), width = 11 - label.len());
        }
    }
    if !snapshot.inherited.is_empty() {
        let inherited: Vec<String> = snapshot
            .inherited
            .iter()
            .map(|i| format!("{} <- {}", i.name, i.from))
            .collect();
        println!("  inherited:  {}", inherited.join(", "));
    }
}
