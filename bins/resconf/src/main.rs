use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use resconf_core::merge::expand_entries;
use resconf_core::schema::builtin;
use resconf_core::{ConfigStore, KeyPath, NestedMap, Node, Schema, Value};
use resconf_sources::{load_file, Format, Loader};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Load a layered configuration and print it.
#[derive(Debug, Parser)]
#[command(name = "resconf", version)]
struct Cli {
    /// File holding the default config
    #[arg(long, short = 'd')]
    defaults: Option<PathBuf>,

    /// Config file candidates, highest precedence first
    #[arg(long = "file", short = 'f')]
    files: Vec<PathBuf>,

    /// Merge all existing files instead of reading only the first
    #[arg(long)]
    merge: bool,

    /// Read overrides for default keys from environment variables with this prefix
    #[arg(long)]
    env_prefix: Option<String>,

    /// Cast a key on write, e.g. `server.port=int` or `timeout=float?`
    #[arg(long = "cast", value_name = "KEY=TYPE")]
    casts: Vec<String>,

    /// Override a key present in the defaults, e.g. `server.port=8080`
    #[arg(long = "set", short = 's', value_name = "KEY=VALUE")]
    sets: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the whole config
    Show {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Print the value at one key
    Get { key: String },
    /// List every leaf key
    Keys,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Ini,
    Json,
    Toml,
    Yaml,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Ini => Format::Ini,
            OutputFormat::Json => Format::Json,
            OutputFormat::Toml => Format::Toml,
            OutputFormat::Yaml => Format::Yaml,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,resconf_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let store = load(&cli)?;

    match cli.command {
        Command::Show { format } => {
            print!("{}", Format::from(format).dump(store.as_map())?);
        }
        Command::Get { key } => {
            let value = store.get_value(KeyPath::parse(&key))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Keys => {
            for key in store.as_map().allkeys() {
                println!("{key}");
            }
        }
    }
    Ok(())
}

fn load(cli: &Cli) -> anyhow::Result<ConfigStore> {
    let default = match &cli.defaults {
        Some(path) => load_file(path).with_context(|| format!("loading defaults from {}", path.display()))?,
        None => NestedMap::new(),
    };

    let mut schema = Schema::new();
    for spec in &cli.casts {
        let (key, name) = split_pair(spec)?;
        let cast = builtin(name).ok_or_else(|| anyhow!("unknown cast type '{name}' for '{key}'"))?;
        schema.register_shared(key, cast);
    }

    let overrides = cli
        .sets
        .iter()
        .map(|spec| {
            let (key, raw) = split_pair(spec)?;
            Ok((KeyPath::parse(key), Node::Leaf(parse_scalar(raw))))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let builder = default
        .allkeys()
        .fold(ConfigStore::builder().schema(schema), |builder, key| {
            let path = key.clone();
            builder.watch(path, move |action, old, new| {
                tracing::debug!(key = %key, ?action, ?old, ?new, "config key loaded");
            })
        });

    let mut loader = Loader::new(default)
        .files(cli.files.iter().cloned())
        .merge_files(cli.merge)
        .args(expand_entries(overrides)?);
    if let Some(prefix) = &cli.env_prefix {
        loader = loader.env_prefix(prefix.clone());
    }

    loader.build(builder).context("loading config")
}

fn split_pair(spec: &str) -> anyhow::Result<(&str, &str)> {
    spec.split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{spec}'"))
}

// JSON scalars are taken as typed values, anything else as a string.
fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_object() => value,
        _ => Value::String(raw.to_string()),
    }
}
