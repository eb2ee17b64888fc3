use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geocode_core::{AttributeMap, CacheStore, Config, Location, ResolutionError, Resolver};
use inquire::Text;
use tracing::debug;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "geocode", version, about = "Reverse geocoding CLI")]
pub struct Cli {
    /// Log cache and network activity to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set contact email, endpoint and language.
    Configure,

    /// Show the address attributes for a coordinate pair.
    Reverse {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        /// Preferred response language, e.g. "en" or "de-ch".
        #[arg(long)]
        lang: Option<String>,

        /// Skip the response cache for this lookup.
        #[arg(long)]
        no_cache: bool,
    },

    /// Inspect or clear the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Print the cache directory.
    Path,
    /// Delete all cached responses.
    Clear,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure => configure(&mut config)?,
            Command::Reverse { latitude, longitude, lang, no_cache } => {
                if no_cache {
                    config.cache_enabled = false;
                }

                let location = Location::new(latitude, longitude)?;
                let resolver = Resolver::from_config(&config)?;
                debug!(
                    endpoint = %config.endpoint,
                    cache_dir = ?resolver.cache().dir(),
                    %location,
                    "resolver ready"
                );

                match resolver.reverse(&location, lang.as_deref()).await {
                    Ok(attributes) => print!("{}", render(&attributes)),
                    Err(err) => return Err(explain(err, &location)),
                }
            }
            Command::Cache { action } => {
                let dir = config.resolved_cache_dir()?;
                match action {
                    CacheCommand::Path => println!("{}", dir.display()),
                    CacheCommand::Clear => {
                        let removed = CacheStore::new(&dir)
                            .clear()
                            .await
                            .with_context(|| format!("Failed to clear cache: {}", dir.display()))?;
                        println!("Removed {removed} cached response(s) from {}", dir.display());
                    }
                }
            }
        }

        Ok(())
    }
}

fn configure(config: &mut Config) -> Result<()> {
    let email = Text::new("Contact email sent to the geocoding service:")
        .with_default(&config.contact_email)
        .prompt()?;
    let endpoint = Text::new("Reverse geocoding endpoint:")
        .with_default(&config.endpoint)
        .prompt()?;
    let language = Text::new("Preferred language (empty to follow the system locale):")
        .with_default(config.language.as_deref().unwrap_or_default())
        .prompt()?;

    config.contact_email = email.trim().to_string();
    config.endpoint = endpoint.trim().to_string();
    config.set_language(Some(language));
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn explain(err: ResolutionError, location: &Location) -> anyhow::Error {
    if err.is_network() {
        anyhow::anyhow!("Could not reach the geocoding service for {location}: {err}")
    } else {
        anyhow::anyhow!("Failed to resolve {location}: {err}")
    }
}

/// One `key = value` line per attribute, sorted by key.
fn render(attributes: &AttributeMap) -> String {
    let width = attributes.keys().map(String::len).max().unwrap_or(0);
    attributes
        .iter()
        .map(|(key, value)| format!("{key:<width$} = {value}\n"))
        .collect()
}
