// trustpath — Alliance-aware relay path selection CLI
//
// Loads a client profile, a relay consensus and a geolocation source, then
// selects a guard, middle and exit relay resistant to colluding alliances.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use trustpath_core::{
    expand_alliance, filter_trusted, parse_consensus, ClientProfile, CountryCode, CountryLookup,
    Fingerprint, PathBuilder, Relay, WithOverrides,
};

#[derive(Parser)]
#[command(name = "trustpath")]
#[command(about = "TrustPath — Alliance-aware relay path selection", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log selection details at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Client alliances, trust levels and endpoints
    #[arg(long, default_value = "client_input.json")]
    client_input: PathBuf,
    /// Relay consensus document
    #[arg(long, default_value = "tor_consensus.json")]
    consensus: PathBuf,
    /// Geolocation source: a MaxMind `.mmdb` database or a JSON table
    /// (address → country code)
    #[arg(long)]
    geo: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a guard, middle and exit relay
    Path {
        #[command(flatten)]
        inputs: InputArgs,
        /// Seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,
        /// Print the path as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show guard and exit security scores
    Score {
        #[command(flatten)]
        inputs: InputArgs,
        /// Also score every exit against this guard
        #[arg(long)]
        guard: Option<String>,
    },
    /// Print the alliance closure of one or more countries
    Expand {
        #[arg(required = true)]
        countries: Vec<String>,
        #[arg(long, default_value = "client_input.json")]
        client_input: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the active configuration
    Show,
    /// Write the default configuration
    Init,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::Config::config_file()?,
    };

    match cli.command {
        Commands::Path { inputs, seed, json } => cmd_path(&config_path, inputs, seed, json),
        Commands::Score { inputs, guard } => cmd_score(&config_path, inputs, guard),
        Commands::Expand {
            countries,
            client_input,
        } => cmd_expand(countries, &client_input),
        Commands::Config { action } => cmd_config(&config_path, action),
    }
}

/// Parsed inputs shared by the path and score commands
struct Loaded {
    profile: ClientProfile,
    builder: PathBuilder<WithOverrides<config::GeoSource>>,
}

fn load_inputs(config_path: &Path, inputs: &InputArgs) -> Result<Loaded> {
    let config = config::Config::load_from(config_path)?;

    let profile = ClientProfile::from_file(&inputs.client_input).with_context(|| {
        format!(
            "Failed to load client input {}",
            inputs.client_input.display()
        )
    })?;
    let geo = config.geo_lookup(inputs.geo.as_deref())?;

    let consensus = std::fs::read_to_string(&inputs.consensus)
        .with_context(|| format!("Failed to read consensus {}", inputs.consensus.display()))?;
    let relays = parse_consensus(&consensus).context("Failed to parse consensus")?;
    let total = relays.len();
    let relays = filter_trusted(relays, &profile.trust, &geo);
    tracing::info!(total, trusted = relays.len(), "loaded relays");

    let builder = PathBuilder::new(
        relays,
        profile.trust.clone(),
        profile.alliances.clone(),
        config.path,
        geo,
    )?;

    Ok(Loaded { profile, builder })
}

fn resolve(lookup: &impl CountryLookup, ip: &str, what: &str) -> Result<CountryCode> {
    lookup
        .country_of(ip)
        .with_context(|| format!("Could not resolve the {} address {}", what, ip))
}

fn find_relay<'a>(relays: &'a [Relay], fingerprint: &Fingerprint) -> Option<&'a Relay> {
    relays.iter().find(|r| &r.fingerprint == fingerprint)
}

fn cmd_path(config_path: &Path, inputs: InputArgs, seed: Option<u64>, json: bool) -> Result<()> {
    let Loaded { profile, builder } = load_inputs(config_path, &inputs)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let path = builder
        .select_path_for(&profile.client_ip, &profile.destination_ip, &mut rng)
        .context("Path selection failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&path)?);
        return Ok(());
    }

    println!("{}", "-- Selected Path --".bold());
    println!("  Guard:  {}", path.guard.to_string().bright_cyan());
    println!("  Middle: {}", path.middle.to_string().bright_cyan());
    println!("  Exit:   {}", path.exit.to_string().bright_cyan());
    println!();

    println!("{}", "-- Extra Info --".bold());
    for (role, fingerprint) in [
        ("guard", &path.guard),
        ("middle", &path.middle),
        ("exit", &path.exit),
    ] {
        let Some(relay) = find_relay(builder.relays(), fingerprint) else {
            continue;
        };
        let country = builder
            .lookup()
            .country_of(&relay.ip)
            .map(|c| c.to_string())
            .unwrap_or_else(|_| "??".to_string());
        println!(
            "  ({}) - {} ({}) - IP: {}",
            role,
            fingerprint.to_string().bright_yellow(),
            country.green(),
            relay.ip
        );
    }

    Ok(())
}

fn cmd_score(config_path: &Path, inputs: InputArgs, guard: Option<String>) -> Result<()> {
    let Loaded { profile, builder } = load_inputs(config_path, &inputs)?;

    let client = resolve(builder.lookup(), &profile.client_ip, "client")?;
    let guard_score = builder.guard_score(&client)?;

    println!("{}", "Guard Security".bold());
    println!("  Client country: {}", client.to_string().bright_cyan());
    println!(
        "  Guards:         {}",
        builder.relays().iter().filter(|r| r.is_guard()).count()
    );
    println!("  Score:          {:.6}", guard_score);

    let Some(guard) = guard else {
        return Ok(());
    };

    let fingerprint = Fingerprint::new(&guard);
    let relay = match find_relay(builder.relays(), &fingerprint) {
        Some(relay) if relay.is_guard() => relay,
        Some(_) => bail!("Relay {} is not a guard", fingerprint),
        None => bail!("Relay {} is not in the trusted relay set", fingerprint),
    };
    let guard_country = resolve(builder.lookup(), &relay.ip, "guard")?;
    let destination = resolve(builder.lookup(), &profile.destination_ip, "destination")?;

    let mut scores: Vec<(Fingerprint, f64)> = builder
        .exit_scores(&client, &destination, &guard_country)?
        .into_iter()
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!();
    println!(
        "{} (guard {} in {})",
        "Exit Security".bold(),
        fingerprint.to_string().bright_yellow(),
        guard_country
    );
    for (exit, score) in scores {
        println!("  {:.6}  {}", score, exit);
    }

    Ok(())
}

fn cmd_expand(countries: Vec<String>, client_input: &Path) -> Result<()> {
    let profile = ClientProfile::from_file(client_input).with_context(|| {
        format!("Failed to load client input {}", client_input.display())
    })?;

    let seed: BTreeSet<CountryCode> = countries.iter().map(CountryCode::new).collect();
    let closure = expand_alliance(&seed, &profile.alliances);

    let seed_list: Vec<&str> = seed.iter().map(CountryCode::as_str).collect();
    let closure_list: Vec<String> = closure
        .iter()
        .map(|c| {
            if seed.contains(c) {
                c.to_string()
            } else {
                c.to_string().bright_red().to_string()
            }
        })
        .collect();

    println!(
        "{} {}",
        "Alliance closure of".bold(),
        seed_list.join(", ").bright_cyan()
    );
    println!("  {}", closure_list.join(", "));

    Ok(())
}

fn cmd_config(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = config::Config::load_from(config_path)?;
            println!("{}", "Configuration".bold());
            println!("  File: {}", config_path.display().to_string().bright_cyan());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            config::Config::default().save_to(config_path)?;
            println!(
                "  {} Wrote default configuration to {}",
                "✓".green(),
                config_path.display().to_string().bright_cyan()
            );
        }
    }

    Ok(())
}
