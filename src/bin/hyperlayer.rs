// Hyperlayer CLI
// Compiles, checks and simulates keyboard layer profiles

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hyperlayer_core::{config, parse_script, Profile, ScriptEvent, Simulator, VariableStore};

/// Tap/hold and modal sublayer compiler for macOS key remapping
#[derive(Parser, Debug)]
#[command(name = "hyperlayer")]
#[command(version)]
#[command(about = "Tap/hold and modal sublayer compiler for macOS key remapping", long_about = None)]
struct Args {
    /// TOML profile (defaults to <config dir>/hyperlayer/profile.toml)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the profile into complex-modification JSON
    Compile {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
    /// Validate the profile and print its rule units
    Check,
    /// List every variable the profile owns
    Variables,
    /// Replay a key script: d:KEY u:KEY t:MS app:BUNDLE
    Simulate {
        #[arg(required = true, value_name = "TOKEN")]
        script: Vec<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn load(path: Option<PathBuf>) -> Result<Profile> {
    let path = match path {
        Some(path) => path,
        None => config::default_path().context("no --config given and no config directory found")?,
    };
    config::load_profile(&path).with_context(|| format!("failed to load {}", path.display()))
}

fn compile(profile: &Profile, output: Option<PathBuf>) -> Result<()> {
    let json = profile
        .to_json_pretty()
        .context("failed to serialize profile")?;
    match output {
        Some(path) => {
            fs::write(&path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("Wrote {} units to {}", profile.units().len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn check(profile: &Profile) {
    println!(
        "Profile '{}' is valid: {} units, {} variables",
        profile.title(),
        profile.units().len(),
        profile.variables().len()
    );
    for unit in profile.units() {
        let unit_branches = unit.branches();
        let branches: Vec<&str> = unit_branches
            .iter()
            .map(|(branch, _)| branch.as_ref())
            .collect();
        println!("  {}", unit);
        if !unit.conditions.is_empty() {
            let guards: Vec<String> = unit.conditions.iter().map(|c| c.to_string()).collect();
            println!("      when {}", guards.join(" && "));
        }
        if !branches.is_empty() {
            println!("      branches {}", branches.join(", "));
        }
    }
}

fn variables(profile: &Profile) {
    for spec in profile.variables() {
        println!("{:<32} {:<10} {}", spec.name, spec.kind.as_ref(), spec.owner);
    }
}

fn simulate(profile: &Profile, tokens: &[String]) -> Result<()> {
    let script = parse_script(&tokens.join(" ")).context("invalid simulation script")?;
    let mut sim = Simulator::new(profile);

    for event in &script {
        sim.play(std::slice::from_ref(event));
        if let ScriptEvent::App(bundle_id) = event {
            println!("{:>6}ms  frontmost {}", sim.now(), bundle_id);
        }
        for effect in sim.take_effects() {
            println!("{:>6}ms  {}", sim.now(), effect);
        }
    }

    let set: Vec<String> = profile
        .variables()
        .iter()
        .filter(|spec| sim.store().is_set(&spec.name))
        .map(|spec| format!("{}={}", spec.name, sim.variable(&spec.name)))
        .collect();
    if set.is_empty() {
        println!("variables: all zero");
    } else {
        println!("variables: {}", set.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let profile = load(args.config)?;

    match args.command {
        Command::Compile { output } => compile(&profile, output)?,
        Command::Check => check(&profile),
        Command::Variables => variables(&profile),
        Command::Simulate { script } => simulate(&profile, &script)?,
    }
    Ok(())
}
