use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use treesync_core::SyncConfig;
use treesync_sim::simulator::{run_simulator, SimulatorConfig};
use treesync_sim::{load_config, render_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Command::new("treesync-sim")
        .version(treesync_sim::VERSION)
        .about("Treesync region simulator")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Storm a region with random events and check its invariants")
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of random events"),
                )
                .arg(
                    Arg::new("keys")
                        .long("keys")
                        .default_value("8")
                        .value_parser(value_parser!(u64))
                        .help("Number of collections to choose from"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Region config (TOML) to simulate with"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load a region config and print the effective values")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the TOML file"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("simulate", args)) => {
            let defaults = SimulatorConfig::default();
            let sync = match args.get_one::<PathBuf>("config") {
                Some(path) => load_config(path)?,
                None => defaults.sync.clone(),
            };
            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(defaults.seed),
                steps: args.get_one::<u64>("steps").copied().unwrap_or(defaults.steps),
                keys: args.get_one::<u64>("keys").copied().unwrap_or(defaults.keys),
                stop_on_first_violation: args.get_flag("stop-on-violation"),
                sync,
                ..defaults
            };

            let report = run_simulator(config).await?;
            println!("{}", report.generate_text());
            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("check-config", args)) => {
            let path = args
                .get_one::<PathBuf>("file")
                .context("missing config file")?;
            let config: SyncConfig = load_config(path)?;
            print!("{}", render_config(&config)?);
        }
        _ => {}
    }
    Ok(())
}
