#![forbid(unsafe_code)]

use std::io::{self, IsTerminal, Read};

use clap::Parser;
use ticket_defense_engines::device_vault::{DeviceVault, SecretStore};
use ticket_defense_tools::analyze_cli::{run_analyze, runtime_from_lookup};
use ticket_defense_tools::vault_cli::{execute_vault_command, parse_provider_secret_id};
use ticket_defense_tools::{Cli, Commands, VaultAction};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if cli.verbose {
        init_logging();
    }

    if let Err(err) = run(cli) {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let vault = DeviceVault::default_local();
    match cli.command {
        Commands::Vault { action } => {
            let value = match &action {
                VaultAction::Set { key_id } => {
                    let parsed = parse_provider_secret_id(key_id)?;
                    Some(read_secret_value(parsed.as_str())?)
                }
                _ => None,
            };
            let out = execute_vault_command(&vault, &action, value.as_deref())?;
            if !out.is_empty() {
                println!("{out}");
            }
        }
        Commands::Analyze(args) => {
            let lookup = |key: &str| std::env::var(key).ok();
            let store: &dyn SecretStore = &vault;
            let runtime = runtime_from_lookup(&lookup, Some(store));
            let report = run_analyze(&args, &runtime, chrono::Utc::now())?;
            let pretty = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
            println!("{pretty}");
        }
    }
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_defense_tools=debug,ticket_defense_engines=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_secret_value(key_id: &str) -> Result<String, String> {
    let value = if io::stdin().is_terminal() {
        rpassword::prompt_password(format!("Enter value for {key_id}:")).map_err(|e| e.to_string())?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        input
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("secret value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}
