//! Dry-run a deployment config on a sandbox ledger and print the resulting
//! contract addresses.
//!
//! Usage: `fate-deploy <config.json>`. Log verbosity follows `RUST_LOG`.

use std::process::ExitCode;

use fate_deployment_scripts::{deploy, sandbox, strkey_of, DeploymentConfig};
use soroban_sdk::{testutils::Address as _, Address};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        error!("usage: fate-deploy <config.json>");
        return ExitCode::FAILURE;
    };

    let config = match DeploymentConfig::from_file(&path) {
        Ok(config) => config,
        Err(err) => {
            error!(%path, "{err}");
            return ExitCode::FAILURE;
        }
    };

    let env = sandbox();
    let deployer = Address::generate(&env);
    match deploy(&env, &deployer, &config, &[]) {
        Ok(deployment) => {
            println!("reward_token  {}", strkey_of(&deployment.reward_token));
            println!("vault         {}", strkey_of(&deployment.vault));
            println!("schedule      {}", strkey_of(&deployment.schedule));
            println!("controller    {}", strkey_of(&deployment.controller));
            for (i, lockup) in deployment.beneficiary_lockups.iter().enumerate() {
                println!("lockup[{i}]     {}", strkey_of(lockup));
            }
            println!("fgcd_lockup   {}", strkey_of(&deployment.fgcd_lockup));
            println!("legal_lockup  {}", strkey_of(&deployment.legal_lockup));
            println!("growth_lockup {}", strkey_of(&deployment.growth_lockup));
            println!("presale_lockup {}", strkey_of(&deployment.presale_lockup));
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
