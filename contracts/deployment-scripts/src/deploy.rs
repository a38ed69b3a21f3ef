//! Runs a validated [`DeploymentConfig`] against a Soroban host.

use std::fmt::Debug;

use fate_reward_controller::{ControllerConfig, RewardController, RewardControllerClient};
use fate_reward_schedule::{RewardSchedule, RewardScheduleClient, ScheduleStep};
use fate_reward_token::{RewardToken, RewardTokenClient, TokenConfig};
use fate_token_lockup::{TokenLockup, TokenLockupClient};
use fate_vault::{Vault, VaultClient};
use soroban_sdk::{Address, Env, String as SorobanString, Vec as SorobanVec};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{parse_amount, ConfigError, DeploymentConfig};
use crate::{address_from_strkey, strkey_of, CLIFF_DURATION_SECS, TOTAL_DURATION_SECS};

/// Ledgers the controller's allowance on the vault stays live (~30 days).
pub const VAULT_APPROVAL_LEDGERS: u32 = 518_400;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{step} failed: {detail}")]
    Step { step: &'static str, detail: String },
    #[error("{0} overflows")]
    Overflow(&'static str),
}

/// Addresses of everything a deployment created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub reward_token: Address,
    pub vault: Address,
    pub schedule: Address,
    pub controller: Address,
    /// One per configured beneficiary, in config order.
    pub beneficiary_lockups: Vec<Address>,
    pub fgcd_lockup: Address,
    pub legal_lockup: Address,
    pub growth_lockup: Address,
    pub presale_lockup: Address,
}

/// A fresh host ledger on which every signature is granted. Used for dry
/// runs of the deployment.
pub fn sandbox() -> Env {
    let env = Env::default();
    env.mock_all_auths();
    env
}

/// Unwrap a `try_*` client call, naming the step that failed.
fn checked<T, C, E, I>(
    step: &'static str,
    result: Result<Result<T, C>, Result<E, I>>,
) -> Result<T, DeployError>
where
    C: Debug,
    E: Debug,
    I: Debug,
{
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(DeployError::Step {
            step,
            detail: format!("unexpected return value: {err:?}"),
        }),
        Err(Ok(err)) => Err(DeployError::Step {
            step,
            detail: format!("{err:?}"),
        }),
        Err(Err(err)) => Err(DeployError::Step {
            step,
            detail: format!("host error: {err:?}"),
        }),
    }
}

/// Last ledger on which the controller may draw on the vault.
fn approval_expiration(sequence: u32) -> Result<u32, DeployError> {
    sequence
        .checked_add(VAULT_APPROVAL_LEDGERS)
        .ok_or(DeployError::Overflow("vault approval expiration"))
}

/// Deploy the full contract set. `deployer` signs every setup call and ends
/// up holding whatever part of the supply was not allocated.
///
/// Order: token, vault, schedule, controller, lockups, lockup ownership to
/// the multisig, initial transfers, vault approval for the controller, and
/// finally vault, schedule and controller ownership to the multisig.
pub fn deploy(
    env: &Env,
    deployer: &Address,
    config: &DeploymentConfig,
    predecessors: &[Address],
) -> Result<Deployment, DeployError> {
    config.validate()?;
    let multisig = address_from_strkey(env, "multisig", config.multisig()?)?;
    info!(chain_id = config.chain_id, multisig = %strkey_of(&multisig), "deploying FATE contracts");

    // Token
    let supply = config.total_supply()?;
    let reward_token = env.register(RewardToken, ());
    let token = RewardTokenClient::new(env, &reward_token);
    checked(
        "reward token init",
        token.try_init(
            deployer,
            &TokenConfig {
                name: SorobanString::from_str(env, &config.token.name),
                symbol: SorobanString::from_str(env, &config.token.symbol),
                decimals: config.token.decimals,
            },
            &supply,
        ),
    )?;
    info!(address = %strkey_of(&reward_token), supply = %supply, "reward token deployed");

    // Vault
    let vault = env.register(Vault, ());
    let vault_client = VaultClient::new(env, &vault);
    checked("vault init", vault_client.try_init(deployer, &reward_token))?;
    info!(address = %strkey_of(&vault), "vault deployed");

    // Schedule
    let mut steps = SorobanVec::new(env);
    for (start_offset, reward_per_block) in config.schedule_steps()? {
        steps.push_back(ScheduleStep {
            start_offset,
            reward_per_block,
        });
    }
    let schedule = env.register(RewardSchedule, ());
    let schedule_client = RewardScheduleClient::new(env, &schedule);
    checked(
        "schedule init",
        schedule_client.try_init(deployer, &config.schedule.start_block, &steps),
    )?;
    info!(
        address = %strkey_of(&schedule),
        start_block = config.schedule.start_block,
        steps = steps.len(),
        "reward schedule deployed"
    );

    // Controller
    let mut predecessor_list = SorobanVec::new(env);
    for predecessor in predecessors {
        predecessor_list.push_back(predecessor.clone());
    }
    let controller = env.register(RewardController, ());
    let controller_client = RewardControllerClient::new(env, &controller);
    checked(
        "controller init",
        controller_client.try_init(
            deployer,
            &ControllerConfig {
                reward_token: reward_token.clone(),
                schedule: schedule.clone(),
                vault: vault.clone(),
                predecessors: predecessor_list,
                fee_to: multisig.clone(),
                start_block: config.schedule.start_block,
                version: config.controller_version,
            },
        ),
    )?;
    info!(
        address = %strkey_of(&controller),
        version = config.controller_version,
        predecessors = predecessors.len(),
        "reward controller deployed"
    );

    // Lockups
    let start = config.lockup_start.unwrap_or_else(|| env.ledger().timestamp());
    if start.checked_add(TOTAL_DURATION_SECS).is_none() {
        return Err(DeployError::Overflow("lockup start"));
    }
    let staggered = |offset: u64| {
        start
            .checked_add(offset)
            .ok_or(DeployError::Overflow("lockup start"))
    };
    let new_lockup = |step: &'static str,
                      beneficiary: &Address,
                      start: u64,
                      cliff: u64,
                      duration: u64|
     -> Result<Address, DeployError> {
        let lockup = env.register(TokenLockup, ());
        checked(
            step,
            TokenLockupClient::new(env, &lockup).try_init(
                deployer,
                &reward_token,
                beneficiary,
                &start,
                &cliff,
                &duration,
                &true,
            ),
        )?;
        debug!(step, address = %strkey_of(&lockup), start, cliff, duration, "lockup deployed");
        Ok(lockup)
    };

    let mut beneficiaries = Vec::with_capacity(config.beneficiaries.len());
    let mut beneficiary_lockups = Vec::with_capacity(config.beneficiaries.len());
    for (i, beneficiary) in config.beneficiaries.iter().enumerate() {
        let address = address_from_strkey(
            env,
            &format!("beneficiaries[{i}].address"),
            &beneficiary.address,
        )?;
        let lockup = new_lockup(
            "beneficiary lockup init",
            &address,
            start,
            CLIFF_DURATION_SECS,
            TOTAL_DURATION_SECS,
        )?;
        beneficiaries.push(address);
        beneficiary_lockups.push(lockup);
    }
    let fgcd_lockup = new_lockup("fgcd lockup init", &multisig, start, 0, 0)?;
    let legal_lockup = new_lockup("legal lockup init", &multisig, staggered(1)?, 0, 0)?;
    let growth_lockup = new_lockup("growth lockup init", &multisig, staggered(2)?, 0, 0)?;
    let presale_lockup = new_lockup("presale lockup init", &multisig, staggered(3)?, 0, 0)?;
    info!(start, count = beneficiary_lockups.len() + 4, "lockups deployed");

    for lockup in beneficiary_lockups
        .iter()
        .chain([&fgcd_lockup, &legal_lockup, &growth_lockup, &presale_lockup])
    {
        checked(
            "lockup ownership transfer",
            TokenLockupClient::new(env, lockup).try_transfer_ownership(deployer, &multisig),
        )?;
    }
    info!("lockup ownership transferred to multisig");

    // Initial distribution
    let transfer = |step: &'static str, to: &Address, amount: i128| -> Result<(), DeployError> {
        checked(step, token.try_transfer(deployer, to, &amount))?;
        debug!(step, to = %strkey_of(to), amount = %amount, "transferred");
        Ok(())
    };
    for (i, beneficiary) in config.beneficiaries.iter().enumerate() {
        transfer(
            "beneficiary lockup funding",
            &beneficiary_lockups[i],
            parse_amount("locked", &beneficiary.locked)?,
        )?;
        transfer(
            "beneficiary transfer",
            &beneficiaries[i],
            parse_amount("unlocked", &beneficiary.unlocked)?,
        )?;
    }
    let lockups = &config.multisig_lockups;
    transfer("fgcd funding", &fgcd_lockup, parse_amount("fgcd", &lockups.fgcd)?)?;
    transfer("legal funding", &legal_lockup, parse_amount("legal", &lockups.legal)?)?;
    transfer("growth funding", &growth_lockup, parse_amount("growth", &lockups.growth)?)?;
    transfer(
        "presale funding",
        &presale_lockup,
        parse_amount("presale", &lockups.presale)?,
    )?;
    let vault_allocation = parse_amount("vault_allocation", &config.vault_allocation)?;
    transfer("vault funding", &vault, vault_allocation)?;
    info!(allocated = %config.allocated()?, "initial supply distributed");

    // Payout wiring
    let expiration = approval_expiration(env.ledger().sequence())?;
    checked(
        "vault approval",
        vault_client.try_approve(deployer, &controller, &vault_allocation, &expiration),
    )?;
    info!(amount = %vault_allocation, expiration, "vault approved controller");

    checked(
        "vault ownership transfer",
        vault_client.try_transfer_ownership(deployer, &multisig),
    )?;
    checked(
        "schedule ownership transfer",
        schedule_client.try_transfer_ownership(deployer, &multisig),
    )?;
    checked(
        "controller ownership transfer",
        controller_client.try_transfer_ownership(deployer, &multisig),
    )?;
    info!("deployment complete");

    Ok(Deployment {
        reward_token,
        vault,
        schedule,
        controller,
        beneficiary_lockups,
        fgcd_lockup,
        legal_lockup,
        growth_lockup,
        presale_lockup,
    })
}
