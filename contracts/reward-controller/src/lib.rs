#![no_std]

//! # Reward Controller
//!
//! Pool registry for liquidity-token staking rewards. Each pool is keyed by
//! its liquidity token and addressed by a stable index assigned in insertion
//! order. Rewards come from an external emission schedule, are split across
//! pools by weight, and are paid out of a vault that has approved this
//! controller as a spender.
//!
//! A controller is constructed with the list of predecessor controllers it
//! may migrate from. `migrate(pid)` pulls the pool's deposits out of every
//! predecessor that knows the same liquidity token, preserving each user's
//! stake, and can only succeed once per pool.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token, Address, Env, Vec,
};

mod interfaces;

pub use interfaces::{
    PredecessorClient, PredecessorRegistry, RewardScheduleInterface, ScheduleClient,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const PERSISTENT_BUMP_LEDGERS: u32 = 518_400; // ~30 days
const PERSISTENT_BUMP_THRESHOLD: u32 = PERSISTENT_BUMP_LEDGERS - 100_800; // Renew ~7 days early

/// Fixed-point scale of `acc_reward_per_share`.
pub const ACC_REWARD_PRECISION: i128 = 1_000_000_000_000;

/// Weight given to every pool created through `add_many`.
pub const DEFAULT_POOL_WEIGHT: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    PoolAlreadyExists = 4,
    PoolNotFound = 5,
    MigratorNotSet = 6,
    AlreadyMigrated = 7,
    PoolRetired = 8,
    MigrationShortfall = 9,
    InvalidPredecessor = 10,
    InvalidAmount = 11,
    InsufficientStake = 12,
    EmptyBatch = 13,
    Overflow = 14,
}

impl Error {
    /// Rejected because of who called, not because of contract state.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::NotAuthorized | Error::MigratorNotSet)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    pub reward_token: Address,
    pub schedule: Address,
    pub vault: Address,
    pub predecessors: Vec<Address>,
    pub fee_to: Address,
    pub start_block: u32,
    pub version: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolInfo {
    pub lp_token: Address,
    pub weight: u32,
    pub last_reward_block: u32,
    pub acc_reward_per_share: i128,
    pub total_staked: i128,
    /// Deposits were pulled in from predecessors.
    pub migrated: bool,
    /// Deposits were handed over to a successor.
    pub retired: bool,
}

#[contracttype]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserStake {
    pub amount: i128,
    pub reward_debt: i128,
    /// Accrued rewards not yet paid out.
    pub unclaimed: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MigratedStake {
    pub user: Address,
    pub amount: i128,
    pub unclaimed: i128,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Owner,
    RewardToken,
    Schedule,
    Vault,
    FeeTo,
    Migrator,
    Predecessors,
    StartBlock,
    Version,
    TotalWeight,
    PoolCount,
    Pool(u32),
    PoolByToken(Address),
    Stake(u32, Address),
    Stakers(u32),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct ControllerInitialized {
    pub owner: Address,
    pub version: u32,
    pub predecessors: u32,
}

#[contractevent]
pub struct PoolAdded {
    #[topic]
    pub pid: u32,
    pub lp_token: Address,
    pub weight: u32,
}

#[contractevent]
pub struct PoolWeightSet {
    #[topic]
    pub pid: u32,
    pub old_weight: u32,
    pub new_weight: u32,
}

#[contractevent]
pub struct MigratorSet {
    pub migrator: Address,
}

#[contractevent]
pub struct PoolMigrated {
    #[topic]
    pub pid: u32,
    pub lp_token: Address,
    pub amount: i128,
}

#[contractevent]
pub struct PoolMigratedOut {
    #[topic]
    pub pid: u32,
    pub successor: Address,
    pub amount: i128,
}

#[contractevent]
pub struct FeeToSet {
    pub fee_to: Address,
}

#[contractevent]
pub struct VaultSet {
    pub vault: Address,
}

#[contractevent]
pub struct OwnershipTransferred {
    pub previous_owner: Address,
    pub new_owner: Address,
}

#[contractevent]
pub struct Deposited {
    #[topic]
    pub user: Address,
    pub pid: u32,
    pub amount: i128,
}

#[contractevent]
pub struct Withdrawn {
    #[topic]
    pub user: Address,
    pub pid: u32,
    pub amount: i128,
}

#[contractevent]
pub struct EmergencyWithdrawn {
    #[topic]
    pub user: Address,
    pub pid: u32,
    pub amount: i128,
}

#[contractevent]
pub struct RewardPaid {
    #[topic]
    pub user: Address,
    pub amount: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct RewardController;

#[contractimpl]
impl RewardController {
    /// Initialize the controller. The predecessor list is fixed from here on.
    pub fn init(env: Env, owner: Address, config: ControllerConfig) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }
        owner.require_auth();

        let me = env.current_contract_address();
        let count = config.predecessors.len();
        for i in 0..count {
            let predecessor = config.predecessors.get_unchecked(i);
            if predecessor == me {
                return Err(Error::InvalidPredecessor);
            }
            for j in (i + 1)..count {
                if config.predecessors.get_unchecked(j) == predecessor {
                    return Err(Error::InvalidPredecessor);
                }
            }
        }

        let storage = env.storage().instance();
        storage.set(&DataKey::Owner, &owner);
        storage.set(&DataKey::RewardToken, &config.reward_token);
        storage.set(&DataKey::Schedule, &config.schedule);
        storage.set(&DataKey::Vault, &config.vault);
        storage.set(&DataKey::FeeTo, &config.fee_to);
        storage.set(&DataKey::Predecessors, &config.predecessors);
        storage.set(&DataKey::StartBlock, &config.start_block);
        storage.set(&DataKey::Version, &config.version);
        storage.set(&DataKey::TotalWeight, &0u32);
        storage.set(&DataKey::PoolCount, &0u32);

        ControllerInitialized {
            owner,
            version: config.version,
            predecessors: count,
        }
        .publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pool registry
    // -----------------------------------------------------------------------

    /// Register a new pool and return its index. Owner-only.
    ///
    /// With `with_update` every existing pool is brought up to date first, so
    /// the new weight does not dilute rewards already earned.
    pub fn add(
        env: Env,
        caller: Address,
        weight: u32,
        lp_token: Address,
        with_update: bool,
    ) -> Result<u32, Error> {
        require_owner(&env, &caller)?;
        if with_update {
            mass_update(&env)?;
        }
        add_pool(&env, weight, lp_token)
    }

    /// Register several pools with `DEFAULT_POOL_WEIGHT`. Owner-only.
    /// Returns the new pool count. Any duplicate fails the whole batch.
    pub fn add_many(env: Env, caller: Address, lp_tokens: Vec<Address>) -> Result<u32, Error> {
        require_owner(&env, &caller)?;
        if lp_tokens.is_empty() {
            return Err(Error::EmptyBatch);
        }
        mass_update(&env)?;
        for lp_token in lp_tokens.iter() {
            add_pool(&env, DEFAULT_POOL_WEIGHT, lp_token)?;
        }
        Ok(pool_count(&env))
    }

    /// Change a pool's weight. Owner-only.
    pub fn set(
        env: Env,
        caller: Address,
        pid: u32,
        weight: u32,
        with_update: bool,
    ) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        if with_update {
            mass_update(&env)?;
        }

        let mut pool = read_pool(&env, pid)?;
        if pool.retired {
            return Err(Error::PoolRetired);
        }
        let total = read_total_weight(&env)
            .checked_sub(pool.weight)
            .and_then(|t| t.checked_add(weight))
            .ok_or(Error::Overflow)?;
        env.storage().instance().set(&DataKey::TotalWeight, &total);

        let old_weight = pool.weight;
        pool.weight = weight;
        write_pool(&env, pid, &pool);

        PoolWeightSet {
            pid,
            old_weight,
            new_weight: weight,
        }
        .publish(&env);
        Ok(())
    }

    pub fn pool_length(env: Env) -> u32 {
        pool_count(&env)
    }

    pub fn pool_info(env: Env, pid: u32) -> Result<PoolInfo, Error> {
        read_pool(&env, pid)
    }

    pub fn pool_id(env: Env, lp_token: Address) -> Option<u32> {
        env.storage()
            .persistent()
            .get(&DataKey::PoolByToken(lp_token))
    }

    pub fn total_weight(env: Env) -> u32 {
        read_total_weight(&env)
    }

    // -----------------------------------------------------------------------
    // Migration
    // -----------------------------------------------------------------------

    /// Designate the sole address allowed to run migrations. Owner-only.
    ///
    /// On a predecessor this is the successor controller's address; on a
    /// successor it is whoever triggers `migrate`.
    pub fn set_migrator(env: Env, caller: Address, migrator: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Migrator, &migrator);
        MigratorSet { migrator }.publish(&env);
        Ok(())
    }

    pub fn migrator(env: Env) -> Option<Address> {
        env.storage().instance().get(&DataKey::Migrator)
    }

    /// Pull pool `pid`'s deposits from every predecessor that holds the same
    /// liquidity token. Migrator-only; succeeds at most once per pool.
    /// Returns the total stake credited.
    pub fn migrate(env: Env, caller: Address, pid: u32) -> Result<i128, Error> {
        caller.require_auth();
        let migrator: Address = env
            .storage()
            .instance()
            .get(&DataKey::Migrator)
            .ok_or(Error::MigratorNotSet)?;
        if caller != migrator {
            return Err(Error::NotAuthorized);
        }

        let pool = read_pool(&env, pid)?;
        if pool.migrated {
            return Err(Error::AlreadyMigrated);
        }
        if pool.retired {
            return Err(Error::PoolRetired);
        }

        let mut pool = update_pool(&env, pid)?;
        let me = env.current_contract_address();
        let lp = token::Client::new(&env, &pool.lp_token);
        let balance_before = lp.balance(&me);

        let mut credited: i128 = 0;
        for predecessor in read_predecessors(&env).iter() {
            let source = PredecessorClient::new(&env, &predecessor);
            let old_pid = match source.pool_id(&pool.lp_token) {
                Some(old_pid) => old_pid,
                None => continue,
            };
            // An earlier generation may already have handed this pool on.
            if source.pool_info(&old_pid).retired {
                continue;
            }

            for moved in source.migrate_out(&old_pid, &me).iter() {
                let mut stake = read_stake(&env, pid, &moved.user);
                settle(&mut stake, pool.acc_reward_per_share)?;
                stake.amount = stake.amount.checked_add(moved.amount).ok_or(Error::Overflow)?;
                stake.unclaimed = stake
                    .unclaimed
                    .checked_add(moved.unclaimed)
                    .ok_or(Error::Overflow)?;
                reset_debt(&mut stake, pool.acc_reward_per_share)?;
                write_stake(&env, pid, &moved.user, &stake);

                credited = credited.checked_add(moved.amount).ok_or(Error::Overflow)?;
            }
        }

        let received = lp.balance(&me).saturating_sub(balance_before);
        if received < credited {
            return Err(Error::MigrationShortfall);
        }

        pool.total_staked = pool
            .total_staked
            .checked_add(credited)
            .ok_or(Error::Overflow)?;
        pool.migrated = true;
        write_pool(&env, pid, &pool);

        PoolMigrated {
            pid,
            lp_token: pool.lp_token,
            amount: credited,
        }
        .publish(&env);
        Ok(credited)
    }

    /// Predecessor side of a migration: settle every stake in pool `pid`,
    /// hand the deposits to `successor`, and retire the pool. Only the
    /// designated migrator may receive them.
    pub fn migrate_out(env: Env, pid: u32, successor: Address) -> Result<Vec<MigratedStake>, Error> {
        let migrator: Address = env
            .storage()
            .instance()
            .get(&DataKey::Migrator)
            .ok_or(Error::MigratorNotSet)?;
        if successor != migrator {
            return Err(Error::NotAuthorized);
        }
        successor.require_auth();

        if read_pool(&env, pid)?.retired {
            return Err(Error::AlreadyMigrated);
        }
        let mut pool = update_pool(&env, pid)?;

        let mut moved = Vec::new(&env);
        for user in read_stakers(&env, pid).iter() {
            let mut stake = read_stake(&env, pid, &user);
            settle(&mut stake, pool.acc_reward_per_share)?;
            if stake.amount == 0 && stake.unclaimed == 0 {
                continue;
            }
            moved.push_back(MigratedStake {
                user: user.clone(),
                amount: stake.amount,
                unclaimed: stake.unclaimed,
            });
            write_stake(&env, pid, &user, &UserStake::default());
        }

        let total = read_total_weight(&env).saturating_sub(pool.weight);
        env.storage().instance().set(&DataKey::TotalWeight, &total);

        let amount = pool.total_staked;
        pool.weight = 0;
        pool.total_staked = 0;
        pool.retired = true;
        write_pool(&env, pid, &pool);

        if amount > 0 {
            token::Client::new(&env, &pool.lp_token).transfer(
                &env.current_contract_address(),
                &successor,
                &amount,
            );
        }

        PoolMigratedOut {
            pid,
            successor,
            amount,
        }
        .publish(&env);
        Ok(moved)
    }

    /// Users currently holding a stake or unclaimed rewards in pool `pid`.
    pub fn stakers(env: Env, pid: u32) -> Result<Vec<Address>, Error> {
        read_pool(&env, pid)?;
        Ok(read_stakers(&env, pid))
    }

    pub fn predecessors(env: Env) -> Vec<Address> {
        read_predecessors(&env)
    }

    pub fn version(env: Env) -> Result<u32, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Version)
            .ok_or(Error::NotInitialized)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub fn set_fate_fee_to(env: Env, caller: Address, fee_to: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::FeeTo, &fee_to);
        FeeToSet { fee_to }.publish(&env);
        Ok(())
    }

    pub fn fate_fee_to(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::FeeTo)
            .ok_or(Error::NotInitialized)
    }

    /// Redirect where payouts are drawn from. Owner-only.
    pub fn set_vault(env: Env, caller: Address, vault: Address) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Vault, &vault);
        VaultSet { vault }.publish(&env);
        Ok(())
    }

    pub fn vault(env: Env) -> Result<Address, Error> {
        read_vault(&env)
    }

    pub fn reward_token(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::RewardToken)
            .ok_or(Error::NotInitialized)
    }

    pub fn schedule(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Schedule)
            .ok_or(Error::NotInitialized)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    pub fn transfer_ownership(env: Env, caller: Address, new_owner: Address) -> Result<(), Error> {
        let previous_owner = require_owner(&env, &caller)?;
        env.storage().instance().set(&DataKey::Owner, &new_owner);
        OwnershipTransferred {
            previous_owner,
            new_owner,
        }
        .publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Staking
    // -----------------------------------------------------------------------

    /// Stake `amount` liquidity tokens in pool `pid`, paying out any pending
    /// reward first.
    pub fn deposit(env: Env, user: Address, pid: u32, amount: i128) -> Result<(), Error> {
        user.require_auth();
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        if read_pool(&env, pid)?.retired {
            return Err(Error::PoolRetired);
        }

        let mut pool = update_pool(&env, pid)?;
        let mut stake = read_stake(&env, pid, &user);
        settle(&mut stake, pool.acc_reward_per_share)?;
        pay_out(&env, &user, &mut stake)?;

        token::Client::new(&env, &pool.lp_token).transfer(
            &user,
            &env.current_contract_address(),
            &amount,
        );

        stake.amount = stake.amount.checked_add(amount).ok_or(Error::Overflow)?;
        reset_debt(&mut stake, pool.acc_reward_per_share)?;
        write_stake(&env, pid, &user, &stake);

        pool.total_staked = pool.total_staked.checked_add(amount).ok_or(Error::Overflow)?;
        write_pool(&env, pid, &pool);

        Deposited { user, pid, amount }.publish(&env);
        Ok(())
    }

    /// Unstake `amount` from pool `pid`, paying out any pending reward.
    pub fn withdraw(env: Env, user: Address, pid: u32, amount: i128) -> Result<(), Error> {
        user.require_auth();
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let mut pool = update_pool(&env, pid)?;
        let mut stake = read_stake(&env, pid, &user);
        if stake.amount < amount {
            return Err(Error::InsufficientStake);
        }
        settle(&mut stake, pool.acc_reward_per_share)?;
        pay_out(&env, &user, &mut stake)?;

        stake.amount -= amount;
        reset_debt(&mut stake, pool.acc_reward_per_share)?;
        write_stake(&env, pid, &user, &stake);

        pool.total_staked -= amount;
        write_pool(&env, pid, &pool);

        token::Client::new(&env, &pool.lp_token).transfer(
            &env.current_contract_address(),
            &user,
            &amount,
        );

        Withdrawn { user, pid, amount }.publish(&env);
        Ok(())
    }

    /// Pay out everything owed to `user` in pool `pid` that the vault can
    /// cover. Whatever it cannot cover stays unclaimed.
    pub fn claim(env: Env, user: Address, pid: u32) -> Result<i128, Error> {
        user.require_auth();

        let pool = update_pool(&env, pid)?;
        let mut stake = read_stake(&env, pid, &user);
        settle(&mut stake, pool.acc_reward_per_share)?;
        let paid = pay_out(&env, &user, &mut stake)?;
        write_stake(&env, pid, &user, &stake);
        Ok(paid)
    }

    /// Withdraw the whole stake without settling rewards accrued since the
    /// last checkpoint.
    pub fn emergency_withdraw(env: Env, user: Address, pid: u32) -> Result<i128, Error> {
        user.require_auth();

        let mut pool = read_pool(&env, pid)?;
        let mut stake = read_stake(&env, pid, &user);
        let amount = stake.amount;
        if amount == 0 {
            return Ok(0);
        }

        stake.amount = 0;
        stake.reward_debt = 0;
        write_stake(&env, pid, &user, &stake);

        pool.total_staked -= amount;
        write_pool(&env, pid, &pool);

        token::Client::new(&env, &pool.lp_token).transfer(
            &env.current_contract_address(),
            &user,
            &amount,
        );

        EmergencyWithdrawn { user, pid, amount }.publish(&env);
        Ok(amount)
    }

    /// Reward `user` could claim from pool `pid` at the current block.
    pub fn pending_reward(env: Env, pid: u32, user: Address) -> Result<i128, Error> {
        let pool = read_pool(&env, pid)?;
        let mut acc = pool.acc_reward_per_share;
        let block = env.ledger().sequence();
        if block > pool.last_reward_block && pool.total_staked > 0 && pool.weight > 0 {
            let reward = pool_reward(&env, &pool, block)?;
            acc = accumulate(acc, reward, pool.total_staked)?;
        }

        let mut stake = read_stake(&env, pid, &user);
        settle(&mut stake, acc)?;
        Ok(stake.unclaimed)
    }

    pub fn user_stake(env: Env, pid: u32, user: Address) -> Result<UserStake, Error> {
        read_pool(&env, pid)?;
        Ok(read_stake(&env, pid, &user))
    }

    pub fn update_pool(env: Env, pid: u32) -> Result<PoolInfo, Error> {
        update_pool(&env, pid)
    }

    pub fn mass_update_pools(env: Env) -> Result<(), Error> {
        mass_update(&env)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_owner(env: &Env, caller: &Address) -> Result<Address, Error> {
    caller.require_auth();
    let owner: Address = env
        .storage()
        .instance()
        .get(&DataKey::Owner)
        .ok_or(Error::NotInitialized)?;
    if *caller != owner {
        return Err(Error::NotAuthorized);
    }
    Ok(owner)
}

fn pool_count(env: &Env) -> u32 {
    env.storage().instance().get(&DataKey::PoolCount).unwrap_or(0)
}

fn read_total_weight(env: &Env) -> u32 {
    env.storage().instance().get(&DataKey::TotalWeight).unwrap_or(0)
}

fn read_predecessors(env: &Env) -> Vec<Address> {
    env.storage()
        .instance()
        .get(&DataKey::Predecessors)
        .unwrap_or(Vec::new(env))
}

fn read_vault(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Vault)
        .ok_or(Error::NotInitialized)
}

fn read_pool(env: &Env, pid: u32) -> Result<PoolInfo, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Pool(pid))
        .ok_or(Error::PoolNotFound)
}

fn write_pool(env: &Env, pid: u32, pool: &PoolInfo) {
    let key = DataKey::Pool(pid);
    env.storage().persistent().set(&key, pool);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_THRESHOLD, PERSISTENT_BUMP_LEDGERS);
}

fn read_stake(env: &Env, pid: u32, user: &Address) -> UserStake {
    env.storage()
        .persistent()
        .get(&DataKey::Stake(pid, user.clone()))
        .unwrap_or_default()
}

/// Persist a stake. The pool's staker list gains the user on their first
/// stake and drops them once nothing is left to withdraw or claim.
fn write_stake(env: &Env, pid: u32, user: &Address, stake: &UserStake) {
    let key = DataKey::Stake(pid, user.clone());
    let exists = env.storage().persistent().has(&key);

    if stake.amount == 0 && stake.unclaimed == 0 {
        if exists {
            env.storage().persistent().remove(&key);
            let mut stakers = read_stakers(env, pid);
            if let Some(i) = stakers.iter().position(|staker| staker == *user) {
                stakers.remove(i as u32);
            }
            write_stakers(env, pid, &stakers);
        }
        return;
    }

    if !exists {
        let mut stakers = read_stakers(env, pid);
        stakers.push_back(user.clone());
        write_stakers(env, pid, &stakers);
    }
    env.storage().persistent().set(&key, stake);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_THRESHOLD, PERSISTENT_BUMP_LEDGERS);
}

fn write_stakers(env: &Env, pid: u32, stakers: &Vec<Address>) {
    let key = DataKey::Stakers(pid);
    env.storage().persistent().set(&key, stakers);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_THRESHOLD, PERSISTENT_BUMP_LEDGERS);
}

fn read_stakers(env: &Env, pid: u32) -> Vec<Address> {
    env.storage()
        .persistent()
        .get(&DataKey::Stakers(pid))
        .unwrap_or(Vec::new(env))
}

fn add_pool(env: &Env, weight: u32, lp_token: Address) -> Result<u32, Error> {
    let token_key = DataKey::PoolByToken(lp_token.clone());
    if env.storage().persistent().has(&token_key) {
        return Err(Error::PoolAlreadyExists);
    }

    let pid = pool_count(env);
    let start_block: u32 = env
        .storage()
        .instance()
        .get(&DataKey::StartBlock)
        .unwrap_or(0);
    let total = read_total_weight(env)
        .checked_add(weight)
        .ok_or(Error::Overflow)?;

    let pool = PoolInfo {
        lp_token: lp_token.clone(),
        weight,
        last_reward_block: env.ledger().sequence().max(start_block),
        acc_reward_per_share: 0,
        total_staked: 0,
        migrated: false,
        retired: false,
    };
    write_pool(env, pid, &pool);

    env.storage().persistent().set(&token_key, &pid);
    env.storage()
        .persistent()
        .extend_ttl(&token_key, PERSISTENT_BUMP_THRESHOLD, PERSISTENT_BUMP_LEDGERS);
    env.storage().instance().set(&DataKey::TotalWeight, &total);
    env.storage()
        .instance()
        .set(&DataKey::PoolCount, &pid.checked_add(1).ok_or(Error::Overflow)?);

    PoolAdded {
        pid,
        lp_token,
        weight,
    }
    .publish(env);
    Ok(pid)
}

fn mass_update(env: &Env) -> Result<(), Error> {
    for pid in 0..pool_count(env) {
        update_pool(env, pid)?;
    }
    Ok(())
}

fn update_pool(env: &Env, pid: u32) -> Result<PoolInfo, Error> {
    let mut pool = read_pool(env, pid)?;
    let block = env.ledger().sequence();
    if block <= pool.last_reward_block {
        return Ok(pool);
    }
    if pool.total_staked > 0 && pool.weight > 0 {
        let reward = pool_reward(env, &pool, block)?;
        pool.acc_reward_per_share =
            accumulate(pool.acc_reward_per_share, reward, pool.total_staked)?;
    }
    pool.last_reward_block = block;
    write_pool(env, pid, &pool);
    Ok(pool)
}

/// This pool's weighted share of the schedule's emission since its last
/// checkpoint.
fn pool_reward(env: &Env, pool: &PoolInfo, to_block: u32) -> Result<i128, Error> {
    let total_weight = read_total_weight(env);
    if total_weight == 0 {
        return Ok(0);
    }
    let schedule: Address = env
        .storage()
        .instance()
        .get(&DataKey::Schedule)
        .ok_or(Error::NotInitialized)?;
    let emitted = ScheduleClient::new(env, &schedule)
        .calculate_reward(&pool.last_reward_block, &to_block);
    Ok(emitted
        .checked_mul(pool.weight as i128)
        .ok_or(Error::Overflow)?
        / total_weight as i128)
}

fn accumulate(acc: i128, reward: i128, total_staked: i128) -> Result<i128, Error> {
    let per_share = reward
        .checked_mul(ACC_REWARD_PRECISION)
        .ok_or(Error::Overflow)?
        / total_staked;
    acc.checked_add(per_share).ok_or(Error::Overflow)
}

/// Move rewards accrued since the last debt snapshot into `unclaimed`.
fn settle(stake: &mut UserStake, acc: i128) -> Result<(), Error> {
    let accrued = stake.amount.checked_mul(acc).ok_or(Error::Overflow)? / ACC_REWARD_PRECISION;
    let pending = accrued - stake.reward_debt;
    if pending > 0 {
        stake.unclaimed = stake.unclaimed.checked_add(pending).ok_or(Error::Overflow)?;
    }
    stake.reward_debt = accrued;
    Ok(())
}

fn reset_debt(stake: &mut UserStake, acc: i128) -> Result<(), Error> {
    stake.reward_debt = stake.amount.checked_mul(acc).ok_or(Error::Overflow)? / ACC_REWARD_PRECISION;
    Ok(())
}

/// Pay as much of `stake.unclaimed` as the vault's balance and allowance
/// allow.
fn pay_out(env: &Env, user: &Address, stake: &mut UserStake) -> Result<i128, Error> {
    if stake.unclaimed <= 0 {
        return Ok(0);
    }
    let reward_token: Address = env
        .storage()
        .instance()
        .get(&DataKey::RewardToken)
        .ok_or(Error::NotInitialized)?;
    let vault = read_vault(env)?;
    let me = env.current_contract_address();

    let token_client = token::Client::new(env, &reward_token);
    let available = token_client
        .balance(&vault)
        .min(token_client.allowance(&vault, &me));
    let amount = stake.unclaimed.min(available);
    if amount <= 0 {
        return Ok(0);
    }

    token_client.transfer_from(&me, &vault, user, &amount);
    stake.unclaimed -= amount;

    RewardPaid {
        user: user.clone(),
        amount,
    }
    .publish(env);
    Ok(amount)
}
