#![no_std]

//! # Reward Schedule Contract
//!
//! Emission curve for the reward controller: a step function from ledger
//! sequence ("block") to reward-per-block, anchored at `start_block`. The
//! curve is fixed at `init` and only ever read afterwards.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Env, Vec,
};

/// 8 weeks of 2-second blocks.
pub const EPOCH_PERIOD_BLOCKS: u32 = 30 * 60 * 24 * 7 * 8;

// ── Errors ───────────────────────────────────────────────────────
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    InvalidSchedule = 4,
    Overflow = 5,
}

// ── Storage Keys ─────────────────────────────────────────────────
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Owner,
    StartBlock,
    Steps,
}

// ── Domain Types ─────────────────────────────────────────────────
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScheduleStep {
    /// Blocks after `start_block` at which this rate takes effect.
    pub start_offset: u32,
    pub reward_per_block: i128,
}

// ── Events ────────────────────────────────────────────────────────
#[contractevent]
pub struct ScheduleInitialized {
    pub owner: Address,
    pub start_block: u32,
    pub steps: u32,
}

#[contractevent]
pub struct OwnershipTransferred {
    pub previous_owner: Address,
    pub new_owner: Address,
}

// ── Contract ──────────────────────────────────────────────────────
#[contract]
pub struct RewardSchedule;

#[contractimpl]
impl RewardSchedule {
    /// Initialize the curve. Offsets must start at 0 and strictly increase;
    /// rates must be non-negative.
    pub fn init(
        env: Env,
        owner: Address,
        start_block: u32,
        steps: Vec<ScheduleStep>,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }
        owner.require_auth();
        validate_steps(&steps)?;

        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::StartBlock, &start_block);
        env.storage().instance().set(&DataKey::Steps, &steps);

        ScheduleInitialized {
            owner,
            start_block,
            steps: steps.len(),
        }
        .publish(&env);
        Ok(())
    }

    /// Reward emitted for a single block. Zero before `start_block`.
    pub fn reward_per_block(env: Env, block: u32) -> Result<i128, Error> {
        let start_block = get_start_block(&env)?;
        let steps = get_steps(&env)?;
        if block < start_block {
            return Ok(0);
        }
        let offset = block - start_block;
        let mut rate = 0i128;
        for step in steps.iter() {
            if step.start_offset > offset {
                break;
            }
            rate = step.reward_per_block;
        }
        Ok(rate)
    }

    /// Total reward emitted over blocks `[from_block, to_block)`.
    pub fn calculate_reward(env: Env, from_block: u32, to_block: u32) -> Result<i128, Error> {
        let start_block = get_start_block(&env)?;
        let steps = get_steps(&env)?;

        let from = (from_block.max(start_block)) as u64;
        let to = to_block as u64;
        if to <= from {
            return Ok(0);
        }

        let mut total = 0i128;
        let count = steps.len();
        for i in 0..count {
            let step = steps.get_unchecked(i);
            let step_start = start_block as u64 + step.start_offset as u64;
            let step_end = if i + 1 < count {
                start_block as u64 + steps.get_unchecked(i + 1).start_offset as u64
            } else {
                u64::MAX
            };

            let lo = from.max(step_start);
            let hi = to.min(step_end);
            if hi <= lo {
                continue;
            }
            let blocks = (hi - lo) as i128;
            let portion = blocks
                .checked_mul(step.reward_per_block)
                .ok_or(Error::Overflow)?;
            total = total.checked_add(portion).ok_or(Error::Overflow)?;
        }
        Ok(total)
    }

    /// Zero-based 8-week epoch that `block` falls into, relative to `start_block`.
    pub fn epoch_of(env: Env, block: u32) -> Result<u32, Error> {
        let start_block = get_start_block(&env)?;
        Ok(block.saturating_sub(start_block) / EPOCH_PERIOD_BLOCKS)
    }

    pub fn steps(env: Env) -> Result<Vec<ScheduleStep>, Error> {
        get_steps(&env)
    }

    pub fn start_block(env: Env) -> Result<u32, Error> {
        get_start_block(&env)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    pub fn transfer_ownership(env: Env, caller: Address, new_owner: Address) -> Result<(), Error> {
        caller.require_auth();
        let owner = Self::owner(env.clone())?;
        if caller != owner {
            return Err(Error::NotAuthorized);
        }
        env.storage().instance().set(&DataKey::Owner, &new_owner);
        OwnershipTransferred {
            previous_owner: owner,
            new_owner,
        }
        .publish(&env);
        Ok(())
    }
}

// ── Internal ─────────────────────────────────────────────────────
fn validate_steps(steps: &Vec<ScheduleStep>) -> Result<(), Error> {
    if steps.is_empty() {
        return Err(Error::InvalidSchedule);
    }
    let mut prev: Option<u32> = None;
    for step in steps.iter() {
        if step.reward_per_block < 0 {
            return Err(Error::InvalidSchedule);
        }
        match prev {
            None if step.start_offset != 0 => return Err(Error::InvalidSchedule),
            Some(p) if step.start_offset <= p => return Err(Error::InvalidSchedule),
            _ => {}
        }
        prev = Some(step.start_offset);
    }
    Ok(())
}

fn get_start_block(env: &Env) -> Result<u32, Error> {
    env.storage()
        .instance()
        .get(&DataKey::StartBlock)
        .ok_or(Error::NotInitialized)
}

fn get_steps(env: &Env) -> Result<Vec<ScheduleStep>, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Steps)
        .ok_or(Error::NotInitialized)
}

// ── Tests ─────────────────────────────────────────────────────────
#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::{testutils::Address as _, vec, Env};

    fn step(start_offset: u32, reward_per_block: i128) -> ScheduleStep {
        ScheduleStep {
            start_offset,
            reward_per_block,
        }
    }

    fn setup(env: &Env, start_block: u32, steps: Vec<ScheduleStep>) -> RewardScheduleClient<'_> {
        env.mock_all_auths();
        let owner = Address::generate(env);
        let contract_id = env.register(RewardSchedule, ());
        let client = RewardScheduleClient::new(env, &contract_id);
        client.init(&owner, &start_block, &steps);
        client
    }

    #[test]
    fn test_reward_per_block_follows_steps() {
        let env = Env::default();
        let steps = vec![&env, step(0, 100), step(10, 50), step(20, 0)];
        let client = setup(&env, 5, steps);

        assert_eq!(client.reward_per_block(&4), 0);
        assert_eq!(client.reward_per_block(&5), 100);
        assert_eq!(client.reward_per_block(&14), 100);
        assert_eq!(client.reward_per_block(&15), 50);
        assert_eq!(client.reward_per_block(&25), 0);
        assert_eq!(client.reward_per_block(&1_000_000), 0);
    }

    #[test]
    fn test_calculate_reward_spans_step_boundaries() {
        let env = Env::default();
        let steps = vec![&env, step(0, 100), step(10, 50)];
        let client = setup(&env, 10, steps);

        // 5 blocks before start contribute nothing.
        assert_eq!(client.calculate_reward(&5, &10), 0);
        // [10, 15) at 100
        assert_eq!(client.calculate_reward(&10, &15), 500);
        // [15, 20) at 100 + [20, 30) at 50
        assert_eq!(client.calculate_reward(&15, &30), 500 + 500);
        // range starting before the curve is clamped to start_block
        assert_eq!(client.calculate_reward(&0, &12), 200);
    }

    #[test]
    fn test_calculate_reward_empty_range() {
        let env = Env::default();
        let client = setup(&env, 0, vec![&env, step(0, 7)]);
        assert_eq!(client.calculate_reward(&20, &20), 0);
        assert_eq!(client.calculate_reward(&30, &20), 0);
    }

    #[test]
    fn test_sum_matches_per_block() {
        let env = Env::default();
        let steps = vec![&env, step(0, 9), step(3, 4), step(8, 1)];
        let client = setup(&env, 2, steps);

        let mut expected = 0i128;
        for b in 0u32..20 {
            expected += client.reward_per_block(&b);
        }
        assert_eq!(client.calculate_reward(&0, &20), expected);
    }

    #[test]
    fn test_epoch_of() {
        let env = Env::default();
        let client = setup(&env, 10, vec![&env, step(0, 1)]);
        assert_eq!(client.epoch_of(&0), 0);
        assert_eq!(client.epoch_of(&(10 + EPOCH_PERIOD_BLOCKS - 1)), 0);
        assert_eq!(client.epoch_of(&(10 + EPOCH_PERIOD_BLOCKS)), 1);
    }

    #[test]
    fn test_invalid_steps_rejected() {
        let env = Env::default();
        env.mock_all_auths();
        let owner = Address::generate(&env);
        let contract_id = env.register(RewardSchedule, ());
        let client = RewardScheduleClient::new(&env, &contract_id);

        let empty: Vec<ScheduleStep> = Vec::new(&env);
        assert_eq!(
            client.try_init(&owner, &0, &empty),
            Err(Ok(Error::InvalidSchedule))
        );
        assert_eq!(
            client.try_init(&owner, &0, &vec![&env, step(1, 10)]),
            Err(Ok(Error::InvalidSchedule))
        );
        assert_eq!(
            client.try_init(&owner, &0, &vec![&env, step(0, 10), step(0, 5)]),
            Err(Ok(Error::InvalidSchedule))
        );
        assert_eq!(
            client.try_init(&owner, &0, &vec![&env, step(0, -1)]),
            Err(Ok(Error::InvalidSchedule))
        );
    }

    #[test]
    fn test_double_init_fails() {
        let env = Env::default();
        let client = setup(&env, 0, vec![&env, step(0, 1)]);
        let other = Address::generate(&env);
        assert_eq!(
            client.try_init(&other, &0, &vec![&env, step(0, 1)]),
            Err(Ok(Error::AlreadyInitialized))
        );
    }

    #[test]
    fn test_transfer_ownership() {
        let env = Env::default();
        let client = setup(&env, 0, vec![&env, step(0, 1)]);
        let owner = client.owner();
        let stranger = Address::generate(&env);
        let multisig = Address::generate(&env);

        assert_eq!(
            client.try_transfer_ownership(&stranger, &multisig),
            Err(Ok(Error::NotAuthorized))
        );
        assert_eq!(client.owner(), owner);

        client.transfer_ownership(&owner, &multisig);
        assert_eq!(client.owner(), multisig);
    }
}
