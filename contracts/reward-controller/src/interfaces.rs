//! Contract-to-contract seams of the controller.

use soroban_sdk::{contractclient, Address, Env, Vec};

use crate::{MigratedStake, PoolInfo};

/// Emission curve the controller reads to size each pool update.
#[contractclient(name = "ScheduleClient")]
pub trait RewardScheduleInterface {
    /// Total reward emitted over blocks `[from_block, to_block)`.
    fn calculate_reward(env: Env, from_block: u32, to_block: u32) -> i128;
}

/// A previous controller version that can hand its pools over.
#[contractclient(name = "PredecessorClient")]
pub trait PredecessorRegistry {
    fn pool_id(env: Env, lp_token: Address) -> Option<u32>;

    fn pool_info(env: Env, pid: u32) -> PoolInfo;

    /// Moves the pool's deposits to `successor` and returns the per-user
    /// stakes it held. Only callable by the predecessor's migrator.
    fn migrate_out(env: Env, pid: u32, successor: Address) -> Vec<MigratedStake>;
}
