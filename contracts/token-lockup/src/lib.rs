#![no_std]

//! # Token Lockup Contract
//!
//! Holds a token balance for a single beneficiary and releases it linearly
//! between a cliff and the end of the vesting duration. The grant is funded by
//! transferring tokens to the contract address after `init`; the vested total
//! is whatever the contract holds plus what it has already released.
//!
//! A zero duration vests everything at `start`. Revocable grants may be
//! revoked by the owner, which returns the unvested remainder to the owner and
//! leaves the already-vested part claimable by the beneficiary.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token, Address, Env,
};

// ─── Errors ───────────────────────────────────────────────────────────────────

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    InvalidSchedule = 4,
    NothingToRelease = 5,
    NotRevocable = 6,
    AlreadyRevoked = 7,
    Overflow = 8,
}

// ─── Types ────────────────────────────────────────────────────────────────────

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VestingGrant {
    pub beneficiary: Address,
    pub token: Address,
    pub start_timestamp: u64,
    pub cliff_seconds: u64,
    pub duration_seconds: u64,
    pub revocable: bool,
    pub released: i128,
    pub revoked: bool,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Owner,
    Grant,
}

// ─── Events ───────────────────────────────────────────────────────────────────

#[contractevent]
pub struct LockupCreated {
    pub beneficiary: Address,
    pub start_timestamp: u64,
    pub cliff_seconds: u64,
    pub duration_seconds: u64,
    pub revocable: bool,
}

#[contractevent]
pub struct TokensReleased {
    pub beneficiary: Address,
    pub amount: i128,
}

#[contractevent]
pub struct LockupRevoked {
    pub owner: Address,
    pub refund: i128,
}

#[contractevent]
pub struct OwnershipTransferred {
    pub previous_owner: Address,
    pub new_owner: Address,
}

// ─── Contract ─────────────────────────────────────────────────────────────────

#[contract]
pub struct TokenLockup;

#[contractimpl]
impl TokenLockup {
    /// Initialise the lockup. Must be called once.
    ///
    /// * `start_timestamp`  – when vesting begins (UNIX seconds)
    /// * `cliff_seconds`    – seconds from start before anything vests
    /// * `duration_seconds` – total linear-vesting window, `>= cliff_seconds`
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        env: Env,
        owner: Address,
        token: Address,
        beneficiary: Address,
        start_timestamp: u64,
        cliff_seconds: u64,
        duration_seconds: u64,
        revocable: bool,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }
        owner.require_auth();

        if cliff_seconds > duration_seconds {
            return Err(Error::InvalidSchedule);
        }
        start_timestamp
            .checked_add(duration_seconds)
            .ok_or(Error::Overflow)?;

        let grant = VestingGrant {
            beneficiary: beneficiary.clone(),
            token,
            start_timestamp,
            cliff_seconds,
            duration_seconds,
            revocable,
            released: 0,
            revoked: false,
        };
        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::Grant, &grant);

        LockupCreated {
            beneficiary,
            start_timestamp,
            cliff_seconds,
            duration_seconds,
            revocable,
        }
        .publish(&env);
        Ok(())
    }

    /// Release everything currently vested to the beneficiary. Anyone may
    /// trigger a release; funds only ever go to the beneficiary.
    pub fn release(env: Env) -> Result<i128, Error> {
        let mut grant = get_grant(&env)?;
        let token = token::Client::new(&env, &grant.token);
        let balance = token.balance(&env.current_contract_address());

        let now = env.ledger().timestamp();
        let releasable = vested(&grant, balance, now)?.saturating_sub(grant.released);
        if releasable <= 0 {
            return Err(Error::NothingToRelease);
        }

        grant.released = grant
            .released
            .checked_add(releasable)
            .ok_or(Error::Overflow)?;
        env.storage().instance().set(&DataKey::Grant, &grant);

        token.transfer(
            &env.current_contract_address(),
            &grant.beneficiary,
            &releasable,
        );

        TokensReleased {
            beneficiary: grant.beneficiary,
            amount: releasable,
        }
        .publish(&env);
        Ok(releasable)
    }

    /// Revoke the grant. The unvested remainder goes back to the owner.
    pub fn revoke(env: Env, caller: Address) -> Result<i128, Error> {
        caller.require_auth();
        let owner = Self::owner(env.clone())?;
        if caller != owner {
            return Err(Error::NotAuthorized);
        }

        let mut grant = get_grant(&env)?;
        if !grant.revocable {
            return Err(Error::NotRevocable);
        }
        if grant.revoked {
            return Err(Error::AlreadyRevoked);
        }

        let token = token::Client::new(&env, &grant.token);
        let balance = token.balance(&env.current_contract_address());
        let now = env.ledger().timestamp();
        let releasable = vested(&grant, balance, now)?.saturating_sub(grant.released);
        let refund = balance.saturating_sub(releasable).max(0);

        grant.revoked = true;
        env.storage().instance().set(&DataKey::Grant, &grant);

        if refund > 0 {
            token.transfer(&env.current_contract_address(), &owner, &refund);
        }

        LockupRevoked { owner, refund }.publish(&env);
        Ok(refund)
    }

    /// Amount vested at `timestamp`, including what was already released.
    pub fn vested_amount(env: Env, timestamp: u64) -> Result<i128, Error> {
        let grant = get_grant(&env)?;
        let balance = token::Client::new(&env, &grant.token).balance(&env.current_contract_address());
        vested(&grant, balance, timestamp)
    }

    /// Amount `release` would pay out right now.
    pub fn releasable_amount(env: Env) -> Result<i128, Error> {
        let grant = get_grant(&env)?;
        let balance = token::Client::new(&env, &grant.token).balance(&env.current_contract_address());
        let vested = vested(&grant, balance, env.ledger().timestamp())?;
        Ok(vested.saturating_sub(grant.released).max(0))
    }

    pub fn grant(env: Env) -> Result<VestingGrant, Error> {
        get_grant(&env)
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

// ─── Internal ─────────────────────────────────────────────────────────────────

fn get_grant(env: &Env) -> Result<VestingGrant, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Grant)
        .ok_or(Error::NotInitialized)
}

fn vested(grant: &VestingGrant, balance: i128, now: u64) -> Result<i128, Error> {
    let total = balance.checked_add(grant.released).ok_or(Error::Overflow)?;
    let cliff = grant.start_timestamp.saturating_add(grant.cliff_seconds);
    if now < cliff {
        return Ok(0);
    }
    let elapsed = now - grant.start_timestamp;
    if grant.revoked || elapsed >= grant.duration_seconds {
        return Ok(total);
    }
    let vested = (total as u128)
        .checked_mul(elapsed as u128)
        .ok_or(Error::Overflow)?
        / grant.duration_seconds as u128;
    Ok(vested as i128)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use soroban_sdk::{
        testutils::{Address as _, Ledger},
        token::StellarAssetClient,
        Env,
    };

    const CLIFF: u64 = 60 * 60 * 24 * 182;
    const DURATION: u64 = 60 * 60 * 24 * 365;
    const GRANT: i128 = 365_000;

    struct Setup<'a> {
        env: Env,
        client: TokenLockupClient<'a>,
        owner: Address,
        beneficiary: Address,
        token: token::Client<'a>,
        start: u64,
    }

    fn setup(cliff: u64, duration: u64, revocable: bool) -> Setup<'static> {
        let env = Env::default();
        env.mock_all_auths();
        env.ledger().with_mut(|l| l.timestamp = 1_000_000);

        let owner = Address::generate(&env);
        let beneficiary = Address::generate(&env);
        let token_contract = env.register_stellar_asset_contract_v2(owner.clone());
        let token_addr = token_contract.address();

        let contract_id = env.register(TokenLockup, ());
        let client = TokenLockupClient::new(&env, &contract_id);
        let start = env.ledger().timestamp();
        client.init(
            &owner,
            &token_addr,
            &beneficiary,
            &start,
            &cliff,
            &duration,
            &revocable,
        );
        StellarAssetClient::new(&env, &token_addr).mint(&contract_id, &GRANT);

        let client: TokenLockupClient<'static> = unsafe { core::mem::transmute(client) };
        let token: token::Client<'static> =
            unsafe { core::mem::transmute(token::Client::new(&env, &token_addr)) };
        Setup {
            env,
            client,
            owner,
            beneficiary,
            token,
            start,
        }
    }

    #[test]
    fn test_nothing_before_cliff() {
        let s = setup(CLIFF, DURATION, true);
        s.env
            .ledger()
            .with_mut(|l| l.timestamp = s.start + CLIFF - 1);
        assert_eq!(s.client.releasable_amount(), 0);
        assert_eq!(s.client.try_release(), Err(Ok(Error::NothingToRelease)));
    }

    #[test]
    fn test_linear_after_cliff() {
        let s = setup(CLIFF, DURATION, true);
        s.env.ledger().with_mut(|l| l.timestamp = s.start + CLIFF);

        let expected = GRANT * CLIFF as i128 / DURATION as i128;
        assert_eq!(s.client.vested_amount(&(s.start + CLIFF)), expected);
        let released = s.client.release();
        assert_eq!(released, expected);
        assert_eq!(s.token.balance(&s.beneficiary), expected);
        assert_eq!(s.client.grant().released, expected);
    }

    #[test]
    fn test_full_release_at_end() {
        let s = setup(CLIFF, DURATION, true);
        s.env.ledger().with_mut(|l| l.timestamp = s.start + CLIFF);
        let first = s.client.release();

        s.env
            .ledger()
            .with_mut(|l| l.timestamp = s.start + DURATION + 1);
        let second = s.client.release();
        assert_eq!(first + second, GRANT);
        assert_eq!(s.token.balance(&s.beneficiary), GRANT);
        assert_eq!(s.client.releasable_amount(), 0);
    }

    #[test]
    fn test_zero_duration_vests_immediately() {
        let s = setup(0, 0, true);
        assert_eq!(s.client.releasable_amount(), GRANT);
        assert_eq!(s.client.release(), GRANT);
    }

    #[test]
    fn test_revoke_refunds_unvested() {
        let s = setup(0, 1000, true);
        s.env.ledger().with_mut(|l| l.timestamp = s.start + 250);

        let refund = s.client.revoke(&s.owner);
        assert_eq!(refund, GRANT - GRANT / 4);
        assert_eq!(s.token.balance(&s.owner), refund);

        // The vested quarter stays claimable.
        assert_eq!(s.client.release(), GRANT / 4);
        assert_eq!(s.client.try_revoke(&s.owner), Err(Ok(Error::AlreadyRevoked)));
    }

    #[test]
    fn test_revoke_requires_owner() {
        let s = setup(0, 1000, true);
        let stranger = Address::generate(&s.env);
        assert_eq!(s.client.try_revoke(&stranger), Err(Ok(Error::NotAuthorized)));
        assert!(!s.client.grant().revoked);
    }

    #[test]
    fn test_irrevocable_grant() {
        let s = setup(0, 1000, false);
        assert_eq!(s.client.try_revoke(&s.owner), Err(Ok(Error::NotRevocable)));
    }

    #[test]
    fn test_cliff_longer_than_duration_rejected() {
        let env = Env::default();
        env.mock_all_auths();
        let owner = Address::generate(&env);
        let contract_id = env.register(TokenLockup, ());
        let client = TokenLockupClient::new(&env, &contract_id);
        let result = client.try_init(
            &owner,
            &Address::generate(&env),
            &Address::generate(&env),
            &0,
            &10,
            &5,
            &true,
        );
        assert_eq!(result, Err(Ok(Error::InvalidSchedule)));
    }

    #[test]
    fn test_ownership_transfer_moves_revoke_right() {
        let s = setup(0, 1000, true);
        let multisig = Address::generate(&s.env);
        s.client.transfer_ownership(&s.owner, &multisig);
        assert_eq!(s.client.owner(), multisig);
        assert_eq!(s.client.try_revoke(&s.owner), Err(Ok(Error::NotAuthorized)));
        s.client.revoke(&multisig);
    }
}
