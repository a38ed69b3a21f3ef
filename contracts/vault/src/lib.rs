#![no_std]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token, Address, Env,
};

// ── Errors ───────────────────────────────────────────────────────
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    InvalidAmount = 4,
    InsufficientFunds = 5,
}

// ── Storage Keys ─────────────────────────────────────────────────
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Owner,
    Token,
}

// ── Events ────────────────────────────────────────────────────────
#[contractevent]
pub struct SpenderApproved {
    #[topic]
    pub spender: Address,
    pub amount: i128,
    pub expiration_ledger: u32,
}

#[contractevent]
pub struct Withdrawn {
    pub to: Address,
    pub amount: i128,
}

#[contractevent]
pub struct OwnershipTransferred {
    pub previous_owner: Address,
    pub new_owner: Address,
}

// ── Contract ──────────────────────────────────────────────────────
/// Holds reward funds. Payout contracts draw from it through a token
/// allowance granted by the owner.
#[contract]
pub struct Vault;

#[contractimpl]
impl Vault {
    /// Initialize with the owner and the reward token address.
    pub fn init(env: Env, owner: Address, token_address: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }
        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::Token, &token_address);
        Ok(())
    }

    /// Allow `spender` to pull up to `amount` of the vault's tokens. Owner-only.
    pub fn approve(
        env: Env,
        caller: Address,
        spender: Address,
        amount: i128,
        expiration_ledger: u32,
    ) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        if amount < 0 {
            return Err(Error::InvalidAmount);
        }

        let token_client = token::Client::new(&env, &read_token(&env)?);
        token_client.approve(
            &env.current_contract_address(),
            &spender,
            &amount,
            &expiration_ledger,
        );

        SpenderApproved {
            spender,
            amount,
            expiration_ledger,
        }
        .publish(&env);
        Ok(())
    }

    /// Move funds out of the vault. Owner-only.
    pub fn withdraw(env: Env, caller: Address, to: Address, amount: i128) -> Result<(), Error> {
        require_owner(&env, &caller)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let token_client = token::Client::new(&env, &read_token(&env)?);
        if token_client.balance(&env.current_contract_address()) < amount {
            return Err(Error::InsufficientFunds);
        }
        token_client.transfer(&env.current_contract_address(), &to, &amount);

        Withdrawn { to, amount }.publish(&env);
        Ok(())
    }

    pub fn balance(env: Env) -> Result<i128, Error> {
        let token_client = token::Client::new(&env, &read_token(&env)?);
        Ok(token_client.balance(&env.current_contract_address()))
    }

    pub fn token(env: Env) -> Result<Address, Error> {
        read_token(&env)
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
}

// ── Internal ─────────────────────────────────────────────────────
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

fn read_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)
}

// ── Tests ─────────────────────────────────────────────────────────
#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::{
        testutils::Address as _,
        token::{Client as TokenClient, StellarAssetClient},
        Env,
    };

    fn create_token<'a>(env: &Env, admin: &Address) -> (Address, StellarAssetClient<'a>, TokenClient<'a>) {
        let sac = env.register_stellar_asset_contract_v2(admin.clone());
        let addr = sac.address();
        (addr.clone(), StellarAssetClient::new(env, &addr), TokenClient::new(env, &addr))
    }

    #[test]
    fn test_approved_spender_can_pull() {
        let env = Env::default();
        env.mock_all_auths();

        let owner = Address::generate(&env);
        let controller = Address::generate(&env);
        let user = Address::generate(&env);
        let (token_id, sa, tc) = create_token(&env, &owner);

        let vault_id = env.register(Vault, ());
        let client = VaultClient::new(&env, &vault_id);
        client.init(&owner, &token_id);
        sa.mint(&vault_id, &1_000);

        client.approve(&owner, &controller, &400, &1_000);
        assert_eq!(tc.allowance(&vault_id, &controller), 400);

        tc.transfer_from(&controller, &vault_id, &user, &150);
        assert_eq!(tc.balance(&user), 150);
        assert_eq!(client.balance(), 850);
    }

    #[test]
    fn test_withdraw() {
        let env = Env::default();
        env.mock_all_auths();

        let owner = Address::generate(&env);
        let to = Address::generate(&env);
        let (token_id, sa, tc) = create_token(&env, &owner);

        let vault_id = env.register(Vault, ());
        let client = VaultClient::new(&env, &vault_id);
        client.init(&owner, &token_id);
        sa.mint(&vault_id, &500);

        client.withdraw(&owner, &to, &200);
        assert_eq!(tc.balance(&to), 200);
        assert_eq!(
            client.try_withdraw(&owner, &to, &301),
            Err(Ok(Error::InsufficientFunds))
        );
    }

    #[test]
    fn test_non_owner_rejected() {
        let env = Env::default();
        env.mock_all_auths();

        let owner = Address::generate(&env);
        let stranger = Address::generate(&env);
        let (token_id, sa, _) = create_token(&env, &owner);

        let vault_id = env.register(Vault, ());
        let client = VaultClient::new(&env, &vault_id);
        client.init(&owner, &token_id);
        sa.mint(&vault_id, &500);

        assert_eq!(
            client.try_withdraw(&stranger, &stranger, &1),
            Err(Ok(Error::NotAuthorized))
        );
        assert_eq!(
            client.try_approve(&stranger, &stranger, &1, &100),
            Err(Ok(Error::NotAuthorized))
        );
        assert_eq!(
            client.try_transfer_ownership(&stranger, &stranger),
            Err(Ok(Error::NotAuthorized))
        );
        assert_eq!(client.owner(), owner);
        assert_eq!(client.balance(), 500);
    }

    #[test]
    fn test_double_init_fails() {
        let env = Env::default();
        let owner = Address::generate(&env);
        let token = Address::generate(&env);
        let vault_id = env.register(Vault, ());
        let client = VaultClient::new(&env, &vault_id);
        client.init(&owner, &token);
        assert_eq!(client.try_init(&owner, &token), Err(Ok(Error::AlreadyInitialized)));
    }
}
