#![no_std]
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Env, String,
};

const PERSISTENT_BUMP_LEDGERS: u32 = 518_400; // ~30 days
const PERSISTENT_BUMP_THRESHOLD: u32 = PERSISTENT_BUMP_LEDGERS - 100_800;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    InsufficientBalance = 3,
    InsufficientAllowance = 4,
    InvalidAmount = 5,
    InvalidExpiration = 6,
    Overflow = 7,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AllowanceValue {
    pub amount: i128,
    pub expiration_ledger: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataKey {
    Config,
    Supply,
    Balance(Address),
    Allowance(Address, Address),
}

#[contractevent]
pub struct Minted {
    #[topic]
    pub to: Address,
    pub amount: i128,
}

#[contractevent]
pub struct Transfer {
    #[topic]
    pub from: Address,
    #[topic]
    pub to: Address,
    pub amount: i128,
}

#[contractevent]
pub struct Approve {
    #[topic]
    pub from: Address,
    #[topic]
    pub spender: Address,
    pub amount: i128,
    pub expiration_ledger: u32,
}

/// Fixed-supply reward token. The whole supply is minted to the initial
/// holder at `init`; there is no mint afterwards.
#[contract]
pub struct RewardToken;

#[contractimpl]
impl RewardToken {
    /// Mints `supply` to `holder` and records the token metadata.
    pub fn init(env: Env, holder: Address, config: TokenConfig, supply: i128) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(Error::AlreadyInitialized);
        }
        if supply <= 0 {
            return Err(Error::InvalidAmount);
        }
        holder.require_auth();

        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::Supply, &supply);
        write_balance(&env, &holder, supply);

        Minted { to: holder, amount: supply }.publish(&env);
        Ok(())
    }

    pub fn transfer(env: Env, from: Address, to: Address, amount: i128) -> Result<(), Error> {
        from.require_auth();
        move_balance(&env, &from, &to, amount)
    }

    /// Spends `from`'s allowance to `spender`.
    pub fn transfer_from(
        env: Env,
        spender: Address,
        from: Address,
        to: Address,
        amount: i128,
    ) -> Result<(), Error> {
        spender.require_auth();
        if amount < 0 {
            return Err(Error::InvalidAmount);
        }

        if amount > 0 {
            let key = DataKey::Allowance(from.clone(), spender.clone());
            let allowance = Self::allowance(env.clone(), from.clone(), spender.clone());
            if allowance < amount {
                return Err(Error::InsufficientAllowance);
            }
            let mut value: AllowanceValue = env
                .storage()
                .temporary()
                .get(&key)
                .ok_or(Error::InsufficientAllowance)?;
            value.amount = allowance - amount;
            env.storage().temporary().set(&key, &value);
        }

        move_balance(&env, &from, &to, amount)
    }

    /// Sets `spender`'s allowance over `from`'s balance, valid until
    /// `expiration_ledger` (inclusive).
    pub fn approve(
        env: Env,
        from: Address,
        spender: Address,
        amount: i128,
        expiration_ledger: u32,
    ) -> Result<(), Error> {
        from.require_auth();
        if amount < 0 {
            return Err(Error::InvalidAmount);
        }
        let current = env.ledger().sequence();
        if amount > 0 && expiration_ledger < current {
            return Err(Error::InvalidExpiration);
        }

        let key = DataKey::Allowance(from.clone(), spender.clone());
        env.storage().temporary().set(
            &key,
            &AllowanceValue {
                amount,
                expiration_ledger,
            },
        );
        let live_for = expiration_ledger.saturating_sub(current);
        if amount > 0 && live_for > 0 {
            env.storage().temporary().extend_ttl(&key, live_for, live_for);
        }

        Approve {
            from,
            spender,
            amount,
            expiration_ledger,
        }
        .publish(&env);
        Ok(())
    }

    /// Remaining allowance; zero once expired.
    pub fn allowance(env: Env, from: Address, spender: Address) -> i128 {
        let value: Option<AllowanceValue> = env
            .storage()
            .temporary()
            .get(&DataKey::Allowance(from, spender));
        match value {
            Some(v) if v.expiration_ledger >= env.ledger().sequence() => v.amount,
            _ => 0,
        }
    }

    pub fn balance(env: Env, id: Address) -> i128 {
        let key = DataKey::Balance(id);
        let balance: i128 = env.storage().persistent().get(&key).unwrap_or(0);
        if balance > 0 {
            env.storage()
                .persistent()
                .extend_ttl(&key, PERSISTENT_BUMP_THRESHOLD, PERSISTENT_BUMP_LEDGERS);
        }
        balance
    }

    pub fn total_supply(env: Env) -> i128 {
        env.storage().instance().get(&DataKey::Supply).unwrap_or(0)
    }

    pub fn decimals(env: Env) -> Result<u32, Error> {
        Ok(read_config(&env)?.decimals)
    }

    pub fn name(env: Env) -> Result<String, Error> {
        Ok(read_config(&env)?.name)
    }

    pub fn symbol(env: Env) -> Result<String, Error> {
        Ok(read_config(&env)?.symbol)
    }
}

fn read_config(env: &Env) -> Result<TokenConfig, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(Error::NotInitialized)
}

fn write_balance(env: &Env, id: &Address, amount: i128) {
    let key = DataKey::Balance(id.clone());
    env.storage().persistent().set(&key, &amount);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_THRESHOLD, PERSISTENT_BUMP_LEDGERS);
}

/// Zero-amount moves are accepted and only emit the event.
fn move_balance(env: &Env, from: &Address, to: &Address, amount: i128) -> Result<(), Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    let from_balance = RewardToken::balance(env.clone(), from.clone());
    if from_balance < amount {
        return Err(Error::InsufficientBalance);
    }
    if amount > 0 {
        write_balance(env, from, from_balance - amount);
        let to_balance = RewardToken::balance(env.clone(), to.clone());
        write_balance(env, to, to_balance.checked_add(amount).ok_or(Error::Overflow)?);
    }

    Transfer {
        from: from.clone(),
        to: to.clone(),
        amount,
    }
    .publish(env);
    Ok(())
}
