//! Deployment plan for the FATE reward contracts.
//!
//! A [`DeploymentConfig`] is loaded from JSON and validated, then [`deploy`]
//! instantiates every contract on a Soroban host, hands the lockups to the
//! multisig, distributes the initial supply and lets the controller draw on
//! the vault.

pub mod config;
pub mod deploy;

use soroban_sdk::{Address, Env, String as SorobanString};

pub use config::{
    BeneficiaryConfig, ConfigError, DeploymentConfig, MultisigLockups, ScheduleConfig,
    StepConfig, TokenSettings, STRKEY_LEN,
};
pub use deploy::{deploy, sandbox, DeployError, Deployment};

/// Beneficiary lockups vest nothing for the first six months.
pub const CLIFF_DURATION_SECS: u64 = 60 * 60 * 24 * 182;
/// Beneficiary lockups are fully vested after one year.
pub const TOTAL_DURATION_SECS: u64 = 60 * 60 * 24 * 365;

const FATE_UNIT: i128 = 1_000_000_000_000_000_000;

/// Total FATE supply in base units (18 decimals).
pub const FATE_SUPPLY: i128 = 800_000_000 * FATE_UNIT;

/// How the initial FATE supply is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FateAllocations {
    /// Locked in each beneficiary's vesting lockup.
    pub beneficiary_locked: i128,
    /// Sent to each beneficiary directly.
    pub beneficiary_unlocked: i128,
    pub fgcd: i128,
    pub legal: i128,
    pub growth: i128,
    pub presale: i128,
    pub vault: i128,
}

impl FateAllocations {
    pub fn total(&self, beneficiaries: i128) -> i128 {
        beneficiaries * (self.beneficiary_locked + self.beneficiary_unlocked)
            + self.fgcd
            + self.legal
            + self.growth
            + self.presale
            + self.vault
    }
}

/// The mainnet split for two beneficiaries. Adds up to [`FATE_SUPPLY`].
pub fn fate_allocations() -> FateAllocations {
    FateAllocations {
        beneficiary_locked: 30_889_346_400_000_000_000_000_000,
        beneficiary_unlocked: 3_432_149_600_000_000_000_000_000,
        fgcd: 36_345_600_000_000_000_000_000_000,
        legal: 8_888_888_000_000_000_000_000_000,
        growth: 530_596_436_000_000_000_000_000_000,
        presale: 727_272_000_000_000_000_000_000,
        vault: 154_798_812_000_000_000_000_000_000,
    }
}

/// Parse a `G…`/`C…` strkey into a host address. The checksum is verified
/// first; the host panics on a malformed strkey.
pub fn address_from_strkey(env: &Env, field: &str, strkey: &str) -> Result<Address, ConfigError> {
    config::check_address(field, strkey)?;
    Ok(Address::from_string(&SorobanString::from_str(env, strkey)))
}

/// Render a host address as its strkey.
pub fn strkey_of(address: &Address) -> String {
    let strkey = address.to_string();
    let mut buf = [0u8; STRKEY_LEN];
    strkey.copy_into_slice(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use soroban_sdk::testutils::Address as _;

    #[test]
    fn test_fate_allocations_cover_supply() {
        assert_eq!(fate_allocations().total(2), FATE_SUPPLY);
    }

    #[test]
    fn test_strkey_round_trip() {
        let env = Env::default();
        let address = Address::generate(&env);
        let strkey = strkey_of(&address);

        assert_eq!(strkey.len(), STRKEY_LEN);
        assert_eq!(address_from_strkey(&env, "address", &strkey).unwrap(), address);
    }

    #[test]
    fn test_bad_strkey_is_an_error() {
        let env = Env::default();
        let mut strkey = strkey_of(&Address::generate(&env)).into_bytes();
        strkey[STRKEY_LEN - 1] = if strkey[STRKEY_LEN - 1] == b'A' { b'B' } else { b'A' };
        let strkey = String::from_utf8(strkey).unwrap();

        match address_from_strkey(&env, "multisig", &strkey) {
            Err(ConfigError::InvalidAddress { field, .. }) => assert_eq!(field, "multisig"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
