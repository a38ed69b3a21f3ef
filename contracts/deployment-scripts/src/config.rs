//! JSON deployment configuration.
//!
//! Token amounts are carried as decimal strings: 18-decimal balances do not
//! fit in a JSON number without losing precision.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stellar_strkey::Strkey;
use thiserror::Error;

use crate::{FateAllocations, TOTAL_DURATION_SECS};

/// Length of a Stellar strkey (`G…` account or `C…` contract).
pub const STRKEY_LEN: usize = 56;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no multisig configured for chain {0}")]
    UnknownChain(u64),
    #[error("{field}: invalid address {value:?}")]
    InvalidAddress { field: String, value: String },
    #[error("{field}: invalid amount {value:?}")]
    InvalidAmount { field: String, value: String },
    #[error("allocations total {allocated} exceeds supply {supply}")]
    AllocationExceedsSupply { allocated: i128, supply: i128 },
    #[error("invalid reward schedule: {0}")]
    InvalidSchedule(&'static str),
    #[error("lockup_start {0} leaves no room for the vesting period")]
    InvalidLockupStart(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub total_supply: String,
}

/// A beneficiary receives `unlocked` directly and `locked` through a vesting
/// lockup with the standard cliff and duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryConfig {
    pub address: String,
    pub locked: String,
    pub unlocked: String,
}

/// Allocations held in lockups owned by the multisig. These have no cliff
/// and vest entirely at their start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigLockups {
    pub fgcd: String,
    pub legal: String,
    pub growth: String,
    pub presale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub start_offset: u32,
    pub reward_per_block: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub start_block: u32,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub chain_id: u64,
    /// Multisig strkey per chain id.
    pub multisigs: BTreeMap<u64, String>,
    pub token: TokenSettings,
    /// Lockup start as a unix timestamp. Defaults to the ledger time at
    /// deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockup_start: Option<u64>,
    pub beneficiaries: Vec<BeneficiaryConfig>,
    pub multisig_lockups: MultisigLockups,
    pub vault_allocation: String,
    pub schedule: ScheduleConfig,
    pub controller_version: u32,
}

impl DeploymentConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// FATE token settings and allocations for the given beneficiaries.
    pub fn fate(
        chain_id: u64,
        multisig: &str,
        beneficiaries: &[&str],
        allocations: &FateAllocations,
        schedule: ScheduleConfig,
    ) -> Self {
        let supply = allocations.total(beneficiaries.len() as i128);
        Self {
            chain_id,
            multisigs: BTreeMap::from([(chain_id, multisig.to_string())]),
            token: TokenSettings {
                name: "Fate".to_string(),
                symbol: "FATE".to_string(),
                decimals: 18,
                total_supply: supply.to_string(),
            },
            lockup_start: None,
            beneficiaries: beneficiaries
                .iter()
                .map(|address| BeneficiaryConfig {
                    address: address.to_string(),
                    locked: allocations.beneficiary_locked.to_string(),
                    unlocked: allocations.beneficiary_unlocked.to_string(),
                })
                .collect(),
            multisig_lockups: MultisigLockups {
                fgcd: allocations.fgcd.to_string(),
                legal: allocations.legal.to_string(),
                growth: allocations.growth.to_string(),
                presale: allocations.presale.to_string(),
            },
            vault_allocation: allocations.vault.to_string(),
            schedule,
            controller_version: 1,
        }
    }

    /// The multisig for the configured chain.
    pub fn multisig(&self) -> Result<&str, ConfigError> {
        self.multisigs
            .get(&self.chain_id)
            .map(String::as_str)
            .ok_or(ConfigError::UnknownChain(self.chain_id))
    }

    pub fn total_supply(&self) -> Result<i128, ConfigError> {
        parse_amount("token.total_supply", &self.token.total_supply)
    }

    /// Sum of everything the deployment hands out.
    pub fn allocated(&self) -> Result<i128, ConfigError> {
        let mut amounts = vec![
            parse_amount("multisig_lockups.fgcd", &self.multisig_lockups.fgcd)?,
            parse_amount("multisig_lockups.legal", &self.multisig_lockups.legal)?,
            parse_amount("multisig_lockups.growth", &self.multisig_lockups.growth)?,
            parse_amount("multisig_lockups.presale", &self.multisig_lockups.presale)?,
            parse_amount("vault_allocation", &self.vault_allocation)?,
        ];
        for (i, beneficiary) in self.beneficiaries.iter().enumerate() {
            amounts.push(parse_amount(&format!("beneficiaries[{i}].locked"), &beneficiary.locked)?);
            amounts.push(parse_amount(
                &format!("beneficiaries[{i}].unlocked"),
                &beneficiary.unlocked,
            )?);
        }

        amounts
            .into_iter()
            .try_fold(0i128, |acc, amount| acc.checked_add(amount))
            .ok_or_else(|| ConfigError::InvalidAmount {
                field: "allocations".to_string(),
                value: "overflow".to_string(),
            })
    }

    /// Check everything the contracts would otherwise reject mid-deployment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (chain_id, multisig) in &self.multisigs {
            check_address(&format!("multisigs.{chain_id}"), multisig)?;
        }
        self.multisig()?;

        for (i, beneficiary) in self.beneficiaries.iter().enumerate() {
            check_address(&format!("beneficiaries[{i}].address"), &beneficiary.address)?;
        }

        let supply = self.total_supply()?;
        let allocated = self.allocated()?;
        if allocated > supply {
            return Err(ConfigError::AllocationExceedsSupply { allocated, supply });
        }

        if let Some(start) = self.lockup_start {
            if start.checked_add(TOTAL_DURATION_SECS).is_none() {
                return Err(ConfigError::InvalidLockupStart(start));
            }
        }

        self.schedule_steps()?;
        Ok(())
    }

    /// Parsed schedule steps. Offsets start at 0 and strictly increase.
    pub fn schedule_steps(&self) -> Result<Vec<(u32, i128)>, ConfigError> {
        let steps = &self.schedule.steps;
        if steps.is_empty() {
            return Err(ConfigError::InvalidSchedule("no steps"));
        }
        if steps[0].start_offset != 0 {
            return Err(ConfigError::InvalidSchedule("first step must start at offset 0"));
        }
        if steps.windows(2).any(|w| w[1].start_offset <= w[0].start_offset) {
            return Err(ConfigError::InvalidSchedule("offsets must strictly increase"));
        }

        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let field = format!("schedule.steps[{i}].reward_per_block");
                let reward: i128 = step.reward_per_block.parse().map_err(|_| {
                    ConfigError::InvalidAmount {
                        field: field.clone(),
                        value: step.reward_per_block.clone(),
                    }
                })?;
                if reward < 0 {
                    return Err(ConfigError::InvalidAmount {
                        field,
                        value: step.reward_per_block.clone(),
                    });
                }
                Ok((step.start_offset, reward))
            })
            .collect()
    }
}

/// Parse a strictly positive base-unit amount.
pub fn parse_amount(field: &str, value: &str) -> Result<i128, ConfigError> {
    match value.parse::<i128>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(ConfigError::InvalidAmount {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Accept only checksummed `G…` account and `C…` contract strkeys.
pub(crate) fn check_address(field: &str, value: &str) -> Result<(), ConfigError> {
    match Strkey::from_string(value) {
        Ok(Strkey::PublicKeyEd25519(_) | Strkey::Contract(_)) => Ok(()),
        _ => Err(ConfigError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fate_allocations, FATE_SUPPLY};
    use std::io::Write;

    fn account(byte: u8) -> String {
        format!("{}", stellar_strkey::ed25519::PublicKey([byte; 32]))
    }

    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            start_block: 100,
            steps: vec![
                StepConfig {
                    start_offset: 0,
                    reward_per_block: "5000000000000000000".to_string(),
                },
                StepConfig {
                    start_offset: 100_800,
                    reward_per_block: "2500000000000000000".to_string(),
                },
            ],
        }
    }

    fn sample() -> DeploymentConfig {
        let multisig = account(1);
        let first = account(2);
        let second = account(3);
        DeploymentConfig::fate(
            56,
            &multisig,
            &[first.as_str(), second.as_str()],
            &fate_allocations(),
            schedule(),
        )
    }

    #[test]
    fn test_fate_config_is_valid() {
        let config = sample();
        config.validate().unwrap();
        assert_eq!(config.total_supply().unwrap(), FATE_SUPPLY);
        assert_eq!(config.allocated().unwrap(), FATE_SUPPLY);
        assert_eq!(config.multisig().unwrap(), account(1));
    }

    #[test]
    fn test_load_from_file() {
        let config = sample();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string_pretty(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = DeploymentConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
        loaded.validate().unwrap();
    }

    #[test]
    fn test_lockup_start_is_optional() {
        let mut config = sample();
        config.lockup_start = Some(1_700_000_000);
        let raw = serde_json::to_string(&config).unwrap();
        assert!(raw.contains("\"lockup_start\":1700000000"));
        // Amounts stay strings on the wire.
        assert!(raw.contains("\"vault_allocation\":\"154798812000000000000000000\""));

        config.lockup_start = None;
        let raw = serde_json::to_string(&config).unwrap();
        assert!(!raw.contains("lockup_start"));
        assert_eq!(DeploymentConfig::from_json(&raw).unwrap().lockup_start, None);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeploymentConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = DeploymentConfig::from_json("{ \"chain_id\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_chain() {
        let mut config = sample();
        config.chain_id = 1;
        assert!(matches!(config.validate(), Err(ConfigError::UnknownChain(1))));
    }

    #[test]
    fn test_invalid_addresses() {
        let mut config = sample();
        config.beneficiaries[1].address = "0x4F5Fbb56314cB48fA4848bf1e0433F0DD8A12C49".to_string();
        match config.validate() {
            Err(ConfigError::InvalidAddress { field, .. }) => {
                assert_eq!(field, "beneficiaries[1].address")
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut config = sample();
        config.multisigs.insert(56, "X".repeat(STRKEY_LEN));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_address_checksum_is_verified() {
        let valid = account(2);
        assert_eq!(valid.len(), STRKEY_LEN);

        // Same alphabet and length, one character changed.
        let mut corrupted = valid.into_bytes();
        corrupted[20] = if corrupted[20] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(corrupted).unwrap();

        let mut config = sample();
        config.beneficiaries[0].address = corrupted.clone();
        match config.validate() {
            Err(ConfigError::InvalidAddress { field, value }) => {
                assert_eq!(field, "beneficiaries[0].address");
                assert_eq!(value, corrupted);
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Secret seeds decode but are not addresses.
        let mut config = sample();
        config.multisigs.insert(
            56,
            format!("{}", stellar_strkey::ed25519::PrivateKey([7; 32])),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));

        let mut config = sample();
        config.beneficiaries[1].address =
            format!("{}", stellar_strkey::Contract([9; 32]));
        config.validate().unwrap();
    }

    #[test]
    fn test_lockup_start_must_fit_vesting_period() {
        let mut config = sample();
        config.lockup_start = Some(u64::MAX - TOTAL_DURATION_SECS + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLockupStart(_))
        ));

        config.lockup_start = Some(u64::MAX - TOTAL_DURATION_SECS);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_amounts() {
        let mut config = sample();
        config.multisig_lockups.legal = "-1".to_string();
        match config.validate() {
            Err(ConfigError::InvalidAmount { field, value }) => {
                assert_eq!(field, "multisig_lockups.legal");
                assert_eq!(value, "-1");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut config = sample();
        config.vault_allocation = "1.5e26".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_over_allocation() {
        let mut config = sample();
        config.token.total_supply = (FATE_SUPPLY - 1).to_string();
        match config.validate() {
            Err(ConfigError::AllocationExceedsSupply { allocated, supply }) => {
                assert_eq!(allocated, FATE_SUPPLY);
                assert_eq!(supply, FATE_SUPPLY - 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_schedule() {
        let mut config = sample();
        config.schedule.steps.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSchedule(_))
        ));

        let mut config = sample();
        config.schedule.steps[1].start_offset = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSchedule(_))
        ));

        let mut config = sample();
        config.schedule.steps[0].reward_per_block = "-5".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAmount { .. })
        ));
    }
}
