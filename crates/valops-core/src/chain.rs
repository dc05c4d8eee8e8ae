//! Interface to the external validator-core library.
//!
//! The daemon never talks to the chain itself. Everything it needs (chain
//! configuration, validator role, complaint and offer voting, election
//! calls) comes through [`ValidatorCore`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Current validation round, from chain config parameter 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRound {
    pub start_work_time: u64,
    pub end_work_time: u64,
}

/// Stake freeze parameters, from chain config parameter 15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingParams {
    pub stake_held_for: u64,
}

/// A complaint registered with the elector for an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub hash: String,
    #[serde(default)]
    pub pseudohash: Option<String>,
}

/// An open config-change offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub hash: String,
    /// Content fingerprint; `None` when the core could not compute it.
    #[serde(default)]
    pub pseudohash: Option<String>,
    /// Config parameter the offer changes.
    #[serde(default)]
    pub config_id: Option<i64>,
}

/// Cumulative chain counters observed by the core's block scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainActivity {
    pub transactions: u64,
    pub blocks: u64,
}

/// Capabilities the daemon consumes from the validator core.
pub trait ValidatorCore: Send + Sync {
    fn network_name(&self) -> Result<String>;

    fn validator_round(&self) -> Result<ValidatorRound>;
    fn staking_params(&self) -> Result<StakingParams>;

    /// Whether this node is configured to validate.
    fn using_validator(&self) -> Result<bool>;
    /// Index in the current validator set, negative when not elected.
    fn validator_index(&self) -> Result<i64>;

    /// Check the previous round's validators and file complaints for
    /// misbehaviour observed in `[start, end]`.
    fn check_validators(&self, start: u64, end: u64) -> Result<()>;

    fn complaints(&self, election_id: u64) -> Result<Vec<Complaint>>;
    fn valid_complaints(&self, complaints: Vec<Complaint>, election_id: u64)
    -> Result<Vec<Complaint>>;
    fn vote_complaint(&self, election_id: u64, complaint_hash: &str) -> Result<()>;

    fn offers(&self) -> Result<Vec<Offer>>;
    fn vote_offer(&self, offer_hash: &str) -> Result<()>;

    fn using_pool(&self) -> Result<bool>;
    fn using_liquid_staking(&self) -> Result<bool>;
    fn pools_update_validator_set(&self) -> Result<()>;
    fn controllers_update_validator_set(&self) -> Result<()>;
    fn recover_stake(&self) -> Result<()>;
    fn election_entry(&self) -> Result<()>;

    fn adnl_addr(&self) -> Result<String>;
    fn validator_status(&self) -> Result<Value>;
    fn db_usage(&self) -> Result<Value>;
    fn fullnode_adnl(&self) -> Result<Option<String>>;
    fn overlays_stats(&self) -> Result<Value>;

    /// Totals seen so far by a block scanner. `None` when the core runs
    /// without one, which leaves the tps/bps/block time families null.
    fn chain_activity(&self) -> Result<Option<ChainActivity>> {
        Ok(None)
    }

    /// Build revisions of the installed node software, keyed by component.
    fn git_hashes(&self) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Command-line arguments the validator engine was started with.
    fn node_args(&self) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Round-trip times to well-known beacon hosts, keyed by host.
    fn pings(&self) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Stand-in used when no validator core is attached.
///
/// Every chain call fails, so epoch-gated tasks log and skip while host
/// statistics keep being collected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

fn detached<T>() -> Result<T> {
    Err(Error::Collaborator("no validator core attached".to_string()))
}

impl ValidatorCore for Detached {
    fn network_name(&self) -> Result<String> {
        detached()
    }
    fn validator_round(&self) -> Result<ValidatorRound> {
        detached()
    }
    fn staking_params(&self) -> Result<StakingParams> {
        detached()
    }
    fn using_validator(&self) -> Result<bool> {
        Ok(false)
    }
    fn validator_index(&self) -> Result<i64> {
        Ok(-1)
    }
    fn check_validators(&self, _start: u64, _end: u64) -> Result<()> {
        detached()
    }
    fn complaints(&self, _election_id: u64) -> Result<Vec<Complaint>> {
        detached()
    }
    fn valid_complaints(
        &self,
        _complaints: Vec<Complaint>,
        _election_id: u64,
    ) -> Result<Vec<Complaint>> {
        detached()
    }
    fn vote_complaint(&self, _election_id: u64, _complaint_hash: &str) -> Result<()> {
        detached()
    }
    fn offers(&self) -> Result<Vec<Offer>> {
        detached()
    }
    fn vote_offer(&self, _offer_hash: &str) -> Result<()> {
        detached()
    }
    fn using_pool(&self) -> Result<bool> {
        Ok(false)
    }
    fn using_liquid_staking(&self) -> Result<bool> {
        Ok(false)
    }
    fn pools_update_validator_set(&self) -> Result<()> {
        detached()
    }
    fn controllers_update_validator_set(&self) -> Result<()> {
        detached()
    }
    fn recover_stake(&self) -> Result<()> {
        detached()
    }
    fn election_entry(&self) -> Result<()> {
        detached()
    }
    fn adnl_addr(&self) -> Result<String> {
        detached()
    }
    fn validator_status(&self) -> Result<Value> {
        detached()
    }
    fn db_usage(&self) -> Result<Value> {
        detached()
    }
    fn fullnode_adnl(&self) -> Result<Option<String>> {
        Ok(None)
    }
    fn overlays_stats(&self) -> Result<Value> {
        detached()
    }
}
