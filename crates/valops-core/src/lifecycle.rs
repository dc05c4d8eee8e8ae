//! Validator lifecycle ticks that need no epoch marker.

use crate::chain::ValidatorCore;
use crate::error::Result;

/// One complaints tick. Returns the number of votes the core accepted.
///
/// Runs every tick: each complaint carries its own identity and the core
/// rejects duplicate votes, so voting again is harmless. A failed vote is
/// logged and the remaining complaints are still voted on.
pub fn complaints_tick(core: &dyn ValidatorCore) -> Result<usize> {
    if core.validator_index()? < 0 {
        return Ok(0);
    }
    let election_id = core.validator_round()?.start_work_time;
    let complaints = core.complaints(election_id)?;
    let valid = core.valid_complaints(complaints, election_id)?;
    let mut accepted = 0;
    for complaint in &valid {
        match core.vote_complaint(election_id, &complaint.hash) {
            Ok(()) => accepted += 1,
            Err(e) => log::warn!("vote for complaint {} failed: {e}", complaint.hash),
        }
    }
    if !valid.is_empty() {
        log::info!(
            "complaints for election {election_id}: {accepted}/{} votes accepted",
            valid.len()
        );
    }
    Ok(accepted)
}

/// One elections tick: refresh pool/controller validator sets, recover
/// returned stake, and take part in the election when validating.
pub fn elections_tick(core: &dyn ValidatorCore) -> Result<()> {
    if core.using_pool()? {
        core.pools_update_validator_set()?;
    }
    if core.using_liquid_staking()? {
        core.controllers_update_validator_set()?;
    }
    core.recover_stake()?;
    if core.using_validator()? {
        core.election_entry()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Complaint;
    use crate::chain::mock::MockCore;

    fn complaint(hash: &str) -> Complaint {
        Complaint {
            hash: hash.to_string(),
            pseudohash: None,
        }
    }

    #[test]
    fn complaints_skipped_when_not_elected() {
        let core = MockCore {
            complaints: vec![complaint("c1")],
            ..MockCore::default()
        };
        *core.index.lock().unwrap() = -1;
        assert_eq!(complaints_tick(&core).unwrap(), 0);
        assert!(core.calls().is_empty());
    }

    #[test]
    fn complaints_voted_every_tick() {
        let core = MockCore {
            complaints: vec![complaint("c1"), complaint("invalid-c2"), complaint("c3")],
            ..MockCore::default()
        };
        assert_eq!(complaints_tick(&core).unwrap(), 2);
        assert_eq!(complaints_tick(&core).unwrap(), 2);
        assert_eq!(core.count("vote_complaint 100 c1"), 2);
        assert_eq!(core.count("vote_complaint 100 invalid"), 0);
    }

    #[test]
    fn one_failed_complaint_does_not_block_others() {
        let core = MockCore {
            complaints: vec![complaint("c1"), complaint("c2")],
            failing_votes: ["c1".to_string()].into_iter().collect(),
            ..MockCore::default()
        };
        assert_eq!(complaints_tick(&core).unwrap(), 1);
        assert_eq!(core.count("vote_complaint"), 2);
    }

    #[test]
    fn elections_call_order() {
        let core = MockCore::default();
        elections_tick(&core).unwrap();
        assert_eq!(
            core.calls(),
            vec![
                "controllers_update_validator_set".to_string(),
                "recover_stake".to_string(),
                "election_entry".to_string(),
            ]
        );
    }
}
