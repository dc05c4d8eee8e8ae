//! Offer voting with a persisted vote history.
//!
//! The history lives under `saveOffers` as `hash -> record`. Older daemons
//! wrote the record as a bare fingerprint string; current ones write
//! `[fingerprint, config_id]`. Both shapes are read for as long as old
//! stores exist, and only the two-element shape is ever written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chain::{Offer, ValidatorCore};
use crate::error::Result;
use crate::store::{Store, keys};

/// A vote history entry exactly as found in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredVote {
    /// `[fingerprint, related_id]`.
    Current(Option<String>, Option<i64>),
    /// Bare fingerprint from older stores.
    Legacy(Option<String>),
}

/// Normalised vote history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub fingerprint: Option<String>,
    pub related_id: Option<i64>,
}

impl From<StoredVote> for VoteRecord {
    fn from(stored: StoredVote) -> Self {
        match stored {
            StoredVote::Current(fingerprint, related_id) => Self {
                fingerprint,
                related_id,
            },
            StoredVote::Legacy(fingerprint) => Self {
                fingerprint,
                related_id: None,
            },
        }
    }
}

impl VoteRecord {
    /// The canonical shape written back to the store.
    pub fn to_stored(&self) -> StoredVote {
        StoredVote::Current(self.fingerprint.clone(), self.related_id)
    }
}

pub type VoteHistory = BTreeMap<String, VoteRecord>;

/// Decode `saveOffers`. Entries of any other shape are dropped with a warning.
pub fn decode_history(raw: Option<&Value>) -> VoteHistory {
    let Some(Value::Object(map)) = raw else {
        return VoteHistory::new();
    };
    map.iter()
        .filter_map(
            |(hash, value)| match serde_json::from_value::<StoredVote>(value.clone()) {
                Ok(stored) => Some((hash.clone(), stored.into())),
                Err(_) => {
                    log::warn!("ignoring unreadable vote record for offer {hash}: {value}");
                    None
                }
            },
        )
        .collect()
}

/// Both fingerprints are known and equal.
fn fingerprints_match(offer: Option<&str>, recorded: Option<&str>) -> bool {
    match (offer, recorded) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether `offer` already has a matching vote in `history`.
pub fn already_voted(offer: &Offer, history: &VoteHistory) -> bool {
    history.get(&offer.hash).is_some_and(|record| {
        fingerprints_match(offer.pseudohash.as_deref(), record.fingerprint.as_deref())
    })
}

/// Offers split by whether they still need a vote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferPlan {
    pub skip: Vec<Offer>,
    pub vote: Vec<Offer>,
}

pub fn plan_offers(offers: Vec<Offer>, history: &VoteHistory) -> OfferPlan {
    let (skip, vote): (Vec<Offer>, Vec<Offer>) = offers
        .into_iter()
        .partition(|offer| already_voted(offer, history));
    OfferPlan { skip, vote }
}

/// Record a vote in the canonical shape, leaving other entries untouched.
fn record_vote(store: &Store, offer: &Offer) -> Result<()> {
    let record = VoteRecord {
        fingerprint: offer.pseudohash.clone(),
        related_id: offer.config_id,
    };
    let stored = serde_json::to_value(record.to_stored())?;
    store.update(|db| {
        let history = db
            .entry(keys::SAVE_OFFERS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !history.is_object() {
            *history = Value::Object(Map::new());
        }
        if let Value::Object(map) = history {
            map.insert(offer.hash.clone(), stored);
        }
    })
}

/// One offers tick. Returns the number of votes cast.
///
/// A rejected vote is logged and does not stop the remaining offers.
pub fn offers_tick(core: &dyn ValidatorCore, store: &Store) -> Result<usize> {
    let history = decode_history(store.get(keys::SAVE_OFFERS).as_ref());
    let plan = plan_offers(core.offers()?, &history);
    log::debug!(
        "offers: {} already voted, {} to vote",
        plan.skip.len(),
        plan.vote.len()
    );
    let mut voted = 0;
    for offer in &plan.vote {
        match core.vote_offer(&offer.hash) {
            Ok(()) => {
                record_vote(store, offer)?;
                voted += 1;
            }
            Err(e) => log::warn!("vote for offer {} failed: {e}", offer.hash),
        }
    }
    Ok(voted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockCore;
    use serde_json::json;

    fn offer(hash: &str, pseudohash: Option<&str>) -> Offer {
        Offer {
            hash: hash.to_string(),
            pseudohash: pseudohash.map(str::to_string),
            config_id: Some(7),
        }
    }

    #[test]
    fn legacy_and_current_records_both_match() {
        let legacy = decode_history(Some(&json!({"h1": "p1"})));
        let current = decode_history(Some(&json!({"h1": ["p1", 7]})));
        for history in [&legacy, &current] {
            assert!(already_voted(&offer("h1", Some("p1")), history));
            assert!(!already_voted(&offer("h1", Some("p2")), history));
        }
        assert_eq!(current["h1"].related_id, Some(7));
        assert_eq!(legacy["h1"].related_id, None);
    }

    #[test]
    fn unknown_fingerprint_never_matches() {
        let history = decode_history(Some(&json!({"h1": null, "h2": [null, 3]})));
        assert!(!already_voted(&offer("h1", None), &history));
        assert!(!already_voted(&offer("h2", None), &history));
        let concrete = decode_history(Some(&json!({"h3": "p3"})));
        assert!(!already_voted(&offer("h3", None), &concrete));
    }

    #[test]
    fn unknown_hash_is_not_voted() {
        let history = decode_history(Some(&json!({"h1": "p1"})));
        assert!(!already_voted(&offer("h9", Some("p1")), &history));
    }

    #[test]
    fn unreadable_entries_are_dropped() {
        let history = decode_history(Some(&json!({"h1": {"x": 1}, "h2": "p2"})));
        assert_eq!(history.len(), 1);
        assert!(history.contains_key("h2"));
        assert!(decode_history(Some(&json!("garbage"))).is_empty());
        assert!(decode_history(None).is_empty());
    }

    #[test]
    fn plan_partitions_offers() {
        let history = decode_history(Some(&json!({"h1": ["p1", 1]})));
        let plan = plan_offers(
            vec![offer("h1", Some("p1")), offer("h2", Some("p2"))],
            &history,
        );
        assert_eq!(plan.skip.len(), 1);
        assert_eq!(plan.vote.len(), 1);
        assert_eq!(plan.vote[0].hash, "h2");
    }

    #[test]
    fn tick_votes_once_and_writes_canonical_shape() {
        let core = MockCore {
            offers: vec![offer("h1", Some("p1")), offer("h2", Some("p2"))],
            ..MockCore::default()
        };
        let store = Store::in_memory();
        store
            .set(keys::SAVE_OFFERS, json!({"h1": "p1", "old": "x"}))
            .unwrap();

        assert_eq!(offers_tick(&core, &store).unwrap(), 1);
        assert_eq!(offers_tick(&core, &store).unwrap(), 0);
        assert_eq!(core.calls(), vec!["vote_offer h2".to_string()]);

        let saved = store.get(keys::SAVE_OFFERS).unwrap();
        assert_eq!(saved["h2"], json!(["p2", 7]));
        assert_eq!(saved["h1"], json!("p1"));
        assert_eq!(saved["old"], json!("x"));
    }

    #[test]
    fn failed_vote_is_retried_next_tick() {
        let core = MockCore {
            offers: vec![offer("bad", Some("p")), offer("good", Some("q"))],
            failing_votes: ["bad".to_string()].into_iter().collect(),
            ..MockCore::default()
        };
        let store = Store::in_memory();
        assert_eq!(offers_tick(&core, &store).unwrap(), 1);
        assert_eq!(offers_tick(&core, &store).unwrap(), 0);
        assert_eq!(core.count("vote_offer bad"), 2);
        assert_eq!(core.count("vote_offer good"), 1);
    }
}
