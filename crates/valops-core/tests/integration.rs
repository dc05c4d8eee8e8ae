//! Integration tests for valops-core.
//!
//! These drive the public API end to end:
//! counters → statistics → store, and the validator tasks against a
//! file-backed store that is reopened between ticks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use valops_core::store::keys;
use valops_core::{
    Complaint, CounterSource, Daemon, DaemonConfig, DiskCounters, DiskSnapshot, GateOutcome,
    NetworkSnapshot, Offer, ReportSink, Result, StakingParams, StatsCollector, Store, Task,
    ValidatorCore, ValidatorRound, offers_tick, slashing_tick,
};

struct Core {
    offers: Vec<Offer>,
    calls: Mutex<Vec<String>>,
}

impl Core {
    fn new(offers: Vec<Offer>) -> Self {
        Self {
            offers,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ValidatorCore for Core {
    fn network_name(&self) -> Result<String> {
        Ok("testnet".to_string())
    }
    fn validator_round(&self) -> Result<ValidatorRound> {
        Ok(ValidatorRound {
            start_work_time: 1_000,
            end_work_time: 2_000,
        })
    }
    fn staking_params(&self) -> Result<StakingParams> {
        Ok(StakingParams { stake_held_for: 500 })
    }
    fn using_validator(&self) -> Result<bool> {
        Ok(true)
    }
    fn validator_index(&self) -> Result<i64> {
        Ok(0)
    }
    fn check_validators(&self, start: u64, end: u64) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("check {start} {end}"));
        Ok(())
    }
    fn complaints(&self, _election_id: u64) -> Result<Vec<Complaint>> {
        Ok(Vec::new())
    }
    fn valid_complaints(&self, complaints: Vec<Complaint>, _election_id: u64) -> Result<Vec<Complaint>> {
        Ok(complaints)
    }
    fn vote_complaint(&self, _election_id: u64, _complaint_hash: &str) -> Result<()> {
        Ok(())
    }
    fn offers(&self) -> Result<Vec<Offer>> {
        Ok(self.offers.clone())
    }
    fn vote_offer(&self, offer_hash: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("vote {offer_hash}"));
        Ok(())
    }
    fn using_pool(&self) -> Result<bool> {
        Ok(false)
    }
    fn using_liquid_staking(&self) -> Result<bool> {
        Ok(false)
    }
    fn pools_update_validator_set(&self) -> Result<()> {
        Ok(())
    }
    fn controllers_update_validator_set(&self) -> Result<()> {
        Ok(())
    }
    fn recover_stake(&self) -> Result<()> {
        Ok(())
    }
    fn election_entry(&self) -> Result<()> {
        Ok(())
    }
    fn adnl_addr(&self) -> Result<String> {
        Ok("ADNL".to_string())
    }
    fn validator_status(&self) -> Result<Value> {
        Ok(json!({}))
    }
    fn db_usage(&self) -> Result<Value> {
        Ok(json!(1.0))
    }
    fn fullnode_adnl(&self) -> Result<Option<String>> {
        Ok(None)
    }
    fn overlays_stats(&self) -> Result<Value> {
        Ok(json!([]))
    }
}

/// Network traffic of 1 Mbit/s each way, one disk at 50% busy.
struct SteadyHost;

impl CounterSource for SteadyHost {
    fn network(&self, timestamp: u64) -> Result<NetworkSnapshot> {
        Ok(NetworkSnapshot {
            timestamp,
            bytes_recv: timestamp * 125_000,
            bytes_sent: timestamp * 125_000,
            packets_recv: timestamp * 100,
            packets_sent: 0,
        })
    }

    fn disks(&self, timestamp: u64) -> Result<DiskSnapshot> {
        let mut disks = BTreeMap::new();
        disks.insert(
            "nvme0n1".to_string(),
            DiskCounters {
                busy_time: timestamp * 500,
                read_bytes: 0,
                write_bytes: timestamp * 2_000_000,
                read_count: 0,
                write_count: timestamp * 20,
            },
        );
        Ok(DiskSnapshot { timestamp, disks })
    }
}

#[derive(Default)]
struct NullSink;

impl ReportSink for NullSink {
    fn post(&self, _url: &str, _body: &Value) -> Result<()> {
        Ok(())
    }
}

fn offer(hash: &str, fingerprint: &str) -> Offer {
    Offer {
        hash: hash.to_string(),
        pseudohash: Some(fingerprint.to_string()),
        config_id: Some(12),
    }
}

#[test]
fn windows_converge_under_steady_load() {
    let store = Store::in_memory();
    let mut stats = StatsCollector::default();
    // 15 minutes of 10 s samples fills every window.
    for i in 0..=90u64 {
        stats.tick(&SteadyHost, &store, 10_000 + i * 10).unwrap();
    }
    let s = store.statistics();
    assert_eq!(s[keys::NET_LOAD_AVG], json!([2.0, 2.0, 2.0]));
    assert_eq!(s[keys::PPS_AVG], json!([100.0, 100.0, 100.0]));
    assert_eq!(
        s[keys::DISKS_LOAD_PERCENT_AVG],
        json!({"nvme0n1": [50.0, 50.0, 50.0]})
    );
    assert_eq!(s[keys::DISKS_LOAD_AVG], json!({"nvme0n1": [2.0, 2.0, 2.0]}));
    assert_eq!(s[keys::IOPS_AVG], json!({"nvme0n1": [20.0, 20.0, 20.0]}));
}

#[test]
fn warm_up_reports_only_short_window_data() {
    let store = Store::in_memory();
    let mut stats = StatsCollector::default();
    for i in 0..7u64 {
        stats.tick(&SteadyHost, &store, i * 10).unwrap();
    }
    // Medium and long fall back to the short baseline until they fill.
    assert_eq!(
        store.statistic(keys::NET_LOAD_AVG),
        Some(json!([2.0, 2.0, 2.0]))
    );
}

#[test]
fn slashing_runs_once_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let core = Core::new(Vec::new());

    {
        let store = Store::open(&path).unwrap();
        store.set(keys::IS_SLASHING, json!(true)).unwrap();
        assert_eq!(
            slashing_tick(&core, &store, 1_500).unwrap(),
            GateOutcome::OutsideWindow
        );
        assert_eq!(
            slashing_tick(&core, &store, 2_100).unwrap(),
            GateOutcome::Executed
        );
    }
    let store = Store::open(&path).unwrap();
    assert_eq!(
        slashing_tick(&core, &store, 2_200).unwrap(),
        GateOutcome::AlreadyProcessed
    );
    assert_eq!(core.calls(), vec!["check 1000 1940".to_string()]);
}

#[test]
fn offers_respect_legacy_history_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    std::fs::write(
        &path,
        r#"{"saveOffers": {"old": "fp-old"}, "stake": 5}"#,
    )
    .unwrap();
    let core = Core::new(vec![offer("old", "fp-old"), offer("new", "fp-new")]);

    {
        let store = Store::open(&path).unwrap();
        assert_eq!(offers_tick(&core, &store).unwrap(), 1);
    }
    let store = Store::open(&path).unwrap();
    assert_eq!(offers_tick(&core, &store).unwrap(), 0);
    assert_eq!(core.calls(), vec!["vote new".to_string()]);

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["saveOffers"]["old"], json!("fp-old"));
    assert_eq!(raw["saveOffers"]["new"], json!(["fp-new", 12]));
    assert_eq!(raw["stake"], json!(5));
}

#[test]
fn daemon_ticks_share_one_store() {
    let store = Arc::new(Store::in_memory());
    let daemon = Daemon::new(
        DaemonConfig::default(),
        Arc::clone(&store),
        Box::new(Core::new(vec![offer("h", "p")])),
        Box::new(SteadyHost),
        Box::new(NullSink),
    );
    for task in Task::ALL {
        daemon.tick(task);
    }
    assert!(store.statistic(keys::NET_LOAD_AVG).is_some());
    assert!(store.get(keys::SAVE_OFFERS).unwrap().get("h").is_some());
}
