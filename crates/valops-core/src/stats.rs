//! Statistics collector: the single writer of all history rings and series.
//!
//! Each tick samples the host counters, pushes them into the rings, and
//! writes the derived window averages into the store's `statistics` map,
//! one family at a time.

use serde_json::{Value, json};

use crate::averager::{DiskAverages, NetworkAverages, WindowRates, disk_averages, network_averages};
use crate::counters::{CounterSource, DiskSnapshot, NetworkSnapshot};
use crate::error::Result;
use crate::history::{HistoryRing, Window};
use crate::series::TimeSeries;
use crate::store::{Store, keys};

#[derive(Debug, Clone)]
pub struct StatsCollector {
    network: HistoryRing<NetworkSnapshot>,
    disks: HistoryRing<DiskSnapshot>,
    transactions: TimeSeries,
    blocks: TimeSeries,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(
            crate::history::DEFAULT_WINDOW_COUNT,
            crate::history::DEFAULT_SAMPLES_PER_WINDOW,
        )
    }
}

impl StatsCollector {
    pub fn new(window_count: usize, samples_per_window: usize) -> Self {
        Self {
            network: HistoryRing::new(window_count, samples_per_window),
            disks: HistoryRing::new(window_count, samples_per_window),
            transactions: TimeSeries::new(),
            blocks: TimeSeries::new(),
        }
    }

    pub fn record_network(&mut self, snapshot: NetworkSnapshot) {
        self.network.record(snapshot);
    }

    pub fn record_disks(&mut self, snapshot: DiskSnapshot) {
        self.disks.record(snapshot);
    }

    /// Feed cumulative transaction and block counts from a chain scanner.
    pub fn record_chain_activity(&mut self, timestamp: u64, transactions: u64, blocks: u64) {
        self.transactions.record(timestamp, transactions);
        self.blocks.record(timestamp, blocks);
    }

    pub fn network_averages(&self) -> NetworkAverages {
        network_averages(&self.network)
    }

    pub fn disk_averages(&self) -> DiskAverages {
        disk_averages(&self.disks)
    }

    pub fn tps(&self) -> WindowRates {
        Window::ALL.map(|w| self.transactions.rate_over(w.seconds()))
    }

    pub fn bps(&self) -> WindowRates {
        Window::ALL.map(|w| self.blocks.rate_over(w.seconds()))
    }

    pub fn block_time(&self) -> WindowRates {
        Window::ALL.map(|w| self.blocks.block_time_avg(w.seconds()))
    }

    /// Sample network counters and publish `netLoadAvg` and `ppsAvg`.
    pub fn sample_network(&mut self, counters: &dyn CounterSource, store: &Store, now: u64) -> Result<()> {
        self.record_network(counters.network(now)?);
        let avg = self.network_averages();
        store.merge_statistics(vec![
            (keys::NET_LOAD_AVG, json!(avg.net_load)),
            (keys::PPS_AVG, json!(avg.pps)),
        ])
    }

    /// Publish `tpsAvg`, `bpsAvg` and `blockTimeAvg`.
    pub fn publish_chain_activity(&self, store: &Store) -> Result<()> {
        store.merge_statistics(vec![
            (keys::TPS_AVG, json!(self.tps())),
            (keys::BPS_AVG, json!(self.bps())),
            (keys::BLOCK_TIME_AVG, json!(self.block_time())),
        ])
    }

    /// Sample disk counters and publish the three per-disk families.
    pub fn sample_disks(&mut self, counters: &dyn CounterSource, store: &Store, now: u64) -> Result<()> {
        self.record_disks(counters.disks(now)?);
        let avg = self.disk_averages();
        store.merge_statistics(vec![
            (keys::DISKS_LOAD_AVG, json!(avg.load)),
            (keys::DISKS_LOAD_PERCENT_AVG, json!(avg.load_percent)),
            (keys::IOPS_AVG, json!(avg.iops)),
        ])
    }

    /// One statistics tick.
    ///
    /// Network and disk sampling are independent: a failure in one does not
    /// skip the other. The first error is returned after both have run.
    pub fn tick(&mut self, counters: &dyn CounterSource, store: &Store, now: u64) -> Result<()> {
        let network = self.sample_network(counters, store, now);
        let chain = self.publish_chain_activity(store);
        let disks = self.sample_disks(counters, store, now);
        network.and(chain).and(disks)
    }
}

/// Current `[short, medium, long]` values of one statistics family.
pub fn statistic_or_null(store: &Store, name: &str) -> Value {
    store.statistic(name).unwrap_or(Value::Null)
}
