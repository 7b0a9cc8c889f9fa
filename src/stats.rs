//! End-of-run statistics, computed by scanning the node arena once the
//! simulation has stopped.

use crate::sim::Simulation;
use std::fmt;

/// A snapshot of network-wide counters, aggregated from every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub node_count: usize,
    pub nodes_failed: usize,
    pub nodes_online: usize,
    pub data_loss_events: u64,
    pub data_recovered_events: u64,
    pub backups_made: u64,
    pub restores_made: u64,
    /// Count of backed-up blocks across the network. The data model allows
    /// at most one remote copy per block, so every entry here is, by
    /// construction, the only remaining copy if its owner fails.
    pub vulnerable_blocks: u64,
}

impl Summary {
    pub fn compute(sim: &Simulation) -> Self {
        let mut summary = Self {
            node_count: sim.nodes().len(),
            ..Self::default()
        };

        for node in sim.nodes() {
            if node.failed {
                summary.nodes_failed += 1;
            }
            if node.online {
                summary.nodes_online += 1;
            }
            summary.data_loss_events += node.data_loss_events;
            summary.data_recovered_events += node.data_recovered;
            summary.backups_made += node.backups_made;
            summary.restores_made += node.restores_made;
            summary.vulnerable_blocks += node
                .backed_up_blocks
                .iter()
                .filter(|peer| peer.is_some())
                .count() as u64;
        }

        summary
    }

    pub fn data_loss_events_total(&self) -> u64 {
        self.data_loss_events
    }

    pub fn percent_nodes_failed(&self) -> f64 {
        if self.node_count == 0 {
            return 0.0;
        }
        100.0 * self.nodes_failed as f64 / self.node_count as f64
    }

    /// `data_recovered / data_loss_events`; 100% when no node has ever
    /// failed, since there was nothing to recover from.
    pub fn recovery_rate(&self) -> f64 {
        if self.data_loss_events == 0 {
            return 1.0;
        }
        self.data_recovered_events as f64 / self.data_loss_events as f64
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes: {} ({} online, {} failed)", self.node_count, self.nodes_online, self.nodes_failed)?;
        writeln!(f, "data loss events: {}", self.data_loss_events)?;
        writeln!(f, "data recovered events: {}", self.data_recovered_events)?;
        writeln!(f, "backups made: {}", self.backups_made)?;
        writeln!(f, "restores made: {}", self.restores_made)?;
        writeln!(f, "recovery rate: {:.2}%", self.recovery_rate() * 100.0)?;
        writeln!(f, "vulnerable blocks (single remote copy): {}", self.vulnerable_blocks)?;
        write!(f, "percent nodes failed: {:.2}%", self.percent_nodes_failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeClassConfig;
    use crate::sim::Simulation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn counts_three_nodes_with_two_backed_up_blocks_each_as_six_vulnerable() {
        let classes = vec![NodeClassConfig {
            class_name: "n".into(),
            number: 3,
            n: 4,
            k: 2,
            data_size: 4096,
            storage_size: 4096 * 4,
            upload_speed: 1_000_000.0,
            download_speed: 1_000_000.0,
            average_uptime: f64::INFINITY,
            average_downtime: 0.0,
            average_lifetime: f64::INFINITY,
            average_recover_time: 1.0,
            arrival_time: 0.0,
        }];
        let rng = StdRng::seed_from_u64(7);
        let mut sim = Simulation::new(&classes, rng).unwrap();
        sim.run(1_000_000.0).ok();

        let summary = sim.summary();
        assert!(summary.vulnerable_blocks > 0);
        assert_eq!(summary.nodes_failed, 0);
    }

    #[test]
    fn recovery_rate_is_full_when_nothing_has_ever_been_lost() {
        let summary = Summary::default();
        assert_eq!(summary.recovery_rate(), 1.0);
    }

    #[test]
    fn recovery_rate_is_recovered_over_loss_events_not_restores_over_backups() {
        let summary = Summary {
            data_loss_events: 4,
            data_recovered_events: 3,
            backups_made: 100,
            restores_made: 1,
            ..Summary::default()
        };
        assert_eq!(summary.recovery_rate(), 0.75);
    }
}
