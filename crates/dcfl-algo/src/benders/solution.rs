//! Engine results and the pool of explored configurations.

use std::time::Duration;

use serde::Serialize;

use super::model::Configuration;
use crate::cluster::ClusterAssignment;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// No violated cut remains at the reported solution.
    Converged,
    /// A node, iteration or time limit stopped the search.
    LimitReached,
}

/// Outcome for one facility.
#[derive(Debug, Clone, Serialize)]
pub struct FacilityOutcome {
    pub facility: usize,
    pub name: String,
    pub open: bool,
    /// Price charged; `None` for closed candidates
    pub price: Option<f64>,
    /// Menu position of the chosen price for candidates
    pub level: Option<usize>,
    /// Expected captured demand
    pub demand: f64,
    pub market_share: f64,
}

/// Entry of the [`SolutionPool`].
#[derive(Debug, Clone, Serialize)]
pub struct PoolEntry {
    pub levels: Vec<Option<usize>>,
    pub objective: f64,
    #[serde(skip)]
    pub configuration: Configuration,
}

/// Bounded pool of distinct integer configurations, best kept when full.
///
/// Memory stays within `capacity` entries. Callers that need every visited
/// configuration observe them as they are found instead (see
/// [`BendersOrchestrator::run_observed`](super::BendersOrchestrator::run_observed)).
#[derive(Debug, Clone)]
pub struct SolutionPool {
    capacity: usize,
    /// Retained entries, oldest first
    entries: Vec<PoolEntry>,
    accepted: usize,
}

impl SolutionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
            accepted: 0,
        }
    }

    /// Record a configuration; returns `false` if it is already pooled.
    pub fn insert(
        &mut self,
        configuration: Configuration,
        levels: Vec<Option<usize>>,
        objective: f64,
    ) -> bool {
        self.insert_entry(PoolEntry {
            levels,
            objective,
            configuration,
        })
    }

    pub fn insert_entry(&mut self, entry: PoolEntry) -> bool {
        if self.contains(&entry.configuration) {
            return false;
        }
        self.accepted += 1;
        if self.entries.len() == self.capacity {
            let worst = self
                .entries
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.objective.total_cmp(&b.1.objective))
                .map(|(i, e)| (i, e.objective));
            match worst {
                Some((i, objective)) if entry.objective > objective => {
                    self.entries.remove(i);
                }
                _ => return true,
            }
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, configuration: &Configuration) -> bool {
        self.entries.iter().any(|e| e.configuration == *configuration)
    }

    /// Distinct configurations accepted, including evicted ones.
    pub fn distinct_seen(&self) -> usize {
        self.accepted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.iter()
    }

    /// Best entry, earliest on ties.
    pub fn best(&self) -> Option<&PoolEntry> {
        self.entries.iter().fold(None, |best: Option<&PoolEntry>, e| match best {
            Some(b) if b.objective >= e.objective => Some(b),
            _ => Some(e),
        })
    }

    pub fn into_entries(self) -> Vec<PoolEntry> {
        self.entries
    }
}

/// Result of a Benders run.
#[derive(Debug, Clone, Serialize)]
pub struct BendersSolution {
    pub status: SolveStatus,
    /// True when the run converged
    pub optimal: bool,
    /// Expected profit of the reported configuration
    pub objective: f64,
    pub revenue: f64,
    pub fixed_cost: f64,
    /// Best proven upper bound
    pub best_bound: f64,
    /// `best_bound - objective`, zero when converged
    pub gap: f64,
    pub facilities: Vec<FacilityOutcome>,
    /// Chosen price level per facility (`None` = closed or existing)
    pub levels: Vec<Option<usize>>,
    pub iterations: usize,
    pub cuts_added: usize,
    pub nodes: usize,
    pub explored: Vec<PoolEntry>,
    pub clusters: Option<ClusterAssignment>,
    pub solve_time: Duration,
}

impl BendersSolution {
    pub fn open_facilities(&self) -> impl Iterator<Item = &FacilityOutcome> {
        self.facilities
            .iter()
            .filter(|f| f.open && f.level.is_some())
    }

    pub fn leader_demand(&self) -> f64 {
        self.open_facilities().map(|f| f.demand).sum()
    }

    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Benders Solution Summary\n{}\n", "=".repeat(40)));
        s.push_str(&format!(
            "Status: {}\n",
            match self.status {
                SolveStatus::Converged => "Converged",
                SolveStatus::LimitReached => "Limit reached (not proven optimal)",
            }
        ));
        s.push_str(&format!("Objective: {:.4}\n", self.objective));
        s.push_str(&format!("  Revenue: {:.4}\n", self.revenue));
        s.push_str(&format!("  Fixed cost: {:.4}\n", self.fixed_cost));
        s.push_str(&format!("Bound gap: {:.6}\n", self.gap));
        s.push_str(&format!(
            "Iterations: {}, cuts: {}, nodes: {}\n",
            self.iterations, self.cuts_added, self.nodes
        ));
        s.push_str(&format!("Solve Time: {:.2?}\n", self.solve_time));

        s.push_str("\nFacilities:\n");
        for f in &self.facilities {
            match (f.open, f.price) {
                (true, Some(price)) => s.push_str(&format!(
                    "  [OPEN]   {} @ {:.2} - demand {:.3} ({:.1}%)\n",
                    f.name,
                    price,
                    f.demand,
                    f.market_share * 100.0
                )),
                _ => s.push_str(&format!("  [CLOSED] {}\n", f.name)),
            }
        }
        if !self.explored.is_empty() {
            s.push_str(&format!("\nExplored solutions: {}\n", self.explored.len()));
        }
        if let Some(clusters) = &self.clusters {
            s.push_str(&format!(
                "Clusters: {} (medoids {:?})\n",
                clusters.n_clusters(),
                clusters.medoids
            ));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bits: &[bool]) -> Configuration {
        Configuration::from_open(bits.to_vec())
    }

    #[test]
    fn test_pool_deduplicates() {
        let mut pool = SolutionPool::new(4);
        assert!(pool.insert(config(&[true, false]), vec![Some(0)], 3.0));
        assert!(!pool.insert(config(&[true, false]), vec![Some(0)], 3.0));
        assert!(pool.insert(config(&[false, false]), vec![None], 1.0));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.distinct_seen(), 2);
        assert_eq!(pool.best().unwrap().objective, 3.0);
        assert!(pool.contains(&config(&[false, false])));
    }

    #[test]
    fn test_pool_keeps_best_when_full() {
        let mut pool = SolutionPool::new(2);
        pool.insert(config(&[false, false]), vec![], 1.0);
        pool.insert(config(&[true, false]), vec![], 2.0);
        pool.insert(config(&[false, true]), vec![], 5.0);
        pool.insert(config(&[true, true]), vec![], 0.5);
        let objectives: Vec<f64> = pool.iter().map(|e| e.objective).collect();
        assert_eq!(objectives, vec![2.0, 5.0]);
        assert_eq!(pool.distinct_seen(), 4);
    }

    #[test]
    fn test_pool_eviction_keeps_insertion_order() {
        let mut pool = SolutionPool::new(3);
        let bits = [
            [false, false, false],
            [true, false, false],
            [false, true, false],
            [false, false, true],
            [true, true, false],
        ];
        for (objective, b) in [4.0, 1.0, 6.0, 3.0, 5.0].into_iter().zip(&bits) {
            pool.insert(config(b), vec![], objective);
        }
        // 1.0 is evicted by 3.0, then 3.0 by 5.0
        let objectives: Vec<f64> = pool.iter().map(|e| e.objective).collect();
        assert_eq!(objectives, vec![4.0, 6.0, 5.0]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.distinct_seen(), 5);
        assert!(!pool.contains(&config(&bits[1])));
        assert_eq!(pool.best().unwrap().objective, 6.0);
    }
}
