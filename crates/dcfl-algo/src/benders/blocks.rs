//! Partition of customer-scenario pairs into retained pairs and blocks.

use serde::Serialize;

use super::config::{ClusterDimension, CutGroups, Granularity, Retention};
use crate::error::{BendersError, BendersResult};

/// A group of decomposed pairs sharing one master estimate `z_b`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: usize,
    /// Set when every pair of the block belongs to one scenario
    pub scenario: Option<usize>,
    /// Set when every pair of the block belongs to one customer
    pub customer: Option<usize>,
    pub pairs: Vec<(usize, usize)>,
}

/// Which pairs stay in the master and how the rest is decomposed.
#[derive(Debug, Clone, Serialize)]
pub struct BlockLayout {
    pub granularity: Granularity,
    /// Pairs modeled with assignment variables in the master
    pub retained: Vec<(usize, usize)>,
    pub blocks: Vec<Block>,
}

impl BlockLayout {
    pub fn build(
        n_customers: usize,
        n_scenarios: usize,
        granularity: Granularity,
        retention: &Retention,
    ) -> BendersResult<Self> {
        match retention {
            Retention::Scenarios(mask) if mask.len() != n_scenarios => {
                return Err(BendersError::InvalidConfig(format!(
                    "scenario retention mask has {} entries, instance has {} scenarios",
                    mask.len(),
                    n_scenarios
                )));
            }
            Retention::Customers(mask) if mask.len() != n_customers => {
                return Err(BendersError::InvalidConfig(format!(
                    "customer retention mask has {} entries, instance has {} customers",
                    mask.len(),
                    n_customers
                )));
            }
            _ => {}
        }

        let mut retained = Vec::new();
        let mut decomposed = Vec::new();
        for n in 0..n_customers {
            for r in 0..n_scenarios {
                if retention.retains(n, r) {
                    retained.push((n, r));
                } else {
                    decomposed.push((n, r));
                }
            }
        }

        let mut blocks: Vec<Block> = Vec::new();
        match granularity {
            Granularity::Scenario => {
                for r in 0..n_scenarios {
                    let pairs: Vec<_> = decomposed.iter().copied().filter(|p| p.1 == r).collect();
                    if !pairs.is_empty() {
                        blocks.push(Block {
                            id: blocks.len(),
                            scenario: Some(r),
                            customer: None,
                            pairs,
                        });
                    }
                }
            }
            Granularity::Customer => {
                for n in 0..n_customers {
                    let pairs: Vec<_> = decomposed.iter().copied().filter(|p| p.0 == n).collect();
                    if !pairs.is_empty() {
                        blocks.push(Block {
                            id: blocks.len(),
                            scenario: None,
                            customer: Some(n),
                            pairs,
                        });
                    }
                }
            }
            Granularity::ScenarioCustomer => {
                for &(n, r) in &decomposed {
                    blocks.push(Block {
                        id: blocks.len(),
                        scenario: Some(r),
                        customer: Some(n),
                        pairs: vec![(n, r)],
                    });
                }
            }
        }

        Ok(Self {
            granularity,
            retained,
            blocks,
        })
    }

    /// True when nothing is decomposed.
    pub fn is_monolithic(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn num_decomposed_pairs(&self) -> usize {
        self.blocks.iter().map(|b| b.pairs.len()).sum()
    }

    /// Aggregate-cut group of every block. Blocks that span several indices
    /// of the clustered dimension fall into one shared group.
    pub fn groups(&self, cut_groups: Option<&CutGroups>) -> Vec<Vec<usize>> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let Some(groups) = cut_groups else {
            return vec![(0..self.blocks.len()).collect()];
        };
        let n_labels = groups.labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); n_labels + 1];
        for block in &self.blocks {
            let index = match groups.dimension {
                ClusterDimension::Scenario => block.scenario,
                ClusterDimension::Customer => block.customer,
            };
            let slot = index
                .and_then(|i| groups.labels.get(i).copied())
                .unwrap_or(n_labels);
            out[slot].push(block.id);
        }
        out.retain(|g| !g.is_empty());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_blocks_with_partial_retention() {
        let layout = BlockLayout::build(
            3,
            4,
            Granularity::Scenario,
            &Retention::Scenarios(vec![true, false, false, true]),
        )
        .unwrap();
        assert_eq!(layout.retained.len(), 6);
        assert_eq!(layout.blocks.len(), 2);
        assert_eq!(layout.blocks[0].scenario, Some(1));
        assert_eq!(layout.blocks[1].pairs, vec![(0, 2), (1, 2), (2, 2)]);
        assert_eq!(layout.num_decomposed_pairs(), 6);
    }

    #[test]
    fn test_pair_granularity_and_monolithic() {
        let layout =
            BlockLayout::build(2, 2, Granularity::ScenarioCustomer, &Retention::None).unwrap();
        assert_eq!(layout.blocks.len(), 4);
        assert!(layout.retained.is_empty());

        let mono = BlockLayout::build(2, 2, Granularity::Customer, &Retention::All).unwrap();
        assert!(mono.is_monolithic());
        assert_eq!(mono.retained.len(), 4);
    }

    #[test]
    fn test_mask_length_checked() {
        let err = BlockLayout::build(2, 3, Granularity::Scenario, &Retention::Customers(vec![true]))
            .unwrap_err();
        assert!(matches!(err, BendersError::InvalidConfig(_)));
    }

    #[test]
    fn test_groups_follow_cluster_labels() {
        let layout = BlockLayout::build(2, 4, Granularity::Scenario, &Retention::None).unwrap();
        let groups = CutGroups {
            dimension: ClusterDimension::Scenario,
            labels: vec![1, 0, 1, 0],
        };
        assert_eq!(layout.groups(Some(&groups)), vec![vec![1, 3], vec![0, 2]]);
        assert_eq!(layout.groups(None), vec![vec![0, 1, 2, 3]]);

        // customer blocks cannot be split by scenario labels
        let by_customer =
            BlockLayout::build(2, 4, Granularity::Customer, &Retention::None).unwrap();
        assert_eq!(by_customer.groups(Some(&groups)), vec![vec![0, 1]]);
    }
}
