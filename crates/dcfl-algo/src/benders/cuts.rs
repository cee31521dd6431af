//! Benders optimality cuts.
//!
//! For one pair with ranking `k_1..k_m`, margins `π_s`, fallback margin `π_fb`
//! and a reference position `t` with value `V = π_t` (`π_fb` when `t = m+1`):
//!
//! ```text
//! z ≤ V + Σ_{s<t} (π_s − V)⁺ y_{k_s} + [t ≤ m] (max(π_fb, max_{s>t} π_s) − V)⁺ (1 − y_{k_t})
//! ```
//!
//! The right-hand side bounds the pair's margin for every binary `y` and is
//! exact whenever `k_t` is the first open option. At integer points `t` is
//! the first open option; at fractional points the `t` minimizing the
//! right-hand side gives the deepest member of the family. Block cuts are the
//! demand-weighted sums of their pair cuts.

use rayon::prelude::*;
use serde::Serialize;

use super::blocks::Block;
use super::model::{ChoiceModel, ChoiceRanking};

/// Origin of a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CutKind {
    /// Sums several block estimates
    Aggregate,
    /// Bounds a single block estimate
    Disaggregate,
    /// Generated before the first master solve
    Presolve,
}

/// `Σ_{b ∈ blocks} z_b ≤ constant + Σ coef · y`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BendersCut {
    pub kind: CutKind,
    pub blocks: Vec<usize>,
    pub constant: f64,
    /// Sparse (option, coefficient) pairs
    pub coefs: Vec<(usize, f64)>,
}

impl BendersCut {
    pub fn rhs(&self, y: &[f64]) -> f64 {
        self.constant + self.coefs.iter().map(|(k, c)| c * y[*k]).sum::<f64>()
    }

    /// Positive when `(z, y)` lies beyond the cut.
    pub fn violation(&self, z: &[f64], y: &[f64]) -> f64 {
        self.blocks.iter().map(|b| z[*b]).sum::<f64>() - self.rhs(y)
    }

    pub fn is_global(&self) -> bool {
        self.blocks.len() != 1
    }
}

/// Dense cut for one block, prior to aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCut {
    pub block: usize,
    pub constant: f64,
    pub coefs: Vec<f64>,
}

impl BlockCut {
    pub fn rhs(&self, y: &[f64]) -> f64 {
        self.constant + self.coefs.iter().zip(y).map(|(c, v)| c * v).sum::<f64>()
    }
}

/// Builds cuts from a [`ChoiceModel`].
#[derive(Debug, Clone, Copy)]
pub struct CutGenerator<'a> {
    model: &'a ChoiceModel,
}

impl<'a> CutGenerator<'a> {
    pub fn new(model: &'a ChoiceModel) -> Self {
        Self { model }
    }

    /// Cut for one block at master point `y`.
    pub fn block_cut(&self, block: &Block, y: &[f64], integral: bool) -> BlockCut {
        let mut constant = 0.0;
        let mut coefs = vec![0.0; self.model.n_options()];
        for &(n, r) in &block.pairs {
            let ranking = self.model.ranking(n, r);
            let t = if integral {
                ranking
                    .ranked
                    .iter()
                    .position(|ro| y[ro.option] > 0.5)
                    .unwrap_or(ranking.ranked.len())
            } else {
                deepest_reference(ranking, y)
            };
            add_pair_terms(ranking, t, self.model.weight(n), &mut constant, &mut coefs);
        }
        BlockCut {
            block: block.id,
            constant,
            coefs,
        }
    }

    /// Cuts for many blocks, in block order.
    pub fn block_cuts(&self, blocks: &[Block], y: &[f64], integral: bool) -> Vec<BlockCut> {
        blocks
            .par_iter()
            .map(|block| self.block_cut(block, y, integral))
            .collect()
    }
}

fn suffix_best(ranking: &ChoiceRanking) -> Vec<f64> {
    let m = ranking.ranked.len();
    let mut after = vec![ranking.fallback_margin; m];
    for t in (0..m.saturating_sub(1)).rev() {
        after[t] = after[t + 1].max(ranking.ranked[t + 1].margin);
    }
    after
}

/// Right-hand side of the pair cut with reference `t` evaluated at `y`.
pub fn pair_rhs(ranking: &ChoiceRanking, t: usize, y: &[f64]) -> f64 {
    let after = suffix_best(ranking);
    pair_rhs_with(ranking, &after, t, y)
}

fn pair_rhs_with(ranking: &ChoiceRanking, after: &[f64], t: usize, y: &[f64]) -> f64 {
    let m = ranking.ranked.len();
    let v = if t < m {
        ranking.ranked[t].margin
    } else {
        ranking.fallback_margin
    };
    let mut rhs = v;
    for ro in &ranking.ranked[..t.min(m)] {
        rhs += (ro.margin - v).max(0.0) * y[ro.option];
    }
    if t < m {
        rhs += (after[t] - v).max(0.0) * (1.0 - y[ranking.ranked[t].option]);
    }
    rhs
}

/// Reference position giving the smallest right-hand side at `y`.
pub fn deepest_reference(ranking: &ChoiceRanking, y: &[f64]) -> usize {
    let m = ranking.ranked.len();
    let after = suffix_best(ranking);
    let mut best_t = m;
    let mut best = pair_rhs_with(ranking, &after, m, y);
    for t in 0..m {
        let rhs = pair_rhs_with(ranking, &after, t, y);
        if rhs < best {
            best = rhs;
            best_t = t;
        }
    }
    best_t
}

fn add_pair_terms(
    ranking: &ChoiceRanking,
    t: usize,
    weight: f64,
    constant: &mut f64,
    coefs: &mut [f64],
) {
    let m = ranking.ranked.len();
    if t >= m {
        let v = ranking.fallback_margin;
        *constant += weight * v;
        for ro in &ranking.ranked {
            coefs[ro.option] += weight * (ro.margin - v).max(0.0);
        }
        return;
    }

    let v = ranking.ranked[t].margin;
    *constant += weight * v;
    for ro in &ranking.ranked[..t] {
        coefs[ro.option] += weight * (ro.margin - v).max(0.0);
    }
    let after = suffix_best(ranking);
    let d = (after[t] - v).max(0.0);
    *constant += weight * d;
    coefs[ranking.ranked[t].option] -= weight * d;
}

/// One cut per selected block.
pub fn disaggregate(cuts: &[BlockCut], selected: &[usize], kind: CutKind) -> Vec<BendersCut> {
    selected
        .iter()
        .map(|&b| BendersCut {
            kind,
            blocks: vec![cuts[b].block],
            constant: cuts[b].constant,
            coefs: sparse(&cuts[b].coefs),
        })
        .collect()
}

/// Sum of the selected block cuts.
pub fn aggregate(cuts: &[BlockCut], selected: &[usize], kind: CutKind) -> Option<BendersCut> {
    let first = selected.first()?;
    let mut dense = vec![0.0; cuts[*first].coefs.len()];
    let mut constant = 0.0;
    for &b in selected {
        constant += cuts[b].constant;
        for (acc, c) in dense.iter_mut().zip(&cuts[b].coefs) {
            *acc += c;
        }
    }
    Some(BendersCut {
        kind,
        blocks: selected.iter().map(|&b| cuts[b].block).collect(),
        constant,
        coefs: sparse(&dense),
    })
}

fn sparse(dense: &[f64]) -> Vec<(usize, f64)> {
    dense
        .iter()
        .enumerate()
        .filter(|(_, c)| **c != 0.0)
        .map(|(k, c)| (k, *c))
        .collect()
}
