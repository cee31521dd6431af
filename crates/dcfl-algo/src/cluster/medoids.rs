//! k-medoids (PAM build + swap) over a [`DistanceMatrix`].

use tracing::trace;

use super::distance::DistanceMatrix;

/// Medoids (ascending) and the label of every index.
#[derive(Debug, Clone, PartialEq)]
pub struct MedoidPartition {
    pub medoids: Vec<usize>,
    pub labels: Vec<usize>,
    /// Sum of distances to the assigned medoid
    pub cost: f64,
}

fn total_cost(d: &DistanceMatrix, medoids: &[usize]) -> f64 {
    (0..d.len())
        .map(|j| {
            medoids
                .iter()
                .map(|&m| d.get(j, m))
                .fold(f64::INFINITY, f64::min)
        })
        .sum()
}

/// Greedy BUILD: start from the most central index, then keep adding the
/// index that lowers the total cost most. Ties go to the lowest index.
fn build(d: &DistanceMatrix, k: usize) -> Vec<usize> {
    let n = d.len();
    let mut medoids: Vec<usize> = Vec::with_capacity(k);
    let mut nearest = vec![f64::INFINITY; n];

    while medoids.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for candidate in (0..n).filter(|c| !medoids.contains(c)) {
            let cost: f64 = (0..n)
                .map(|j| nearest[j].min(d.get(j, candidate)))
                .sum();
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((candidate, cost));
            }
        }
        let Some((chosen, _)) = best else { break };
        for (j, near) in nearest.iter_mut().enumerate() {
            *near = near.min(d.get(j, chosen));
        }
        medoids.push(chosen);
    }
    medoids
}

/// Steepest-descent SWAP passes until no exchange improves the cost.
fn swap(d: &DistanceMatrix, medoids: &mut [usize], max_passes: usize) -> f64 {
    let n = d.len();
    let mut cost = total_cost(d, medoids);
    for pass in 0..max_passes {
        let mut best: Option<(usize, usize, f64)> = None;
        for slot in 0..medoids.len() {
            for h in 0..n {
                if medoids.contains(&h) {
                    continue;
                }
                let old = medoids[slot];
                medoids[slot] = h;
                let trial = total_cost(d, medoids);
                medoids[slot] = old;
                if trial < best.map_or(cost, |(_, _, c)| c) - 1e-12 {
                    best = Some((slot, h, trial));
                }
            }
        }
        match best {
            Some((slot, h, trial)) => {
                trace!(pass, from = medoids[slot], to = h, cost = trial, "medoid swap");
                medoids[slot] = h;
                cost = trial;
            }
            None => break,
        }
    }
    cost
}

/// Partition `d` into `k` clusters (clamped to `[1, n]`).
pub fn pam(d: &DistanceMatrix, k: usize, max_swap_passes: usize) -> MedoidPartition {
    let n = d.len();
    if n == 0 {
        return MedoidPartition {
            medoids: Vec::new(),
            labels: Vec::new(),
            cost: 0.0,
        };
    }
    let k = k.clamp(1, n);
    let mut medoids = build(d, k);
    swap(d, &mut medoids, max_swap_passes);
    medoids.sort_unstable();

    let mut labels: Vec<usize> = (0..n)
        .map(|j| {
            let mut label = 0;
            for (c, &m) in medoids.iter().enumerate() {
                if d.get(j, m) < d.get(j, medoids[label]) {
                    label = c;
                }
            }
            label
        })
        .collect();
    // duplicates at distance zero must not pull a medoid into another cluster
    for (c, &m) in medoids.iter().enumerate() {
        labels[m] = c;
    }
    let cost = (0..n).map(|j| d.get(j, medoids[labels[j]])).sum();

    MedoidPartition {
        medoids,
        labels,
        cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight groups on a line: {0, 1, 2} near 0 and {3, 4} near 10.
    fn line() -> DistanceMatrix {
        let x: [f64; 5] = [0.0, 0.5, 1.0, 10.0, 10.4];
        DistanceMatrix::from_fn(x.len(), move |i, j| (x[i] - x[j]).abs())
    }

    #[test]
    fn test_two_groups_found() {
        let d = line();
        let part = pam(&d, 2, 10);
        assert_eq!(part.medoids, vec![1, 3]);
        assert_eq!(part.labels, vec![0, 0, 0, 1, 1]);
        assert!((part.cost - (0.5 + 0.5 + 0.4)).abs() < 1e-12);
    }

    #[test]
    fn test_medoids_belong_to_their_cluster() {
        // all points coincide
        let d = DistanceMatrix::from_fn(4, |_, _| 0.0);
        let part = pam(&d, 3, 10);
        assert_eq!(part.medoids.len(), 3);
        for (c, &m) in part.medoids.iter().enumerate() {
            assert_eq!(part.labels[m], c);
        }
        assert_eq!(part.labels.len(), 4);
    }

    #[test]
    fn test_k_clamped() {
        let d = line();
        assert_eq!(pam(&d, 0, 10).medoids.len(), 1);
        assert_eq!(pam(&d, 9, 10).medoids, vec![0, 1, 2, 3, 4]);
        assert_eq!(pam(&DistanceMatrix::from_fn(0, |_, _| 0.0), 2, 10).labels.len(), 0);
    }
}
