//! Rectangular linear assignment via shortest augmenting paths
//!
//! Solves minimum-cost matching on an m x n cost matrix where entries may
//! be `+inf` (forbidden pair). Every row is matched when m <= n, every
//! column when m > n. Based on the algorithm in:
//!
//! > DF Crouse. On implementing 2D rectangular assignment algorithms.
//! > IEEE Transactions on Aerospace and Electronic Systems
//! > 52(4):1679-1696, August 2016

use ndarray::ArrayView2;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlapError {
    /// No complete matching exists (some row/column sees only `+inf`).
    #[error("cost matrix is infeasible")]
    Infeasible,
    /// The matrix contains NaN or `-inf`.
    #[error("cost matrix contains NaN or -inf")]
    Invalid,
}

/// Matched pairs, row-ascending. `rows.len() == cols.len() == min(m, n)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

impl Assignment {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.iter().copied().zip(self.cols.iter().copied())
    }
}

/// Solve the rectangular linear assignment problem on `cost`.
///
/// `+inf` entries mark forbidden pairs; NaN and `-inf` are rejected as
/// [`RlapError::Invalid`]. The solver is pure and allocates only scratch
/// vectors sized by the inputs.
pub fn solve(cost: ArrayView2<'_, f32>) -> Result<Assignment, RlapError> {
    let (m, n) = cost.dim();
    if m == 0 || n == 0 {
        return Ok(Assignment::default());
    }

    // A tall matrix is transposed internally and the result un-transposed.
    let transpose = n < m;
    let (nr, nc) = if transpose { (n, m) } else { (m, n) };

    let matrix: Vec<f32> = if transpose {
        let mut t = vec![0.0f32; nr * nc];
        for i in 0..m {
            for j in 0..n {
                t[j * m + i] = cost[[i, j]];
            }
        }
        t
    } else {
        cost.iter().copied().collect()
    };

    if matrix.iter().any(|c| c.is_nan() || *c == f32::NEG_INFINITY) {
        return Err(RlapError::Invalid);
    }

    let mut state = SolverState::new(nr, nc);
    for cur_row in 0..nr {
        let (sink, min_val) = state.augmenting_path(&matrix, cur_row)?;

        // Update dual variables along the alternating tree.
        state.u[cur_row] += min_val;
        for i in 0..nr {
            if state.sr[i] && i != cur_row {
                state.u[i] += min_val - state.shortest_path_costs[state.col4row[i] as usize];
            }
        }
        for j in 0..nc {
            if state.sc[j] {
                state.v[j] -= min_val - state.shortest_path_costs[j];
            }
        }

        // Augment: swap assignments along the path back to cur_row.
        let mut j = sink as isize;
        loop {
            let i = state.path[j as usize] as usize;
            state.row4col[j as usize] = i as isize;
            let displaced = state.col4row[i];
            state.col4row[i] = j;
            if i == cur_row {
                break;
            }
            j = displaced;
        }
    }

    let mut result = Assignment::default();
    if transpose {
        // col4row maps original columns to original rows; emit row-ascending.
        let mut order: Vec<usize> = (0..nr).collect();
        order.sort_by_key(|&j| state.col4row[j]);
        for j in order {
            result.rows.push(state.col4row[j] as usize);
            result.cols.push(j);
        }
    } else {
        for i in 0..nr {
            result.rows.push(i);
            result.cols.push(state.col4row[i] as usize);
        }
    }
    Ok(result)
}

struct SolverState {
    u: Vec<f32>,
    v: Vec<f32>,
    shortest_path_costs: Vec<f32>,
    path: Vec<isize>,
    col4row: Vec<isize>,
    row4col: Vec<isize>,
    sr: Vec<bool>,
    sc: Vec<bool>,
    remaining: Vec<usize>,
}

impl SolverState {
    fn new(nr: usize, nc: usize) -> Self {
        Self {
            u: vec![0.0; nr],
            v: vec![0.0; nc],
            shortest_path_costs: vec![0.0; nc],
            path: vec![-1; nc],
            col4row: vec![-1; nr],
            row4col: vec![-1; nc],
            sr: vec![false; nr],
            sc: vec![false; nc],
            remaining: vec![0; nc],
        }
    }

    /// Dijkstra-style search for the shortest augmenting path rooted at
    /// `start_row`. Returns the sink column and the path cost.
    fn augmenting_path(
        &mut self,
        matrix: &[f32],
        start_row: usize,
    ) -> Result<(usize, f32), RlapError> {
        let nc = self.v.len();
        let mut min_val = 0.0f32;
        let mut i = start_row;

        // Filled in reverse so a constant cost matrix resolves to the
        // identity matching.
        let mut num_remaining = nc;
        for (it, slot) in self.remaining.iter_mut().enumerate() {
            *slot = nc - it - 1;
        }

        self.sr.fill(false);
        self.sc.fill(false);
        self.shortest_path_costs.fill(f32::INFINITY);

        loop {
            let mut index = usize::MAX;
            let mut lowest = f32::INFINITY;
            self.sr[i] = true;

            for it in 0..num_remaining {
                let j = self.remaining[it];
                let r = min_val + matrix[i * nc + j] - self.u[i] - self.v[j];
                if r < self.shortest_path_costs[j] {
                    self.path[j] = i as isize;
                    self.shortest_path_costs[j] = r;
                }

                // On ties prefer a column that yields a new sink node.
                if self.shortest_path_costs[j] < lowest
                    || (self.shortest_path_costs[j] == lowest && self.row4col[j] == -1)
                {
                    lowest = self.shortest_path_costs[j];
                    index = it;
                }
            }

            min_val = lowest;
            if min_val == f32::INFINITY {
                return Err(RlapError::Infeasible);
            }

            let j = self.remaining[index];
            self.sc[j] = true;
            num_remaining -= 1;
            self.remaining[index] = self.remaining[num_remaining];

            if self.row4col[j] == -1 {
                return Ok((j, min_val));
            }
            i = self.row4col[j] as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn total_cost(cost: &ndarray::Array2<f32>, a: &Assignment) -> f32 {
        a.pairs().map(|(i, j)| cost[[i, j]]).sum()
    }

    /// Exhaustive minimum over all matchings, for small matrices.
    fn brute_force_min(cost: &ndarray::Array2<f32>) -> f32 {
        let (m, n) = cost.dim();
        let (cols, k) = if m <= n { (n, m) } else { (m, n) };
        let mut best = f32::INFINITY;
        let mut perm: Vec<usize> = (0..cols).collect();
        permute(&mut perm, 0, &mut |p| {
            let mut c = 0.0;
            for i in 0..k {
                c += if m <= n {
                    cost[[i, p[i]]]
                } else {
                    cost[[p[i], i]]
                };
            }
            if c < best {
                best = c;
            }
        });
        best
    }

    fn permute(v: &mut Vec<usize>, k: usize, f: &mut impl FnMut(&[usize])) {
        if k == v.len() {
            f(v);
            return;
        }
        for i in k..v.len() {
            v.swap(k, i);
            permute(v, k + 1, f);
            v.swap(k, i);
        }
    }

    #[test]
    fn test_square_optimal() {
        let cost = array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        let a = solve(cost.view()).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(total_cost(&cost, &a), brute_force_min(&cost));
    }

    #[test]
    fn test_wide_matrix() {
        let cost = array![[10.0, 4.0, 6.0, 1.0], [5.0, 8.0, 3.0, 7.0]];
        let a = solve(cost.view()).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a.rows, vec![0, 1]);
        assert_eq!(total_cost(&cost, &a), brute_force_min(&cost));
    }

    #[test]
    fn test_tall_matrix_transposed() {
        let cost = array![[10.0, 5.0], [4.0, 8.0], [6.0, 3.0], [1.0, 7.0]];
        let a = solve(cost.view()).unwrap();
        assert_eq!(a.len(), 2);
        // Row-ascending output even through the internal transpose.
        let mut sorted = a.rows.clone();
        sorted.sort_unstable();
        assert_eq!(a.rows, sorted);
        assert_eq!(total_cost(&cost, &a), brute_force_min(&cost));
    }

    #[test]
    fn test_constant_cost_yields_identity() {
        let cost = ndarray::Array2::from_elem((2, 2), 1.0f32);
        let a = solve(cost.view()).unwrap();
        assert_eq!(a.rows, vec![0, 1]);
        assert_eq!(a.cols, vec![0, 1]);
    }

    #[test]
    fn test_forbidden_entries_avoided() {
        let inf = f32::INFINITY;
        let cost = array![[inf, 1.0, 2.0], [3.0, inf, 1.0], [2.0, 4.0, inf]];
        let a = solve(cost.view()).unwrap();
        for (i, j) in a.pairs() {
            assert!(cost[[i, j]].is_finite());
        }
    }

    #[test]
    fn test_infeasible() {
        let inf = f32::INFINITY;
        // Both rows can only take column 0.
        let cost = array![[1.0, inf], [2.0, inf]];
        assert_eq!(solve(cost.view()), Err(RlapError::Infeasible));
    }

    #[test]
    fn test_invalid_nan() {
        let cost = array![[1.0, f32::NAN], [2.0, 3.0]];
        assert_eq!(solve(cost.view()), Err(RlapError::Invalid));
    }

    #[test]
    fn test_invalid_neg_inf() {
        let cost = array![[1.0, f32::NEG_INFINITY], [2.0, 3.0]];
        assert_eq!(solve(cost.view()), Err(RlapError::Invalid));
    }

    #[test]
    fn test_empty() {
        let cost = ndarray::Array2::<f32>::zeros((0, 3));
        assert!(solve(cost.view()).unwrap().is_empty());
    }

    #[test]
    fn test_random_against_brute_force() {
        // Deterministic pseudo-random matrices up to 5x5.
        let mut seed = 0x9e3779b9u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed % 1000) as f32 / 100.0
        };
        for m in 1..=5usize {
            for n in 1..=5usize {
                let cost =
                    ndarray::Array2::from_shape_fn((m, n), |_| next());
                let a = solve(cost.view()).unwrap();
                assert_eq!(a.len(), m.min(n));
                let expected = brute_force_min(&cost);
                let got = total_cost(&cost, &a);
                assert!(
                    (got - expected).abs() < 1e-3,
                    "{m}x{n}: got {got}, expected {expected}"
                );
            }
        }
    }
}
