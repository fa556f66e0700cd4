//! Minimum-cost bipartite assignment (Hungarian algorithm).
//!
//! Solves rectangular cost matrices by padding to square with zero-cost
//! virtual vertices. Non-finite costs are tolerated: positive infinity
//! is replaced by a finite value larger than any real cost (so such an
//! edge is only ever taken when nothing better exists; callers gate on
//! the original cost), negative infinity by zero.

use ndarray::{Array2, ArrayView2};

/// Result of a minimum-cost assignment.
#[derive(Debug, Clone)]
pub struct AssignmentSolution {
    /// For each row, the assigned column (None when rows outnumber
    /// columns and this row was left unassigned).
    pub row_to_col: Vec<Option<usize>>,
    /// Total cost of the assignment over the original matrix.
    pub total_cost: f64,
}

/// Solve the minimum-cost assignment for a rectangular cost matrix.
///
/// Every column is used at most once. With `m <= n` every row is
/// assigned; with `m > n` exactly `n` rows are. The solution is
/// deterministic for identical inputs.
pub fn min_cost_assignment(cost: &ArrayView2<f64>) -> AssignmentSolution {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return AssignmentSolution {
            row_to_col: vec![None; rows],
            total_cost: 0.0,
        };
    }

    // Sanitize non-finite entries: +inf becomes a "practical infinity"
    // strictly dominating every real cost, -inf becomes 0.
    let max_finite = cost
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let practical_infinity = if max_finite.is_finite() {
        2.0 * max_finite.max(0.0) + 1.0
    } else {
        1.0
    };
    let sanitize = |v: f64| {
        if v == f64::NEG_INFINITY {
            0.0
        } else if !v.is_finite() {
            // +inf and NaN both mean "never take this edge"
            practical_infinity
        } else {
            v
        }
    };

    // Pad to square with zero-cost virtual vertices; a constant dummy
    // cost does not change which real assignment is optimal.
    let size = rows.max(cols);
    let mut reduced = Array2::zeros((size, size));
    for i in 0..rows {
        for j in 0..cols {
            reduced[[i, j]] = sanitize(cost[[i, j]]);
        }
    }

    let stars = solve_square(&mut reduced);

    let mut row_to_col = vec![None; rows];
    let mut total_cost = 0.0;
    for i in 0..rows {
        for j in 0..cols {
            if stars[[i, j]] == STAR {
                row_to_col[i] = Some(j);
                total_cost += cost[[i, j]];
            }
        }
    }

    AssignmentSolution {
        row_to_col,
        total_cost,
    }
}

const STAR: u8 = 1;
const PRIME: u8 = 2;

/// Munkres' algorithm over a square all-finite matrix. Returns the mask
/// matrix with one starred zero per row and column.
fn solve_square(cost: &mut Array2<f64>) -> Array2<u8> {
    let size = cost.nrows();

    // Row reduction
    for mut row in cost.rows_mut() {
        let min = row.iter().copied().fold(f64::INFINITY, f64::min);
        row.mapv_inplace(|v| v - min);
    }

    // Initial starring of independent zeros
    let mut mask = Array2::<u8>::zeros((size, size));
    let mut row_covered = vec![false; size];
    let mut col_covered = vec![false; size];
    for i in 0..size {
        for j in 0..size {
            if cost[[i, j]] == 0.0 && !row_covered[i] && !col_covered[j] {
                mask[[i, j]] = STAR;
                row_covered[i] = true;
                col_covered[j] = true;
            }
        }
    }
    row_covered.fill(false);
    col_covered.fill(false);

    loop {
        // Cover every column containing a starred zero
        for j in 0..size {
            if (0..size).any(|i| mask[[i, j]] == STAR) {
                col_covered[j] = true;
            }
        }
        if col_covered.iter().filter(|&&c| c).count() == size {
            break;
        }

        // Prime uncovered zeros until an augmenting path appears
        loop {
            match find_uncovered_zero(cost, &row_covered, &col_covered) {
                None => {
                    // Adjust weights by the smallest uncovered value
                    let mut delta = f64::INFINITY;
                    for i in 0..size {
                        if row_covered[i] {
                            continue;
                        }
                        for j in 0..size {
                            if !col_covered[j] {
                                delta = delta.min(cost[[i, j]]);
                            }
                        }
                    }
                    for i in 0..size {
                        for j in 0..size {
                            if row_covered[i] {
                                cost[[i, j]] += delta;
                            }
                            if !col_covered[j] {
                                cost[[i, j]] -= delta;
                            }
                        }
                    }
                }
                Some((row, col)) => {
                    mask[[row, col]] = PRIME;
                    if let Some(star_col) = (0..size).find(|&j| mask[[row, j]] == STAR) {
                        row_covered[row] = true;
                        col_covered[star_col] = false;
                    } else {
                        augment_path(&mut mask, row, col);
                        row_covered.fill(false);
                        col_covered.fill(false);
                        mask.mapv_inplace(|m| if m == PRIME { 0 } else { m });
                        break;
                    }
                }
            }
        }
    }

    mask
}

fn find_uncovered_zero(
    cost: &Array2<f64>,
    row_covered: &[bool],
    col_covered: &[bool],
) -> Option<(usize, usize)> {
    let size = cost.nrows();
    for i in 0..size {
        if row_covered[i] {
            continue;
        }
        for j in 0..size {
            if !col_covered[j] && cost[[i, j]] == 0.0 {
                return Some((i, j));
            }
        }
    }
    None
}

/// Flip stars and primes along the alternating path starting at an
/// uncovered primed zero, growing the matching by one.
fn augment_path(mask: &mut Array2<u8>, prime_row: usize, prime_col: usize) {
    let size = mask.nrows();
    let mut path = vec![(prime_row, prime_col)];

    loop {
        let (_, col) = *path.last().unwrap();
        let Some(star_row) = (0..size).find(|&i| mask[[i, col]] == STAR) else {
            break;
        };
        path.push((star_row, col));

        let prime_col = (0..size)
            .find(|&j| mask[[star_row, j]] == PRIME)
            .expect("primed zero must exist in a covered row");
        path.push((star_row, prime_col));
    }

    for (i, j) in path {
        mask[[i, j]] = if mask[[i, j]] == STAR { 0 } else { STAR };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn assigned_pairs(solution: &AssignmentSolution) -> Vec<(usize, usize)> {
        solution
            .row_to_col
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|j| (i, j)))
            .collect()
    }

    #[test]
    fn test_identity_assignment() {
        let cost = array![[1.0, 10.0], [10.0, 1.0]];
        let solution = min_cost_assignment(&cost.view());
        assert_eq!(solution.row_to_col, vec![Some(0), Some(1)]);
        assert_relative_eq!(solution.total_cost, 2.0);
    }

    #[test]
    fn test_cross_assignment() {
        let cost = array![[10.0, 1.0], [1.0, 10.0]];
        let solution = min_cost_assignment(&cost.view());
        assert_eq!(solution.row_to_col, vec![Some(1), Some(0)]);
        assert_relative_eq!(solution.total_cost, 2.0);
    }

    #[test]
    fn test_three_by_three_optimum() {
        let cost = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [3.0, 6.0, 9.0]];
        let solution = min_cost_assignment(&cost.view());

        let pairs = assigned_pairs(&solution);
        assert_eq!(pairs.len(), 3);
        let mut cols: Vec<usize> = pairs.iter().map(|&(_, j)| j).collect();
        cols.sort_unstable();
        assert_eq!(cols, vec![0, 1, 2]);

        // Optimal is the anti-diagonal: 3 + 4 + 3 = 10
        assert_relative_eq!(solution.total_cost, 10.0);
    }

    #[test]
    fn test_infinity_forces_diagonal() {
        let cost = array![[1.0, f64::INFINITY], [f64::INFINITY, 2.0]];
        let solution = min_cost_assignment(&cost.view());
        assert_eq!(solution.row_to_col, vec![Some(0), Some(1)]);
        assert_relative_eq!(solution.total_cost, 3.0);
    }

    #[test]
    fn test_negative_infinity_is_free() {
        let cost = array![[f64::NEG_INFINITY, 5.0], [5.0, 3.0]];
        let solution = min_cost_assignment(&cost.view());
        // -inf counts as zero cost, so the diagonal (0 + 3) wins over 5 + 5
        assert_eq!(solution.row_to_col, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_wide_matrix_assigns_all_rows() {
        let cost = array![[5.0, 1.0, 3.0], [1.0, 5.0, 3.0]];
        let solution = min_cost_assignment(&cost.view());
        assert_eq!(solution.row_to_col, vec![Some(1), Some(0)]);
        assert_relative_eq!(solution.total_cost, 2.0);
    }

    #[test]
    fn test_tall_matrix_leaves_a_row_unassigned() {
        let cost = array![[1.0], [2.0], [3.0]];
        let solution = min_cost_assignment(&cost.view());
        let assigned = assigned_pairs(&solution);
        assert_eq!(assigned, vec![(0, 0)]);
    }

    #[test]
    fn test_empty_matrix() {
        let cost = Array2::<f64>::zeros((0, 4));
        let solution = min_cost_assignment(&cost.view());
        assert!(solution.row_to_col.is_empty());
        assert_relative_eq!(solution.total_cost, 0.0);
    }

    #[test]
    fn test_deterministic() {
        let cost = array![
            [4.0, 2.0, 8.0],
            [4.0, 3.0, 7.0],
            [3.0, 1.0, 6.0]
        ];
        let first = min_cost_assignment(&cost.view());
        for _ in 0..10 {
            let again = min_cost_assignment(&cost.view());
            assert_eq!(again.row_to_col, first.row_to_col);
        }
    }

    #[test]
    fn test_matches_brute_force_on_small_matrices() {
        // Exhaustive check over all 3! permutations
        let cost = array![
            [7.0, 5.0, 11.0],
            [5.0, 4.0, 1.0],
            [9.0, 3.0, 2.0]
        ];
        let solution = min_cost_assignment(&cost.view());

        let mut best = f64::INFINITY;
        let perms = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for perm in perms {
            let total: f64 = perm.iter().enumerate().map(|(i, &j)| cost[[i, j]]).sum();
            best = best.min(total);
        }

        assert_relative_eq!(solution.total_cost, best);
    }
}
