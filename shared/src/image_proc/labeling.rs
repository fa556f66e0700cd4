//! Connected component labeling and moment extraction.
//!
//! Two-pass labeling with union-find equivalence resolution over
//! 8-connectivity (horizontal, vertical and diagonal neighbors), then
//! zeroth and first moments per component for sub-pixel centroids.

use ndarray::{Array2, ArrayView2};

/// Find the root label in the union-find parent table (with path
/// compression).
fn find_root(parents: &mut [usize], label: usize) -> usize {
    let mut current = label;
    while current != parents[current] {
        parents[current] = parents[parents[current]];
        current = parents[current];
    }
    current
}

/// Union two labels, keeping the smaller root as canonical.
fn union_labels(parents: &mut [usize], label1: usize, label2: usize) {
    let root1 = find_root(parents, label1);
    let root2 = find_root(parents, label2);
    if root1 != root2 {
        if root1 < root2 {
            parents[root2] = root1;
        } else {
            parents[root1] = root2;
        }
    }
}

/// Label maximal 8-connected components of a binary mask.
///
/// Background pixels get label 0; each component gets a consecutive
/// label starting from 1, numbered by the row-major position of the
/// first pixel encountered. That numbering is what defines detection
/// "discovery order" downstream.
pub fn connected_components(mask: &ArrayView2<bool>) -> Array2<usize> {
    let (height, width) = mask.dim();
    let mut labels = Array2::zeros((height, width));
    let mut label_count = 0;
    let mut parents = vec![0];

    for i in 0..height {
        for j in 0..width {
            if !mask[[i, j]] {
                continue;
            }

            // Already-visited 8-connected neighbors: left, up-left, up, up-right
            let mut neighbor_labels: [usize; 4] = [0; 4];
            let mut neighbor_count = 0;
            let mut push = |label: usize| {
                if label > 0 {
                    neighbor_labels[neighbor_count] = label;
                    neighbor_count += 1;
                }
            };
            if j > 0 {
                push(labels[[i, j - 1]]);
            }
            if i > 0 {
                if j > 0 {
                    push(labels[[i - 1, j - 1]]);
                }
                push(labels[[i - 1, j]]);
                if j + 1 < width {
                    push(labels[[i - 1, j + 1]]);
                }
            }

            if neighbor_count == 0 {
                label_count += 1;
                labels[[i, j]] = label_count;
                parents.push(label_count);
            } else {
                let neighbors = &neighbor_labels[..neighbor_count];
                let min_label = *neighbors.iter().min().unwrap();
                labels[[i, j]] = min_label;
                for &neighbor in neighbors {
                    if neighbor != min_label {
                        union_labels(&mut parents, min_label, neighbor);
                    }
                }
            }
        }
    }

    // Flatten the parent table, then map roots to consecutive labels
    for i in 1..parents.len() {
        find_root(&mut parents, i);
    }

    let mut relabel = vec![0; parents.len()];
    let mut next_label = 0;
    for i in 1..parents.len() {
        let root = parents[i];
        if relabel[root] == 0 {
            next_label += 1;
            relabel[root] = next_label;
        }
        relabel[i] = relabel[root];
    }

    labels.mapv_inplace(|l| if l > 0 { relabel[l] } else { 0 });
    labels
}

/// Zeroth and first moments of one labeled component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMoments {
    /// Component label (1-based)
    pub label: usize,
    /// Zeroth moment: pixel count
    pub area: f64,
    /// Centroid x (column), normalized first moment
    pub cx: f64,
    /// Centroid y (row), normalized first moment
    pub cy: f64,
}

/// Compute per-component moments from a labeled image.
///
/// Results are ordered by label, i.e. by component discovery order.
/// Components with zero mass cannot occur by construction and are
/// skipped if they somehow do.
pub fn component_moments(labels: &ArrayView2<usize>) -> Vec<ComponentMoments> {
    let max_label = labels.iter().copied().max().unwrap_or(0);
    if max_label == 0 {
        return Vec::new();
    }

    // Accumulate m00, m10 (x), m01 (y) per label
    let mut m00 = vec![0.0f64; max_label + 1];
    let mut m10 = vec![0.0f64; max_label + 1];
    let mut m01 = vec![0.0f64; max_label + 1];

    for ((row, col), &label) in labels.indexed_iter() {
        if label > 0 {
            m00[label] += 1.0;
            m10[label] += col as f64;
            m01[label] += row as f64;
        }
    }

    (1..=max_label)
        .filter(|&label| m00[label] > 0.0)
        .map(|label| ComponentMoments {
            label,
            area: m00[label],
            cx: m10[label] / m00[label],
            cy: m01[label] / m00[label],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mask_from(pattern: &[&[i32]]) -> Array2<bool> {
        let height = pattern.len();
        let width = pattern[0].len();
        Array2::from_shape_fn((height, width), |(i, j)| pattern[i][j] != 0)
    }

    fn assert_labels_match(labeled: &Array2<usize>, expected: &[&[i32]]) {
        for (i, row) in expected.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                assert_eq!(
                    labeled[[i, j]],
                    value as usize,
                    "mismatch at [{i}, {j}]: expected {value}, got {}",
                    labeled[[i, j]]
                );
            }
        }
    }

    #[test]
    fn test_empty_mask() {
        let mask = mask_from(&[&[0, 0, 0], &[0, 0, 0]]);
        let labeled = connected_components(&mask.view());
        assert!(labeled.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_single_component() {
        let mask = mask_from(&[
            &[0, 0, 0, 0],
            &[0, 1, 1, 0],
            &[0, 1, 1, 0],
            &[0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view());
        let expected: &[&[i32]] = &[
            &[0, 0, 0, 0],
            &[0, 1, 1, 0],
            &[0, 1, 1, 0],
            &[0, 0, 0, 0],
        ];
        assert_labels_match(&labeled, expected);
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        // 8-connectivity joins diagonal neighbors into one component
        let mask = mask_from(&[
            &[1, 0, 0, 0],
            &[0, 1, 0, 0],
            &[0, 0, 1, 0],
            &[0, 0, 0, 1],
        ]);
        let labeled = connected_components(&mask.view());
        let expected: &[&[i32]] = &[
            &[1, 0, 0, 0],
            &[0, 1, 0, 0],
            &[0, 0, 1, 0],
            &[0, 0, 0, 1],
        ];
        assert_labels_match(&labeled, expected);
    }

    #[test]
    fn test_separated_components_numbered_in_discovery_order() {
        let mask = mask_from(&[
            &[0, 0, 0, 0, 1],
            &[1, 1, 0, 0, 0],
            &[0, 0, 0, 0, 0],
            &[0, 0, 1, 0, 0],
        ]);
        let labeled = connected_components(&mask.view());
        let expected: &[&[i32]] = &[
            &[0, 0, 0, 0, 1],
            &[2, 2, 0, 0, 0],
            &[0, 0, 0, 0, 0],
            &[0, 0, 3, 0, 0],
        ];
        assert_labels_match(&labeled, expected);
    }

    #[test]
    fn test_u_shape_equivalence() {
        let mask = mask_from(&[
            &[0, 0, 0, 0, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view());
        let expected: &[&[i32]] = &[
            &[0, 0, 0, 0, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0],
        ];
        assert_labels_match(&labeled, expected);
    }

    #[test]
    fn test_complex_equivalence() {
        let mask = mask_from(&[
            &[0, 0, 0, 0, 0, 0, 0],
            &[0, 1, 1, 0, 1, 1, 0],
            &[0, 1, 0, 0, 0, 1, 0],
            &[0, 1, 0, 1, 0, 1, 0],
            &[0, 1, 0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view());
        // All foreground pixels join through the bottom row
        let max = labeled.iter().copied().max().unwrap();
        assert_eq!(max, 1);
    }

    #[test]
    fn test_component_moments_centroid() {
        // Plus-shaped component centered at (2, 2)
        let mask = mask_from(&[
            &[0, 0, 0, 0, 0],
            &[0, 0, 1, 0, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 1, 0, 0],
            &[0, 0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view());
        let moments = component_moments(&labeled.view());

        assert_eq!(moments.len(), 1);
        assert_relative_eq!(moments[0].area, 5.0);
        assert_relative_eq!(moments[0].cx, 2.0, epsilon = 1e-12);
        assert_relative_eq!(moments[0].cy, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_component_moments_subpixel() {
        // 2x1 horizontal pair: centroid halfway between columns 1 and 2
        let mask = mask_from(&[&[0, 1, 1, 0]]);
        let labeled = connected_components(&mask.view());
        let moments = component_moments(&labeled.view());

        assert_eq!(moments.len(), 1);
        assert_relative_eq!(moments[0].cx, 1.5, epsilon = 1e-12);
        assert_relative_eq!(moments[0].cy, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_moments_follow_discovery_order() {
        let mask = mask_from(&[
            &[0, 0, 0, 1, 1],
            &[0, 0, 0, 1, 1],
            &[1, 0, 0, 0, 0],
        ]);
        let labeled = connected_components(&mask.view());
        let moments = component_moments(&labeled.view());

        assert_eq!(moments.len(), 2);
        // The 2x2 block is discovered first (row-major)
        assert_relative_eq!(moments[0].area, 4.0);
        assert_relative_eq!(moments[1].area, 1.0);
        assert_relative_eq!(moments[1].cx, 0.0);
        assert_relative_eq!(moments[1].cy, 2.0);
    }
}
