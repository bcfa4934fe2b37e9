//! Joint principal-component projection for visualization.
//!
//! Every call fits a fresh projection on exactly the batch it is given and
//! applies it to that batch. Nothing is cached between calls, so coordinates
//! are only comparable within one returned batch.

use crate::UltragError;

const MAX_ITERATIONS: usize = 500;
const CONVERGENCE: f64 = 1e-12;

/// Reduce `vectors` to `target_dim` dimensions by principal-component analysis.
///
/// When there are fewer vectors than `target_dim` the projection is not
/// well defined and the input is returned unchanged. Components beyond the
/// rank of the batch come out as `0.0`.
///
/// Only the leading `target_dim` components are computed, by power iteration
/// with deflation on the Gram matrix, so the cost grows with
/// `n * n * target_dim` rather than with a full eigendecomposition.
///
/// Returns a [`UltragError::Validation`] if the vectors differ in length.
pub fn reduce(vectors: &[Vec<f32>], target_dim: usize) -> Result<Vec<Vec<f32>>, UltragError> {
    if vectors.len() < target_dim {
        return Ok(vectors.to_vec());
    }

    let n = vectors.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let dim = vectors[0].len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(UltragError::Validation(format!(
            "cannot project vectors of mixed dimension ({dim} and {})",
            bad.len()
        )));
    }

    // Mean-centre the batch.
    let mut mean = vec![0.0f64; dim];
    for v in vectors {
        for (m, x) in mean.iter_mut().zip(v) {
            *m += *x as f64;
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }
    let centered: Vec<Vec<f64>> = vectors
        .iter()
        .map(|v| v.iter().zip(&mean).map(|(x, m)| *x as f64 - m).collect())
        .collect();

    // The n x n Gram matrix shares its non-zero spectrum with the covariance
    // matrix; its eigenvectors scaled by sqrt(eigenvalue) are the PCA scores.
    let mut gram = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in i..n {
            let dot: f64 = centered[i].iter().zip(&centered[j]).map(|(a, b)| a * b).sum();
            gram[i][j] = dot;
            gram[j][i] = dot;
        }
    }

    let trace: f64 = (0..n).map(|i| gram[i][i]).sum();
    let tolerance = trace.abs().max(f64::MIN_POSITIVE) * 1e-12;
    let mut reduced = vec![vec![0.0f32; target_dim]; n];
    let mut found: Vec<Vec<f64>> = Vec::with_capacity(target_dim);

    for component in 0..target_dim {
        let Some((lambda, vector)) = dominant_eigenpair(&gram, &found) else {
            break;
        };
        if lambda <= tolerance {
            break;
        }

        let sigma = lambda.sqrt();
        let mut scores: Vec<f64> = vector.iter().map(|u| u * sigma).collect();

        // Deterministic sign: the largest-magnitude score is positive.
        let pivot = scores
            .iter()
            .copied()
            .fold(0.0f64, |acc, s| if s.abs() > acc.abs() { s } else { acc });
        if pivot < 0.0 {
            for s in &mut scores {
                *s = -*s;
            }
        }

        for (row, score) in scores.into_iter().enumerate() {
            reduced[row][component] = score as f32;
        }

        // Deflate: A := A - lambda * v * v^T
        for i in 0..n {
            for j in 0..n {
                gram[i][j] -= lambda * vector[i] * vector[j];
            }
        }
        found.push(vector);
    }

    Ok(reduced)
}

/// Power iteration for the dominant eigenpair of a symmetric positive
/// semi-definite matrix.
///
/// The iterate is kept orthogonal to `found` so rounding left over from
/// deflation cannot pull it back toward an earlier component. Returns `None`
/// when the matrix has nothing left outside `found`.
fn dominant_eigenpair(matrix: &[Vec<f64>], found: &[Vec<f64>]) -> Option<(f64, Vec<f64>)> {
    let n = matrix.len();

    // Fixed, irregular start so results repeat across runs.
    let mut v: Vec<f64> = (0..n)
        .map(|i| 1.0 + ((i as f64 + 1.0) * 0.618_033_988_749_895).fract())
        .collect();
    orthogonalize(&mut v, found);
    normalize(&mut v)?;

    for _ in 0..MAX_ITERATIONS {
        let mut next = mat_vec(matrix, &v);
        orthogonalize(&mut next, found);
        normalize(&mut next)?;

        let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b) * (a - b)).sum();
        v = next;
        if delta <= CONVERGENCE {
            break;
        }
    }

    // Rayleigh quotient of the unit iterate.
    let lambda: f64 = mat_vec(matrix, &v).iter().zip(&v).map(|(a, b)| a * b).sum();
    Some((lambda, v))
}

fn mat_vec(matrix: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let dot: f64 = v.iter().zip(b).map(|(x, y)| x * y).sum();
        for (x, y) in v.iter_mut().zip(b) {
            *x -= dot * y;
        }
    }
}

fn normalize(v: &mut [f64]) -> Option<()> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm <= f64::MIN_POSITIVE.sqrt() {
        return None;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
    }

    #[test]
    fn fewer_vectors_than_target_passes_through() {
        let input = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        let out = reduce(&input, 3).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn empty_batch_with_zero_target() {
        let out = reduce(&[], 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn output_has_target_dimension() {
        let input: Vec<Vec<f32>> = (0..6)
            .map(|i| (0..8).map(|j| ((i * 7 + j * 3) % 5) as f32).collect())
            .collect();
        let out = reduce(&input, 3).unwrap();
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|row| row.len() == 3));
    }

    #[test]
    fn planar_points_keep_pairwise_distances() {
        // Points on a plane embedded in 4-D: a 2-D projection is lossless.
        let input = vec![
            vec![0.0, 0.0, 1.0, 1.0],
            vec![3.0, 0.0, 1.0, 1.0],
            vec![0.0, 4.0, 1.0, 1.0],
            vec![3.0, 4.0, 1.0, 1.0],
            vec![1.0, 2.0, 1.0, 1.0],
        ];
        let out = reduce(&input, 2).unwrap();
        for i in 0..input.len() {
            for j in 0..input.len() {
                let original = distance(&input[i], &input[j]);
                let projected = distance(&out[i], &out[j]);
                assert!(
                    (original - projected).abs() < 1e-4,
                    "distance {i}-{j}: {original} vs {projected}"
                );
            }
        }
    }

    #[test]
    fn first_component_carries_most_variance() {
        let input = vec![
            vec![-10.0, 0.5, 0.0],
            vec![-5.0, -0.5, 0.0],
            vec![0.0, 0.5, 0.0],
            vec![5.0, -0.5, 0.0],
            vec![10.0, 0.5, 0.0],
        ];
        let out = reduce(&input, 2).unwrap();
        let var = |c: usize| out.iter().map(|r| r[c] * r[c]).sum::<f32>();
        assert!(var(0) > var(1));
    }

    #[test]
    fn rank_deficient_batch_pads_with_zeros() {
        let input = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]];
        let out = reduce(&input, 3).unwrap();
        for row in &out {
            assert_eq!(row[1], 0.0);
            assert_eq!(row[2], 0.0);
        }
        // Centred along one line; the middle point sits at the origin.
        assert!(out[1][0].abs() < 1e-6);
    }

    #[test]
    fn projection_is_centred() {
        let input = vec![
            vec![1.0, 9.0, 3.0],
            vec![4.0, 2.0, 8.0],
            vec![7.0, 5.0, 1.0],
            vec![2.0, 6.0, 4.0],
        ];
        let out = reduce(&input, 2).unwrap();
        for c in 0..2 {
            let sum: f32 = out.iter().map(|r| r[c]).sum();
            assert!(sum.abs() < 1e-4);
        }
    }

    #[test]
    fn sign_is_deterministic() {
        let input = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 0.0]];
        let out = reduce(&input, 1).unwrap();
        let max = out.iter().map(|r| r[0]).fold(f32::MIN, f32::max);
        let min = out.iter().map(|r| r[0]).fold(f32::MAX, f32::min);
        assert!(max.abs() >= min.abs());
    }

    #[test]
    fn large_batch_gives_orthogonal_components_in_variance_order() {
        // 200 vectors of 48 dimensions with per-axis scales 10, 5, 3.3, ...
        let input: Vec<Vec<f32>> = (0..200)
            .map(|i| {
                (0..48)
                    .map(|j| {
                        let scale = 10.0 / (j as f32 + 1.0);
                        scale * (i as f32 * 0.05 * (j as f32 + 1.0) + 0.3).sin()
                    })
                    .collect()
            })
            .collect();

        let out = reduce(&input, 3).unwrap();
        assert_eq!(out.len(), 200);

        let column = |c: usize| out.iter().map(|r| r[c] as f64).collect::<Vec<_>>();
        let dot = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>();
        let cols: Vec<Vec<f64>> = (0..3).map(column).collect();
        let var: Vec<f64> = cols.iter().map(|c| dot(c, c)).collect();

        assert!(var[0] >= var[1] && var[1] >= var[2] && var[2] > 0.0, "{var:?}");
        for a in 0..3 {
            for b in (a + 1)..3 {
                let cos = dot(&cols[a], &cols[b]) / (var[a] * var[b]).sqrt();
                assert!(cos.abs() < 1e-3, "components {a} and {b}: {cos}");
            }
        }
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let input = vec![vec![1.0, 2.0], vec![1.0]];
        let err = reduce(&input, 1).unwrap_err();
        assert!(matches!(err, UltragError::Validation(_)));
    }
}
