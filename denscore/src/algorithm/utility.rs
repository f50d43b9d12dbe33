//! Numeric helpers shared by the statistics kernels.

/// Absolute floor used when a variance-like quantity appears in a denominator.
pub const VARIANCE_EPSILON: f64 = 1e-12;

/// Population mean of a slice, 0.0 for empty input.
pub fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Population standard deviation of a slice, 0.0 for fewer than two values.
pub fn std(values: &[f32]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mu;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    var.max(0.0).sqrt()
}

/// Division with a guarded denominator: returns `fallback` when the
/// denominator is smaller than `VARIANCE_EPSILON` in magnitude.
#[inline]
pub fn guarded_div(num: f64, den: f64, fallback: f64) -> f64 {
    if den.abs() < VARIANCE_EPSILON {
        fallback
    } else {
        num / den
    }
}

/// Pearson correlation of two equal-length slices.
///
/// Returns 0.0 when either input has (near-)zero variance or fewer than two
/// points, so callers can rank scores without special-casing degenerate
/// windows.
pub fn pearson(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let ma = mean(&a[..n]);
    let mb = mean(&b[..n]);
    let mut cov = 0.0f64;
    let mut va = 0.0f64;
    let mut vb = 0.0f64;
    for i in 0..n {
        let da = a[i] as f64 - ma;
        let db = b[i] as f64 - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    let den = (va * vb).sqrt();
    if den < VARIANCE_EPSILON {
        return 0.0;
    }
    cov / den
}

/// Scale factor fitted by trimmed least squares: the `s` minimising
/// `sum_v (obs[v] - s * reference[v])^2` over the voxels that survive the
/// outlier cut `|obs[v] - s * reference[v]| <= cutoff * local_std[v]`.
///
/// The fit starts from the closed-form untrimmed solution and re-trims a
/// fixed number of rounds; it is deterministic for any input. Voxels with a
/// vanishing `local_std` are always kept so a constant ensemble does not
/// trim itself away. The result is clamped to be non-negative.
pub fn trimmed_scale_fit(
    obs: &[f32],
    reference: &[f32],
    local_std: &[f32],
    cutoff: f32,
    max_rounds: usize,
) -> f32 {
    let n = obs.len().min(reference.len());
    if n == 0 {
        return 1.0;
    }

    let solve = |keep: Option<&[bool]>| -> f64 {
        let mut num = 0.0f64;
        let mut den = 0.0f64;
        for v in 0..n {
            if let Some(mask) = keep {
                if !mask[v] {
                    continue;
                }
            }
            let o = obs[v] as f64;
            let r = reference[v] as f64;
            num += o * r;
            den += r * r;
        }
        guarded_div(num, den, 1.0)
    };

    let mut scale = solve(None);
    let mut keep = vec![true; n];
    for _ in 0..max_rounds {
        let mut kept = 0usize;
        for v in 0..n {
            let resid = (obs[v] as f64 - scale * reference[v] as f64).abs();
            let bound = (cutoff as f64) * local_std.get(v).copied().unwrap_or(0.0) as f64;
            keep[v] = bound < VARIANCE_EPSILON || resid <= bound;
            if keep[v] {
                kept += 1;
            }
        }
        // A badly corrupted starting scale can push every voxel outside the
        // cut; keep the half with the smallest residuals so the fit can
        // recover instead of bailing out on the contaminated solution.
        if kept < (n + 1) / 2 {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                let ra = (obs[a] as f64 - scale * reference[a] as f64).abs();
                let rb = (obs[b] as f64 - scale * reference[b] as f64).abs();
                ra.total_cmp(&rb).then(a.cmp(&b))
            });
            keep.iter_mut().for_each(|k| *k = false);
            for &v in order.iter().take((n + 1) / 2) {
                keep[v] = true;
            }
        }
        let refined = solve(Some(&keep));
        if (refined - scale).abs() < 1e-6 {
            scale = refined;
            break;
        }
        scale = refined;
    }
    scale.max(0.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_std() {
        let v = vec![1.0f32, 2.0, 3.0, 4.0];
        assert!((mean(&v) - 2.5).abs() < 1e-9);
        assert!((std(&v) - 1.118033988).abs() < 1e-6);
        assert_eq!(std(&[1.0f32]), 0.0);
    }

    #[test]
    fn test_pearson_perfect() {
        let a = vec![1.0f32, 2.0, 3.0, 4.0];
        let b = vec![2.0f32, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_degenerate_is_zero() {
        let a = vec![1.0f32, 1.0, 1.0];
        let b = vec![2.0f32, 4.0, 6.0];
        assert_eq!(pearson(&a, &b), 0.0);
    }

    #[test]
    fn test_trimmed_scale_exact() {
        let reference = vec![1.0f32, 2.0, 3.0, 4.0];
        let obs: Vec<f32> = reference.iter().map(|r| r * 2.0).collect();
        let local_std = vec![0.1f32; 4];
        let s = trimmed_scale_fit(&obs, &reference, &local_std, 1.5, 10);
        assert!((s - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_trimmed_scale_rejects_outlier() {
        let reference = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut obs: Vec<f32> = reference.clone();
        obs[2] += 50.0; // one corrupted voxel
        let local_std = vec![0.5f32; 6];
        let s = trimmed_scale_fit(&obs, &reference, &local_std, 1.5, 10);
        assert!((s - 1.0).abs() < 0.05, "scale was {}", s);
    }

    #[test]
    fn test_trimmed_scale_never_negative() {
        let reference = vec![1.0f32, 1.0, 1.0];
        let obs = vec![-3.0f32, -3.0, -3.0];
        let local_std = vec![0.1f32; 3];
        let s = trimmed_scale_fit(&obs, &reference, &local_std, 1.5, 10);
        assert!(s >= 0.0);
    }
}
