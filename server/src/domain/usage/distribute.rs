//! Integer proportional distribution (largest remainder)

/// Split `total` across `weights` so the shares sum to `total` exactly
///
/// Shares start at `floor(total * w / sum)`; leftover units go to the
/// largest remainders, lower index first on ties. A zero weight sum sends
/// everything to index 0. Negative weights count as zero.
pub fn distribute(total: i64, weights: &[i64]) -> Vec<i64> {
    if weights.is_empty() {
        return Vec::new();
    }
    if total <= 0 {
        return vec![0; weights.len()];
    }

    let weights: Vec<i128> = weights.iter().map(|w| i128::from((*w).max(0))).collect();
    let sum: i128 = weights.iter().sum();
    let total = i128::from(total);

    if sum == 0 {
        let mut shares = vec![0; weights.len()];
        shares[0] = total as i64;
        return shares;
    }

    let mut shares: Vec<i128> = weights.iter().map(|w| total * w / sum).collect();
    let mut remainder = total - shares.iter().sum::<i128>();

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = total * weights[a] % sum;
        let rb = total * weights[b] % sum;
        rb.cmp(&ra).then(a.cmp(&b))
    });

    for i in order {
        if remainder == 0 {
            break;
        }
        shares[i] += 1;
        remainder -= 1;
    }

    shares.into_iter().map(|s| s as i64).collect()
}
