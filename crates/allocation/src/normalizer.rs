use crate::error::{AllocationError, Result};
use std::cmp::Ordering;

/// Largest-remainder apportionment of `total` whole units across claimants.
///
/// Each claimant's ideal share is proportional to its weight (an even split
/// when every weight is zero). Floors are assigned first, then leftover
/// units go one at a time to the largest fractional remainders, ties broken
/// by the larger weight and finally by input order. Per-claimant minimums
/// are honored; when lifting to a minimum overshoots the total, units are
/// taken back from the smallest remainders without dropping anyone below
/// their minimum.
///
/// The result always has the input length, every entry is a non-negative
/// integer, and the entries sum to exactly `total`. A minimums vector whose
/// sum exceeds `total` is rejected rather than silently reduced.
pub fn apportion(total: u32, weights: &[f64], minimums: Option<&[u32]>) -> Result<Vec<u32>> {
    let claimants = weights.len();
    if let Some(mins) = minimums {
        if mins.len() != claimants {
            return Err(AllocationError::LengthMismatch {
                claimants,
                minimums: mins.len(),
            });
        }
    }
    if claimants == 0 {
        return Ok(Vec::new());
    }
    if total == 0 {
        return Ok(vec![0; claimants]);
    }

    let mins: Vec<u32> = match minimums {
        Some(mins) => mins.to_vec(),
        None => vec![0; claimants],
    };
    let required: u64 = mins.iter().map(|&m| u64::from(m)).sum();
    if required > u64::from(total) {
        return Err(AllocationError::InfeasibleMinimums { required, total });
    }

    // negative or non-finite weights carry no claim
    let weights: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    let ideals: Vec<f64> = if weight_sum > 0.0 {
        weights
            .iter()
            .map(|w| f64::from(total) * w / weight_sum)
            .collect()
    } else {
        vec![f64::from(total) / claimants as f64; claimants]
    };

    let mut shares: Vec<u32> = ideals.iter().map(|&ideal| ideal.floor() as u32).collect();
    let remainders: Vec<f64> = ideals
        .iter()
        .zip(&shares)
        .map(|(&ideal, &floor)| ideal - f64::from(floor))
        .collect();

    for (share, &minimum) in shares.iter_mut().zip(&mins) {
        if *share < minimum {
            *share = minimum;
        }
    }

    let assigned: u64 = shares.iter().map(|&s| u64::from(s)).sum();
    match assigned.cmp(&u64::from(total)) {
        Ordering::Less => {
            let mut leftover = (u64::from(total) - assigned) as u32;
            let mut order: Vec<usize> = (0..claimants).collect();
            order.sort_by(|&a, &b| {
                remainders[b]
                    .partial_cmp(&remainders[a])
                    .unwrap_or(Ordering::Equal)
                    .then(
                        weights[b]
                            .partial_cmp(&weights[a])
                            .unwrap_or(Ordering::Equal),
                    )
                    .then(a.cmp(&b))
            });
            let mut cursor = 0usize;
            while leftover > 0 {
                shares[order[cursor % claimants]] += 1;
                leftover -= 1;
                cursor += 1;
            }
        }
        Ordering::Greater => {
            // minimum lifts overshot the total; walk the smallest
            // remainders and take units back without breaking a minimum
            let mut excess = (assigned - u64::from(total)) as u32;
            let mut order: Vec<usize> = (0..claimants).collect();
            order.sort_by(|&a, &b| {
                remainders[a]
                    .partial_cmp(&remainders[b])
                    .unwrap_or(Ordering::Equal)
                    .then(
                        weights[a]
                            .partial_cmp(&weights[b])
                            .unwrap_or(Ordering::Equal),
                    )
                    .then(a.cmp(&b))
            });
            let mut cursor = 0usize;
            let mut stalled = 0usize;
            while excess > 0 && stalled < claimants {
                let idx = order[cursor % claimants];
                if shares[idx] > mins[idx] {
                    shares[idx] -= 1;
                    excess -= 1;
                    stalled = 0;
                } else {
                    stalled += 1;
                }
                cursor += 1;
            }
        }
        Ordering::Equal => {}
    }

    Ok(shares)
}
