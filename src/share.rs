/*!
Largest-remainder share allocation for adaptive-memory resizing: split a
fixed total number of bits across tasks in proportion to an "ideal" real
share, then (optionally) lift any task below a minimum share back up,
taking the bits it needed from whichever tasks can best spare them.

Grounded on `cerberus.py::calculate_shares`.
*/

use crate::error::{invariant, Result};

/// Distribute `register_size` total bits across `ideal_shares.len()` tasks.
///
/// Each task is guaranteed at least one bit (the final `+1`), and when
/// `is_min_share` is set every task is additionally guaranteed a share of
/// at least 5 bits, which requires `5 * ideal_shares.len() <= register_size`.
pub fn calculate_shares(register_size: i64, ideal_shares: &[f64], is_min_share: bool) -> Result<Vec<i64>> {
    let n = ideal_shares.len() as i64;
    let min_share_floor = 5;
    invariant!(
        !(is_min_share && min_share_floor * n > register_size),
        "cannot distribute {register_size} bits across {n} tasks while respecting the minimum share"
    );

    let denom = {
        let s: f64 = ideal_shares.iter().sum();
        if s > 0.0 { s } else { 1.0 }
    };
    let effective_register_size = register_size - n;
    let scaled: Vec<f64> = ideal_shares
        .iter()
        .map(|&x| x / denom * effective_register_size as f64)
        .collect();
    let mut base_shares: Vec<i64> = scaled.iter().map(|&x| x.floor() as i64).collect();
    let mut remaining = effective_register_size - base_shares.iter().sum::<i64>();
    let mut decimals: Vec<f64> = scaled
        .iter()
        .zip(&base_shares)
        .map(|(&x, &b)| x - b as f64)
        .collect();

    while remaining > 0 {
        let winner = largest_decimal_index(&decimals);
        base_shares[winner] += 1;
        decimals[winner] -= 1.0;
        remaining -= 1;
    }

    if is_min_share {
        let min_share = min_share_floor - 1;
        let mut deficit = 0i64;
        for i in 0..base_shares.len() {
            if base_shares[i] < min_share {
                deficit += min_share - base_shares[i];
                base_shares[i] = min_share;
                decimals[i] = f64::INFINITY;
            }
        }
        while deficit > 0 {
            let order = donor_order(&decimals, &base_shares);
            for idx in order {
                if base_shares[idx] > min_share {
                    base_shares[idx] -= 1;
                    decimals[idx] += 1.0;
                    deficit -= 1;
                    break;
                }
            }
        }
    }

    Ok(base_shares.into_iter().map(|x| x + 1).collect())
}

/// Index of the largest `decimals` entry, ties broken by lowest index
/// (matches the stability of Python's `sorted(..., reverse=True)`).
fn largest_decimal_index(decimals: &[f64]) -> usize {
    let mut best = 0;
    for i in 1..decimals.len() {
        if decimals[i] > decimals[best] {
            best = i;
        }
    }
    best
}

/// Indices ordered ascending by `(decimals[i], -base_shares[i])`, stable on
/// ties. Matches `sorted(range(len(decimals)), key=lambda i: (decimals[i], -base_shares[i]))`.
fn donor_order(decimals: &[f64], base_shares: &[i64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..decimals.len()).collect();
    indices.sort_by(|&a, &b| {
        decimals[a]
            .partial_cmp(&decimals[b])
            .unwrap()
            .then(base_shares[b].cmp(&base_shares[a]))
    });
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ideal_shares_split_evenly() {
        let shares = calculate_shares(32, &[1.0, 1.0, 1.0, 1.0], true).unwrap();
        assert_eq!(shares, vec![8, 8, 8, 8]);
        assert_eq!(shares.iter().sum::<i64>(), 32);
    }

    #[test]
    fn lopsided_ideal_shares_respect_minimum() {
        let shares = calculate_shares(32, &[100.0, 1.0, 1.0, 1.0], true).unwrap();
        assert_eq!(shares, vec![17, 5, 5, 5]);
        assert_eq!(shares.iter().sum::<i64>(), 32);
    }

    #[test]
    fn rejects_minimum_share_impossible_to_satisfy() {
        assert!(calculate_shares(10, &[1.0, 1.0, 1.0], true).is_err());
    }

    #[test]
    fn zero_ideal_shares_falls_back_to_even_split() {
        let shares = calculate_shares(20, &[0.0, 0.0, 0.0, 0.0], false).unwrap();
        assert_eq!(shares.iter().sum::<i64>(), 20);
    }
}
