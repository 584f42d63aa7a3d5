//! Enthalpy ranking and selection weights for breeding.

use rand::Rng;

/// Sort `(index, enthalpy)` entries by ascending enthalpy.
pub fn sort_by_enthalpy(entries: &mut [(usize, f64)]) {
    entries.sort_by(|a, b| a.1.total_cmp(&b.1));
}

/// Build a cumulative selection-probability list over enthalpies sorted in
/// ascending order, weighting low enthalpies most.
///
/// The list intentionally covers one *fewer* entry than the input: the
/// worst structure keeps zero weight and is selected only when the random
/// draw exceeds every cumulative threshold (see [`select_index`]).
pub fn probability_list(sorted_enthalpies: &[f64]) -> Vec<f64> {
    let n = sorted_enthalpies.len();
    if n <= 1 {
        return Vec::new();
    }

    let lowest = sorted_enthalpies[0];
    let highest = sorted_enthalpies[n - 1];
    let spread = highest - lowest;

    // All structures at the same enthalpy: uniform weights
    if spread <= 1e-5 {
        let p = 1.0 / n as f64;
        let mut probs: Vec<f64> = (1..=n).map(|i| i as f64 * p).collect();
        probs.pop();
        return probs;
    }

    // Normalize to [0, 1], flip so the lowest enthalpy weighs most, then
    // accumulate into selection thresholds.
    let mut probs: Vec<f64> = sorted_enthalpies
        .iter()
        .map(|h| 1.0 - (h - lowest) / spread)
        .collect();
    let sum: f64 = probs.iter().sum();
    let mut acc = 0.0;
    for p in probs.iter_mut() {
        acc += *p / sum;
        *p = acc;
    }
    probs.pop();
    probs
}

/// Draw an index according to the cumulative thresholds from
/// [`probability_list`]. Returns a value in `0..=probs.len()`; the top
/// index selects the entry the list left uncovered.
pub fn select_index<R: Rng + ?Sized>(rng: &mut R, probs: &[f64]) -> usize {
    let r = rng.gen::<f64>();
    for (i, &p) in probs.iter().enumerate() {
        if r < p {
            return i;
        }
    }
    probs.len()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{probability_list, select_index, sort_by_enthalpy};

    #[test]
    fn test_sort_by_enthalpy() {
        let mut entries = vec![(0, 3.0), (1, -5.0), (2, 1.0)];
        sort_by_enthalpy(&mut entries);
        assert_eq!(
            entries.iter().map(|e| e.0).collect::<Vec<_>>(),
            vec![1, 2, 0]
        );
    }

    #[test]
    fn test_probability_list_worked_example() {
        // Enthalpies -5 -2 -1 3 5 normalize to 0 0.3 0.4 0.8 1, flip to
        // 1 0.7 0.6 0.2 0 (sum 2.5), accumulate to 0.4 0.68 0.92 1 1 and
        // drop the last entry.
        let probs = probability_list(&[-5.0, -2.0, -1.0, 3.0, 5.0]);
        assert_eq!(probs.len(), 4);
        assert_relative_eq!(probs[0], 0.4, epsilon = 1e-12);
        assert_relative_eq!(probs[1], 0.68, epsilon = 1e-12);
        assert_relative_eq!(probs[2], 0.92, epsilon = 1e-12);
        assert_relative_eq!(probs[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_probability_list_degenerate_spread() {
        let probs = probability_list(&[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(probs.len(), 3);
        assert_relative_eq!(probs[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(probs[2], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_selection_favors_low_enthalpy() {
        let probs = probability_list(&[-5.0, -2.0, -1.0, 3.0, 5.0]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut counts = [0usize; 5];
        for _ in 0..10_000 {
            counts[select_index(&mut rng, &probs)] += 1;
        }
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[3]);
        // The uncovered worst entry is still reachable but rare
        assert!(counts[4] < counts[0] / 10);
    }
}
