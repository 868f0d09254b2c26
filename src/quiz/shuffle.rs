use rand::Rng;

/// Returns a fresh Fisher-Yates permutation of `items`.
///
/// The randomness source is passed in so callers (and tests) control it.
/// Empty and single-element inputs come back unchanged.
pub fn shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut mixed = items.to_vec();
    for i in (1..mixed.len()).rev() {
        let j = rng.gen_range(0..=i);
        mixed.swap(i, j);
    }
    mixed
}
