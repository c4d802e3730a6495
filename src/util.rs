use rand::Rng;

/// Returns the index of a maximal value, breaking ties uniformly at random
///
/// This is the one tie-break policy shared by every agent in the crate, so
/// greedy action selection never collapses to the lowest index when several
/// actions have equal value.
///
/// **Panics** if `values` is empty or contains a NaN.
pub fn random_argmax<R: Rng>(values: &[f64], rng: &mut R) -> usize {
    assert!(!values.is_empty(), "`values` must not be empty");
    let max = values
        .iter()
        .copied()
        .max_by(|a, b| a.partial_cmp(b).expect("`values` must not contain NaN"))
        .unwrap();
    let ties = values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v == max)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    ties[rng.gen_range(0..ties.len())]
}
