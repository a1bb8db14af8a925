//! Categorical statistics over property buffers.

use crate::property::Property;

/// Sorted list of distinct categories present in the property.
pub fn categories(prop: &Property) -> Vec<i32> {
    let mut cats: Vec<i32> = prop.iter().flatten().map(as_category).collect();
    cats.sort_unstable();
    cats.dedup();
    cats
}

/// Absolute frequency of each category, sorted by category.
pub fn frequencies(prop: &Property) -> Vec<(i32, u64)> {
    let mut counts: Vec<(i32, u64)> = Vec::new();
    for v in prop.iter().flatten() {
        let c = as_category(v);
        match counts.binary_search_by_key(&c, |&(k, _)| k) {
            Ok(pos) => counts[pos].1 += 1,
            Err(pos) => counts.insert(pos, (c, 1)),
        }
    }
    counts
}

/// Global category PDF, missing entries excluded, as ordered
/// `(category, weight)` pairs.
pub fn global_pdf(prop: &Property) -> Vec<(i32, f64)> {
    let freq = frequencies(prop);
    let total: u64 = freq.iter().map(|&(_, n)| n).sum();
    if total == 0 {
        return Vec::new();
    }
    freq.iter()
        .map(|&(c, n)| (c, n as f64 / total as f64))
        .collect()
}

/// Most frequent category among the given values, smallest category on
/// ties. `None` when the input is empty.
pub fn mode(values: impl IntoIterator<Item = f32>) -> Option<f32> {
    let mut counts: Vec<(i32, u64)> = Vec::new();
    for v in values {
        let c = as_category(v);
        match counts.binary_search_by_key(&c, |&(k, _)| k) {
            Ok(pos) => counts[pos].1 += 1,
            Err(pos) => counts.insert(pos, (c, 1)),
        }
    }
    // Counts are sorted by category, so the first maximum is the smallest.
    counts
        .iter()
        .max_by_key(|&&(c, n)| (n, std::cmp::Reverse(c)))
        .map(|&(c, _)| c as f32)
}

/// Categorical interpretation of a stored value.
#[inline]
pub fn as_category(v: f32) -> i32 {
    v.round() as i32
}
