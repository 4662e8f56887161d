use itertools::Itertools;

/// Group-by as an explicit `(key, aggregation)` pair.
///
/// Rows are stably sorted by `key`, cut into contiguous runs of equal keys, and
/// each run is folded by `aggregate`. Groups exist only where rows exist; no
/// calendar or key space is generated. Output is ordered by key.
pub fn aggregate_by<T, K, V, FK, FA>(
    rows: impl IntoIterator<Item = T>,
    key: FK,
    mut aggregate: FA,
) -> Vec<(K, V)>
where
    K: Ord,
    FK: Fn(&T) -> K,
    FA: FnMut(&K, Vec<T>) -> V,
{
    let mut rows = rows.into_iter().collect::<Vec<_>>();
    rows.sort_by(|a, b| key(a).cmp(&key(b)));

    let chunks = rows.into_iter().chunk_by(|r| key(r));
    let mut out = Vec::new();
    for (k, group) in &chunks {
        let value = aggregate(&k, group.collect());
        out.push((k, value));
    }
    out
}

/// Same as [`aggregate_by`] but keeps the grouped rows.
pub fn group_by_key<T, K, FK>(rows: impl IntoIterator<Item = T>, key: FK) -> Vec<(K, Vec<T>)>
where
    K: Ord,
    FK: Fn(&T) -> K,
{
    aggregate_by(rows, key, |_, group| group)
}
