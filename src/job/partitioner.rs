use super::types::Split;

/// Lines per split for a given input.
///
/// `ceil(file_size / n_splits)` when there are at least as many lines as
/// requested splits, otherwise one line per split.
pub fn partition_size(file_size: u32, n_splits: u32) -> u32 {
    if n_splits == 0 || file_size < n_splits {
        return 1;
    }
    let size = (file_size as u64).div_ceil(n_splits as u64);
    size as u32
}

/// Cuts `[0, file_size)` into contiguous, non-overlapping splits with ids
/// starting at 0. Never produces more splits than lines; the last split is
/// clamped to `file_size - 1`.
pub fn partition(file_size: u32, n_splits: u32) -> Vec<Split> {
    if file_size == 0 || n_splits == 0 {
        return Vec::new();
    }

    let size = partition_size(file_size, n_splits);
    let mut splits = Vec::with_capacity(file_size.div_ceil(size) as usize);

    let mut id = 0;
    let mut from = 0u32;
    while from < file_size {
        let to = from.saturating_add(size - 1).min(file_size - 1);
        splits.push(Split::new(id, from, to));
        id += 1;
        from = to + 1;
    }

    tracing::debug!(
        "Partitioned {} lines into {} splits of up to {} lines",
        file_size,
        splits.len(),
        size
    );

    splits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_ten_lines_three_splits() {
        let splits = partition(10, 3);
        assert_eq!(
            splits,
            vec![Split::new(0, 0, 3), Split::new(1, 4, 7), Split::new(2, 8, 9)]
        );
    }

    #[test]
    fn test_more_splits_than_lines() {
        let splits = partition(3, 8);
        assert_eq!(splits.len(), 3);
        for (i, split) in splits.iter().enumerate() {
            assert_eq!(split.id, i as u32);
            assert_eq!(split.from, split.to);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(0, 4).is_empty());
        assert!(partition(5, 0).is_empty());
    }
}
