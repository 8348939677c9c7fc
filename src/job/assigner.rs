//! Round-robin dealing of splits over the known members and the controller ring.

use super::types::{Assignment, Split, WorkerId};

/// Backup owner for `worker`'s work: its successor on the ring of member ids.
///
/// `member_count` is the number of distinct members known to the computing
/// node, itself counted once. With ids `1..=n` the result is `worker + 1`,
/// wrapping from `n` back to `1`.
pub fn controller_for(worker: WorkerId, member_count: usize) -> WorkerId {
    let modulus = member_count as u64 + 1;
    let id = (worker.0 as u64 + 1) % modulus;
    if id == 0 {
        WorkerId(1)
    } else {
        WorkerId(id as u32)
    }
}

/// Deals `splits` over `members` in the order given.
///
/// Counts are dealt round-robin so earlier members pick up the remainder,
/// then each member takes a contiguous run of the split sequence. Members
/// that end up with nothing are left out of the result.
pub fn deal_splits(members: &[WorkerId], splits: &[Split]) -> Vec<Assignment> {
    if members.is_empty() {
        return Vec::new();
    }

    let mut counts = vec![0usize; members.len()];
    for i in 0..splits.len() {
        counts[i % members.len()] += 1;
    }

    let mut assignments = Vec::new();
    let mut next = 0;
    for (member, count) in members.iter().zip(counts) {
        if count == 0 {
            continue;
        }
        let chunk = splits[next..next + count].to_vec();
        next += count;
        assignments.push(Assignment::new(*member, chunk));
    }

    tracing::debug!(
        "Dealt {} splits over {} members ({} received work)",
        splits.len(),
        members.len(),
        assignments.len()
    );

    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::partitioner::partition;

    #[test]
    fn test_controller_ring_successor() {
        assert_eq!(controller_for(WorkerId(1), 3), WorkerId(2));
        assert_eq!(controller_for(WorkerId(2), 3), WorkerId(3));
        assert_eq!(controller_for(WorkerId(3), 3), WorkerId(1));
    }

    #[test]
    fn test_controller_single_member_points_at_one() {
        assert_eq!(controller_for(WorkerId(1), 1), WorkerId(1));
    }

    #[test]
    fn test_remainder_goes_to_earlier_members() {
        let members = [WorkerId(1), WorkerId(2), WorkerId(3)];
        let splits = partition(7, 7);
        let dealt = deal_splits(&members, &splits);

        let sizes: Vec<usize> = dealt.iter().map(|a| a.splits.len()).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        assert_eq!(dealt[0].splits.iter().map(|s| s.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(dealt[1].splits.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(dealt[2].splits.iter().map(|s| s.id).collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn test_fewer_splits_than_members() {
        let members = [WorkerId(1), WorkerId(2), WorkerId(3)];
        let splits = partition(2, 2);
        let dealt = deal_splits(&members, &splits);

        assert_eq!(dealt.len(), 2);
        assert_eq!(dealt[0].owner, WorkerId(1));
        assert_eq!(dealt[1].owner, WorkerId(2));
    }

    #[test]
    fn test_no_members_no_assignments() {
        assert!(deal_splits(&[], &partition(4, 2)).is_empty());
    }
}
