//! Membership Module Tests
//!
//! ## Test Scopes
//! - **Table**: idempotent insert, removal, timer bookkeeping.
//! - **Ownership**: orphan placement never gives one split two owners.
//! - **Timer & Gate**: expiry, reset, and the pause that stops the clock.

#[cfg(test)]
mod tests {
    use crate::job::{Assignment, Split, WorkerId};
    use crate::membership::{InsertOutcome, LivenessTimer, MemberInfo, MembershipTable, PauseGate};
    use crate::rpc::{LocalPeer, WorkerRpc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn member(id: u32) -> MemberInfo {
        MemberInfo::new(WorkerId(id), format!("local://W{}", id))
    }

    fn handle(id: u32) -> Arc<dyn WorkerRpc> {
        Arc::new(LocalPeer::detached(format!("local://W{}", id)))
    }

    fn table_of(ids: &[u32]) -> MembershipTable {
        let mut table = MembershipTable::new();
        for id in ids {
            table.insert(member(*id), handle(*id), None);
        }
        table
    }

    fn idle_timer(id: u32) -> LivenessTimer {
        LivenessTimer::start(WorkerId(id), Duration::from_secs(60), PauseGate::new(), |_| {})
    }

    // ============================================================
    // TABLE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let mut table = MembershipTable::new();

        assert_eq!(table.insert(member(2), handle(2), None), InsertOutcome::Inserted);
        assert_eq!(table.insert(member(2), handle(2), None), InsertOutcome::Unchanged);
        assert_eq!(
            table.insert(member(2), handle(2), Some(idle_timer(2))),
            InsertOutcome::TimerFilled
        );
        assert_eq!(
            table.insert(member(2), handle(2), Some(idle_timer(2))),
            InsertOutcome::Unchanged
        );

        assert_eq!(table.len(), 1);
        assert!(table.has_timer(WorkerId(2)));
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_assignment() {
        let mut table = table_of(&[1]);
        table
            .set_assignment(Assignment::new(WorkerId(1), vec![Split::new(0, 0, 3)]))
            .unwrap();

        table.insert(member(1), handle(1), Some(idle_timer(1)));

        assert!(table.assignment(WorkerId(1)).is_some());
    }

    #[test]
    fn test_remove_unknown_member_is_state_error() {
        let mut table = table_of(&[1, 2]);

        assert!(table.remove(WorkerId(2)).is_ok());
        let err = table.remove(WorkerId(2)).err().unwrap();
        assert!(err.to_string().contains("W2"));
        assert_eq!(table.ids(), vec![WorkerId(1)]);
    }

    #[test]
    fn test_ids_are_sorted() {
        let table = table_of(&[3, 1, 2]);
        assert_eq!(table.ids(), vec![WorkerId(1), WorkerId(2), WorkerId(3)]);
    }

    #[test]
    fn test_reset_timer_needs_monitoring() {
        let table = table_of(&[1]);
        assert!(!table.reset_timer(WorkerId(1)));
        assert!(!table.reset_timer(WorkerId(9)));
    }

    #[test]
    fn test_set_assignment_for_unknown_member_fails() {
        let mut table = table_of(&[1]);
        let result = table.set_assignment(Assignment::new(WorkerId(5), vec![]));
        assert!(result.is_err());
    }

    // ============================================================
    // OWNERSHIP TESTS
    // ============================================================

    #[test]
    fn test_orphan_goes_to_preferred_when_idle() {
        let mut table = table_of(&[1, 2, 3]);
        let orphan = Assignment::new(WorkerId(2), vec![Split::new(1, 3, 5)]);

        let placed = table.place_orphan(&orphan, WorkerId(3)).unwrap();

        assert_eq!(placed.owner, WorkerId(3));
        assert_eq!(table.owners_of(1), vec![WorkerId(3)]);
    }

    #[test]
    fn test_orphan_falls_back_to_lowest_idle() {
        let mut table = table_of(&[1, 2, 3, 4]);
        table
            .set_assignment(Assignment::new(WorkerId(1), vec![Split::new(0, 0, 1)]))
            .unwrap();
        table
            .set_assignment(Assignment::new(WorkerId(3), vec![Split::new(2, 4, 5)]))
            .unwrap();
        let orphan = Assignment::new(WorkerId(9), vec![Split::new(1, 2, 3)]);

        let placed = table.place_orphan(&orphan, WorkerId(3)).unwrap();

        assert_eq!(placed.owner, WorkerId(2));
    }

    #[test]
    fn test_no_idle_member_leaves_orphan_unplaced() {
        let mut table = table_of(&[1, 2]);
        for id in [1, 2] {
            table
                .set_assignment(Assignment::new(WorkerId(id), vec![Split::new(id, id, id)]))
                .unwrap();
        }
        let orphan = Assignment::new(WorkerId(3), vec![Split::new(3, 3, 3)]);

        assert!(table.place_orphan(&orphan, WorkerId(1)).is_none());
        assert!(table.owners_of(3).is_empty());
        assert!(table.has_outstanding_work());
    }

    #[test]
    fn test_failure_then_placement_keeps_one_owner() {
        let mut table = table_of(&[1, 2, 3]);
        let work = Assignment::new(WorkerId(2), vec![Split::new(1, 3, 5)]);
        table.set_assignment(work).unwrap();

        let record = table.remove(WorkerId(2)).unwrap();
        let orphan = record.assignment.unwrap();
        table.place_orphan(&orphan, WorkerId(3)).unwrap();

        // A second report of the same failure finds nothing to move.
        assert!(table.remove(WorkerId(2)).is_err());
        assert_eq!(table.owners_of(1), vec![WorkerId(3)]);
        assert_eq!(table.busy_members(), vec![WorkerId(3)]);
    }

    #[test]
    fn test_take_assignment_empties_slot() {
        let mut table = table_of(&[1]);
        table
            .set_assignment(Assignment::new(WorkerId(1), vec![Split::new(0, 0, 0)]))
            .unwrap();

        assert!(table.take_assignment(WorkerId(1)).is_some());
        assert!(table.take_assignment(WorkerId(1)).is_none());
        assert!(!table.has_outstanding_work());
    }

    #[test]
    fn test_finish_ignores_splits_not_held() {
        let mut table = table_of(&[1, 2]);
        table
            .set_assignment(Assignment::new(WorkerId(2), vec![Split::new(2, 4, 5)]))
            .unwrap();

        // A late report for split 1, which this member no longer holds.
        assert!(table.finish_assignment(WorkerId(2), &[1]).is_none());
        assert!(table.finish_assignment(WorkerId(2), &[]).is_none());
        assert!(table.finish_assignment(WorkerId(1), &[2]).is_none());
        assert_eq!(table.owners_of(2), vec![WorkerId(2)]);
    }

    #[test]
    fn test_finish_accepts_resumed_subset() {
        let mut table = table_of(&[1, 2]);
        table
            .set_assignment(Assignment::new(
                WorkerId(2),
                vec![Split::new(1, 2, 3), Split::new(2, 4, 5)],
            ))
            .unwrap();

        let finished = table.finish_assignment(WorkerId(2), &[2]).unwrap();

        assert_eq!(finished.splits.len(), 2);
        assert!(!table.has_outstanding_work());
    }

    // ============================================================
    // TIMER & GATE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_timer_fires_once_without_lifeproofs() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = LivenessTimer::start(
            WorkerId(4),
            Duration::from_millis(50),
            PauseGate::new(),
            move |id| {
                assert_eq!(id, WorkerId(4));
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.is_finished());
    }

    #[tokio::test]
    async fn test_reset_postpones_expiry() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = LivenessTimer::start(
            WorkerId(1),
            Duration::from_millis(120),
            PauseGate::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            timer.reset();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_paused_gate_stops_the_clock() {
        let gate = PauseGate::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _timer = LivenessTimer::start(
            WorkerId(1),
            Duration::from_millis(50),
            gate.clone(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(gate.pause());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert!(gate.resume());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_releases_waiters() {
        let gate = PauseGate::new();
        assert!(gate.pause());
        assert!(!gate.pause());

        let waiter = gate.clone();
        let task = tokio::spawn(async move { waiter.wait_open().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_member_info_display() {
        assert_eq!(member(7).to_string(), "W7@local://W7");
    }
}
