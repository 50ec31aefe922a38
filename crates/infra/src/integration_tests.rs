//! End-to-end flows across catalog, router, ledger, reservations and the bus.
//!
//! Verifies:
//! - the three reference scenarios (reservation, gated adjustment, import negotiation)
//! - concurrent exits at one key never oversell
//! - opposite transfers between two keys do not deadlock
//! - entries reach bus subscribers only after they are committed

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use ledgergate_ai::{ClassifierProposal, ClassifierQuestion, MappedRow, ScriptedClassifier};
    use ledgergate_core::{DomainError, ErrorCategory};
    use ledgergate_events::EventBus;
    use ledgergate_inventory::{HilDecision, Movement, NegotiationState, StockThresholds, TaskStatus};

    use crate::audit::{AuditQuery, AuditSink};
    use crate::imports::{AnswerSet, StartImport};
    use crate::router::{BatchOutcome, SubmitOutcome};
    use crate::testing::{Fixture, conf, loc, pn};

    #[test]
    fn scenario_a_reserve_blocks_exit_then_cancel_restores() {
        let f = Fixture::new();
        f.stock("A", 100);

        let r = f.reservations.reserve(f.reserve_request("A", 30), "ana").unwrap();
        assert_eq!(f.available("A"), 70);

        let err = f
            .router
            .submit(Movement::exit(pn(), loc("A"), 80, "ana"), conf(0.99), None)
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InsufficientAvailable { available: 70, .. })));
        assert_eq!(err.category(), ErrorCategory::InsufficientStock);

        f.reservations.cancel(r.id, "ana").unwrap();
        assert_eq!(f.available("A"), 100);
        assert_eq!(f.quantity("A"), 100);
    }

    #[test]
    fn scenario_b_adjustment_is_gated_and_rejection_writes_nothing() {
        let f = Fixture::new();
        f.stock("A", 10);
        let entries_before = f.ledger.entries().unwrap().len();

        let SubmitOutcome::PendingHil { task_id, .. } = f
            .router
            .submit(Movement::adjustment(pn(), loc("A"), -2, "ana"), conf(0.99), None)
            .unwrap()
        else {
            panic!("adjustments always need approval");
        };
        f.router
            .resolve(task_id, HilDecision::Reject, "supervisor", Some("count was right".into()))
            .unwrap();

        assert_eq!(f.router.task_outcome(task_id).unwrap_err().category(), ErrorCategory::PolicyRejection);
        assert_eq!(f.ledger.entries().unwrap().len(), entries_before);
        assert_eq!(f.quantity("A"), 10);
        let rejected = f.audit.query(&AuditQuery {
            action: Some("task.rejected".into()),
            ..AuditQuery::default()
        });
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].actor, "supervisor");
    }

    #[test]
    fn scenario_c_import_negotiates_then_commits_autonomously() {
        let rows = vec![
            MappedRow {
                part_number: "PN-X".into(),
                location: "B".into(),
                quantity: 11,
                serial: None,
            },
            MappedRow {
                part_number: "PN-X".into(),
                location: "B".into(),
                quantity: 1,
                serial: Some("SN-0001".into()),
            },
        ];
        let round1 = ClassifierProposal {
            questions: vec![
                ClassifierQuestion {
                    id: "q1".into(),
                    prompt: "Which column holds the part number?".into(),
                    field: Some("part_number".into()),
                    options: vec!["Col A".into(), "Col C".into()],
                },
                ClassifierQuestion {
                    id: "q2".into(),
                    prompt: "Is 'Qty' in units or packs?".into(),
                    field: Some("quantity".into()),
                    options: vec![],
                },
            ],
            field_confidences: BTreeMap::from([("part_number".into(), 0.55), ("quantity".into(), 0.55)]),
            rows: rows.clone(),
            ..ClassifierProposal::default()
        };
        let round2 = ClassifierProposal {
            field_confidences: BTreeMap::from([("part_number".into(), 0.92), ("quantity".into(), 0.92)]),
            mapping: BTreeMap::from([("Col A".into(), "part_number".into()), ("Qty".into(), "quantity".into())]),
            rows,
            ready: true,
            ..ClassifierProposal::default()
        };
        let f = Fixture::with_classifier(ScriptedClassifier::new(vec![round1, round2]));

        let s = f
            .imports
            .start(
                StartImport {
                    file_ref: "uploads/q3-count.xlsx".into(),
                    schema: "part, location, qty".into(),
                },
                "ana",
            )
            .unwrap();
        assert_eq!(s.state, NegotiationState::QuestionsPending);

        let s = f
            .imports
            .answer(
                s.id,
                AnswerSet {
                    answers: BTreeMap::from([("q1".into(), "Col A".into()), ("q2".into(), "units".into())]),
                    comment: None,
                    expected_round: Some(1),
                },
                "ana",
            )
            .unwrap();
        assert_eq!(s.state, NegotiationState::ReadyForProcessing);

        let done = f.imports.execute(s.id, "ana", None).unwrap();
        assert!(matches!(done.outcome, BatchOutcome::Autonomous { .. }));
        assert_eq!(f.quantity("B"), 12);
        let serials: Vec<_> = f
            .ledger
            .entries()
            .unwrap()
            .iter()
            .filter_map(|e| e.payload().asset_serial.clone())
            .collect();
        assert_eq!(serials, vec!["SN-0001".to_string()]);
        assert!(f.router.list_tasks(Some(TaskStatus::Pending), None).is_empty());
    }

    #[test]
    fn concurrent_exits_never_oversell() {
        let f = Arc::new(Fixture::new());
        f.stock("A", 50);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let f = f.clone();
                thread::spawn(move || {
                    f.router
                        .submit(Movement::exit(pn(), loc("A"), 5, "picker"), conf(0.95), None)
                        .is_ok()
                })
            })
            .collect();
        let ok = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();

        assert_eq!(ok, 10);
        assert_eq!(f.quantity("A"), 0);
        assert!(f.projector.replay().unwrap().is_consistent());
    }

    #[test]
    fn opposite_transfers_do_not_deadlock() {
        let f = Arc::new(Fixture::new());
        f.stock("A", 1000);
        f.stock("B", 1000);

        let spawn = |from: &'static str, to: &'static str| {
            let f = f.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    f.router
                        .submit(Movement::transfer(pn(), loc(from), loc(to), 1, "mover"), conf(0.99), None)
                        .unwrap();
                }
            })
        };
        let ab = spawn("A", "B");
        let ba = spawn("B", "A");
        ab.join().unwrap();
        ba.join().unwrap();

        assert_eq!(f.quantity("A") + f.quantity("B"), 2000);
        assert_eq!(f.ledger.entries().unwrap().len(), 402);
    }

    #[test]
    fn committed_entries_reach_subscribers_in_order() {
        let f = Fixture::new();
        let sub = f.bus.subscribe();

        f.stock("A", 5);
        f.router
            .submit(Movement::exit(pn(), loc("A"), 9, "ana"), conf(0.99), None)
            .unwrap_err();
        f.router
            .submit(Movement::transfer(pn(), loc("A"), loc("B"), 2, "ana"), conf(0.99), None)
            .unwrap();

        let first = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!((first.sequence_number(), second.sequence_number()), (1, 2));
        assert!(sub.try_recv().is_err(), "rejected exit must not be published");
    }

    #[test]
    fn reorder_watch_worker_raises_alert() {
        let f = Fixture::new();
        f.catalog
            .set_thresholds(
                &pn(),
                StockThresholds {
                    minimum: 0,
                    maximum: None,
                    reorder_point: 4,
                },
                "ana",
            )
            .unwrap();
        f.stock("A", 10);
        let workers = f.start_workers().unwrap();

        f.router
            .submit(Movement::exit(pn(), loc("A"), 7, "ana"), conf(0.95), None)
            .unwrap();

        let mut alerts = Vec::new();
        for _ in 0..40 {
            alerts = f.alerts.all();
            if !alerts.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
        workers.shutdown();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].available, 3);
    }
}
