//! End-to-end tests over an in-memory database: the write path, the
//! projection invariant, split application, and the rebuild command.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::error::JournalError;
    use crate::journal::JournalService;
    use crate::ledger;
    use crate::money::round_display;
    use crate::store::Database;
    use crate::types::{
        EntrySummary, Importance, NewEntry, NewNote, NewReminder, NewSplit, NewTransaction,
        NoteKind, TxSide,
    };

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn service() -> JournalService {
        let db = Arc::new(Database::connect_in_memory().await.unwrap());
        JournalService::new(db)
    }

    async fn create_entry(service: &JournalService) -> i64 {
        service
            .create_entry(&NewEntry {
                owner_id: 1,
                symbol: "AAPL".to_string(),
                name: "Apple".to_string(),
                sector: Some("tech".to_string()),
                reason: Some("moat".to_string()),
                memo: None,
                tags: vec!["value".to_string()],
            })
            .await
            .unwrap()
    }

    fn buy(trade_date: &str, price: Decimal, quantity: Decimal) -> NewTransaction {
        NewTransaction {
            side: TxSide::Buy,
            trade_date: date(trade_date),
            price,
            quantity,
            memo: None,
        }
    }

    fn sell(trade_date: &str, price: Decimal, quantity: Decimal) -> NewTransaction {
        NewTransaction {
            side: TxSide::Sell,
            trade_date: date(trade_date),
            price,
            quantity,
            memo: None,
        }
    }

    /// P6: the persisted projection equals a fresh replay of the event log.
    async fn assert_projection_matches_replay(service: &JournalService, entry_id: i64) {
        let stored = service.get_summary(entry_id).await.unwrap();
        let events = service.db().list_events(entry_id).await.unwrap();
        let replayed = ledger::replay(&events).summary;
        assert_eq!(stored, replayed);
    }

    #[tokio::test]
    async fn round_trip_updates_projection() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(2000.00), dec!(100)))
            .await
            .unwrap();
        assert_projection_matches_replay(&service, entry_id).await;

        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(100));
        assert_eq!(summary.average_price, dec!(2000.00));

        service
            .append_transaction(entry_id, &sell("2024-03-20", dec!(2500.00), dec!(100)))
            .await
            .unwrap();
        assert_projection_matches_replay(&service, entry_id).await;

        let summary = service.get_summary(entry_id).await.unwrap();
        assert!(summary.is_flat());
        assert_eq!(summary.realized_profit, dec!(50000.00));
        assert_eq!(summary.first_purchase_date, Some(date("2024-01-10")));
        assert_eq!(summary.last_transaction_date, Some(date("2024-03-20")));
    }

    #[tokio::test]
    async fn deleting_a_transaction_recomputes() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(100.00), dec!(10)))
            .await
            .unwrap();
        let tx_id = service
            .append_transaction(entry_id, &buy("2024-02-10", dec!(200.00), dec!(10)))
            .await
            .unwrap();

        service.delete_transaction(tx_id).await.unwrap();
        assert_projection_matches_replay(&service, entry_id).await;

        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(10));
        assert_eq!(summary.average_price, dec!(100.00));
        assert_eq!(summary.transaction_count, 1);
    }

    #[tokio::test]
    async fn split_application_rewrites_history() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(5000.00), dec!(100)))
            .await
            .unwrap();
        let split_id = service
            .append_split(
                entry_id,
                &NewSplit {
                    effective_date: date("2024-02-01"),
                    ratio: dec!(2),
                    memo: None,
                },
            )
            .await
            .unwrap();

        // recorded but unapplied: the projection is untouched
        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(100));

        service.apply_split(split_id).await.unwrap();
        assert_projection_matches_replay(&service, entry_id).await;

        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(200));
        assert_eq!(summary.average_price, dec!(2500.00));
        assert_eq!(summary.total_cost, dec!(500000.00));
        assert_eq!(summary.realized_profit, Decimal::ZERO);

        // applying twice never double-counts
        service.apply_split(split_id).await.unwrap();
        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(200));

        service
            .append_transaction(entry_id, &sell("2024-03-01", dec!(3000.00), dec!(100)))
            .await
            .unwrap();
        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.realized_profit, dec!(50000.00));
    }

    #[tokio::test]
    async fn applied_splits_cannot_be_deleted() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(100.00), dec!(10)))
            .await
            .unwrap();
        let split_id = service
            .append_split(
                entry_id,
                &NewSplit {
                    effective_date: date("2024-02-01"),
                    ratio: dec!(2),
                    memo: None,
                },
            )
            .await
            .unwrap();

        service.apply_split(split_id).await.unwrap();
        let result = service.delete_split(split_id).await;
        assert!(matches!(result, Err(JournalError::Validation(_))));

        // an unapplied split deletes cleanly
        let pending = service
            .append_split(
                entry_id,
                &NewSplit {
                    effective_date: date("2024-03-01"),
                    ratio: dec!(3),
                    memo: None,
                },
            )
            .await
            .unwrap();
        service.delete_split(pending).await.unwrap();
    }

    #[tokio::test]
    async fn validation_and_not_found_errors() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        let result = service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(0), dec!(10)))
            .await;
        assert!(matches!(result, Err(JournalError::Validation(_))));

        let result = service
            .append_transaction(9999, &buy("2024-01-10", dec!(100), dec!(10)))
            .await;
        assert!(matches!(
            result,
            Err(JournalError::NotFound { kind: "entry", .. })
        ));

        let result = service.get_summary(9999).await;
        assert!(matches!(result, Err(JournalError::NotFound { .. })));
    }

    #[tokio::test]
    async fn recalculate_repairs_a_diverged_projection() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(2000.00), dec!(100)))
            .await
            .unwrap();

        // simulate projection drift: write a bogus summary directly
        let bogus = EntrySummary {
            current_quantity: dec!(999),
            realized_profit: dec!(-1),
            ..EntrySummary::default()
        };
        service.db().write_summary(entry_id, &bogus).await.unwrap();

        service.recalculate_entry(entry_id).await.unwrap();
        assert_projection_matches_replay(&service, entry_id).await;

        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(100));
        assert_eq!(summary.realized_profit, Decimal::ZERO);
    }

    #[tokio::test]
    async fn recalculate_covers_a_whole_owner() {
        let service = service().await;
        let first = create_entry(&service).await;
        let second = service
            .create_entry(&NewEntry {
                owner_id: 1,
                symbol: "MSFT".to_string(),
                name: "Microsoft".to_string(),
                sector: None,
                reason: None,
                memo: None,
                tags: Vec::new(),
            })
            .await
            .unwrap();

        for entry_id in [first, second] {
            service
                .append_transaction(entry_id, &buy("2024-01-10", dec!(100.00), dec!(5)))
                .await
                .unwrap();
        }

        let count = service.recalculate(Some(1)).await.unwrap();
        assert_eq!(count, 2);
        assert_projection_matches_replay(&service, first).await;
        assert_projection_matches_replay(&service, second).await;
    }

    #[tokio::test]
    async fn trail_reflects_the_event_log() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(2000.00), dec!(100)))
            .await
            .unwrap();
        service
            .append_transaction(entry_id, &sell("2024-03-20", dec!(2600.00), dec!(60)))
            .await
            .unwrap();

        let trail = service.get_trail(entry_id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].holding_quantity, dec!(100));
        assert_eq!(trail[1].holding_quantity, dec!(40));
        assert_eq!(
            round_display(trail[1].realized_profit.unwrap()),
            dec!(36000.00)
        );
    }

    #[tokio::test]
    async fn notes_and_reminders_lifecycle() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        service
            .add_note(
                entry_id,
                &NewNote {
                    note_date: date("2024-02-01"),
                    content: "guidance raised".to_string(),
                    kind: NoteKind::Earnings,
                    importance: Importance::High,
                    reference_price: Some(dec!(195.00)),
                },
            )
            .await
            .unwrap();
        let notes = service.list_notes(entry_id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NoteKind::Earnings);

        let spec_id = service
            .schedule_reminder(
                entry_id,
                &NewReminder {
                    fire_at: chrono::Utc::now(),
                    message: Some("review thesis".to_string()),
                },
            )
            .await
            .unwrap();
        service.cancel_reminder(spec_id).await.unwrap();
        let spec = service.db().get_spec(spec_id).await.unwrap();
        assert!(!spec.active);
    }

    #[tokio::test]
    async fn deleting_an_entry_cascades() {
        let service = service().await;
        let entry_id = create_entry(&service).await;

        let tx_id = service
            .append_transaction(entry_id, &buy("2024-01-10", dec!(100.00), dec!(10)))
            .await
            .unwrap();
        service.delete_entry(entry_id).await.unwrap();

        assert!(matches!(
            service.get_entry(entry_id).await,
            Err(JournalError::NotFound { .. })
        ));
        assert!(matches!(
            service.db().get_transaction(tx_id).await,
            Err(JournalError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_writers_on_one_entry_serialize() {
        let service = Arc::new(service().await);
        let entry_id = create_entry(&service).await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .append_transaction(
                        entry_id,
                        &buy("2024-01-10", dec!(100.00), Decimal::from(i + 1)),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_projection_matches_replay(&service, entry_id).await;
        let summary = service.get_summary(entry_id).await.unwrap();
        assert_eq!(summary.current_quantity, dec!(10)); // 1+2+3+4
        assert_eq!(summary.transaction_count, 4);
    }
}
