//! Tests for domain types and validation

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_tx_side_display_and_parse() {
        assert_eq!(TxSide::Buy.to_string(), "BUY");
        assert_eq!(TxSide::Sell.to_string(), "SELL");
        assert_eq!(TxSide::parse("buy"), Some(TxSide::Buy));
        assert_eq!(TxSide::parse("SELL"), Some(TxSide::Sell));
        assert_eq!(TxSide::parse("hold"), None);
    }

    #[test]
    fn test_new_transaction_validation() {
        let valid = NewTransaction {
            side: TxSide::Buy,
            trade_date: date("2024-01-10"),
            price: dec!(100.00),
            quantity: dec!(10),
            memo: None,
        };
        assert!(valid.validate().is_ok());

        let zero_price = NewTransaction {
            price: dec!(0),
            ..valid.clone()
        };
        assert!(zero_price.validate().is_err());

        let negative_quantity = NewTransaction {
            quantity: dec!(-5),
            ..valid
        };
        assert!(negative_quantity.validate().is_err());
    }

    #[test]
    fn test_new_split_validation() {
        let valid = NewSplit {
            effective_date: date("2024-02-01"),
            ratio: dec!(2),
            memo: None,
        };
        assert!(valid.validate().is_ok());

        let reverse = NewSplit {
            ratio: dec!(0.25),
            ..valid.clone()
        };
        assert!(reverse.validate().is_ok());

        let zero = NewSplit {
            ratio: dec!(0),
            ..valid
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_new_note_validation() {
        let valid = NewNote {
            note_date: date("2024-03-01"),
            content: "earnings beat expectations".to_string(),
            kind: NoteKind::Earnings,
            importance: Importance::High,
            reference_price: Some(dec!(182.50)),
        };
        assert!(valid.validate().is_ok());

        let empty = NewNote {
            content: "   ".to_string(),
            ..valid.clone()
        };
        assert!(empty.validate().is_err());

        let bad_price = NewNote {
            reference_price: Some(dec!(-1)),
            ..valid
        };
        assert!(bad_price.validate().is_err());
    }

    #[test]
    fn test_new_entry_validation() {
        let valid = NewEntry {
            owner_id: 1,
            symbol: "AAPL".to_string(),
            name: "Apple".to_string(),
            sector: Some("tech".to_string()),
            reason: None,
            memo: None,
            tags: vec!["value".to_string()],
        };
        assert!(valid.validate().is_ok());

        let blank_symbol = NewEntry {
            symbol: "".to_string(),
            ..valid
        };
        assert!(blank_symbol.validate().is_err());
    }

    #[test]
    fn test_note_kind_round_trip() {
        for kind in [
            NoteKind::Analysis,
            NoteKind::News,
            NoteKind::Earnings,
            NoteKind::Insight,
            NoteKind::Risk,
            NoteKind::Other,
        ] {
            assert_eq!(NoteKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NoteKind::parse("rumor"), None);
    }

    #[test]
    fn test_importance_round_trip() {
        for level in [Importance::High, Importance::Medium, Importance::Low] {
            assert_eq!(Importance::parse(level.as_str()), Some(level));
        }
        assert_eq!(Importance::parse("urgent"), None);
    }

    #[test]
    fn test_summary_flat_and_closed() {
        let mut summary = EntrySummary::default();
        assert!(summary.is_flat());
        assert!(!summary.is_closed());

        summary.first_purchase_date = Some(date("2024-01-10"));
        assert!(summary.is_closed());

        summary.current_quantity = dec!(10);
        assert!(!summary.is_closed());
    }

    #[test]
    fn test_canonical_sort_orders_by_date_then_creation() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let tx = |id: i64, trade_date: &str, offset_secs: i64| {
            LedgerEvent::Transaction(Transaction {
                id,
                entry_id: 1,
                side: TxSide::Buy,
                trade_date: date(trade_date),
                price: dec!(100),
                quantity: dec!(1),
                memo: None,
                created_at: base + Duration::seconds(offset_secs),
            })
        };
        let split = |id: i64, effective: &str, offset_secs: i64| {
            LedgerEvent::Split(StockSplit {
                id,
                entry_id: 1,
                effective_date: date(effective),
                ratio: dec!(2),
                memo: None,
                applied: true,
                created_at: base + Duration::seconds(offset_secs),
            })
        };

        let mut events = vec![
            tx(3, "2024-02-01", 30),
            split(9, "2024-01-15", 100),
            tx(1, "2024-01-15", 10),
            tx(2, "2024-01-15", 20),
        ];
        sort_canonical(&mut events);

        let order: Vec<NaiveDate> = events.iter().map(|e| e.event_date()).collect();
        assert_eq!(
            order,
            vec![
                date("2024-01-15"),
                date("2024-01-15"),
                date("2024-01-15"),
                date("2024-02-01"),
            ]
        );
        // within 2024-01-15 creation order wins: tx 1, tx 2, then the split
        match (&events[0], &events[1], &events[2]) {
            (
                LedgerEvent::Transaction(a),
                LedgerEvent::Transaction(b),
                LedgerEvent::Split(c),
            ) => {
                assert_eq!(a.id, 1);
                assert_eq!(b.id, 2);
                assert_eq!(c.id, 9);
            }
            _ => panic!("unexpected canonical order"),
        }
    }
}
