//! Scheduler tick tests with a mocked transport and a manual clock

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;
use crate::config::SchedulerConfig;
use crate::store::Database;
use crate::types::{NewEntry, NewReminder};

#[derive(Clone)]
struct ManualClock {
    now: Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(parking_lot::Mutex::new(now)),
        }
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

async fn entry_with_reminder(db: &Database, fire_at: DateTime<Utc>) -> (i64, i64) {
    let entry_id = db
        .create_entry(&NewEntry {
            owner_id: 1,
            symbol: "AAPL".to_string(),
            name: "Apple".to_string(),
            sector: None,
            reason: None,
            memo: None,
            tags: Vec::new(),
        })
        .await
        .unwrap();
    let spec_id = db
        .insert_spec(
            entry_id,
            &NewReminder {
                fire_at,
                message: Some("check earnings".to_string()),
            },
        )
        .await
        .unwrap();
    (entry_id, spec_id)
}

#[tokio::test]
async fn s6_one_shot_fires_once_across_two_ticks() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;
    db.insert_subscription(1, "https://push.example/abc")
        .await
        .unwrap();

    let mut transport = MockPushTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_, _| PushOutcome::Delivered);

    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(
        db.clone(),
        transport,
        clock.clone(),
        SchedulerConfig::default(),
    );

    let first = scheduler.tick(None).await.unwrap();
    assert_eq!(first.examined, 1);
    assert_eq!(first.delivered, 1);

    let spec = db.get_spec(spec_id).await.unwrap();
    assert!(!spec.active);
    assert_eq!(spec.last_sent_at, Some(t0() + Duration::seconds(30)));

    // two minutes later the spec is inactive; nothing fires again
    clock.set(t0() + Duration::minutes(2));
    let second = scheduler.tick(None).await.unwrap();
    assert_eq!(second.examined, 0);
    assert_eq!(second.delivered, 0);
}

#[test]
fn dedup_window_suppresses_recent_deliveries() {
    let spec = NotificationSpec {
        id: 1,
        entry_id: 1,
        fire_at: t0(),
        message: None,
        active: true,
        last_sent_at: Some(t0() + Duration::seconds(30)),
        created_at: t0(),
    };
    let window = Duration::hours(24);

    assert!(in_dedup_window(&spec, t0() + Duration::minutes(2), window));
    assert!(in_dedup_window(&spec, t0() + Duration::hours(23), window));
    assert!(!in_dedup_window(
        &spec,
        t0() + Duration::hours(25),
        window
    ));
}

#[tokio::test]
async fn specs_older_than_grace_are_not_retried() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;

    let transport = MockPushTransport::new(); // no sends expected
    let clock = ManualClock::at(t0() + Duration::minutes(10));
    let scheduler = Scheduler::new(db.clone(), transport, clock, SchedulerConfig::default());

    let report = scheduler.tick(None).await.unwrap();
    assert_eq!(report.examined, 0);

    // the missed spec stays as-is; a flood on recovery is worse than a miss
    let spec = db.get_spec(spec_id).await.unwrap();
    assert!(spec.active);
    assert!(spec.last_sent_at.is_none());
}

#[tokio::test]
async fn delivery_log_written_even_without_subscriptions() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;

    let transport = MockPushTransport::new();
    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(db.clone(), transport, clock, SchedulerConfig::default());

    let report = scheduler.tick(None).await.unwrap();
    assert_eq!(report.delivered, 1);

    let deliveries = db.list_deliveries(1).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].title, "AAPL reminder");
    assert_eq!(deliveries[0].body, "check earnings");

    let spec = db.get_spec(spec_id).await.unwrap();
    assert!(!spec.active);
}

#[tokio::test]
async fn permanent_failure_deactivates_subscription() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;
    let dead_sub = db
        .insert_subscription(1, "https://push.example/dead")
        .await
        .unwrap();
    db.insert_subscription(1, "https://push.example/live")
        .await
        .unwrap();

    let mut transport = MockPushTransport::new();
    transport.expect_send().times(2).returning(move |sub, _| {
        if sub.endpoint.ends_with("dead") {
            PushOutcome::PermanentFailure
        } else {
            PushOutcome::Delivered
        }
    });

    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(db.clone(), transport, clock, SchedulerConfig::default());
    let report = scheduler.tick(None).await.unwrap();
    assert_eq!(report.delivered, 1);

    let subs = db.active_subscriptions(1).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert!(subs.iter().all(|s| s.id != dead_sub));
    assert!(!db.get_spec(spec_id).await.unwrap().active);
}

#[tokio::test]
async fn all_permanent_failures_still_count_as_delivered() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;
    db.insert_subscription(1, "https://push.example/gone")
        .await
        .unwrap();

    let mut transport = MockPushTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_, _| PushOutcome::PermanentFailure);

    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(db.clone(), transport, clock, SchedulerConfig::default());
    let report = scheduler.tick(None).await.unwrap();

    // retrying a gone endpoint forever helps nobody; history still exists
    assert_eq!(report.delivered, 1);
    assert!(!db.get_spec(spec_id).await.unwrap().active);
    assert_eq!(db.active_subscriptions(1).await.unwrap().len(), 0);
    assert_eq!(db.list_deliveries(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn transient_failure_retains_spec_for_next_tick() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;
    db.insert_subscription(1, "https://push.example/flaky")
        .await
        .unwrap();

    let mut transport = MockPushTransport::new();
    let mut calls = 0;
    transport.expect_send().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            PushOutcome::TransientFailure
        } else {
            PushOutcome::Delivered
        }
    });

    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(
        db.clone(),
        transport,
        clock.clone(),
        SchedulerConfig::default(),
    );

    let first = scheduler.tick(None).await.unwrap();
    assert_eq!(first.retained, 1);
    assert_eq!(first.delivered, 0);
    assert!(db.get_spec(spec_id).await.unwrap().active);

    clock.set(t0() + Duration::seconds(90));
    let second = scheduler.tick(None).await.unwrap();
    assert_eq!(second.delivered, 1);
    assert!(!db.get_spec(spec_id).await.unwrap().active);

    // both attempts appear in the history
    assert_eq!(db.list_deliveries(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancelled_specs_never_fire() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;
    db.cancel_spec(spec_id).await.unwrap();

    let transport = MockPushTransport::new();
    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(db.clone(), transport, clock, SchedulerConfig::default());

    let report = scheduler.tick(None).await.unwrap();
    assert_eq!(report.examined, 0);
}

#[tokio::test]
async fn owner_filter_limits_the_tick() {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    let (_, spec_id) = entry_with_reminder(&db, t0()).await;

    let other_entry = db
        .create_entry(&NewEntry {
            owner_id: 2,
            symbol: "MSFT".to_string(),
            name: "Microsoft".to_string(),
            sector: None,
            reason: None,
            memo: None,
            tags: Vec::new(),
        })
        .await
        .unwrap();
    db.insert_spec(
        other_entry,
        &NewReminder {
            fire_at: t0(),
            message: None,
        },
    )
    .await
    .unwrap();

    let transport = MockPushTransport::new();
    let clock = ManualClock::at(t0() + Duration::seconds(30));
    let scheduler = Scheduler::new(db.clone(), transport, clock, SchedulerConfig::default());

    // only owner 2's spec fires; owner 1's stays active
    let report = scheduler.tick(Some(2)).await.unwrap();
    assert_eq!(report.examined, 1);
    assert!(db.get_spec(spec_id).await.unwrap().active);
}
