//! Session history purge scenarios.
//!
//! Retention is 20 days. "Old" sessions were last accessed 30 days ago,
//! "recent" ones 10 days ago; all were created 50 days ago.

#![allow(clippy::unwrap_used)]

use std::num::NonZeroU32;

use sweeper_core::{CartContents, CustomerKind, CustomerSession, Shopper};
use sweeper_integration_tests::Fixture;
use sweeper_jobs::jobs::SessionPurgeReport;
use sweeper_jobs::scheduler;

const RETENTION_DAYS: u32 = 20;
const OLD: i64 = 30;
const RECENT: i64 = 10;

#[derive(Default)]
struct Tracking {
    deleted_sessions: Vec<CustomerSession>,
    kept_sessions: Vec<CustomerSession>,
    deleted_shoppers: Vec<Shopper>,
    kept_shoppers: Vec<Shopper>,
}

impl Tracking {
    fn session(&mut self, session: CustomerSession, deleted: bool) {
        if deleted {
            self.deleted_sessions.push(session);
        } else {
            self.kept_sessions.push(session);
        }
    }

    fn shopper(&mut self, shopper: Shopper, deleted: bool) {
        if deleted {
            self.deleted_shoppers.push(shopper);
        } else {
            self.kept_shoppers.push(shopper);
        }
    }

    async fn verify(&self, fixture: &Fixture, pass: u32) {
        for session in &self.kept_sessions {
            assert!(
                fixture.store.session(session.id).await.is_some(),
                "session {} should not be deleted (pass {pass})",
                session.guid
            );
        }
        for session in &self.deleted_sessions {
            assert!(
                fixture.store.session(session.id).await.is_none(),
                "session {} should have been deleted (pass {pass})",
                session.guid
            );
        }
        for shopper in &self.kept_shoppers {
            assert!(
                fixture.store.shopper(shopper.id).await.is_some(),
                "shopper {} should not be deleted (pass {pass})",
                shopper.guid
            );
        }
        for shopper in &self.deleted_shoppers {
            assert!(
                fixture.store.shopper(shopper.id).await.is_none(),
                "shopper {} should have been deleted (pass {pass})",
                shopper.guid
            );
        }
    }
}

/// One visitor with one session. Returns the shopper and session.
async fn scenario(
    fixture: &Fixture,
    age: i64,
    kind: CustomerKind,
    cart: CartContents,
) -> (Shopper, CustomerSession) {
    let visitor = fixture.visitor(kind, cart).await;
    let session = fixture.session(&visitor.shopper, age).await;
    (visitor.shopper, session)
}

#[tokio::test]
async fn test_standard_eight_cases() {
    use CartContents::{Empty, NoCart, NonEmpty};
    use CustomerKind::{Anonymous, Registered};

    let fixture = Fixture::new().with_session_policy(1000, RETENTION_DAYS);
    let mut track = Tracking::default();

    // (age, customer, cart, session deleted, shopper deleted)
    let cases = [
        (OLD, Anonymous, NoCart, true, true),
        (OLD, Anonymous, Empty, true, true),
        (OLD, Anonymous, NonEmpty, true, true),
        (RECENT, Anonymous, NoCart, false, false),
        (OLD, Registered, Empty, true, true),
        (RECENT, Registered, NoCart, false, false),
        (RECENT, Registered, NonEmpty, false, false),
        (OLD, Registered, NonEmpty, true, false),
    ];

    for (age, kind, cart, session_deleted, shopper_deleted) in cases {
        let (shopper, session) = scenario(&fixture, age, kind, cart).await;
        track.session(session, session_deleted);
        track.shopper(shopper, shopper_deleted);
    }

    let deleted = fixture.session_job().purge_session_history().await.unwrap();

    assert_eq!(deleted, 5);
    track.verify(&fixture, 1).await;
}

#[tokio::test]
async fn test_staleness_ignores_customer_type_and_cart() {
    let fixture = Fixture::new().with_session_policy(1000, RETENTION_DAYS);

    for kind in [CustomerKind::Anonymous, CustomerKind::Registered] {
        for cart in [CartContents::NoCart, CartContents::Empty, CartContents::NonEmpty] {
            scenario(&fixture, OLD, kind, cart).await;
        }
    }

    let deleted = fixture.session_job().purge_session_history().await.unwrap();

    assert_eq!(deleted, 6);
    assert_eq!(fixture.store.counts().await.sessions, 0);
}

#[tokio::test]
async fn test_registered_orphan_with_items_survives_repeated_passes() {
    use CartContents::{Empty, NonEmpty};

    let fixture = Fixture::new().with_session_policy(1000, RETENTION_DAYS);
    let mut track = Tracking::default();

    // Registered visitors: (cart, session ages, shopper deleted)
    let visitors = [
        (Empty, [RECENT, OLD], false),
        (NonEmpty, [RECENT, OLD], false),
        (Empty, [OLD, OLD], true),
        (NonEmpty, [OLD, OLD], false),
    ];
    for (cart, ages, shopper_deleted) in visitors {
        let visitor = fixture.visitor(CustomerKind::Registered, cart).await;
        for age in ages {
            let session = fixture.session(&visitor.shopper, age).await;
            track.session(session, age == OLD);
        }
        track.shopper(visitor.shopper, shopper_deleted);
    }

    let job = fixture.session_job();

    let first = job.purge().await.unwrap();
    assert_eq!((first.sessions, first.shoppers), (6, 1));
    track.verify(&fixture, 1).await;

    let second = job.purge().await.unwrap();
    assert_eq!(second, SessionPurgeReport::default());
    track.verify(&fixture, 2).await;
}

#[tokio::test]
async fn test_shopper_becomes_orphan_once_its_last_session_goes() {
    let fixture = Fixture::new().with_session_policy(1000, RETENTION_DAYS);
    let visitor = fixture
        .visitor(CustomerKind::Anonymous, CartContents::Empty)
        .await;
    let fresh = fixture.session(&visitor.shopper, RECENT).await;
    fixture.session(&visitor.shopper, OLD).await;
    let job = fixture.session_job();

    job.purge().await.unwrap();
    assert!(fixture.store.shopper(visitor.shopper.id).await.is_some());

    // The remaining session ages past retention.
    let stale = fixture.days_ago(OLD);
    fixture.store.touch_session(fresh.id, stale).await;

    let report = job.purge().await.unwrap();
    assert_eq!((report.sessions, report.shoppers), (1, 1));
    assert!(fixture.store.shopper(visitor.shopper.id).await.is_none());
}

#[tokio::test]
async fn test_cleanup_adheres_to_batch_size() {
    const SESSIONS: usize = 27;
    const BATCH: u32 = 10;

    let fixture = Fixture::new().with_session_policy(BATCH, RETENTION_DAYS);
    for _ in 0..SESSIONS {
        scenario(&fixture, OLD, CustomerKind::Anonymous, CartContents::NoCart).await;
    }
    let job = fixture.session_job();

    let mut passes = Vec::new();
    let mut left = SESSIONS;
    while left > 0 {
        let deleted = job.purge_session_history().await.unwrap();
        assert!(deleted > 0, "no progress with {left} sessions left");
        passes.push(deleted);
        left -= deleted;
    }

    assert_eq!(passes, vec![10, 10, 7]);
    assert_eq!(fixture.store.counts().await.sessions, 0);
}

#[tokio::test]
async fn test_scheduler_drains_backlog() {
    let fixture = Fixture::new().with_session_policy(10, RETENTION_DAYS);
    let (anonymous, empty) = (CustomerKind::Anonymous, CartContents::Empty);
    for _ in 0..27 {
        scenario(&fixture, OLD, anonymous, empty).await;
    }
    scenario(&fixture, RECENT, anonymous, empty).await;

    let summary = scheduler::drain(&fixture.session_job(), NonZeroU32::new(100).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.deleted, 27);
    assert!(!summary.capped);
    let counts = fixture.store.counts().await;
    assert_eq!(counts.sessions, 1);
    assert_eq!(counts.shoppers, 1);
}

#[tokio::test]
async fn test_iteration_cap_stops_drain() {
    let fixture = Fixture::new().with_session_policy(5, RETENTION_DAYS);
    for _ in 0..20 {
        scenario(&fixture, OLD, CustomerKind::Anonymous, CartContents::NoCart).await;
    }

    let summary = scheduler::drain(&fixture.session_job(), NonZeroU32::new(2).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.passes, 2);
    assert_eq!(summary.deleted, 10);
    assert!(summary.capped);
    assert_eq!(fixture.store.counts().await.sessions, 10);
}

#[tokio::test]
async fn test_orphan_step_is_bounded_by_batch_size() {
    let fixture = Fixture::new().with_session_policy(3, RETENTION_DAYS);
    for _ in 0..5 {
        fixture.store.insert_shopper(None).await;
    }
    let job = fixture.session_job();

    assert_eq!(job.purge().await.unwrap().shoppers, 3);
    assert_eq!(job.purge().await.unwrap().shoppers, 2);
}
