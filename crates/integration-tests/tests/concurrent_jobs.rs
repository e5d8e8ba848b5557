//! Both jobs running against the same store.
//!
//! The session job may delete a shopper the customer job is about to
//! cascade through, and vice versa. Neither job may fail or double count.

#![allow(clippy::unwrap_used)]

use sweeper_core::{CartContents, CustomerKind};
use sweeper_integration_tests::Fixture;

#[tokio::test]
async fn test_jobs_interleave_without_double_deletes() {
    let fixture = Fixture::new()
        .with_session_policy(4, 20)
        .with_customer_policy(4, 60);

    let mut stale_customers = 0;
    for i in 0..12 {
        let visitor = fixture
        .visitor(CustomerKind::Anonymous, CartContents::Empty)
        .await;
        fixture.session(&visitor.shopper, 30).await;
        if i % 2 == 0 {
            fixture
                .store
                .touch_customer(visitor.customer.id, fixture.days_ago(90))
                .await;
            stale_customers += 1;
        }
    }

    let sessions = fixture.session_job();
    let customers = fixture.customer_job();
    let mut deleted_sessions = 0;
    let mut deleted_customers = 0;
    for _ in 0..5 {
        let (s, c) = tokio::join!(sessions.purge(), customers.run());
        deleted_sessions += s.unwrap().sessions;
        deleted_customers += c.unwrap();
    }

    assert_eq!(deleted_customers, stale_customers);
    assert!(deleted_sessions <= 12);
    let counts = fixture.store.counts().await;
    assert_eq!(counts.sessions, 0);
    assert_eq!(counts.shoppers, 0);
    assert_eq!(counts.customers, 12 - stale_customers);
    assert_eq!(counts.carts, 0);
}
