//! Property-based tests for the idempotency store.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};

use super::memory::InMemoryIdempotencyStore;
use super::store::StoredResponse;

fn arb_payload() -> impl Strategy<Value = Value> {
    (
        proptest::collection::vec(any::<u32>(), 0..8),
        "[a-z_]{1,12}",
    )
        .prop_map(|(ids, status)| json!({"ids": ids, "newStatus": status}))
}

fn arb_key() -> impl Strategy<Value = String> {
    "[A-Za-z0-9-]{1,64}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The first response stored for a key is returned to every later writer.
    #[test]
    fn prop_first_write_wins(
        key in arb_key(),
        payload_a in arb_payload(),
        payload_b in arb_payload(),
        body_a in "[a-z]{1,16}",
        body_b in "[a-z]{1,16}",
    ) {
        let store = InMemoryIdempotencyStore::new();
        let now = Utc::now();
        let ttl = Duration::hours(24);

        let first = store
            .put_if_absent_at(&key, &payload_a, StoredResponse::json(body_a.clone()), ttl, now)
            .unwrap();
        let second = store
            .put_if_absent_at(&key, &payload_b, StoredResponse::json(body_b), ttl, now)
            .unwrap();

        prop_assert_eq!(&first.json, &body_a);
        prop_assert_eq!(&second.json, &body_a);
    }

    /// Nothing is replayed once the record has expired.
    #[test]
    fn prop_expired_records_are_not_replayed(
        key in arb_key(),
        payload in arb_payload(),
        ttl_secs in 0i64..86_400,
        elapsed_secs in 0i64..172_800,
    ) {
        let store = InMemoryIdempotencyStore::new();
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store
            .put_if_absent_at(&key, &payload, StoredResponse::json("{}"), Duration::seconds(ttl_secs), created)
            .unwrap();

        let now = created + Duration::seconds(elapsed_secs);
        let replay = store.try_get_at(&key, &payload, now).unwrap();
        prop_assert_eq!(replay.is_some(), elapsed_secs <= ttl_secs);
    }
}
