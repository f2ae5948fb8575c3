//! Property-based tests for the cursor ordering comparator (C1) and the
//! rumor wire round-trip (E1/C4).
//!
//! Uses proptest to generate arbitrary cursors/rumors and verify the
//! properties hold for all inputs, not just hand-picked examples.

use glade_codec::cursor::OuterCursor;
use glade_codec::event::{deserialize_rumor, serialize_rumor, PubKey, Rumor, Tag};
use glade_codec::EventId;
use proptest::prelude::*;

fn arbitrary_event_id() -> impl Strategy<Value = EventId> {
    any::<[u8; 32]>().prop_map(EventId)
}

fn arbitrary_cursor() -> impl Strategy<Value = OuterCursor> {
    (any::<i64>(), arbitrary_event_id()).prop_map(|(created_at, id)| OuterCursor::new(created_at, id))
}

proptest! {
    /// PROPERTY: ordering is by `created_at` first, regardless of id bytes.
    #[test]
    fn prop_cursor_orders_by_created_at_first(
        earlier in i64::MIN..(i64::MAX - 1),
        later_offset in 1i64..=1000,
        a_id in arbitrary_event_id(),
        b_id in arbitrary_event_id(),
    ) {
        let later = earlier.saturating_add(later_offset);
        prop_assume!(later > earlier);
        let a = OuterCursor::new(earlier, a_id);
        let b = OuterCursor::new(later, b_id);
        prop_assert!(a < b, "cursor with smaller created_at must sort first regardless of id");
    }

    /// PROPERTY: within a tied `created_at`, ties break on id's own Ord.
    #[test]
    fn prop_cursor_ties_break_on_id(created_at in any::<i64>(), a_id in arbitrary_event_id(), b_id in arbitrary_event_id()) {
        let a = OuterCursor::new(created_at, a_id);
        let b = OuterCursor::new(created_at, b_id);
        prop_assert_eq!(a.cmp(&b), a_id.cmp(&b_id));
    }

    /// PROPERTY: the comparator is a total order — reflexive, antisymmetric, transitive.
    #[test]
    fn prop_cursor_total_order(a in arbitrary_cursor(), b in arbitrary_cursor(), c in arbitrary_cursor()) {
        prop_assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
        if a < b && b < c {
            prop_assert!(a < c);
        }
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }
}

fn arbitrary_tag() -> impl Strategy<Value = Tag> {
    prop::collection::vec("[a-z0-9]{1,8}", 1..4).prop_map(Tag)
}

fn arbitrary_rumor() -> impl Strategy<Value = Rumor> {
    (
        any::<[u8; 32]>(),
        any::<i64>(),
        any::<u16>(),
        prop::collection::vec(arbitrary_tag(), 0..4),
        ".{0,64}",
    )
        .prop_map(|(pubkey, created_at, kind, tags, content)| {
            Rumor::new(PubKey(pubkey), created_at, kind, tags, content)
        })
}

proptest! {
    /// PROPERTY: any rumor built through `Rumor::new` round-trips through the
    /// wire codec exactly (§8 property 5).
    #[test]
    fn prop_rumor_round_trips(rumor in arbitrary_rumor()) {
        let bytes = serialize_rumor(&rumor).expect("serialize");
        let decoded = deserialize_rumor(&bytes).expect("deserialize");
        prop_assert_eq!(decoded, rumor);
    }

    /// PROPERTY: a tampered `content` field is caught by the id check no
    /// matter what the original content was.
    #[test]
    fn prop_tampered_content_is_rejected(rumor in arbitrary_rumor(), replacement in ".{0,64}") {
        prop_assume!(replacement != rumor.content);
        let bytes = serialize_rumor(&rumor).expect("serialize");
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json");
        value["content"] = serde_json::Value::String(replacement);
        let tampered = serde_json::to_vec(&value).expect("reserialize");
        prop_assert!(deserialize_rumor(&tampered).is_err());
    }
}
