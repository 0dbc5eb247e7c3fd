//! End-to-end tests driving a `Mirror` with wire frames.
//!
//! Frames are built as JSON text exactly as the instrumented client sends
//! them, so these cover the codec, reducer, hubs and facade together.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use roomlens_mirror::{
    Channel, ConnectionStatus, ExternalStore, FullSyncMode, InboundMessage, Mirror, MirrorConfig,
    OthersField, OutboundMessage, RoomFieldStore, RoomSync,
};

use proptest::prelude::*;
use serde_json::json;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recording_mirror(config: MirrorConfig) -> (Mirror, Rc<RefCell<Vec<OutboundMessage>>>) {
    init_logging();
    let sent = Rc::new(RefCell::new(Vec::new()));
    (Mirror::new(config, Rc::clone(&sent)), sent)
}

fn frame(body: serde_json::Value) -> String {
    let mut body = body;
    body["source"] = json!("devtools-client");
    body.to_string()
}

fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    (count, move || c.set(c.get() + 1))
}

#[test]
fn test_end_to_end_room_lifecycle() {
    let (mirror, sent) = recording_mirror(MirrorConfig::default());
    let view = mirror.view();

    mirror.handle_raw(&frame(json!({ "msg": "wake-up-devtools" }))).unwrap();
    assert_eq!(*sent.borrow(), vec![OutboundMessage::Connect]);

    mirror
        .handle_raw(&frame(json!({ "msg": "room::available", "roomId": "r1" })))
        .unwrap();
    assert_eq!(view.room_ids(), vec!["r1".to_string()]);
    assert_eq!(view.current_room_id().as_deref(), Some("r1"));
    assert_eq!(sent.borrow().last(), Some(&OutboundMessage::subscribe("r1")));

    mirror
        .handle_raw(&frame(json!({
            "msg": "room::sync::partial",
            "roomId": "r1",
            "status": "open",
            "others": []
        })))
        .unwrap();
    assert_eq!(view.status("r1"), Some(ConnectionStatus::Open));
    assert!(view.others("r1").is_none());

    mirror
        .handle_raw(&frame(json!({ "msg": "room::unavailable", "roomId": "r1" })))
        .unwrap();
    assert_eq!(view.room_count(), 0);
    assert_eq!(view.current_room_id(), None);
    assert_eq!(sent.borrow().last(), Some(&OutboundMessage::unsubscribe("r1")));
    assert_eq!(sent.borrow().len(), 3);
}

#[test]
fn test_full_sync_with_storage_tree() {
    let (mirror, _sent) = recording_mirror(MirrorConfig::default());
    let view = mirror.view();

    mirror
        .handle_raw(&frame(json!({
            "msg": "room::sync::full",
            "roomId": "r1",
            "status": "connecting",
            "storage": [
                {
                    "type": "LiveObject",
                    "id": "0:1",
                    "key": "shapes",
                    "payload": [
                        { "type": "Json", "id": "0:2", "key": "color", "payload": "red" },
                        {
                            "type": "LiveList",
                            "id": "0:3",
                            "key": "points",
                            "payload": [
                                { "type": "Json", "id": "0:4", "key": 0, "payload": 1 },
                                { "type": "Json", "id": "0:5", "key": 1, "payload": 2 }
                            ]
                        }
                    ]
                }
            ],
            "me": {
                "type": "User",
                "id": "u1",
                "key": "me",
                "connectionId": 7,
                "info": { "name": "Ada" },
                "presence": [{ "type": "Json", "id": "p1", "key": "cursor", "payload": { "x": 1 } }]
            }
        })))
        .unwrap();

    let snapshot = view.snapshot("r1");
    assert_eq!(snapshot.status, Some(ConnectionStatus::Connecting));
    let storage = snapshot.storage.unwrap();
    assert_eq!(roomlens_mirror::count_nodes(&storage), 5);
    assert_eq!(
        roomlens_mirror::to_json_object(&storage),
        json!({ "shapes": { "color": "red", "points": [1, 2] } })
    );

    let me = snapshot.me.unwrap();
    assert_eq!(me.connection_id, Some(7));
    assert!(!me.is_read_only);
    assert_eq!(me.presence_json(), json!({ "cursor": { "x": 1 } }));

    let points = view.find_storage_node("r1", "0:3").unwrap();
    assert_eq!(points.children().len(), 2);
}

#[test]
fn test_removing_current_selects_first_remaining() {
    let (mirror, sent) = recording_mirror(MirrorConfig::default());
    for id in ["A", "B", "C"] {
        mirror.handle(InboundMessage::available(id));
    }
    assert_eq!(mirror.view().current_room_id().as_deref(), Some("A"));
    sent.borrow_mut().clear();

    mirror.handle(InboundMessage::unavailable("A"));
    assert_eq!(mirror.view().current_room_id().as_deref(), Some("B"));
    assert_eq!(mirror.view().room_ids(), vec!["B".to_string(), "C".to_string()]);
    assert_eq!(
        *sent.borrow(),
        vec![OutboundMessage::unsubscribe("A"), OutboundMessage::subscribe("B")]
    );
}

#[test]
fn test_status_only_sync_leaves_storage_alone() {
    let (mirror, _sent) = recording_mirror(MirrorConfig::default());
    let view = mirror.view();
    mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_storage(Vec::new())));
    let storage_before = view.storage("r1").unwrap();

    let (status_hits, status_listener) = counter();
    let (storage_hits, storage_listener) = counter();
    let _a = view.subscribe("r1", Channel::Status, status_listener);
    let _b = view.subscribe("r1", Channel::Storage, storage_listener);

    mirror
        .handle_raw(&frame(json!({ "msg": "room::sync::partial", "roomId": "r1", "status": "open" })))
        .unwrap();

    assert_eq!(status_hits.get(), 1);
    assert_eq!(storage_hits.get(), 0);
    assert!(Rc::ptr_eq(&storage_before, &view.storage("r1").unwrap()));
}

#[test]
fn test_disjoint_syncs_compose() {
    let (mirror, _sent) = recording_mirror(MirrorConfig::default());
    mirror
        .handle_raw(&frame(json!({ "msg": "room::sync::partial", "roomId": "r1", "status": "open" })))
        .unwrap();
    mirror
        .handle_raw(&frame(json!({
            "msg": "room::sync::full",
            "roomId": "r1",
            "others": [{ "type": "User", "id": "u2", "key": "2", "info": null, "presence": [] }]
        })))
        .unwrap();

    let snapshot = mirror.view().snapshot("r1");
    assert_eq!(snapshot.status, Some(ConnectionStatus::Open));
    assert_eq!(snapshot.others.map(|o| o.len()), Some(1));
    assert!(snapshot.storage.is_none());
}

#[test]
fn test_replace_mode_clears_omitted_fields() {
    let config = MirrorConfig {
        full_sync: FullSyncMode::Replace,
        ..MirrorConfig::default()
    };
    let (mirror, _sent) = recording_mirror(config);
    mirror
        .handle_raw(&frame(json!({ "msg": "room::sync::partial", "roomId": "r1", "status": "open" })))
        .unwrap();
    mirror
        .handle_raw(&frame(json!({ "msg": "room::sync::full", "roomId": "r1", "storage": [] })))
        .unwrap();

    let snapshot = mirror.view().snapshot("r1");
    assert_eq!(snapshot.status, None);
    assert_eq!(snapshot.storage.map(|s| s.len()), Some(0));
}

#[test]
fn test_others_store_follows_room() {
    let (mirror, _sent) = recording_mirror(MirrorConfig::default());
    let store: RoomFieldStore<OthersField> = RoomFieldStore::new(mirror.view(), "r1");
    let (hits, listener) = counter();
    let _sub = store.subscribe(listener);

    mirror
        .handle_raw(&frame(json!({
            "msg": "room::sync::partial",
            "roomId": "r1",
            "others": [{ "type": "User", "id": "u2", "key": "2", "info": {}, "presence": [] }]
        })))
        .unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(store.snapshot().map(|o| o[0].id.clone()).as_deref(), Some("u2"));

    mirror
        .handle_raw(&frame(json!({ "msg": "room::sync::partial", "roomId": "r1", "others": [] })))
        .unwrap();
    assert_eq!(hits.get(), 2);
    assert_eq!(store.snapshot(), None);
}

#[test]
fn test_listener_removal_mid_pass() {
    let (mirror, _sent) = recording_mirror(MirrorConfig::default());
    let view = mirror.view();
    let (first, first_listener) = counter();
    let (last, last_listener) = counter();

    let _first = view.subscribe("r1", Channel::Me, first_listener);
    let slot = Rc::new(RefCell::new(None));
    let slot_inner = Rc::clone(&slot);
    let remover = view.subscribe("r1", Channel::Me, move || {
        if let Some(sub) = slot_inner.borrow_mut().take() {
            drop(sub);
        }
    });
    *slot.borrow_mut() = Some(remover);
    let _last = view.subscribe("r1", Channel::Me, last_listener);

    let me = json!({ "type": "User", "id": "u1", "key": "me", "info": {}, "presence": [] });
    for _ in 0..2 {
        mirror
            .handle_raw(&frame(json!({ "msg": "room::sync::partial", "roomId": "r1", "me": me })))
            .unwrap();
    }

    assert_eq!(first.get(), 2);
    assert_eq!(last.get(), 2);
}

#[test]
fn test_late_sync_for_removed_room_is_harmless() {
    let (mirror, sent) = recording_mirror(MirrorConfig::default());
    mirror.handle(InboundMessage::available("r1"));
    mirror.handle(InboundMessage::unavailable("r1"));
    sent.borrow_mut().clear();

    mirror.handle(InboundMessage::unavailable("r1"));
    assert!(sent.borrow().is_empty());

    // A stray sync re-creates the room rather than failing.
    mirror.handle(InboundMessage::PartialSync(RoomSync::new("r1").with_status(ConnectionStatus::Closed)));
    assert_eq!(mirror.view().status("r1"), Some(ConnectionStatus::Closed));
    assert_eq!(mirror.view().current_room_id().as_deref(), Some("r1"));
}

#[derive(Debug, Clone, Copy)]
enum RoomOp {
    Available,
    Unavailable,
    Select,
}

fn room_op() -> impl Strategy<Value = RoomOp> {
    prop_oneof![
        2 => Just(RoomOp::Available),
        1 => Just(RoomOp::Unavailable),
        1 => Just(RoomOp::Select),
    ]
}

proptest! {
    #[test]
    fn test_membership_invariant_over_room_sequences(
        ops in prop::collection::vec((room_op(), 0usize..8), 0..200)
    ) {
        let (mirror, _sent) = recording_mirror(MirrorConfig::default());
        let view = mirror.view();
        let mut expected: BTreeSet<String> = BTreeSet::new();

        for (op, index) in ops {
            let id = format!("room-{index}");
            match op {
                RoomOp::Available => {
                    mirror.handle(InboundMessage::available(id.clone()));
                    expected.insert(id);
                }
                RoomOp::Unavailable => {
                    mirror.handle(InboundMessage::unavailable(id.clone()));
                    expected.remove(&id);
                }
                RoomOp::Select => {
                    mirror.select_room(Some(&id));
                }
            }

            let actual: BTreeSet<String> = view.room_ids().into_iter().collect();
            prop_assert_eq!(&actual, &expected);
            match view.current_room_id() {
                Some(current) => {
                    prop_assert!(expected.contains(&current));
                }
                None => {
                    prop_assert!(expected.is_empty());
                }
            }
        }
    }
}
