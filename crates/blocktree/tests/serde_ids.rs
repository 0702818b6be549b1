//! Operation ids are the one piece external processes ship between
//! replicas, so they must survive serialization unchanged.

use blocktree::OpId;

#[test]
fn op_id_json_roundtrip() {
    let id = OpId::new("alice", 42, 1);
    let json = serde_json::to_string(&id).expect("serialize id");
    let back: OpId = serde_json::from_str(&json).expect("deserialize id");
    assert_eq!(back, id);
    assert_eq!(back.origin(), "alice");
    assert_eq!(back.clock(), 42);
    assert_eq!(back.idx(), 1);
}

#[test]
fn sentinels_roundtrip_and_keep_meaning() {
    for id in [OpId::list_start(), OpId::list_end()] {
        let json = serde_json::to_string(&id).expect("serialize sentinel");
        let back: OpId = serde_json::from_str(&json).expect("deserialize sentinel");
        assert_eq!(back, id);
    }
    let back: OpId =
        serde_json::from_str(&serde_json::to_string(&OpId::list_start()).expect("serialize"))
            .expect("deserialize");
    assert!(back.is_list_start());
}

#[test]
fn deserialized_ids_order_like_originals() {
    let a = OpId::new("alice", 1, 0);
    let b = OpId::new("bob", 1, 0);
    let roundtrip = |id: &OpId| -> OpId {
        serde_json::from_str(&serde_json::to_string(id).expect("serialize")).expect("deserialize")
    };
    assert!(roundtrip(&a) < roundtrip(&b));
    assert!(roundtrip(&b) < OpId::new("alice", 2, 0));
}
