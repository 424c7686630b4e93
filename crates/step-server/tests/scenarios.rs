//! End-to-end exercises of the concrete scenarios for the codec, uid, rpc,
//! channel, and leaderboard modules, run in-process against loopback sockets
//! and real library types rather than against the running binary.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use step_board::{DeferredLeaderboard, DocumentStore, StoreError};
use step_runtime::{read_loop, ChannelHandle, ChannelRegistry, Dispatch, RpcConnection, RpcEntry};
use step_types::RankItem;
use step_uid::{base36_decode, base36_encode};
use tokio::net::{TcpListener, TcpStream};

/// S1 — client-request frame for code=0x1234, body=[0xAA,0xBB] packs to the
/// literal 10-byte frame and unpacks back to the same (code, body).
#[test]
fn s1_client_request_literal_frame() {
    let frame = step_wire::encode_client_request(0x1234, &[0xAA, 0xBB]).unwrap();
    assert_eq!(frame, vec![0xDA, 0x50, 0x04, 0x00, 0x00, 0x00, 0x34, 0x12, 0xAA, 0xBB]);

    let decoded = step_wire::decode_client_request(&frame).unwrap();
    assert_eq!(decoded.code, 0x1234);
    assert_eq!(decoded.body, vec![0xAA, 0xBB]);
}

/// S2 — base36 encode/decode at the documented fixed points.
#[test]
fn s2_base36_fixed_points() {
    assert_eq!(base36_encode(35), "O");
    assert_eq!(base36_encode(36), "CF");
    assert_eq!(base36_decode("CF"), Some(36));
    assert_eq!(base36_decode("?"), None);
}

/// S4 — a channel at capacity accepts exactly the first N enqueues and
/// reports overload on the (N+1)th, synchronously, no task silently
/// delayed. Uses a shrunk capacity (spawn_with) rather than the real
/// 100,000-item default so the property can be checked without flooding.
#[tokio::test]
async fn s4_channel_overflow_reports_synchronously() {
    let dispatch = Arc::new(Dispatch::new());
    let registry = ChannelRegistry::new(dispatch.clone());
    let handle = ChannelHandle::spawn_with(
        "".to_string(),
        4,
        std::time::Duration::from_secs(3600),
        10,
        dispatch,
        Arc::downgrade(&registry),
    );

    for i in 0..4 {
        let entry = RpcEntry { call_id: i, code: 1, channel_key: String::new(), body: vec![], conn: None };
        handle.enqueue_rpc(entry).expect("capacity not yet exhausted");
    }

    let overflow_entry = RpcEntry { call_id: 99, code: 1, channel_key: String::new(), body: vec![], conn: None };
    assert!(handle.enqueue_rpc(overflow_entry).is_err());
}

/// S5 — two concurrent calls on one connection, responses arriving out of
/// request order, are each delivered to the caller that issued the matching
/// call id rather than in response-arrival order.
#[tokio::test]
async fn s5_rpc_call_response_correlation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dialer_task = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let conn = RpcConnection::new("dialer", Box::new(writer));
        let dispatch = Arc::new(Dispatch::new());
        let channels = ChannelRegistry::new(dispatch);
        tokio::spawn(read_loop(conn.clone(), Box::new(reader), channels));

        let call_a = conn.call("room-1", 1, b"A");
        let call_b = conn.call("room-1", 1, b"B");
        let (a, b) = tokio::join!(call_a, call_b);
        (a.unwrap(), b.unwrap())
    });

    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Read both requests, then answer "B" before "A" to prove correlation
    // doesn't depend on response order.
    let mut first_header = [0u8; 10];
    reader.read_exact(&mut first_header).await.unwrap();
    let (key_len, body_len) = step_wire::rpc_request_header_lens(&first_header);
    let mut first_tail = vec![0u8; key_len + body_len];
    reader.read_exact(&mut first_tail).await.unwrap();
    let mut first_frame = first_header.to_vec();
    first_frame.extend_from_slice(&first_tail);
    let first = match step_wire::decode_rpc_frame(&first_frame).unwrap() {
        step_wire::RpcFrame::Request(r) => r,
        _ => panic!("expected request"),
    };

    let mut second_header = [0u8; 10];
    reader.read_exact(&mut second_header).await.unwrap();
    let (key_len2, body_len2) = step_wire::rpc_request_header_lens(&second_header);
    let mut second_tail = vec![0u8; key_len2 + body_len2];
    reader.read_exact(&mut second_tail).await.unwrap();
    let mut second_frame = second_header.to_vec();
    second_frame.extend_from_slice(&second_tail);
    let second = match step_wire::decode_rpc_frame(&second_frame).unwrap() {
        step_wire::RpcFrame::Request(r) => r,
        _ => panic!("expected request"),
    };

    let (call_id_for_a, call_id_for_b) = if first.body == b"A" {
        (first.call_id, second.call_id)
    } else {
        (second.call_id, first.call_id)
    };

    let resp_b = step_wire::encode_rpc_response(call_id_for_b, 0, b"B").unwrap();
    writer.write_all(&resp_b).await.unwrap();
    let resp_a = step_wire::encode_rpc_response(call_id_for_a, 0, b"A").unwrap();
    writer.write_all(&resp_a).await.unwrap();

    let (a, b) = dialer_task.await.unwrap();
    assert_eq!(a, b"A");
    assert_eq!(b, b"B");
}

struct InMemoryStore {
    items: parking_lot::Mutex<HashMap<String, RankItem>>,
}

impl InMemoryStore {
    fn new() -> Self {
        Self { items: parking_lot::Mutex::new(HashMap::new()) }
    }
}

impl DocumentStore<RankItem> for InMemoryStore {
    fn find_all(&self) -> Result<Vec<RankItem>, StoreError> {
        Ok(self.items.lock().values().cloned().collect())
    }

    fn find_sorted_all(&self) -> Result<Vec<RankItem>, StoreError> {
        self.find_all()
    }

    fn insert(&self, item: &RankItem) -> Result<(), StoreError> {
        self.items.lock().insert(item.key.clone(), item.clone());
        Ok(())
    }

    fn update_fields(&self, _key: &str, _fields: &HashMap<String, Value>) -> Result<(), StoreError> {
        Ok(())
    }

    fn upsert(&self, item: &RankItem) -> Result<(), StoreError> {
        self.insert(item)
    }

    fn remove_id(&self, key: &str) -> Result<(), StoreError> {
        self.items.lock().remove(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StoreError> {
        self.items.lock().clear();
        Ok(())
    }
}

/// S6 — max-rank=5, thresholds=(100,50,10); items valued 200, 40, 5, 5, 5.
/// Expected: 200 -> rank 1; 40 misses the rank-2 threshold of 50, so the
/// gating rule permanently excludes it from top-3 (it does not fall through
/// to try against rank 3's looser threshold) and lands at rank 4; the three
/// 5s fill ranks 5..7 in arrival order, and the two beyond max-rank (6, 7)
/// are evicted, leaving only the first of the three.
#[test]
fn s6_deferred_leaderboard_top3_gating() {
    let board = DeferredLeaderboard::new("s6", 5, [100, 50, 10], InMemoryStore::new());
    board.update("a", "a", 1, "a", "", 200, 0, 0, 0, Vec::new());
    board.update("b", "b", 1, "b", "", 40, 0, 0, 0, Vec::new());
    board.update("c", "c", 1, "c", "", 5, 0, 0, 0, Vec::new());
    board.update("d", "d", 1, "d", "", 5, 0, 0, 0, Vec::new());
    board.update("e", "e", 1, "e", "", 5, 0, 0, 0, Vec::new());
    board.sort();

    assert_eq!(board.rank("a"), 1);
    assert_eq!(board.rank("b"), 4);
    assert_eq!(board.rank("c"), 5);
    assert_eq!(board.rank("d"), 0);
    assert_eq!(board.rank("e"), 0);
}
