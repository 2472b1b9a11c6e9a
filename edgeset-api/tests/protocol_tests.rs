//! End-to-end protocol scenarios: a scripted host talks to a node over an
//! in-memory channel and the transcript is checked line by line.

use std::collections::VecDeque;
use std::io::Cursor;

use edgeset_api::{
    recv_chunked, send_chunked, Dispatcher, EdgeNode, LineChannel, Session, SessionStats,
    StreamChannel,
};
use edgeset_core::config::FailurePolicy;
use edgeset_core::error::Error;
use edgeset_core::{Config, GeometryConfig};
use edgeset_storage::{FileFlash, MemoryFlash};

type TestChannel = StreamChannel<Cursor<Vec<u8>>, Vec<u8>>;

/// Two features, four volatile and two persistent examples in one 6-byte sector
fn tiny_config() -> Config {
    let mut config = Config::default();
    config.geometry = GeometryConfig {
        feature_len: 2,
        volatile_capacity: 4,
        persistent_capacity: 2,
        sector_size: 6,
        base_address: 0x100,
        num_classes: 2,
    };
    config.distance.shift = 0;
    config.classifier.k = 1;
    config
}

const RECORDS: [[u8; 3]; 6] = [
    [0, 0, 0],
    [10, 0, 1],
    [0, 10, 0],
    [10, 10, 1],
    [1, 1, 0],
    [9, 9, 1],
];

fn seeded_dispatcher(config: Config) -> Dispatcher<MemoryFlash> {
    let flash = MemoryFlash::for_geometry(&config.geometry);
    let mut node = EdgeNode::new(config, flash).unwrap();
    for (idx, record) in RECORDS.iter().enumerate() {
        node.write_record(idx, record).unwrap();
    }
    Dispatcher::new(node)
}

fn channel(script: &[&str]) -> TestChannel {
    let mut input = String::new();
    for line in script {
        input.push_str(line);
        input.push_str("\r\n");
    }
    StreamChannel::new(Cursor::new(input.into_bytes()), Vec::new())
}

fn transcript(ch: TestChannel) -> Vec<String> {
    let out = String::from_utf8(ch.into_parts().1).unwrap();
    assert!(out.is_empty() || out.ends_with("\r\n"));
    out.split_terminator("\r\n").map(str::to_string).collect()
}

fn run(
    dispatcher: &mut Dispatcher<MemoryFlash>,
    policy: FailurePolicy,
    script: &[&str],
) -> (Result<SessionStats, Error>, Vec<String>) {
    let mut ch = channel(script);
    let result = Session::new(dispatcher).with_policy(policy).serve(&mut ch);
    (result, transcript(ch))
}

/// Host that acknowledges every line it receives with the running value count
#[derive(Default)]
struct AckingHost {
    inbox: VecDeque<String>,
    received: Vec<String>,
    acks: Vec<String>,
    counted: usize,
    last_read: String,
}

impl AckingHost {
    fn sending(lines: &[&str]) -> Self {
        Self {
            inbox: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl LineChannel for AckingHost {
    fn read_line(&mut self) -> Result<Option<String>, Error> {
        let line = self.inbox.pop_front();
        if let Some(line) = &line {
            self.last_read = line.clone();
        }
        Ok(line)
    }

    fn write_line(&mut self, line: &str) -> Result<(), Error> {
        self.received.push(line.to_string());
        self.counted += line.split_whitespace().count();
        let ack = self.counted.to_string();
        self.acks.push(ack.clone());
        self.inbox.push_back(ack);
        Ok(())
    }

    fn echo_last(&mut self) -> Result<(), Error> {
        self.received.push(self.last_read.clone());
        Ok(())
    }
}

// ============================================================================
// Chunked transfer
// ============================================================================

#[test]
fn test_send_twelve_values_in_chunks_of_five() {
    let values: Vec<u8> = (0..12).collect();
    let mut host = AckingHost::default();
    send_chunked(&mut host, &values, 5).unwrap();

    let widths: Vec<usize> = host
        .received
        .iter()
        .map(|line| line.split(' ').count())
        .collect();
    assert_eq!(widths, vec![5, 5, 2]);
    assert_eq!(host.received[2], "10 11");
    assert_eq!(host.acks, vec!["5", "10", "12"]);
    assert!(host.inbox.is_empty());
}

#[test]
fn test_recv_twelve_values_in_chunks_of_five() {
    let lines = ["0 1 2 3 4", "5 6 7 8 9", "10 11"];
    let mut host = AckingHost::sending(&lines);
    let values = recv_chunked(&mut host, 12, 5, true).unwrap();

    assert_eq!(values, (0..12).collect::<Vec<u8>>());
    assert_eq!(host.received, lines);
    assert!(host.inbox.is_empty());
}

#[test]
fn test_recv_short_middle_chunk() {
    let mut host = AckingHost::sending(&["0 1 2 3 4", "5 6 7", "8 9 10 11"]);
    assert!(matches!(
        recv_chunked(&mut host, 12, 5, false),
        Err(Error::ProtocolSync { .. })
    ));
}

// ============================================================================
// Record transfer
// ============================================================================

#[test]
fn test_volatile_write_then_read_in_chunks() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &[
            "begin 1 write-volatile-record 2 2",
            "7 8",
            "1",
            "end 1",
            "begin 2 read-volatile-record 2 2",
            "2",
            "3",
            "end 2",
        ],
    );

    assert_eq!(result.unwrap(), SessionStats { completed: 2, failed: 0 });
    assert_eq!(
        out,
        vec![
            "ack_begin 1", "7 8", "1", "ack_end 1",
            "ack_begin 2", "7 8", "1", "ack_end 2",
        ]
    );
}

#[test]
fn test_echo_returns_padded_line_verbatim() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 1 write-volatile-record 1", "  4   5   1 ", "end 1"],
    );
    result.unwrap();
    assert_eq!(out, vec!["ack_begin 1", "  4   5   1 ", "ack_end 1"]);
}

#[test]
fn test_echo_can_be_disabled() {
    let mut config = tiny_config();
    config.protocol.echo_input = false;
    let mut dispatcher = seeded_dispatcher(config);

    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 1 write_ram_buffer 0", "4 5 1", "end 1"],
    );
    result.unwrap();
    assert_eq!(out, vec!["ack_begin 1", "ack_end 1"]);
    assert_eq!(dispatcher.node_mut().read_record(0).unwrap(), vec![4, 5, 1]);
}

#[test]
fn test_persistent_slot_and_address_name_the_same_record() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &[
            "begin 1 write-persistent-record 1",
            "30 40 1",
            "end 1",
            "begin 2 read_eeprom 0x103",
            "ack 3",
            "end 2",
        ],
    );

    result.unwrap();
    assert_eq!(
        out,
        vec!["ack_begin 1", "30 40 1", "ack_end 1", "ack_begin 2", "30 40 1", "ack_end 2"]
    );
    assert_eq!(dispatcher.node_mut().read_record(5).unwrap(), vec![30, 40, 1]);
}

#[test]
fn test_read_labels() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 9 read-labels 4", "4", "6", "end 9"],
    );

    result.unwrap();
    assert_eq!(out, vec!["ack_begin 9", "0 1 0 1", "0 1", "ack_end 9"]);
}

// ============================================================================
// Distances and selection
// ============================================================================

#[test]
fn test_compute_and_read_distance_matrix() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &[
            "begin 1 compute-distance-matrix",
            "end 1",
            "begin 2 read-distance-matrix 8",
            "8",
            "16",
            "21",
            "end 2",
        ],
    );

    result.unwrap();
    assert_eq!(out[..3], ["ack_begin 1", "done", "ack_end 1"]);
    assert_eq!(out[3], "ack_begin 2");

    let values: Vec<u16> = out[4..7]
        .iter()
        .flat_map(|line| line.split(' ').map(|v| v.parse::<u16>().unwrap()))
        .collect();
    assert_eq!(values.len(), 21);
    // Packed lower triangle: (0,0), (1,0), (1,1), (2,0) ...
    assert_eq!(values[0], u16::MAX);
    assert_eq!(values[1], 100);
    assert_eq!(values[2], u16::MAX);
    assert_eq!(values[3], 100);
    assert_eq!(out[7], "ack_end 2");
}

#[test]
fn test_read_distances_recomputes_after_write() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    dispatcher.node_mut().compute_distances().unwrap();
    assert!(!dispatcher.node().distances_stale());

    dispatcher.node_mut().write_record(1, &[0, 0, 1]).unwrap();
    assert!(dispatcher.node().distances_stale());

    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 1 read-distance-matrix 21", "21", "end 1"],
    );
    result.unwrap();
    // (1,0) is now identical
    assert!(out[1].starts_with("65535 0 65535 "));
}

#[test]
fn test_select_subset_streams_and_persists() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let originals: Vec<Vec<u8>> = (0..6)
        .map(|i| dispatcher.node_mut().read_record(i).unwrap())
        .collect();

    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &[
            "begin 1 reseed 7",
            "end 1",
            "begin 2 select-subset uniform 8",
            "2",
            "6",
            "end 2",
        ],
    );

    result.unwrap();
    assert_eq!(out[..3], ["ack_begin 1", "random seed set to: 7", "ack_end 1"]);
    assert_eq!(out[3], "ack_begin 2");
    assert_eq!(out[5], "subset_idxs_read_done");
    assert_eq!(out[7], "predicted_labels_read_done");
    assert_eq!(out[8], "ack_end 2");

    let subset: Vec<usize> = out[4].split(' ').map(|v| v.parse().unwrap()).collect();
    assert_eq!(subset.len(), 2);
    assert_ne!(subset[0], subset[1]);
    assert!(subset.iter().all(|&i| i < 6));

    let predicted: Vec<u8> = out[6].split(' ').map(|v| v.parse().unwrap()).collect();
    assert_eq!(predicted.len(), 6);
    assert!(predicted.iter().all(|&c| c < 2));

    // Every selected record now lives in the persistent tier
    let persistent: Vec<Vec<u8>> = (4..6)
        .map(|i| dispatcher.node_mut().read_record(i).unwrap())
        .collect();
    for idx in subset {
        assert!(persistent.contains(&originals[idx]), "example {} not persisted", idx);
    }
}

#[test]
fn test_same_seed_same_selection() {
    let script = [
        "begin 1 reseed 42",
        "end 1",
        "begin 2 select-subset balanced 8",
        "2",
        "6",
        "end 2",
    ];
    let (a, out_a) = run(&mut seeded_dispatcher(tiny_config()), FailurePolicy::Halt, &script);
    let (b, out_b) = run(&mut seeded_dispatcher(tiny_config()), FailurePolicy::Halt, &script);
    a.unwrap();
    b.unwrap();
    assert_eq!(out_a, out_b);
}

#[test]
fn test_persistent_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flash.img");
    let config = tiny_config();

    {
        let flash = FileFlash::open(&path, &config.geometry).unwrap();
        let mut dispatcher = Dispatcher::new(EdgeNode::new(config.clone(), flash).unwrap());
        let mut ch = channel(&["begin 1 write-persistent-record 0", "5 6 1", "end 1"]);
        Session::new(&mut dispatcher).serve(&mut ch).unwrap();
        dispatcher.into_node().into_store().sync().unwrap();
    }

    let flash = FileFlash::open(&path, &config.geometry).unwrap();
    let mut node = EdgeNode::new(config, flash).unwrap();
    assert_eq!(node.read_record(4).unwrap(), vec![5, 6, 1]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unknown_operation_halts() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 1 frobnicate 3", "end 1", "begin 2 reseed 1", "end 2"],
    );

    assert!(matches!(result, Err(Error::UnknownOperation { .. })));
    assert_eq!(out, vec!["ack_error: command_name not recognised: frobnicate"]);
}

#[test]
fn test_missing_begin_is_reported() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(&mut dispatcher, FailurePolicy::Halt, &["hello"]);

    assert!(matches!(result, Err(Error::ProtocolSync { .. })));
    assert_eq!(out, vec!["ack_error: missing begin"]);
}

#[test]
fn test_continue_skips_failed_request() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Continue,
        &[
            "begin 1 read-labels x",
            "end 1",
            "begin 2 write-volatile-record 9",
            "1 2 3",
            "end 2",
            "begin 3 reseed 5",
            "end 3",
        ],
    );

    assert_eq!(result.unwrap(), SessionStats { completed: 1, failed: 2 });
    assert_eq!(out.len(), 6);
    assert!(out[0].starts_with("ack_error: read-labels() parameters not parsed correctly"));
    assert_eq!(out[1], "ack_begin 2");
    assert!(out[2].starts_with("index_error: "));
    assert_eq!(out[3..], ["ack_begin 3", "random seed set to: 5", "ack_end 3"]);
}

#[test]
fn test_continue_after_invalid_utf8() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let mut input = b"begin 1 write-volatile-record 0\r\n1 \xff 2\r\nend 1\r\n".to_vec();
    input.extend_from_slice(b"begin 2 reseed 9\r\nend 2\r\n");
    let mut ch = StreamChannel::new(Cursor::new(input), Vec::new());

    let stats = Session::new(&mut dispatcher)
        .with_policy(FailurePolicy::Continue)
        .serve(&mut ch)
        .unwrap();

    assert_eq!(stats, SessionStats { completed: 1, failed: 1 });
    let out = transcript(ch);
    assert_eq!(out[0], "ack_begin 1");
    assert_eq!(out[1], "ack_error: line is not valid UTF-8");
    assert_eq!(out[2..], ["ack_begin 2", "random seed set to: 9", "ack_end 2"]);
}

#[test]
fn test_mismatched_end_seq() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Continue,
        &["begin 4 reseed 1", "end 5", "begin 6 reseed 2", "end 6"],
    );

    assert_eq!(result.unwrap(), SessionStats { completed: 1, failed: 1 });
    assert_eq!(
        out,
        vec![
            "ack_begin 4",
            "random seed set to: 1",
            "ack_error: seq_num not matching seq_number from begin statement",
            "ack_begin 6",
            "random seed set to: 2",
            "ack_end 6",
        ]
    );
}

#[test]
fn test_unaligned_address_is_range_error() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 1 read-persistent-record 0x101", "end 1"],
    );

    assert!(matches!(result, Err(Error::Range { .. })));
    assert_eq!(out[0], "ack_begin 1");
    assert!(out[1].starts_with("index_error: "));
}

#[test]
fn test_wrong_ack_during_read() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["begin 1 read-volatile-record 0", "2", "end 1"],
    );

    assert!(matches!(result, Err(Error::ProtocolSync { .. })));
    assert_eq!(out[1], "0 0 0");
    assert_eq!(out[2], "ack_error: ack_num mismatch: expected 3, got 2");
}

#[test]
fn test_blank_lines_between_requests() {
    let mut dispatcher = seeded_dispatcher(tiny_config());
    let (result, out) = run(
        &mut dispatcher,
        FailurePolicy::Halt,
        &["", "begin 1 reseed 3", "end 1", ""],
    );
    assert_eq!(result.unwrap().completed, 1);
    assert_eq!(out.len(), 3);
}
