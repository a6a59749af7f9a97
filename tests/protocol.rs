//! Black-box integration tests: boot the full supervisor (library `run()`
//! entry point, bound to a real TCP port) and drive it exactly like a
//! client would, covering the literal scenarios from spec.md §8.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use rt_supervisor::cli::Cli;

/// Spawns the supervisor on its own thread, listening on `port`. The
/// thread is intentionally not joined by callers: `run()` only returns
/// after `SHUTDOWN`, and every test sends one before finishing.
fn spawn_server(port: u16, max_instances: Option<usize>) {
    let cli = Cli {
        port: Some(port),
        max_instances,
        max_queue: None,
        cpu: None,
        config: None,
        quiet: true,
    };
    std::thread::spawn(move || {
        let _ = rt_supervisor::run(cli);
    });
}

/// Connects to `port`, retrying briefly while the server thread finishes
/// binding its listener.
fn connect(port: u16) -> TcpStream {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return stream,
            Err(err) if std::time::Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(20));
                let _ = err;
            }
            Err(err) => panic!("failed to connect to 127.0.0.1:{port}: {err}"),
        }
    }
}

fn send_line(stream: &mut TcpStream, line: &str) {
    write!(stream, "{line}\r\n").unwrap();
    stream.flush().unwrap();
}

/// Reads exactly `n` newline-terminated lines (the caller knows the shape
/// of the reply it expects), stripped of the trailing `\n`.
fn read_lines(reader: &mut BufReader<&TcpStream>, n: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(n);
    for _ in 0..n {
        let mut line = String::new();
        let read = reader.read_line(&mut line).expect("read_line failed");
        assert!(read > 0, "connection closed before {n} lines were read");
        lines.push(line.trim_end_matches(['\n', '\r']).to_owned());
    }
    lines
}

fn read_one(reader: &mut BufReader<&TcpStream>) -> String {
    read_lines(reader, 1).into_iter().next().unwrap()
}

/// Every picked port is unique per test so parallel `cargo test` runs
/// never collide on a listener.
const PORT_ADMIT_ALL: u16 = 18081;
const PORT_UNKNOWN_TASK: u16 = 18082;
const PORT_INVALID_ID: u16 = 18083;
const PORT_LIST_ROUNDTRIP: u16 = 18084;
const PORT_SYSTEM_FULL: u16 = 18085;
const PORT_SHUTDOWN: u16 = 18086;
const PORT_INFO: u16 = 18087;
const PORT_DEACTIVATE_RESTORES_COUNT: u16 = 18088;
const PORT_MONOTONE_IDS: u16 = 18089;
const PORT_INVALID_COMMAND: u16 = 18090;

/// Scenario 1: the default catalog's three tasks are all jointly
/// schedulable (U = 0.567) and get sequential ids.
#[test]
fn scenario_admit_all_three_default_tasks() {
    spawn_server(PORT_ADMIT_ALL, None);
    let stream = connect(PORT_ADMIT_ALL);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "ACTIVATE t1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=1");

    send_line(&mut writer, "ACTIVATE t2");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=2");

    send_line(&mut writer, "ACTIVATE t3");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=3");

    send_line(&mut writer, "DEACTIVATE 1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");
    send_line(&mut writer, "DEACTIVATE 2");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");
    send_line(&mut writer, "DEACTIVATE 3");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// Scenario 4: an unrecognized catalog name is rejected without touching
/// the active set.
#[test]
fn scenario_unknown_task_is_rejected() {
    spawn_server(PORT_UNKNOWN_TASK, None);
    let stream = connect(PORT_UNKNOWN_TASK);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "ACTIVATE nope");
    assert_eq!(read_one(&mut reader), "[SERVER]: ERR Unknown Task");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// Scenario 5: deactivating an id that was never issued is rejected.
#[test]
fn scenario_deactivate_unknown_id_is_rejected() {
    spawn_server(PORT_INVALID_ID, None);
    let stream = connect(PORT_INVALID_ID);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "DEACTIVATE 999");
    assert_eq!(read_one(&mut reader), "[SERVER]: ERR Invalid ID");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// Scenario 7 / P5: `LIST` is empty before any activation, and reports the
/// activated task afterwards, using the command aliases throughout.
#[test]
fn scenario_list_round_trip_and_aliases() {
    spawn_server(PORT_LIST_ROUNDTRIP, None);
    let stream = connect(PORT_LIST_ROUNDTRIP);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "L");
    assert_eq!(read_one(&mut reader), "[SERVER]: Running: 0");

    send_line(&mut writer, "A t1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=1");

    send_line(&mut writer, "LIST");
    let lines = read_lines(&mut reader, 2);
    assert_eq!(lines[0], "[SERVER]: Running: 1");
    assert_eq!(lines[1], "  [ID 1] t1 (C=50, T=300)");

    send_line(&mut writer, "D 1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");

    send_line(&mut writer, "S");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// Scenario 6: once `max_instances` active slots are occupied, the next
/// `ACTIVATE` is rejected with `ERR System Full` even though it would be
/// independently schedulable.
#[test]
fn scenario_system_full_once_capacity_reached() {
    spawn_server(PORT_SYSTEM_FULL, Some(1));
    let stream = connect(PORT_SYSTEM_FULL);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "ACTIVATE t1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=1");

    send_line(&mut writer, "ACTIVATE t2");
    assert_eq!(read_one(&mut reader), "[SERVER]: ERR System Full");

    send_line(&mut writer, "DEACTIVATE 1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// Scenario 8 / P6: `SHUTDOWN` replies immediately, and the listening
/// socket is gone shortly afterwards.
#[test]
fn scenario_shutdown_closes_the_listener() {
    spawn_server(PORT_SHUTDOWN, None);
    let stream = connect(PORT_SHUTDOWN);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
    drop(stream);

    // The network thread notices `shutdown` on its next poll tick (<=
    // the poll timeout) rather than instantaneously.
    std::thread::sleep(Duration::from_millis(500));

    let result = TcpStream::connect(("127.0.0.1", PORT_SHUTDOWN));
    assert!(
        result.is_err(),
        "expected the listener to be closed after shutdown"
    );
}

/// `INFO` reports capacity and every catalog entry, regardless of what is
/// currently active.
#[test]
fn info_reports_capacity_and_full_catalog() {
    spawn_server(PORT_INFO, None);
    let stream = connect(PORT_INFO);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "INFO");
    let lines = read_lines(&mut reader, 5);
    assert_eq!(lines[0], "[SERVER]: Capacity: 0/20 active");
    assert_eq!(lines[1], "Tasks:");
    assert_eq!(lines[2], "  t1 (C=50, T=300, D=300)");
    assert_eq!(lines[3], "  t2 (C=100, T=500, D=500)");
    assert_eq!(lines[4], "  t3 (C=200, T=1000, D=1000)");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// P2: activating then deactivating the same task returns the active set
/// to its prior size, visible via `LIST`.
#[test]
fn deactivate_restores_prior_active_count() {
    spawn_server(PORT_DEACTIVATE_RESTORES_COUNT, None);
    let stream = connect(PORT_DEACTIVATE_RESTORES_COUNT);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "LIST");
    assert_eq!(read_one(&mut reader), "[SERVER]: Running: 0");

    send_line(&mut writer, "ACTIVATE t2");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=1");

    send_line(&mut writer, "DEACTIVATE 1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");

    send_line(&mut writer, "LIST");
    assert_eq!(read_one(&mut reader), "[SERVER]: Running: 0");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// P1: instance ids are strictly increasing across successive `ACTIVATE`s
/// in the same process, including across an intervening `DEACTIVATE`.
#[test]
fn instance_ids_are_strictly_monotone() {
    spawn_server(PORT_MONOTONE_IDS, None);
    let stream = connect(PORT_MONOTONE_IDS);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "ACTIVATE t1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK ID=1");

    send_line(&mut writer, "DEACTIVATE 1");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK");

    send_line(&mut writer, "ACTIVATE t1");
    assert_eq!(
        read_one(&mut reader),
        "[SERVER]: OK ID=2",
        "ids must never be reused, even after the owning instance is torn down"
    );

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}

/// Unparseable lines get `ERR Invalid Command` and do not disturb the
/// active set.
#[test]
fn unparseable_line_is_rejected() {
    spawn_server(PORT_INVALID_COMMAND, None);
    let stream = connect(PORT_INVALID_COMMAND);
    let mut reader = BufReader::new(&stream);
    let mut writer = stream.try_clone().unwrap();

    send_line(&mut writer, "FROBNICATE");
    assert_eq!(read_one(&mut reader), "[SERVER]: ERR Invalid Command");

    send_line(&mut writer, "ACTIVATE");
    assert_eq!(read_one(&mut reader), "[SERVER]: ERR Invalid Command");

    send_line(&mut writer, "LIST");
    assert_eq!(read_one(&mut reader), "[SERVER]: Running: 0");

    send_line(&mut writer, "SHUTDOWN");
    assert_eq!(read_one(&mut reader), "[SERVER]: OK Shutting Down");
}
