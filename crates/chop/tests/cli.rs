#![cfg(feature = "cli")]

use std::io::Write;
use std::net::SocketAddr;
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chop_frame::{Frame, Status};
use chop_peer::{connect, listen, PeerConfig, Received};

const WAIT: Duration = Duration::from_secs(10);

struct TestServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    received: mpsc::Receiver<Received>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start() -> Self {
        let mut server = listen("127.0.0.1:0".parse().unwrap(), PeerConfig::default())
            .expect("server should bind");
        let addr = server.local_addr();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, received) = mpsc::channel();

        let thread = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    server
                        .poll_once(Some(Duration::from_millis(20)))
                        .expect("poll should succeed");
                    for payload in server.take_received() {
                        let _ = tx.send(payload);
                    }
                }
            })
        };

        Self {
            addr,
            stop,
            received,
            thread: Some(thread),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn chop() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_chop"));
    cmd.env_remove("CHOP_ADDR")
        .env_remove("CHOP_WINDOW")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        match child.try_wait().expect("try_wait should succeed") {
            Some(_) => return child.wait_with_output().expect("output should be readable"),
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                let output = child.wait_with_output().expect("output should be readable");
                panic!(
                    "chop did not exit within {timeout:?}; stderr: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            None => thread::sleep(Duration::from_millis(20)),
        }
    }
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn send_ping_prints_acknowledgement() {
    let server = TestServer::start();
    let child = chop()
        .args(["send", "--format", "json", "--addr"])
        .arg(server.addr.to_string())
        .arg("ping")
        .spawn()
        .expect("chop should start");

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(0));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["kind"], "acknowledged");
    assert_eq!(lines[0]["status"], 5);
    assert_eq!(lines[0]["status_name"], "ENQUIRY");
}

#[test]
fn send_wake_while_awake_is_refused() {
    let server = TestServer::start();
    let child = chop()
        .args(["send", "--format", "json", "--addr"])
        .arg(server.addr.to_string())
        .arg("wake")
        .spawn()
        .expect("chop should start");

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(1));

    let lines = json_lines(&output);
    assert_eq!(lines[0]["kind"], "refused");
    assert_eq!(lines[0]["status"], 7);
}

#[test]
fn send_joins_words_into_text() {
    let server = TestServer::start();
    let child = chop()
        .args(["send", "--format", "json", "--addr"])
        .arg(server.addr.to_string())
        .args(["hello", "world"])
        .spawn()
        .expect("chop should start");

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(0));

    let received = server.received.recv_timeout(WAIT).expect("server should get text");
    assert_eq!(received.payload.as_ref(), b"hello world");
}

#[test]
fn console_forwards_stdin_lines() {
    let server = TestServer::start();
    let mut child = chop()
        .args(["console", "--format", "json", "--addr"])
        .arg(server.addr.to_string())
        .stdin(Stdio::piped())
        .spawn()
        .expect("chop should start");

    {
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        stdin
            .write_all(b"first line\nsleep\nwake\nexit\n")
            .expect("stdin should accept input");
    }

    let received = server.received.recv_timeout(WAIT).expect("server should get text");
    assert_eq!(received.payload.as_ref(), b"first line");

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(0));

    let acknowledged: Vec<u64> = json_lines(&output)
        .iter()
        .filter(|line| line["kind"] == "acknowledged")
        .filter_map(|line| line["status"].as_u64())
        .collect();
    assert!(acknowledged.contains(&u64::from(Status::StartText.as_byte())));
}

#[test]
fn serve_prints_received_text() {
    let port = free_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let mut child = chop()
        .args(["serve", "--format", "json", "--count", "1", "--addr"])
        .arg(addr.to_string())
        .spawn()
        .expect("chop should start");

    let start = Instant::now();
    let client = loop {
        let attempt = connect(addr, PeerConfig::default())
            .and_then(|client| client.wait_established(Duration::from_secs(1)).map(|()| client));
        match attempt {
            Ok(client) => break client,
            Err(err) if start.elapsed() < WAIT => {
                let _ = err;
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = child.kill();
                panic!("could not reach chop serve: {err}");
            }
        }
    };

    client
        .send(Frame::text(&b"over the wire"[..]).unwrap())
        .unwrap();
    client.expect_ack(Status::StartText, WAIT).unwrap();

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(0));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["event"], "text");
    assert_eq!(lines[0]["payload"], "over the wire");
    assert_eq!(lines[0]["payload_size"], 13);
}

#[test]
fn window_smaller_than_header_is_usage_error() {
    let child = chop()
        .args(["send", "--window", "2", "--addr", "127.0.0.1:50001", "ping"])
        .spawn()
        .expect("chop should start");

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn refused_connect_is_transport_error() {
    let addr = format!("127.0.0.1:{}", free_port());
    let child = chop()
        .args(["send", "--timeout", "2s", "--addr"])
        .arg(&addr)
        .arg("ping")
        .spawn()
        .expect("chop should start");

    let output = wait_with_timeout(child, WAIT);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(3), "stderr: {stderr}");
    assert!(stderr.contains("connect failed"));
}
