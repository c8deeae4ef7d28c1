//! In-process mock of a YuMi controller: three RAPID command sockets per
//! arm plus a minimal RWS HTTP endpoint, with request logging and
//! per-opcode reply overrides for fault injection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use yumid::Settings;

#[derive(Debug, Clone)]
pub struct LoggedRequest {
    pub arm: &'static str,
    pub port_offset: u16,
    pub code: i32,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub result: i32,
    pub message: String,
    pub delay: Duration,
}

impl Reply {
    pub fn failure(message: &str) -> Self {
        Self {
            result: 0,
            message: message.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed_success(delay: Duration) -> Self {
        Self {
            result: 1,
            message: String::new(),
            delay,
        }
    }
}

#[derive(Default)]
pub struct MockState {
    pub requests: Mutex<Vec<LoggedRequest>>,
    pub overrides: Mutex<HashMap<i32, Reply>>,
    pub rapid_running: AtomicBool,
    pub tasks_running: AtomicBool,
    pub ctrl_state: Mutex<String>,
    pub opmode: Mutex<String>,
    pub http_log: Mutex<Vec<String>>,
}

pub struct MockYumi {
    pub state: Arc<MockState>,
    pub left_port: u16,
    pub right_port: u16,
    pub http_port: u16,
}

impl MockYumi {
    pub fn start() -> Self {
        let state = Arc::new(MockState {
            rapid_running: AtomicBool::new(true),
            tasks_running: AtomicBool::new(true),
            ctrl_state: Mutex::new("motoron".to_string()),
            opmode: Mutex::new("AUTO".to_string()),
            ..MockState::default()
        });

        let left_port = spawn_arm_server("left", Arc::clone(&state));
        let right_port = spawn_arm_server("right", Arc::clone(&state));
        let http_port = spawn_http_server(Arc::clone(&state));

        Self {
            state,
            left_port,
            right_port,
            http_port,
        }
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::new("127.0.0.1");
        settings.base_port_left = self.left_port;
        settings.base_port_right = self.right_port;
        settings.rws_port = self.http_port;
        settings.motion_timeout = 5.0;
        settings.comm_timeout = 2.0;
        settings
    }

    pub fn set_reply(&self, code: i32, reply: Reply) {
        self.state.overrides.lock().unwrap().insert(code, reply);
    }

    pub fn clear_reply(&self, code: i32) {
        self.state.overrides.lock().unwrap().remove(&code);
    }

    pub fn requests_with_code(&self, code: i32) -> Vec<LoggedRequest> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.code == code)
            .cloned()
            .collect()
    }

    pub fn http_actions(&self, needle: &str) -> usize {
        self.state
            .http_log
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

/// Binds three listeners at consecutive even offsets (base, +2, +4) and
/// serves the RAPID wire protocol on them.
fn spawn_arm_server(arm: &'static str, state: Arc<MockState>) -> u16 {
    let (listeners, base_port) = bind_triple();
    for (offset, listener) in listeners {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let state = Arc::clone(&state);
                thread::spawn(move || serve_rapid_connection(arm, offset, conn, state));
            }
        });
    }
    base_port
}

fn bind_triple() -> (Vec<(u16, TcpListener)>, u16) {
    for _ in 0..64 {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = probe.local_addr().unwrap().port();
        drop(probe);
        if base > u16::MAX - 5 {
            continue;
        }

        let bound: Vec<_> = [0u16, 2, 4]
            .iter()
            .filter_map(|&offset| {
                TcpListener::bind(("127.0.0.1", base + offset))
                    .ok()
                    .map(|l| (offset, l))
            })
            .collect();
        if bound.len() == 3 {
            return (bound, base);
        }
    }
    panic!("could not allocate a port triple for the mock arm");
}

fn serve_rapid_connection(
    arm: &'static str,
    port_offset: u16,
    mut conn: TcpStream,
    state: Arc<MockState>,
) {
    loop {
        let Some(frame) = read_frame(&mut conn) else {
            return;
        };
        let (code, body) = match parse_frame(&frame) {
            Some(parsed) => parsed,
            None => return,
        };

        state.requests.lock().unwrap().push(LoggedRequest {
            arm,
            port_offset,
            code,
            body: body.clone(),
        });

        let reply = state.overrides.lock().unwrap().get(&code).cloned();
        let (result, message, delay) = match reply {
            Some(reply) => (reply.result, reply.message, reply.delay),
            None => (1, default_message(code), Duration::ZERO),
        };

        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let response = if message.is_empty() {
            format!("{code} {result}")
        } else {
            format!("{code} {result} {message}")
        };
        if conn.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

/// Reads bytes until the `#` frame terminator.
fn read_frame(conn: &mut TcpStream) -> Option<String> {
    let mut frame = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match conn.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {
                if byte[0] == b'#' {
                    return String::from_utf8(frame).ok();
                }
                frame.push(byte[0]);
            }
        }
    }
}

fn parse_frame(frame: &str) -> Option<(i32, String)> {
    let trimmed = frame.trim();
    match trimmed.split_once(' ') {
        Some((code, body)) => Some((code.parse().ok()?, body.trim().to_string())),
        None => Some((trimmed.parse().ok()?, String::new())),
    }
}

fn default_message(code: i32) -> String {
    match code {
        // get_pose: mm + quaternion
        3 => "300.0 0.0 200.0 0.0 0.0 0.0 1.0".to_string(),
        // get_joints: degrees
        4 => "0.0 10.0 20.0 30.0 40.0 50.0 60.0".to_string(),
        // get_gripper_width: mm
        26 => "10.0".to_string(),
        // buffer_size
        32 => "0".to_string(),
        // reachability queries
        40 | 41 => "1".to_string(),
        // ik: degrees
        42 => "0.0 10.0 20.0 30.0 40.0 50.0 60.0".to_string(),
        // fk: pose
        43 => "300.0 0.0 200.0 0.0 0.0 0.0 1.0".to_string(),
        // is_lead_through
        61 => "0".to_string(),
        // is_gripper_calibrated
        70 => "1".to_string(),
        _ => String::new(),
    }
}

// --- RWS ---------------------------------------------------------------

fn spawn_http_server(state: Arc<MockState>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for conn in listener.incoming() {
            let Ok(conn) = conn else { break };
            let state = Arc::clone(&state);
            thread::spawn(move || serve_http_connection(conn, state));
        }
    });
    port
}

fn serve_http_connection(mut conn: TcpStream, state: Arc<MockState>) {
    loop {
        let Some((method, target, request_body)) = read_http_request(&mut conn) else {
            return;
        };

        state
            .http_log
            .lock()
            .unwrap()
            .push(format!("{method} {target}"));

        let (status, body) = route(&state, &method, &target, &request_body);
        let reason = match status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            _ => "Not Found",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        if conn.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

fn read_http_request(conn: &mut TcpStream) -> Option<(String, String, String)> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match conn.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) => head.push(byte[0]),
        }
    }
    let head = String::from_utf8(head).ok()?;
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let content_length: usize = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        conn.read_exact(&mut body).ok()?;
    }
    Some((method, target, String::from_utf8_lossy(&body).to_string()))
}

fn route(state: &MockState, method: &str, target: &str, request_body: &str) -> (u16, String) {
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    match (method, path) {
        ("GET", "/rw/panel/opmode") => {
            let opmode = state.opmode.lock().unwrap().clone();
            (200, embedded_state(&format!(r#"{{"opmode": "{opmode}"}}"#)))
        }
        ("GET", "/rw/panel/ctrlstate") => {
            let ctrl = state.ctrl_state.lock().unwrap().clone();
            (200, embedded_state(&format!(r#"{{"ctrlstate": "{ctrl}"}}"#)))
        }
        ("GET", "/rw/rapid/execution") => {
            let exec = if state.rapid_running.load(Ordering::SeqCst) {
                "running"
            } else {
                "stopped"
            };
            (200, embedded_state(&format!(r#"{{"ctrlexecstate": "{exec}"}}"#)))
        }
        ("GET", "/rw/rapid/tasks") => {
            let excstate = if state.tasks_running.load(Ordering::SeqCst) {
                "star"
            } else {
                "stop"
            };
            let tasks = format!(
                r#"{{"name": "T_ROB_L", "excstate": "{excstate}"}}, {{"name": "T_ROB_R", "excstate": "{excstate}"}}"#
            );
            (200, embedded_state(&tasks))
        }
        ("POST", "/rw/rapid/execution") if query.contains("action=resetpp") => (204, String::new()),
        ("POST", "/rw/rapid/execution") if query.contains("action=start") => {
            state.rapid_running.store(true, Ordering::SeqCst);
            state.tasks_running.store(true, Ordering::SeqCst);
            (204, String::new())
        }
        ("POST", "/rw/rapid/execution") if query.contains("action=stop") => {
            state.rapid_running.store(false, Ordering::SeqCst);
            state.tasks_running.store(false, Ordering::SeqCst);
            (204, String::new())
        }
        ("POST", p) if p.starts_with("/rw/rapid/tasks/") && query.contains("action=activate") => {
            (204, String::new())
        }
        ("POST", "/rw/panel/ctrlstate") => {
            if let Some(value) = request_body.strip_prefix("ctrl-state=") {
                *state.ctrl_state.lock().unwrap() = value.to_string();
            }
            (204, String::new())
        }
        ("POST", "/rw/mastership") => (204, String::new()),
        ("POST", "/users/rmmp") => (204, String::new()),
        ("POST", "/users") if query.contains("action=set-locale") => (204, String::new()),
        ("POST", "/users") => (201, String::new()),
        _ => (
            404,
            r#"{"_embedded": {"status": {"msg": "no such resource"}}}"#.to_string(),
        ),
    }
}

fn embedded_state(items: &str) -> String {
    format!(r#"{{"_embedded": {{"_state": [{items}]}}}}"#)
}
