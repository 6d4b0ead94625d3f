//! In-process SMTP server used to exercise the probe stack without touching
//! real mail infrastructure. Supports a configurable valid-recipient set, a
//! catch-all switch, and a forced RCPT reply for adversarial scenarios.
#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use veriprobe_core::{Config, RelayIdentity};

/// A config tuned for in-process servers: no jitter, short timeouts, fast
/// retries. One identity per given host, keyed by that host.
pub fn fast_config(relay_hosts: &[&str]) -> Config {
    let mut config = Config::default();
    config.smtp_timeout = std::time::Duration::from_secs(2);
    config.retry_delay = std::time::Duration::from_millis(10);
    config.command_jitter_ms = (0, 0);
    config.catchall_probe_delay = std::time::Duration::from_millis(0);
    config.relays = relay_hosts
        .iter()
        .enumerate()
        .map(|(index, host)| RelayIdentity {
            host: host.to_string(),
            port: 25,
            source_ip: None,
            region: "test".to_string(),
            priority: index as u32,
        })
        .collect();
    config
}

#[derive(Clone, Copy, PartialEq)]
enum Stage {
    Init,
    Helo,
    Mail,
    Rcpt,
}

struct ServerState {
    valid_recipients: Mutex<HashSet<String>>,
    catch_all: AtomicBool,
    rcpt_reply: Mutex<Option<String>>,
    max_connections: AtomicUsize,
    active_connections: AtomicUsize,
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockSmtpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock SMTP server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(ServerState {
            valid_recipients: Mutex::new(HashSet::new()),
            catch_all: AtomicBool::new(false),
            rcpt_reply: Mutex::new(None),
            max_connections: AtomicUsize::new(10),
            active_connections: AtomicUsize::new(0),
        });
        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        let state = Arc::clone(&accept_state);
                        let cap = state.max_connections.load(Ordering::SeqCst);
                        if state.active_connections.load(Ordering::SeqCst) >= cap {
                            tokio::spawn(async move {
                                let _ = socket
                                    .write_all(b"421 Too many connections\r\n")
                                    .await;
                            });
                            continue;
                        }
                        state.active_connections.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            handle_connection(socket, Arc::clone(&state)).await;
                            state.active_connections.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(_) => break,
                }
            }
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn add_valid_recipient(&self, email: &str) {
        self.state
            .valid_recipients
            .lock()
            .insert(email.to_lowercase());
    }

    pub fn set_catch_all(&self, enabled: bool) {
        self.state.catch_all.store(enabled, Ordering::SeqCst);
    }

    /// Forces every subsequent RCPT to receive exactly this reply line.
    pub fn set_rcpt_reply(&self, reply: &str) {
        *self.state.rcpt_reply.lock() = Some(reply.to_string());
    }

    /// Caps concurrent sessions; excess connections get a 421 greeting and
    /// are dropped, mirroring overloaded production relays.
    pub fn set_max_connections(&self, limit: usize) {
        self.state.max_connections.store(limit, Ordering::SeqCst);
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(socket: TcpStream, state: Arc<ServerState>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    if write_half
        .write_all(b"220 localhost ESMTP test service ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    let mut stage = Stage::Init;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim().to_string();
        let upper = command.to_uppercase();

        let reply: String = if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            stage = Stage::Helo;
            "250-localhost greets you\r\n250-SIZE 35882577\r\n250 8BITMIME\r\n".to_string()
        } else if upper.starts_with("MAIL") {
            if stage != Stage::Helo {
                "503 Bad sequence of commands\r\n".to_string()
            } else {
                stage = Stage::Mail;
                "250 Ok\r\n".to_string()
            }
        } else if upper.starts_with("RCPT") {
            if stage != Stage::Mail && stage != Stage::Rcpt {
                "503 Bad sequence of commands\r\n".to_string()
            } else {
                stage = Stage::Rcpt;
                let forced = state.rcpt_reply.lock().clone();
                match forced {
                    Some(text) => format!("{text}\r\n"),
                    None => {
                        if accepts(&state, &command) {
                            "250 Ok\r\n".to_string()
                        } else {
                            "550 No such user here\r\n".to_string()
                        }
                    }
                }
            }
        } else if upper.starts_with("RSET") {
            if stage != Stage::Init {
                stage = Stage::Helo;
            }
            "250 Ok\r\n".to_string()
        } else if upper.starts_with("NOOP") {
            "250 Ok\r\n".to_string()
        } else if upper.starts_with("QUIT") {
            let _ = write_half.write_all(b"221 Goodbye\r\n").await;
            return;
        } else {
            "500 Unknown command\r\n".to_string()
        };

        if write_half.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn accepts(state: &ServerState, rcpt_command: &str) -> bool {
    if state.catch_all.load(Ordering::SeqCst) {
        return true;
    }
    let recipient = rcpt_command
        .find('<')
        .and_then(|start| rcpt_command[start + 1..].find('>').map(|end| {
            rcpt_command[start + 1..start + 1 + end].to_lowercase()
        }));
    match recipient {
        Some(address) => state.valid_recipients.lock().contains(&address),
        None => false,
    }
}
