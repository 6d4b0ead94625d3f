//! One SMTP connection: socket plumbing, reply parsing, and the per-session
//! stage machine.
//!
//! The stage only ever advances within a connection; an unexpected reply
//! tears the session down rather than rewinding. `RSET` is the single
//! sanctioned exception and returns the session to the post-HELO state.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::timeout;

use crate::core::error::{AppError, Result};

/// Position in the minimal probe dialogue. Monotonic within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    Helo,
    Mail,
    Rcpt,
    Data,
    Done,
}

/// A complete SMTP reply: status code plus every line of a multi-line
/// continuation, and the raw text for pattern classification.
#[derive(Debug, Clone)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
    pub raw: String,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Transient per-connection probe state. Discarded when the socket closes.
pub struct ProbeSession {
    stream: BufStream<TcpStream>,
    stage: Stage,
    timeout: Duration,
    peer: String,
}

impl ProbeSession {
    /// Connects to `host:port`, optionally binding the outbound socket to
    /// `source_ip`. Tries every resolved address before giving up.
    pub async fn connect(
        host: &str,
        port: u16,
        source_ip: Option<IpAddr>,
        io_timeout: Duration,
    ) -> Result<Self> {
        let addrs: Vec<SocketAddr> = timeout(io_timeout, lookup_host((host, port)))
            .await
            .map_err(|_| AppError::SmtpTimeout(format!("resolving {host}")))?
            .map_err(|e| AppError::SmtpConnection(format!("cannot resolve {host}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(AppError::SmtpConnection(format!(
                "{host} resolved to no addresses"
            )));
        }

        let mut last_err = None;
        for addr in addrs {
            match Self::connect_one(addr, source_ip, io_timeout).await {
                Ok(stream) => {
                    return Ok(Self {
                        stream: BufStream::new(stream),
                        stage: Stage::Init,
                        timeout: io_timeout,
                        peer: format!("{host}:{port}"),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| AppError::SmtpConnection(format!("no route to {host}:{port}"))))
    }

    async fn connect_one(
        addr: SocketAddr,
        source_ip: Option<IpAddr>,
        io_timeout: Duration,
    ) -> Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(ip) = source_ip {
            // A pinned source address only applies to its own family.
            if ip.is_ipv4() != addr.is_ipv4() {
                return Err(AppError::SmtpConnection(format!(
                    "source IP {ip} and target {addr} are different address families"
                )));
            }
            socket.bind(SocketAddr::new(ip, 0))?;
        }
        timeout(io_timeout, socket.connect(addr))
            .await
            .map_err(|_| AppError::SmtpTimeout(format!("connecting to {addr}")))?
            .map_err(|e| AppError::SmtpConnection(format!("connect {addr}: {e}")))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Moves the session forward. Refuses any regression.
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if next <= self.stage {
            return Err(AppError::SmtpProtocol(format!(
                "stage cannot regress from {:?} to {next:?}",
                self.stage
            )));
        }
        self.stage = next;
        Ok(())
    }

    /// Explicit RSET: back to the post-HELO state so the connection can host
    /// another envelope.
    pub fn reset_envelope(&mut self) -> Result<()> {
        if self.stage < Stage::Helo {
            return Err(AppError::SmtpProtocol(
                "RSET before the greeting completed".to_string(),
            ));
        }
        self.stage = Stage::Helo;
        Ok(())
    }

    /// Writes one command line (CRLF appended) under the session timeout.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        let write = async {
            self.stream.write_all(command.as_bytes()).await?;
            self.stream.write_all(b"\r\n").await?;
            self.stream.flush().await
        };
        timeout(self.timeout, write)
            .await
            .map_err(|_| AppError::SmtpTimeout(format!("writing to {}", self.peer)))?
            .map_err(|e| AppError::SmtpConnection(format!("write {}: {e}", self.peer)))
    }

    /// Sends a command and requires a specific reply code, naming the
    /// handshake step in the error when the server disagrees.
    pub async fn send_expect(
        &mut self,
        command: &str,
        expected: u16,
        step: &str,
    ) -> Result<SmtpReply> {
        self.send_command(command).await?;
        let reply = self.read_reply().await?;
        if reply.code != expected {
            return Err(AppError::SmtpProtocol(format!(
                "{} answered {step} with {} (expected {expected})",
                self.peer, reply.code
            )));
        }
        Ok(reply)
    }

    /// Reads one full reply, following `XYZ-` continuation lines until the
    /// terminal `XYZ ` line.
    pub async fn read_reply(&mut self) -> Result<SmtpReply> {
        let mut lines = Vec::new();
        let mut raw = String::new();
        loop {
            let line = self.read_line().await?;
            // `get` keeps a non-ASCII byte in the code position from slicing
            // inside a character.
            let code = line
                .get(..3)
                .and_then(|prefix| prefix.parse::<u16>().ok())
                .ok_or_else(|| {
                    AppError::SmtpProtocol(format!(
                        "malformed reply line from {}: '{line}'",
                        self.peer
                    ))
                })?;
            let is_continuation = line.as_bytes().get(3) == Some(&b'-');
            raw.push_str(&line);
            raw.push('\n');
            lines.push(line.get(4..).unwrap_or("").to_string());
            if !is_continuation {
                return Ok(SmtpReply { code, lines, raw });
            }
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = timeout(self.timeout, self.stream.read_line(&mut line))
            .await
            .map_err(|_| AppError::SmtpTimeout(format!("awaiting reply from {}", self.peer)))?
            .map_err(|e| AppError::SmtpConnection(format!("read {}: {e}", self.peer)))?;
        if read == 0 {
            return Err(AppError::SmtpConnection(format!(
                "{} closed the connection",
                self.peer
            )));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Best-effort QUIT and socket shutdown. Never fails: the session is
    /// being discarded either way.
    pub async fn close(mut self) {
        let _ = self.send_command("QUIT").await;
        let _ = self.read_reply().await;
        let _ = self.stream.get_mut().shutdown().await;
        self.stage = Stage::Done;
    }

    /// Drops the socket without the QUIT courtesy, e.g. after a block signal.
    pub async fn abort(mut self) {
        let _ = self.stream.get_mut().shutdown().await;
        self.stage = Stage::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Init < Stage::Helo);
        assert!(Stage::Helo < Stage::Mail);
        assert!(Stage::Mail < Stage::Rcpt);
        assert!(Stage::Rcpt < Stage::Data);
        assert!(Stage::Data < Stage::Done);
    }
}
