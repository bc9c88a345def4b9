#![forbid(unsafe_code)]

use crate::domain::{ScanFailure, ScanVerdict, UNKNOWN_SIGNATURE};
use crate::scan::ScanClient;
use async_trait::async_trait;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Client for the clamd TCP protocol. Opens a fresh connection per request;
/// clamd closes the socket after answering a newline-terminated command.
#[derive(Debug, Clone)]
pub struct ClamdClient {
    address: String,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl ClamdClient {
    pub fn new(config: &config::Scanner) -> Self {
        Self {
            address: config.address(),
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        }
    }

    async fn request(&self, command: &[u8]) -> Result<String, ScanFailure> {
        let connect = timeout(self.connect_timeout, TcpStream::connect(&self.address)).await;
        let mut stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                return Err(ScanFailure::DaemonUnavailable {
                    addr: self.address.clone(),
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                return Err(ScanFailure::DaemonUnavailable {
                    addr: self.address.clone(),
                    reason: "connection timed out".into(),
                });
            }
        };

        let exchange = async {
            stream.write_all(command).await?;
            stream.flush().await?;
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };

        let reply = timeout(self.io_timeout, exchange)
            .await
            .map_err(|_| ScanFailure::Timeout)?
            .map_err(|err| ScanFailure::Protocol(err.to_string()))?;

        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

#[async_trait]
impl ScanClient for ClamdClient {
    async fn scan(&self, path: &Path) -> ScanVerdict {
        if let Err(err) = tokio::fs::metadata(path).await {
            return ScanVerdict::Error(ScanFailure::from_io(&err));
        }

        let raw = path.as_os_str().as_bytes();
        if raw.contains(&b'\n') {
            return ScanVerdict::Error(ScanFailure::Protocol(
                "path contains a newline".into(),
            ));
        }

        let mut command = Vec::with_capacity(raw.len() + 7);
        command.extend_from_slice(b"nSCAN ");
        command.extend_from_slice(raw);
        command.push(b'\n');

        match self.request(&command).await {
            Ok(reply) => {
                trace!(?path, %reply, "clamd reply");
                parse_scan_reply(path, &reply)
            }
            Err(failure) => ScanVerdict::Error(failure),
        }
    }

    async fn ping(&self) -> Result<(), ScanFailure> {
        let reply = self.request(b"nPING\n").await?;
        match reply.trim_end_matches(['\0', '\n', '\r']) {
            "PONG" => Ok(()),
            other => Err(ScanFailure::Protocol(format!("unexpected ping reply: {other}"))),
        }
    }
}

/// Parse a reply of the form `<path>: OK`, `<path>: <signature> FOUND` or
/// `<path>: <reason> ERROR`.
pub(crate) fn parse_scan_reply(path: &Path, reply: &str) -> ScanVerdict {
    let Some(line) = reply
        .split(['\0', '\n'])
        .map(|line| line.trim_end_matches('\r'))
        .find(|line| !line.trim().is_empty())
    else {
        return ScanVerdict::Error(ScanFailure::Protocol("empty reply".into()));
    };

    let requested = path.to_string_lossy();
    let status = line
        .strip_prefix(requested.as_ref())
        .and_then(|rest| rest.strip_prefix(": "))
        .or_else(|| line.rsplit_once(": ").map(|(_, rest)| rest));

    let Some(status) = status.map(str::trim) else {
        return ScanVerdict::Error(ScanFailure::Protocol(format!("unexpected reply: {line}")));
    };

    if status == "OK" {
        return ScanVerdict::Clean;
    }
    if status == "FOUND" {
        return ScanVerdict::Infected(UNKNOWN_SIGNATURE.to_string());
    }
    if let Some(signature) = status.strip_suffix(" FOUND") {
        return ScanVerdict::Infected(signature.trim().to_string());
    }
    if let Some(reason) = status.strip_suffix(" ERROR") {
        return ScanVerdict::Error(ScanFailure::Daemon(reason.trim().to_string()));
    }
    ScanVerdict::Error(ScanFailure::Daemon(status.to_string()))
}
