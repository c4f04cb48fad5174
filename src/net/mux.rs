//! Protocol detection for a shared port.
//!
//! # Responsibilities
//! - Peek the first bytes of a connection without consuming them
//! - Classify them as gRPC (HTTP/2 preface), HTTP/1.x, or a TLS ClientHello
//!
//! # Design Decisions
//! - `TcpStream::peek` leaves every byte for the protocol stack that takes over
//! - Lookahead is bounded to the 24-byte HTTP/2 preface and by a deadline
//! - Cleartext HTTP/2 always belongs to gRPC

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

/// HTTP/2 client connection preface.
pub const H2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Maximum bytes ever inspected.
pub const MAX_LOOKAHEAD: usize = H2_PREFACE.len();

const HTTP1_METHODS: &[&[u8]] = &[
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"OPTIONS ",
    b"PATCH ",
    b"CONNECT ",
    b"TRACE ",
];

/// TLS handshake record header: content type 22, major version 3.
const TLS_RECORD: &[u8] = &[0x16, 0x03];

const PEEK_INTERVAL: Duration = Duration::from_millis(5);

/// Result of inspecting a connection's first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Grpc,
    Http,
    Tls,
    Unknown,
    /// The bytes so far are a prefix of a known opening.
    NeedMore,
}

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("protocol detection timed out")]
    Timeout,

    #[error("connection closed before protocol detection")]
    Closed,

    #[error("peek failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Classify the leading bytes of a connection.
pub fn classify(buf: &[u8]) -> Classification {
    if buf.is_empty() {
        return Classification::NeedMore;
    }

    let mut partial = false;
    for (pattern, class) in HTTP1_METHODS
        .iter()
        .map(|m| (*m, Classification::Http))
        .chain([(H2_PREFACE, Classification::Grpc), (TLS_RECORD, Classification::Tls)])
    {
        if buf.len() >= pattern.len() {
            if buf.starts_with(pattern) {
                return class;
            }
        } else if pattern.starts_with(buf) {
            partial = true;
        }
    }

    if partial {
        Classification::NeedMore
    } else {
        Classification::Unknown
    }
}

/// Peek at `stream` until its protocol is known or `deadline` passes.
///
/// Never returns [`Classification::NeedMore`].
pub async fn detect(stream: &TcpStream, deadline: Duration) -> Result<Classification, MuxError> {
    let mut buf = [0u8; MAX_LOOKAHEAD];

    let peek = async {
        loop {
            let n = stream.peek(&mut buf).await?;
            if n == 0 {
                return Err(MuxError::Closed);
            }
            match classify(&buf[..n]) {
                Classification::NeedMore => tokio::time::sleep(PEEK_INTERVAL).await,
                class => return Ok(class),
            }
        }
    };

    tokio::time::timeout(deadline, peek)
        .await
        .map_err(|_| MuxError::Timeout)?
}
