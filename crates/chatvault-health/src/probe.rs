//! HTTP/TCP/DNS probes.
//!
//! Plain HTTP/1 probes over a raw TCP connection, with bounded timeout
//! and round-trip latency measurement. The external-dependency check
//! only needs reachability, so it stops at the TCP connect.

use std::time::{Duration, Instant};

use http_body_util::BodyExt;
use tracing::debug;

/// Outcome of a successful HTTP probe.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
    pub latency: Duration,
}

/// Why a probe produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Connect/handshake/request error.
    Unreachable,
    /// No response within the timeout.
    TimedOut,
}

/// Probe target split out of a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// host:port to connect to.
    pub address: String,
    /// Host header value.
    pub host: String,
    /// Path prefix from the URL (usually empty).
    pub base_path: String,
}

/// Split `http://host[:port][/prefix]` into a connectable target.
///
/// An `https://` URL yields port 443; the reachability probes only
/// connect, they do not speak TLS.
pub fn parse_base_url(url: &str) -> Option<Target> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix("http://") {
        (80u16, rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (443u16, rest)
    } else {
        return None;
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].trim_end_matches('/')),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return None;
    }

    let (host, address) = match authority.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => {
            (host.to_string(), authority.to_string())
        }
        _ => (authority.to_string(), format!("{authority}:{default_port}")),
    };

    Some(Target {
        address,
        host,
        base_path: path.to_string(),
    })
}

/// GET `path` from `target` with a bounded timeout.
pub async fn http_get(
    target: &Target,
    path: &str,
    timeout: Duration,
) -> Result<ProbeResponse, ProbeFailure> {
    let full_path = format!("{}{}", target.base_path, path);
    let started = Instant::now();

    let attempt = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(&target.address)
            .await
            .map_err(|e| {
                debug!(address = %target.address, error = %e, "probe connect failed");
                ProbeFailure::Unreachable
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| {
                debug!(address = %target.address, error = %e, "probe handshake failed");
                ProbeFailure::Unreachable
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&full_path)
            .header("host", &target.host)
            .header("user-agent", "chatvault-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|_| ProbeFailure::Unreachable)?;

        let resp = sender.send_request(req).await.map_err(|e| {
            debug!(path = %full_path, error = %e, "probe request failed");
            ProbeFailure::Unreachable
        })?;

        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map(|collected| String::from_utf8_lossy(&collected.to_bytes()).into_owned())
            .unwrap_or_default();

        Ok(ProbeResponse {
            status,
            body,
            latency: started.elapsed(),
        })
    })
    .await;

    match attempt {
        Ok(result) => result,
        Err(_) => {
            debug!(path = %full_path, "probe timed out");
            Err(ProbeFailure::TimedOut)
        }
    }
}

/// Whether a TCP connection to `address` succeeds within `timeout`.
pub async fn tcp_reachable(address: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect(address)).await,
        Ok(Ok(_))
    )
}

/// Whether `host` resolves in DNS.
pub async fn dns_resolves(host: &str) -> bool {
    tokio::net::lookup_host((host, 80))
        .await
        .map(|mut addrs| addrs.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn parse_plain_host() {
        let target = parse_base_url("http://localhost:8000").unwrap();
        assert_eq!(target.address, "localhost:8000");
        assert_eq!(target.host, "localhost");
        assert_eq!(target.base_path, "");
    }

    #[test]
    fn parse_default_ports() {
        assert_eq!(
            parse_base_url("http://archive.example.com").unwrap().address,
            "archive.example.com:80"
        );
        assert_eq!(
            parse_base_url("https://qyapi.weixin.qq.com").unwrap().address,
            "qyapi.weixin.qq.com:443"
        );
    }

    #[test]
    fn parse_with_path_prefix() {
        let target = parse_base_url("http://localhost:8000/archive/").unwrap();
        assert_eq!(target.base_path, "/archive");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_base_url("localhost:8000").is_none());
        assert!(parse_base_url("http://").is_none());
    }

    #[tokio::test]
    async fn http_get_closed_port_is_unreachable() {
        let target = parse_base_url("http://127.0.0.1:1").unwrap();
        let err = http_get(&target, "/health", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeFailure::Unreachable);
    }

    #[tokio::test]
    async fn http_get_reads_status_and_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let body = r#"{"status": "healthy"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });

        let target = parse_base_url(&format!("http://{addr}")).unwrap();
        let resp = http_get(&target, "/health", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("healthy"));
    }

    #[tokio::test]
    async fn http_get_times_out_on_silent_server() {
        // Listener that accepts but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let target = parse_base_url(&format!("http://{addr}")).unwrap();
        let err = http_get(&target, "/health", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeFailure::TimedOut);
    }

    #[tokio::test]
    async fn tcp_reachable_closed_port() {
        assert!(!tcp_reachable("127.0.0.1:1", Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn tcp_reachable_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(tcp_reachable(&addr.to_string(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn localhost_resolves() {
        assert!(dns_resolves("localhost").await);
    }
}
