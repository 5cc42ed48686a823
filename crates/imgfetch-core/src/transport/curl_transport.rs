//! libcurl transport.
//!
//! Each request runs a single `Easy` handle on Tokio's blocking pool. Body
//! bytes are forwarded as they arrive; the abort flag is polled from both the
//! write and progress callbacks so a stalled transfer still stops promptly.

use std::cell::{Cell, RefCell};
use std::str;
use std::time::Duration;

use super::{Transport, TransportError, TransportEvent, TransportRequest, TransportSink, TransportStream};

/// Default libcurl-backed transport.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    connect_timeout: Duration,
    channel_capacity: usize,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            channel_capacity: 32,
        }
    }
}

impl CurlTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect phase limit (independent of the overall operation deadline).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Transport for CurlTransport {
    fn start(&self, request: TransportRequest) -> Result<TransportStream, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Network(format!("no async runtime: {}", e)))?;
        let (sink, stream) = TransportStream::channel(self.channel_capacity);
        let connect_timeout = self.connect_timeout;
        runtime.spawn_blocking(move || {
            let last = match perform(&request, &sink, connect_timeout) {
                Ok(()) => TransportEvent::Done,
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "curl transfer failed");
                    TransportEvent::Failed(e)
                }
            };
            let _ = sink.blocking_send(last);
        });
        Ok(stream)
    }
}

fn net(e: curl::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

/// Runs one GET to completion on the current (blocking) thread.
fn perform(
    request: &TransportRequest,
    sink: &TransportSink,
    connect_timeout: Duration,
) -> Result<(), TransportError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url).map_err(net)?;
    easy.follow_location(true).map_err(net)?;
    easy.max_redirections(10).map_err(net)?;
    easy.connect_timeout(connect_timeout).map_err(net)?;
    if !request.timeout.is_zero() {
        easy.timeout(request.timeout).map_err(net)?;
    }
    easy.progress(true).map_err(net)?;

    let mut list = curl::easy::List::new();
    for line in request.headers.to_lines() {
        list.append(&line).map_err(net)?;
    }
    if request.bypass_cache {
        list.append("Cache-Control: no-cache").map_err(net)?;
        list.append("Pragma: no-cache").map_err(net)?;
    }
    easy.http_headers(list).map_err(net)?;

    if let Some(cred) = &request.credential {
        easy.username(&cred.user).map_err(net)?;
        easy.password(&cred.password).map_err(net)?;
    }
    if request.handle_cookies {
        // Empty path turns on the in-memory cookie engine without reading a file.
        easy.cookie_file("").map_err(net)?;
    }
    if request.allow_insecure {
        easy.ssl_verify_peer(false).map_err(net)?;
        easy.ssl_verify_host(false).map_err(net)?;
    }

    let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let announced = Cell::new(false);
    let rejected_status: Cell<Option<u32>> = Cell::new(None);

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    // A new status line (redirect hop) starts a fresh header block.
                    if line.starts_with("HTTP/") {
                        lines.borrow_mut().clear();
                    }
                    lines.borrow_mut().push(line.to_string());
                }
                true
            })
            .map_err(net)?;
        transfer
            .write_function(|data| {
                if sink.is_aborted() {
                    return Ok(0);
                }
                if !announced.get() {
                    announced.set(true);
                    let head = lines.borrow();
                    if let Some(code) = status_code(&head) {
                        if !(200..300).contains(&code) {
                            rejected_status.set(Some(code));
                            return Ok(0);
                        }
                    }
                    let expected_length = content_length(&head);
                    if !sink.blocking_send(TransportEvent::Response { expected_length }) {
                        return Ok(0);
                    }
                }
                if !sink.blocking_send(TransportEvent::Chunk(data.to_vec())) {
                    return Ok(0);
                }
                Ok(data.len())
            })
            .map_err(net)?;
        transfer
            .progress_function(|_, _, _, _| !sink.is_aborted())
            .map_err(net)?;
        transfer.perform()
    };

    if let Some(code) = rejected_status.get() {
        return Err(TransportError::Http(code));
    }
    if let Err(e) = performed {
        if sink.is_aborted() {
            return Err(TransportError::Aborted);
        }
        if e.is_operation_timedout() {
            return Err(TransportError::TimedOut);
        }
        return Err(net(e));
    }

    let code = easy.response_code().map_err(net)?;
    // Non-HTTP schemes (file://) report 0.
    if code != 0 && !(200..300).contains(&code) {
        return Err(TransportError::Http(code));
    }
    if !announced.get() {
        let expected_length = content_length(&lines.borrow());
        sink.blocking_send(TransportEvent::Response { expected_length });
    }
    Ok(())
}

/// Status code from the `HTTP/x.y NNN reason` line of the current header block.
fn status_code(lines: &[String]) -> Option<u32> {
    let first = lines.iter().find(|l| l.starts_with("HTTP/"))?;
    first.split_whitespace().nth(1)?.parse().ok()
}

/// `Content-Length` value of the current header block, if present and numeric.
fn content_length(lines: &[String]) -> Option<u64> {
    lines.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse::<u64>().ok()
        } else {
            None
        }
    })
}
