//! Minimal HTTP/1.1 server for the curl transport tests.
//!
//! Routes by path: `/image.png` serves the given body as `image/png`,
//! `/garbage` serves bytes that are not an image, and anything else is 404.
//! Request headers of the last request are recorded for inspection.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub struct ImageServer {
    pub base: String,
    last_request: Arc<Mutex<Vec<String>>>,
}

impl ImageServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// Header lines of the most recent request, without the request line.
    pub fn last_request_headers(&self) -> Vec<String> {
        self.last_request.lock().unwrap().clone()
    }
}

/// Start serving `png` in a background thread; runs until the process exits.
pub fn start(png: Vec<u8>) -> ImageServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let png = Arc::new(png);
    let last_request = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&last_request);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let png = Arc::clone(&png);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || handle(stream, &png, &recorded));
        }
    });
    ImageServer {
        base: format!("http://127.0.0.1:{}/", port),
        last_request,
    }
}

fn handle(mut stream: TcpStream, png: &[u8], recorded: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut lines = request.lines();
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    *recorded.lock().unwrap() = lines
        .take_while(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .collect();

    let (status, content_type, body): (&str, &str, &[u8]) = match path.as_str() {
        "/image.png" => ("200 OK", "image/png", png),
        "/garbage" => ("200 OK", "application/octet-stream", b"definitely not an image"),
        _ => ("404 Not Found", "text/plain", b"not found"),
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}
