//! Minimal line-protocol server for integration tests.
//!
//! Understands a handful of requests:
//! - `whoami` replies `OK <name>`
//! - `echo <args>` replies `OK <args>`
//! - `fail <msg>` replies `ERR <msg>`
//! - `flaky` hangs up without replying the first `drop_first` times, then `OK flaky`
//!
//! Anything else gets `ERR unknown`.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LineServer {
    /// `127.0.0.1:<port>`
    pub addr: String,
    requests: Arc<AtomicUsize>,
}

impl LineServer {
    /// Number of request lines received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(name: &str) -> LineServer {
    start_flaky(name, 0)
}

/// Like `start`, but the first `drop_first` `flaky` requests are answered by
/// closing the connection.
pub fn start_flaky(name: &str, drop_first: usize) -> LineServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));
    let name = name.to_string();
    {
        let requests = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let name = name.clone();
                let requests = Arc::clone(&requests);
                let dropped = Arc::clone(&dropped);
                thread::spawn(move || handle(stream, &name, &requests, &dropped, drop_first));
            }
        });
    }
    LineServer {
        addr: format!("127.0.0.1:{port}"),
        requests,
    }
}

/// Address with nothing listening on it.
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{port}")
}

fn handle(
    stream: TcpStream,
    name: &str,
    requests: &AtomicUsize,
    dropped: &AtomicUsize,
    drop_first: usize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(_) => return,
    };
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { return };
        requests.fetch_add(1, Ordering::SeqCst);
        let (op, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let reply = match op {
            "whoami" => format!("OK {name}"),
            "echo" => format!("OK {rest}"),
            "fail" => format!("ERR {rest}"),
            "flaky" => {
                if dropped.fetch_add(1, Ordering::SeqCst) < drop_first {
                    return;
                }
                "OK flaky".to_string()
            }
            _ => "ERR unknown".to_string(),
        };
        if writeln!(writer, "{reply}").is_err() {
            return;
        }
    }
}
