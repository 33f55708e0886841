//! Plain-text line protocol client over TCP.
//!
//! A request is one line `OP arg1 arg2...`; the reply is one line, either
//! `OK <payload>` or `ERR <message>`. Used by the CLI and the integration
//! tests as a concrete [`RpcClient`].

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::client::{ClientFactory, RpcClient, Transport};
use crate::endpoint::Endpoint;
use crate::error::{RpcError, TransportError, TransportErrorKind};

/// TCP transport bound to one endpoint.
#[derive(Debug)]
pub struct LineTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Option<BufReader<TcpStream>>,
}

impl LineTransport {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            io_timeout,
            stream: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs: Vec<SocketAddr> = self
            .endpoint
            .authority()
            .to_socket_addrs()
            .map_err(|e| TransportError::from_io(e, format!("resolving {}", self.endpoint)))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                format!("no addresses for {}", self.endpoint),
            ));
        }
        Ok(addrs)
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let mut last = None;
        for addr in self.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect failed");
                    last = Some(e);
                }
            }
        }
        let e = last.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotConnected));
        Err(TransportError::from_io(e, format!("connecting to {}", self.endpoint)))
    }

    /// Send one request line and read one reply line. Any io failure leaves
    /// the transport closed.
    fn exchange(&mut self, request: &str) -> Result<String, TransportError> {
        let reader = self.stream.as_mut().ok_or_else(|| {
            TransportError::new(TransportErrorKind::NotOpen, "transport is not open")
        })?;
        let result = write_and_read(reader, request);
        if result.is_err() {
            self.stream = None;
        }
        result.map_err(|e| {
            let context = format!("exchanging with {}", self.endpoint);
            match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    TransportError::new(TransportErrorKind::EndOfFile, context)
                }
                _ => TransportError::from_io(e, context),
            }
        })
    }
}

fn write_and_read(reader: &mut BufReader<TcpStream>, request: &str) -> io::Result<String> {
    let stream = reader.get_mut();
    stream.write_all(request.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

impl Transport for LineTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.connect()?;
        let timeout = Some(self.io_timeout).filter(|t| !t.is_zero());
        stream
            .set_read_timeout(timeout)
            .and_then(|()| stream.set_write_timeout(timeout))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|e| TransportError::from_io(e, "configuring socket"))?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(reader) = self.stream.take() {
            // The peer may already have hung up.
            if let Err(e) = reader.get_ref().shutdown(Shutdown::Both) {
                tracing::trace!(endpoint = %self.endpoint, error = %e, "socket shutdown failed");
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Client issuing line-protocol calls over a [`LineTransport`].
#[derive(Debug)]
pub struct LineClient {
    transport: LineTransport,
}

impl LineClient {
    pub fn new(transport: LineTransport) -> Self {
        Self { transport }
    }

    /// Call `op` with `args`. `ERR` replies are application faults; a closed
    /// connection or socket failure is a transport fault.
    pub fn call<S: AsRef<str>>(&mut self, op: &str, args: &[S]) -> Result<String, RpcError> {
        let request = encode_request(op, args)?;
        let reply = self.transport.exchange(&request)?;
        decode_reply(&reply)
    }
}

fn encode_request<S: AsRef<str>>(op: &str, args: &[S]) -> Result<String, RpcError> {
    if op.is_empty() || op.contains(char::is_whitespace) {
        return Err(RpcError::application(format!("invalid operation name {op:?}")));
    }
    let mut request = op.to_string();
    for arg in args {
        let arg = arg.as_ref();
        if arg.contains(['\r', '\n']) {
            return Err(RpcError::application("arguments must not contain line breaks"));
        }
        request.push(' ');
        request.push_str(arg);
    }
    Ok(request)
}

fn decode_reply(reply: &str) -> Result<String, RpcError> {
    let (status, payload) = reply.split_once(' ').unwrap_or((reply, ""));
    match status {
        "OK" => Ok(payload.to_string()),
        "ERR" => Err(RpcError::application(payload.to_string())),
        _ => Err(TransportError::new(
            TransportErrorKind::CorruptedData,
            format!("malformed reply {reply:?}"),
        )
        .into()),
    }
}

impl RpcClient for LineClient {
    type Transport = LineTransport;

    fn transport(&self) -> &LineTransport {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut LineTransport {
        &mut self.transport
    }
}

/// Builds unopened [`LineClient`]s.
#[derive(Debug, Clone, Copy)]
pub struct LineClientFactory {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl LineClientFactory {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }
}

impl Default for LineClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

impl ClientFactory for LineClientFactory {
    type Client = LineClient;

    fn create(&self, endpoint: &Endpoint) -> Result<LineClient, TransportError> {
        Ok(LineClient::new(LineTransport::new(
            endpoint.clone(),
            self.connect_timeout,
            self.io_timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Serve one connection: answer each request line with `reply(line)`,
    /// hanging up when it returns `None`.
    fn serve_once(reply: impl Fn(&str) -> Option<String> + Send + 'static) -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { return };
                match reply(&line) {
                    Some(r) => {
                        if writeln!(writer, "{r}").is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        });
        Endpoint::new("127.0.0.1", port)
    }

    fn client(endpoint: Endpoint) -> LineClient {
        let mut c = LineClientFactory::new(Duration::from_secs(1), Duration::from_secs(1))
            .create(&endpoint)
            .unwrap();
        c.transport_mut().open().unwrap();
        c
    }

    #[test]
    fn ok_and_err_replies() {
        let ep = serve_once(|line| {
            Some(match line.strip_prefix("echo ") {
                Some(rest) => format!("OK {rest}"),
                None => format!("ERR unknown request {line}"),
            })
        });
        let mut c = client(ep);
        assert_eq!(c.call("echo", &["a", "b"]).unwrap(), "a b");
        let err = c.call("nope", &["x"]).unwrap_err();
        assert!(matches!(err, RpcError::Application(_)));
        assert!(c.transport().is_open());
    }

    #[test]
    fn hang_up_is_end_of_file() {
        let ep = serve_once(|_| None);
        let mut c = client(ep);
        match c.call::<&str>("ping", &[]) {
            Err(RpcError::Transport(e)) => {
                assert!(e.is_restartable(), "{e}");
                assert!(matches!(
                    e.kind(),
                    TransportErrorKind::EndOfFile | TransportErrorKind::Unknown
                ));
            }
            other => panic!("expected transport fault, got {other:?}"),
        }
        assert!(!c.transport().is_open());
    }

    #[test]
    fn malformed_reply_is_corrupted_data() {
        let ep = serve_once(|_| Some("WAT".to_string()));
        let mut c = client(ep);
        match c.call::<&str>("ping", &[]) {
            Err(RpcError::Transport(e)) => {
                assert_eq!(e.kind(), TransportErrorKind::CorruptedData);
                assert!(!e.is_restartable());
            }
            other => panic!("expected corrupted data, got {other:?}"),
        }
    }

    #[test]
    fn refused_connection_is_restartable() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let mut t = LineTransport::new(
            Endpoint::new("127.0.0.1", port),
            Duration::from_millis(500),
            Duration::from_millis(500),
        );
        let err = t.open().unwrap_err();
        assert!(err.is_restartable(), "{err}");
        assert!(!t.is_open());
    }

    #[test]
    fn call_on_closed_transport_is_not_open() {
        let ep = serve_once(|l| Some(format!("OK {l}")));
        let mut c = client(ep);
        c.transport_mut().close().unwrap();
        c.transport_mut().close().unwrap();
        match c.call::<&str>("ping", &[]) {
            Err(RpcError::Transport(e)) => assert_eq!(e.kind(), TransportErrorKind::NotOpen),
            other => panic!("expected not open, got {other:?}"),
        }
    }

    #[test]
    fn request_encoding_rejects_bad_input() {
        assert_eq!(encode_request("get", &["k", "v"]).unwrap(), "get k v");
        assert!(encode_request::<&str>("two words", &[]).is_err());
        assert!(encode_request("set", &["a\nb"]).is_err());
        assert_eq!(decode_reply("OK").unwrap(), "");
    }
}
