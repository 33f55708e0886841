//! Scripted client and transport used by unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::client::{ClientFactory, RpcClient, Transport};
use crate::endpoint::Endpoint;
use crate::error::{RpcError, TransportError, TransportErrorKind};

/// What the next call on any mock client does.
#[derive(Debug, Clone)]
pub enum Outcome {
    Reply(String),
    Fault(TransportErrorKind),
    App(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(Endpoint),
    Close(Endpoint),
    Call(Endpoint),
}

#[derive(Debug, Default)]
pub struct Shared {
    script: Mutex<VecDeque<Outcome>>,
    events: Mutex<Vec<Event>>,
    refused: Mutex<HashSet<Endpoint>>,
}

impl Shared {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<Endpoint> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Connect(ep) => Some(ep),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| f(e)).count()
    }

    fn record(&self, e: Event) {
        self.events.lock().unwrap().push(e);
    }
}

#[derive(Debug)]
pub struct MockTransport {
    endpoint: Endpoint,
    open: bool,
    shared: Arc<Shared>,
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.shared.refused.lock().unwrap().contains(&self.endpoint) {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                format!("connection refused: {}", self.endpoint),
            ));
        }
        self.open = true;
        self.shared.record(Event::Connect(self.endpoint.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.open = false;
            self.shared.record(Event::Close(self.endpoint.clone()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug)]
pub struct MockClient {
    transport: MockTransport,
}

impl MockClient {
    pub fn call(&mut self) -> Result<String, RpcError> {
        let shared = Arc::clone(&self.transport.shared);
        shared.record(Event::Call(self.transport.endpoint.clone()));
        let next = shared.script.lock().unwrap().pop_front();
        match next {
            None => Ok(format!("ok from {}", self.transport.endpoint)),
            Some(Outcome::Reply(s)) => Ok(s),
            Some(Outcome::Fault(kind)) => Err(TransportError::new(kind, "scripted fault").into()),
            Some(Outcome::App(msg)) => Err(RpcError::application(msg)),
        }
    }
}

impl RpcClient for MockClient {
    type Transport = MockTransport;

    fn transport(&self) -> &MockTransport {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut MockTransport {
        &mut self.transport
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    pub shared: Arc<Shared>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.shared.script.lock().unwrap().extend(outcomes);
    }

    pub fn refuse(&self, endpoint: Endpoint) {
        self.shared.refused.lock().unwrap().insert(endpoint);
    }

    pub fn accept(&self, endpoint: &Endpoint) {
        self.shared.refused.lock().unwrap().remove(endpoint);
    }
}

impl ClientFactory for MockFactory {
    type Client = MockClient;

    fn create(&self, endpoint: &Endpoint) -> Result<MockClient, TransportError> {
        Ok(MockClient {
            transport: MockTransport {
                endpoint: endpoint.clone(),
                open: false,
                shared: Arc::clone(&self.shared),
            },
        })
    }
}
