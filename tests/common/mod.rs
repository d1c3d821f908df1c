//! Shared fixtures for integration tests.
//!
//! [`FakeTopology`] and [`FakeProvider`] script a cluster in memory and
//! record every interaction. [`spawn_node`] starts a RESP-speaking node on a
//! local TCP port for end-to-end tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use slotpipe::proto::codec::{Decoder, Encoder};
use slotpipe::{
    key_slot, BoxConnection, Cmd, ConnectionProvider, Error, Frame, NodeConnection, Redirect,
    Result, Topology,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn ok() -> Frame {
    Frame::SimpleString(b"OK".to_vec())
}

pub fn bulk(value: &str) -> Frame {
    Frame::from(value)
}

pub fn moved(slot: u16, address: &str) -> Frame {
    Frame::Error(format!("MOVED {} {}", slot, address).into_bytes())
}

pub fn ask(slot: u16, address: &str) -> Frame {
    Frame::Error(format!("ASK {} {}", slot, address).into_bytes())
}

pub fn first_arg(cmd: &Cmd) -> String {
    cmd.args()
        .first()
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .unwrap_or_default()
}

pub fn name(cmd: &Cmd) -> String {
    String::from_utf8_lossy(cmd.name()).into_owned()
}

/// Routes slots to nodes by explicit assignment, falling back to
/// `slot % nodes.len()`.
#[derive(Default)]
pub struct FakeTopology {
    nodes: Vec<String>,
    assigned: Mutex<HashMap<u16, Option<String>>>,
    key_slots: HashMap<Vec<u8>, u16>,
    drop_last: bool,
    stale: Mutex<Vec<Redirect>>,
    lookups: AtomicUsize,
}

impl FakeTopology {
    pub fn new(nodes: &[&str]) -> Self {
        Self {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Pins a slot to a node, or to no node at all.
    pub fn assign(self, slot: u16, address: Option<&str>) -> Self {
        self.assigned
            .lock()
            .unwrap()
            .insert(slot, address.map(str::to_string));
        self
    }

    /// Overrides the hash of one key.
    pub fn key_in_slot(mut self, key: &str, slot: u16) -> Self {
        self.key_slots.insert(key.as_bytes().to_vec(), slot);
        self
    }

    /// Makes every lookup return one address too few.
    pub fn truncating(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn stale(&self) -> Vec<Redirect> {
        self.stale.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn resolve(&self, slot: Option<u16>) -> Option<String> {
        let slot = slot.unwrap_or(0);
        if let Some(address) = self.assigned.lock().unwrap().get(&slot) {
            return address.clone();
        }
        if self.nodes.is_empty() {
            return None;
        }
        Some(self.nodes[slot as usize % self.nodes.len()].clone())
    }
}

#[async_trait]
impl Topology for FakeTopology {
    async fn resolve_addresses(
        &self,
        slots: &[Option<u16>],
        _prefer_replica: bool,
    ) -> Result<Vec<Option<String>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut addresses: Vec<Option<String>> =
            slots.iter().map(|slot| self.resolve(*slot)).collect();
        if self.drop_last {
            addresses.pop();
        }
        Ok(addresses)
    }

    fn key_slot(&self, key: &[u8]) -> u16 {
        self.key_slots
            .get(key)
            .copied()
            .unwrap_or_else(|| key_slot(key))
    }

    fn mark_stale(&self, redirect: &Redirect) {
        self.stale.lock().unwrap().push(redirect.clone());
    }
}

type Handler = Arc<dyn Fn(&Cmd) -> Frame + Send + Sync>;

#[derive(Default)]
struct ProviderState {
    handlers: Mutex<HashMap<String, Handler>>,
    unreachable: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    sent: Mutex<Vec<(String, Cmd)>>,
    direct: Mutex<Option<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    direct_attempts: AtomicUsize,
}

/// In-memory nodes driven by per-address handlers.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node answering each command with `handler`.
    pub fn node(&self, address: &str, handler: impl Fn(&Cmd) -> Frame + Send + Sync + 'static) {
        self.state
            .handlers
            .lock()
            .unwrap()
            .insert(address.to_string(), Arc::new(handler));
    }

    /// Registers a node answering every command with `<address>:<first arg>`.
    pub fn echo_node(&self, address: &str) {
        let tag = address.to_string();
        self.node(address, move |cmd| {
            Frame::from(format!("{}:{}", tag, first_arg(cmd)).as_str())
        });
    }

    /// Refuses connections to `address`.
    pub fn unreachable(&self, address: &str) {
        self.state
            .unreachable
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    /// Accepts connections to `address` but fails every read.
    pub fn broken(&self, address: &str) {
        self.state.broken.lock().unwrap().insert(address.to_string());
    }

    /// Delays every flush to `address`.
    pub fn delay(&self, address: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .unwrap()
            .insert(address.to_string(), delay);
    }

    /// Node used by direct (unrouted) commands.
    pub fn direct_node(&self, address: &str) {
        *self.state.direct.lock().unwrap() = Some(address.to_string());
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn direct_attempts(&self) -> usize {
        self.state.direct_attempts.load(Ordering::SeqCst)
    }

    /// Every command written to any node, in write order.
    pub fn sent(&self) -> Vec<(String, Cmd)> {
        self.state.sent.lock().unwrap().clone()
    }

    /// Command names and first arguments written to `address`.
    pub fn sent_to(&self, address: &str) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter(|(a, _)| a == address)
            .map(|(_, cmd)| (name(&cmd), first_arg(&cmd)))
            .collect()
    }

    fn open(&self, address: &str) -> Result<BoxConnection> {
        if self.state.unreachable.lock().unwrap().contains(address) {
            return Err(Error::Io {
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        let handler = self
            .state
            .handlers
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::Protocol {
                message: format!("unknown node {}", address),
            })?;
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            address: address.to_string(),
            handler,
            state: Arc::clone(&self.state),
            queued: Vec::new(),
            replies: Vec::new(),
            closed: false,
        }))
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    async fn connection_for(
        &self,
        address: &str,
        _force_dial: bool,
        _read_only: bool,
    ) -> Result<BoxConnection> {
        self.open(address)
    }

    async fn connect_with_retry(&self, max_attempts: u32, delay: Duration) -> Result<BoxConnection> {
        let address = self.state.direct.lock().unwrap().clone().ok_or_else(|| {
            Error::InvalidArgument {
                message: "no direct node".to_string(),
            }
        })?;
        let mut last = None;
        for attempt in 0..max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }
            self.state.direct_attempts.fetch_add(1, Ordering::SeqCst);
            match self.open(&address) {
                Ok(conn) => return Ok(conn),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap())
    }
}

struct FakeConnection {
    address: String,
    handler: Handler,
    state: Arc<ProviderState>,
    queued: Vec<Cmd>,
    replies: Vec<Frame>,
    closed: bool,
}

#[async_trait]
impl NodeConnection for FakeConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send(&mut self, cmd: &Cmd) -> Result<()> {
        self.queued.push(cmd.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let delay = self.state.delays.lock().unwrap().get(&self.address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        for cmd in self.queued.drain(..) {
            self.replies.push((self.handler)(&cmd));
            self.state
                .sent
                .lock()
                .unwrap()
                .push((self.address.clone(), cmd));
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame> {
        if self.state.broken.lock().unwrap().contains(&self.address) {
            return Err(Error::Io {
                source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
            });
        }
        if self.replies.is_empty() {
            return Err(Error::Protocol {
                message: "read before flush".to_string(),
            });
        }
        Ok(self.replies.remove(0))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Key/value store behind one TCP node.
#[derive(Clone, Default)]
pub struct NodeStore {
    values: Arc<Mutex<HashMap<Bytes, Bytes>>>,
    moved: Arc<Mutex<HashMap<u16, String>>>,
    commands: Arc<AtomicUsize>,
}

impl NodeStore {
    /// Answers commands for `slot` with MOVED to `address`.
    pub fn redirect_slot(&self, slot: u16, address: &str) {
        self.moved.lock().unwrap().insert(slot, address.to_string());
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<Bytes> {
        self.values.lock().unwrap().get(key.as_bytes()).cloned()
    }

    fn execute(&self, parts: Vec<Bytes>) -> Frame {
        self.commands.fetch_add(1, Ordering::SeqCst);
        let Some((name, args)) = parts.split_first() else {
            return Frame::Error(b"ERR empty command".to_vec());
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        if let Some(key) = args.first() {
            let slot = key_slot(key);
            if let Some(address) = self.moved.lock().unwrap().get(&slot) {
                return moved(slot, address);
            }
        }
        let mut values = self.values.lock().unwrap();
        match (name.as_str(), args) {
            ("PING", _) => Frame::SimpleString(b"PONG".to_vec()),
            ("READONLY" | "ASKING", _) => ok(),
            ("GET", [key]) => Frame::BulkString(values.get(key).cloned()),
            ("SET", [key, value]) => {
                values.insert(key.clone(), value.clone());
                ok()
            }
            ("MGET", keys) if !keys.is_empty() => Frame::Array(
                keys.iter()
                    .map(|k| Frame::BulkString(values.get(k).cloned()))
                    .collect(),
            ),
            ("MSET", pairs) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                for pair in pairs.chunks_exact(2) {
                    values.insert(pair[0].clone(), pair[1].clone());
                }
                ok()
            }
            _ => Frame::Error(format!("ERR unknown command '{}'", name).into_bytes()),
        }
    }
}

fn command_parts(frame: Frame) -> Vec<Bytes> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Frame::BulkString(Some(b)) => Some(b),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Starts a node on an ephemeral local port and returns its address.
pub async fn spawn_node(store: NodeStore) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let store = store.clone();
            tokio::spawn(async move {
                let mut decoder = Decoder::new();
                let mut encoder = Encoder::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    decoder.append(&buf[..n]);
                    while let Ok(Some(frame)) = decoder.decode() {
                        encoder.encode(&store.execute(command_parts(frame)));
                    }
                    if !encoder.is_empty() && socket.write_all(&encoder.take()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    address
}
