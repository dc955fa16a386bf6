//! Scripted mock tuner device for client integration tests
//!
//! Serves get/set requests over loopback TCP from a table of variable values
//! and records every request it sees.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hdhr_protocol::{frame_len, tag, GetSetReply, Packet, PacketType, HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct Script {
    values: HashMap<String, Result<String, String>>,
    delays: HashMap<String, Duration>,
    reject_sets: Option<String>,
    hang_ups: HashSet<String>,
    requests: Vec<(String, Option<String>)>,
}

/// Handle to a running mock device
#[derive(Clone)]
pub struct MockDevice {
    pub addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    connections: Arc<AtomicUsize>,
    abandoned: Arc<AtomicUsize>,
}

impl MockDevice {
    pub async fn start() -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let device = Self {
            addr: listener.local_addr().unwrap(),
            script: Arc::new(Mutex::new(Script::default())),
            connections: Arc::new(AtomicUsize::new(0)),
            abandoned: Arc::new(AtomicUsize::new(0)),
        };

        let handle = device.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                handle.connections.fetch_add(1, Ordering::SeqCst);
                let conn = handle.clone();
                tokio::spawn(async move { conn.serve(stream).await });
            }
        });

        device
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Answer `name` with `value`
    pub fn set_value(&self, name: &str, value: &str) -> &Self {
        self.script.lock().unwrap().values.insert(name.to_string(), Ok(value.to_string()));
        self
    }

    /// Answer `name` with a get/set error
    pub fn set_error(&self, name: &str, message: &str) -> &Self {
        self.script.lock().unwrap().values.insert(name.to_string(), Err(message.to_string()));
        self
    }

    /// Hold replies for `name` back by `delay`
    pub fn set_delay(&self, name: &str, delay: Duration) -> &Self {
        self.script.lock().unwrap().delays.insert(name.to_string(), delay);
        self
    }

    /// Reject every set request with `message`
    pub fn reject_sets(&self, message: &str) -> &Self {
        self.script.lock().unwrap().reject_sets = Some(message.to_string());
        self
    }

    /// Read requests for `name`, then close the connection without replying
    pub fn hang_up(&self, name: &str) -> &Self {
        self.script.lock().unwrap().hang_ups.insert(name.to_string());
        self
    }

    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Connections the client closed before a reply was sent
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    async fn serve(&self, mut stream: TcpStream) {
        let Some(packet) = read_packet(&mut stream).await else {
            return;
        };
        if packet.packet_type != PacketType::GetSetRequest {
            return;
        }

        let name = packet.get_string(tag::GETSET_NAME).unwrap_or_default();
        let value = packet.get_string(tag::GETSET_VALUE);

        let (outcome, delay) = {
            let mut script = self.script.lock().unwrap();
            script.requests.push((name.clone(), value.clone()));
            if script.hang_ups.contains(&name) {
                return;
            }

            let rejection = script.reject_sets.clone();
            let outcome = match (&value, rejection) {
                (Some(_), Some(message)) => Err(message),
                (Some(v), None) => {
                    script.values.insert(name.clone(), Ok(v.clone()));
                    Ok(v.clone())
                }
                (None, _) => script
                    .values
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| Err("ERROR: unknown getset variable".to_string())),
            };
            (outcome, script.delays.get(&name).copied())
        };

        if let Some(delay) = delay {
            let mut byte = [0u8; 1];
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                read = stream.read(&mut byte) => {
                    if matches!(read, Ok(0) | Err(_)) {
                        self.abandoned.fetch_add(1, Ordering::SeqCst);
                    }
                    return;
                }
            }
        }

        let reply = GetSetReply { name, outcome }.to_packet().encode().unwrap();
        let _ = stream.write_all(&reply).await;
    }
}

async fn read_packet(stream: &mut TcpStream) -> Option<Packet> {
    let mut buf = vec![0u8; HEADER_LEN];
    stream.read_exact(&mut buf).await.ok()?;
    let total = frame_len(&buf)?;
    buf.resize(total, 0);
    stream.read_exact(&mut buf[HEADER_LEN..]).await.ok()?;
    Packet::decode(&buf).ok()
}
