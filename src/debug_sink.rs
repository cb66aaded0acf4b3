// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Debug broadcast sink: fans serialized items out to inspection clients.
//!
//! One [`DebugServer`] is owned by each query context and handed to the
//! `debug_print`/`log_as` operators. The service is lazily started and
//! idempotently repairable: [`DebugServer::ensure_started`] both constructs
//! and heals it, re-binding the listener and restarting the accept loop if
//! either was previously closed or died.
//!
//! Wire format, per message: a 6-byte header `0xFF, 0x00, <u32 big-endian
//! payload length>` followed by the UTF-8 payload. No handshake and no
//! acknowledgement; a client only ever receives messages sent while it was
//! connected, and a failed write removes exactly that client from the set.
//!
//! Every failure in here is non-fatal to the pipelines using the sink.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::observability::messages::sink::{
    ClientConnected, ClientRemoved, ListenerFailed, SinkListening,
};
use crate::observability::messages::StructuredLog;

pub struct DebugServer {
    port: u16,
    state: Mutex<Option<Active>>,
}

struct Active {
    addr: SocketAddr,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    queue: mpsc::UnboundedSender<String>,
    clients: Arc<Mutex<Vec<TcpStream>>>,
}

impl DebugServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            state: Mutex::new(None),
        }
    }

    /// Get-or-create: bind the listener and start the accept and writer
    /// loops unless they are already running. Safe to call on every use of a
    /// debug operator; a stopped or crashed sink is brought back up.
    pub async fn ensure_started(&self) -> std::io::Result<SocketAddr> {
        let mut state = self.state.lock().await;
        if let Some(active) = state.as_ref() {
            if active.alive.load(Ordering::Acquire) {
                return Ok(active.addr);
            }
            active.cancel.cancel();
        }

        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let addr = listener.local_addr()?;
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let clients: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
        let (queue, rx) = mpsc::unbounded_channel();

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&clients),
            Arc::clone(&alive),
            cancel.clone(),
        ));
        tokio::spawn(write_loop(rx, Arc::clone(&clients), cancel.clone()));

        SinkListening { addr }.log();
        *state = Some(Active {
            addr,
            alive,
            cancel,
            queue,
            clients,
        });
        Ok(addr)
    }

    /// Queue a message for broadcast to every currently connected client.
    /// Returns immediately; the writer loop performs the network I/O.
    pub async fn send(&self, message: String) {
        let state = self.state.lock().await;
        if let Some(active) = state.as_ref() {
            if active.alive.load(Ordering::Acquire) {
                let _ = active.queue.send(message);
            }
        }
    }

    /// Stop accepting, close every client connection, and clear the set.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(active) = state.take() {
            active.cancel.cancel();
            active.alive.store(false, Ordering::Release);
            active.clients.lock().await.clear();
        }
    }

    pub async fn is_listening(&self) -> bool {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|active| active.alive.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.state.lock().await;
        state.as_ref().map(|active| active.addr)
    }

    pub async fn client_count(&self) -> usize {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(active) => active.clients.lock().await.len(),
            None => 0,
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let mut set = clients.lock().await;
                    set.push(stream);
                    ClientConnected { peer, client_count: set.len() }.log();
                }
                Err(error) => {
                    ListenerFailed { error: &error }.log();
                    cancel.cancel();
                    clients.lock().await.clear();
                    break;
                }
            },
        }
    }
    alive.store(false, Ordering::Release);
}

async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => broadcast(&clients, &message).await,
                None => break,
            },
        }
    }
}

async fn broadcast(clients: &Mutex<Vec<TcpStream>>, message: &str) {
    let bytes = frame(message);
    let mut set = clients.lock().await;
    let mut index = 0;
    while index < set.len() {
        match set[index].write_all(&bytes).await {
            Ok(()) => {
                let _ = set[index].flush().await;
                index += 1;
            }
            Err(error) => {
                ClientRemoved { error: &error }.log();
                set.swap_remove(index);
            }
        }
    }
}

/// `0xFF, 0x00, <u32 big-endian length>, <payload>`, rebuilt per message.
fn frame(message: &str) -> Vec<u8> {
    let payload = message.as_bytes();
    let mut buf = Vec::with_capacity(6 + payload.len());
    buf.push(0xFF);
    buf.push(0x00);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    async fn wait_for_clients(server: &DebugServer, expected: usize) {
        for _ in 0..200 {
            if server.client_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("never saw {expected} connected clients");
    }

    async fn read_frame(stream: &mut TcpStream) -> (u32, Vec<u8>) {
        let mut header = [0u8; 6];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0xFF);
        assert_eq!(header[1], 0x00);
        let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
        let mut payload = vec![0u8; len as usize];
        stream.read_exact(&mut payload).await.unwrap();
        (len, payload)
    }

    #[tokio::test]
    async fn frame_layout_is_exact() {
        let bytes = frame("hi");
        assert_eq!(bytes, vec![0xFF, 0x00, 0x00, 0x00, 0x00, 0x02, b'h', b'i']);
    }

    #[tokio::test]
    async fn broadcasts_to_every_connected_client() {
        let server = DebugServer::new(0);
        let addr = server.ensure_started().await.unwrap();
        let mut a = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        let mut b = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        wait_for_clients(&server, 2).await;

        server.send("reading: 0.5".to_string()).await;
        for client in [&mut a, &mut b] {
            let (len, payload) = read_frame(client).await;
            assert_eq!(len, 12);
            assert_eq!(payload, b"reading: 0.5");
        }
    }

    #[tokio::test]
    async fn late_clients_miss_earlier_messages() {
        let server = DebugServer::new(0);
        let addr = server.ensure_started().await.unwrap();
        server.send("before".to_string()).await;

        let mut late = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        wait_for_clients(&server, 1).await;
        server.send("after".to_string()).await;

        let (_, payload) = read_frame(&mut late).await;
        assert_eq!(payload, b"after");
    }

    #[tokio::test]
    async fn failed_client_is_dropped_others_keep_receiving() {
        let server = DebugServer::new(0);
        let addr = server.ensure_started().await.unwrap();
        let gone = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        let mut stays = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        wait_for_clients(&server, 2).await;
        drop(gone);

        // The dead connection may absorb one write before the reset lands.
        let mut remaining = 2;
        for round in 0..100 {
            server.send(format!("probe {round}")).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            remaining = server.client_count().await;
            if remaining == 1 {
                break;
            }
        }
        assert_eq!(remaining, 1);

        server.send("still here".to_string()).await;
        loop {
            let (_, payload) = read_frame(&mut stays).await;
            if payload == b"still here" {
                break;
            }
        }
    }

    #[tokio::test]
    async fn get_or_create_heals_a_stopped_sink() {
        let server = DebugServer::new(0);
        server.ensure_started().await.unwrap();
        assert!(server.is_listening().await);

        server.disconnect().await;
        assert!(!server.is_listening().await);
        assert_eq!(server.client_count().await, 0);

        let addr = server.ensure_started().await.unwrap();
        assert!(server.is_listening().await);
        let mut client = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        wait_for_clients(&server, 1).await;
        server.send("revived".to_string()).await;
        let (_, payload) = read_frame(&mut client).await;
        assert_eq!(payload, b"revived");
    }

    #[tokio::test]
    async fn ensure_started_is_idempotent() {
        let server = DebugServer::new(0);
        let first = server.ensure_started().await.unwrap();
        let second = server.ensure_started().await.unwrap();
        assert_eq!(first, second);
    }
}
