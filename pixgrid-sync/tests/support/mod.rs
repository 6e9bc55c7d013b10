//! In-process grid server for integration tests.
//!
//! Speaks the same frames as the production server: `c:<id>` and a base64
//! snapshot on connect, `r:`/`d:` presence fan-out, `s:<cell>:<bit>` after
//! each toggle and cursor relay to everyone else.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use pixgrid_sync::{encode_snapshot, ClientMessage, SnapshotFormat};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

#[derive(Default)]
struct Hub {
    cells: Vec<bool>,
    clients: HashMap<String, mpsc::UnboundedSender<String>>,
    received: Vec<String>,
}

impl Hub {
    fn broadcast(&self, frame: &str, except: Option<&str>) {
        for (id, tx) in &self.clients {
            if Some(id.as_str()) != except {
                let _ = tx.send(frame.to_string());
            }
        }
    }
}

pub struct TestGridServer {
    pub url: String,
    hub: Arc<Mutex<Hub>>,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestGridServer {
    pub async fn start(cell_count: usize) -> Self {
        Self::start_with(vec![false; cell_count]).await
    }

    pub async fn start_with(cells: Vec<bool>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(Mutex::new(Hub {
            cells,
            ..Hub::default()
        }));
        let accepted = Arc::new(AtomicUsize::new(0));

        let task = {
            let hub = hub.clone();
            let accepted = accepted.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(handle_client(stream, hub.clone()));
                }
            })
        };

        Self {
            url: format!("ws://{addr}/api/ws"),
            hub,
            accepted,
            task,
        }
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn client_count(&self) -> usize {
        self.hub.lock().unwrap().clients.len()
    }

    /// Close every open socket from the server side.
    pub fn kick_all(&self) {
        self.hub.lock().unwrap().clients.clear();
    }

    /// Send a raw frame to every connected client.
    pub fn broadcast(&self, frame: &str) {
        self.hub.lock().unwrap().broadcast(frame, None);
    }

    /// Every frame received from clients, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.hub.lock().unwrap().received.clone()
    }
}

impl Drop for TestGridServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_client(stream: TcpStream, hub: Arc<Mutex<Hub>>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();

    {
        let mut hub = hub.lock().unwrap();
        let _ = tx.send(format!("c:{id}"));
        let _ = tx.send(encode_snapshot(&hub.cells, SnapshotFormat::Base64));
        for peer in hub.clients.keys() {
            let _ = tx.send(format!("r:{peer}"));
        }
        hub.broadcast(&format!("r:{id}"), None);
        hub.clients.insert(id.clone(), tx);
    }

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let mut hub = hub.lock().unwrap();
                    hub.received.push(text.as_str().to_owned());
                    match ClientMessage::parse(text.as_str()) {
                        Ok(ClientMessage::Toggle { cell }) => {
                            if let Some(value) = hub.cells.get_mut(cell) {
                                *value = !*value;
                                let bit = u8::from(*value);
                                hub.broadcast(&format!("s:{cell}:{bit}"), None);
                            }
                        }
                        Ok(ClientMessage::Cursor { .. }) => hub.broadcast(text.as_str(), Some(id.as_str())),
                        Err(_) => {}
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let mut hub = hub.lock().unwrap();
    hub.clients.remove(&id);
    hub.broadcast(&format!("d:{id}"), None);
}

/// A port with nothing listening on it.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Receive until `pred` matches, failing after three seconds.
pub async fn wait_for<T: Debug>(
    rx: &mut mpsc::Receiver<T>,
    what: &str,
    mut pred: impl FnMut(&T) -> bool,
) -> T {
    let found = timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("channel closed while waiting for {what}"),
            }
        }
    })
    .await;
    found.unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
