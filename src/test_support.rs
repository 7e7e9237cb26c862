//! Scripted in-process venue used by the upstream and gateway tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehaviour {
    /// Keep the socket open until the client goes away.
    Hold,
    /// Close right after the scripted frames.
    CloseAfterFrames,
}

#[derive(Default)]
struct MockLog {
    accepts: Vec<Instant>,
    closes: Vec<Instant>,
    client_gone: Vec<Instant>,
    subscriptions: Vec<String>,
    /// Text frames received after the subscription.
    received: Vec<String>,
}

pub struct MockVenue {
    addr: SocketAddr,
    log: Arc<Mutex<MockLog>>,
}

impl MockVenue {
    /// Every accepted connection reads one subscription frame, replays
    /// `frames`, then follows `behaviour`.
    pub async fn spawn(frames: Vec<String>, behaviour: MockBehaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(MockLog::default()));

        let accept_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_log.lock().accepts.push(Instant::now());
                let log = accept_log.clone();
                let frames = frames.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    if let Some(Ok(Message::Text(sub))) = ws.next().await {
                        log.lock().subscriptions.push(sub);
                    }
                    for frame in frames {
                        if ws.send(Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    match behaviour {
                        MockBehaviour::Hold => {
                            while let Some(Ok(msg)) = ws.next().await {
                                if let Message::Text(text) = msg {
                                    log.lock().received.push(text);
                                }
                            }
                            log.lock().client_gone.push(Instant::now());
                        }
                        MockBehaviour::CloseAfterFrames => {
                            log.lock().closes.push(Instant::now());
                            let _ = ws.close(None).await;
                        }
                    }
                });
            }
        });

        Self { addr, log }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.log.lock().accepts.len()
    }

    pub fn accept_times(&self) -> Vec<Instant> {
        self.log.lock().accepts.clone()
    }

    pub fn close_times(&self) -> Vec<Instant> {
        self.log.lock().closes.clone()
    }

    pub fn clients_gone(&self) -> usize {
        self.log.lock().client_gone.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.log.lock().subscriptions.clone()
    }

    pub fn received(&self) -> Vec<String> {
        self.log.lock().received.clone()
    }
}

/// Poll `cond` every 20 ms until it holds or `within` elapses.
pub async fn wait_until(within: std::time::Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    cond()
}
