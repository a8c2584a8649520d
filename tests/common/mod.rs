//! Fake SCPI instrument served on a local TCP port.

#![allow(dead_code)]

use instrument_control::transport::encode_block;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How the fake answers a command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// One newline terminated line
    Line(String),
    /// IEEE 488.2 definite length block followed by a newline
    Block(Vec<u8>),
    /// Close the connection
    Hangup,
}

/// Line based instrument answering `*IDN?` and a table of canned replies.
/// Queries without a canned reply stay unanswered.
pub struct FakeInstrument {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeInstrument {
    pub async fn start(identity: &str) -> Self {
        Self::with_replies(identity, Vec::new()).await
    }

    pub async fn with_replies(identity: &str, replies: Vec<(&str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));

        let mut table: HashMap<String, Reply> = replies
            .into_iter()
            .map(|(command, reply)| (command.to_string(), reply))
            .collect();
        table
            .entry("*IDN?".to_string())
            .or_insert_with(|| Reply::Line(identity.to_string()));
        let table = Arc::new(table);

        let log = Arc::clone(&received);
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let table = Arc::clone(&table);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let (reader, mut writer) = socket.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log.lock().unwrap().push(line.clone());
                        match table.get(line.trim()) {
                            Some(Reply::Line(text)) => {
                                if writer.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Reply::Block(data)) => {
                                if writer.write_all(&encode_block(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Reply::Hangup) => break,
                            None => {}
                        }
                    }
                });
            }
        });

        Self { addr, received, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Lines received so far, over all connections.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until `count` lines arrived, for commands that get no reply.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let lines = self.received();
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.received()
    }
}

impl Drop for FakeInstrument {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
