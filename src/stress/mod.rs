//! Internal stress tests for pipelines.
//!
//! These tests run many pipelines concurrently through one client to verify
//! reply ordering and connection reuse under load.

use std::sync::Arc;

use crate::cluster::{ClusterClient, ConnectionPool, PoolConfig, SlotMap, SlotRange};
use crate::core::command;
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Starts a node answering GET with its key and anything else with OK.
async fn echo_node() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => break,
            };

            tokio::spawn(async move {
                let mut decoder = Decoder::new();
                let mut encoder = Encoder::new();
                let mut buf = [0u8; 4096];

                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) => return,
                        Ok(n) => n,
                        Err(_) => return,
                    };

                    decoder.append(&buf[..n]);

                    while let Ok(Some(frame)) = decoder.decode() {
                        let response = match frame {
                            Frame::Array(ref args) => match (args.first(), args.get(1)) {
                                (Some(Frame::BulkString(Some(cmd))), Some(key))
                                    if cmd.eq_ignore_ascii_case(b"GET") =>
                                {
                                    key.clone()
                                }
                                (Some(Frame::BulkString(Some(_))), _) => {
                                    Frame::SimpleString(b"OK".to_vec())
                                }
                                _ => Frame::Error(b"ERR unknown command".to_vec()),
                            },
                            _ => Frame::Error(b"ERR format".to_vec()),
                        };
                        encoder.encode(&response);
                    }

                    if socket.write_all(&encoder.take()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn test_concurrent_pipelines_stress() {
    let first = echo_node().await;
    let second = echo_node().await;
    let map = SlotMap::with_ranges(vec![
        SlotRange::new(0, 8191, first.clone()),
        SlotRange::new(8192, 16383, second),
    ]);
    let pool = Arc::new(ConnectionPool::new(vec![first], PoolConfig::default()));
    let client = ClusterClient::new(Arc::new(map), pool.clone());

    let mut handles = Vec::new();

    for task in 0..200 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut pipeline = client.pipeline();
            let keys: Vec<String> = (0..25).map(|i| format!("task{}:key{}", task, i)).collect();
            for key in &keys {
                pipeline.send(command::get(key.clone()));
            }
            pipeline.flush().await.unwrap();
            for key in &keys {
                assert_eq!(pipeline.receive().unwrap(), Frame::from(key.as_str()));
            }
            pipeline.close().await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // connections were handed back and reused rather than leaked
    assert!(pool.idle_count() > 0);
    assert!(pool.idle_count() <= 2 * PoolConfig::default().max_idle_per_node);
}
