//! Upstream pump against a local WebSocket server.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sysdash::channel::{shared, ConnectionState, Hub, Reader};
use sysdash::error::{ConnectionError, ReaderError};
use sysdash::types::Snapshot;
use sysdash::ws::{connect, pump};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
struct Collect {
    cpu: Vec<Option<f64>>,
    states: Vec<ConnectionState>,
}

impl Reader for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    fn on_snapshot(&mut self, s: &Snapshot) -> Result<(), ReaderError> {
        self.cpu.push(s.cpu);
        Ok(())
    }

    fn on_state(&mut self, state: &ConnectionState) {
        self.states.push(state.clone());
    }
}

/// Serve one client: send `frames`, then either close or hold the socket open until the
/// client closes it.
async fn serve(frames: Vec<&'static str>, close: bool) -> (String, tokio::task::JoinHandle<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for f in frames {
            ws.send(Message::Text(f.into())).await.unwrap();
        }
        if close {
            let _ = ws.close(None).await;
            return true;
        }
        // wait for the client's close frame
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                return true;
            }
        }
        false
    });
    (format!("ws://{addr}/ws"), handle)
}

#[tokio::test]
async fn malformed_frames_are_skipped_and_peer_close_is_reported() {
    let (url, server) = serve(vec![r#"{"cpu": 10}"#, "not json", r#"{"cpu": 30}"#], true).await;
    let hub = Hub::new();
    let reader = shared(Collect::default());
    let _sub = hub.subscribe(reader.clone());

    let ws = connect(&url, None).await.unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(5), pump(ws, hub.clone()))
        .await
        .unwrap();
    assert!(server.await.unwrap());

    assert_eq!(reason, ConnectionError::ClosedByPeer);
    assert_eq!(hub.stats().decode_failures(), 1);
    let r = reader.lock().unwrap();
    assert_eq!(r.cpu, vec![Some(10.0), Some(30.0)]);
    assert_eq!(
        r.states,
        vec![
            ConnectionState::Live,
            ConnectionState::Closed(ConnectionError::ClosedByPeer)
        ]
    );
    assert!(hub.state().is_closed());
}

#[tokio::test]
async fn last_unsubscribe_closes_the_socket() {
    let (url, server) = serve(vec![r#"{"memory": 42.5}"#], false).await;
    let hub = Hub::new();
    let seen = Arc::new(Mutex::new(0usize));
    let counter = seen.clone();
    let sub = hub.subscribe(shared(FnReader(move |_s: &Snapshot| {
        *counter.lock().unwrap() += 1;
    })));

    let ws = connect(&url, None).await.unwrap();
    let task = tokio::spawn(pump(ws, hub.clone()));

    // wait for the first frame before leaving
    for _ in 0..100 {
        if *seen.lock().unwrap() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*seen.lock().unwrap(), 1);
    drop(sub);

    let reason = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, ConnectionError::Shutdown);
    assert!(server.await.unwrap(), "server never saw a close frame");
}

struct FnReader<F>(F);

impl<F: FnMut(&Snapshot) + Send> Reader for FnReader<F> {
    fn name(&self) -> &str {
        "fn"
    }

    fn on_snapshot(&mut self, s: &Snapshot) -> Result<(), ReaderError> {
        (self.0)(s);
        Ok(())
    }
}
