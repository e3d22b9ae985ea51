//! Background sampler: collects once per period while someone is listening, caches the
//! serialized frame and broadcasts it to every connected socket.

use std::sync::atomic::Ordering;

use crate::metrics::collect_snapshot;
use crate::state::AppState;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

pub fn spawn_sampler(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            if state.client_count.load(Ordering::Relaxed) == 0 {
                // the next client must not be greeted with a frame from before the idle gap
                state.last_frame.write().await.clear();
                while state.client_count.load(Ordering::Relaxed) == 0 {
                    debug!("no clients, sampler idle");
                    state.wake_sampler.notified().await;
                }
            }
            tick.tick().await;

            let snapshot = collect_snapshot(&state).await;
            let frame = match serde_json::to_string(&snapshot) {
                Ok(f) => f,
                Err(e) => {
                    warn!("serializing snapshot: {e}");
                    continue;
                }
            };
            *state.last_frame.write().await = frame.clone();
            // no receivers is fine; they come and go
            let _ = state.frames.send(frame);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for(state: &AppState, want_empty: bool) {
        for _ in 0..400 {
            if state.last_frame.read().await.is_empty() == want_empty {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("cached frame never became {}", if want_empty { "empty" } else { "set" });
    }

    #[tokio::test]
    async fn cached_frame_dropped_while_idle() {
        let state = AppState::new(None);
        *state.last_frame.write().await = "{\"cpu\": 1.0}".into();
        let sampler = spawn_sampler(state.clone(), Duration::from_millis(50));
        wait_for(&state, true).await;

        state.client_count.store(1, Ordering::Relaxed);
        state.wake_sampler.notify_one();
        wait_for(&state, false).await;
        let fresh = state.last_frame.read().await.clone();
        assert!(fresh.contains("\"cpu\""), "{fresh}");

        // last client leaves: the frame goes stale and must not be replayed later
        state.client_count.store(0, Ordering::Relaxed);
        wait_for(&state, true).await;
        sampler.abort();
    }
}
