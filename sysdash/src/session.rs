//! Gate between the identity provider and the views.
//!
//! Views are mounted on the hub only while someone is signed in. Signing out drops every
//! subscription, which lets the hub tear down the upstream connection.

use tokio::sync::watch;
use tracing::info;

use crate::channel::{Hub, Subscription};
use crate::views::ViewSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedIn(String),
    SignedOut,
}

pub struct Dashboard {
    hub: Hub,
    views: ViewSet,
    mounted: Vec<Subscription>,
    session: SessionState,
}

impl Dashboard {
    pub fn new(hub: Hub, views: ViewSet) -> Self {
        Self {
            hub,
            views,
            mounted: Vec::new(),
            session: SessionState::SignedOut,
        }
    }

    pub fn views(&self) -> &ViewSet {
        &self.views
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn is_mounted(&self) -> bool {
        !self.mounted.is_empty()
    }

    /// Apply one identity event. Repeated sign-ins do not double-register.
    pub fn apply(&mut self, state: SessionState) {
        match &state {
            SessionState::SignedIn(user) => {
                if self.mounted.is_empty() {
                    info!("{} signed in, mounting views", user);
                    self.mounted = self.views.subscribe_all(&self.hub);
                }
            }
            SessionState::SignedOut => {
                if !self.mounted.is_empty() {
                    info!("signed out, unmounting views");
                    self.mounted.clear();
                }
            }
        }
        self.session = state;
    }

    /// Follow the identity stream until its sender goes away. Ends signed out.
    pub async fn follow(&mut self, mut identity: watch::Receiver<SessionState>) {
        loop {
            let state = identity.borrow_and_update().clone();
            self.apply(state);
            if identity.changed().await.is_err() {
                break;
            }
        }
        self.apply(SessionState::SignedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snapshot;
    use crate::views::testing::ctx;

    fn dashboard() -> (Dashboard, Hub) {
        let (ctx, _rec) = ctx(false);
        let hub = Hub::new();
        (Dashboard::new(hub.clone(), ViewSet::new(&ctx)), hub)
    }

    fn cpu(v: f64) -> Snapshot {
        Snapshot {
            cpu: Some(v),
            ..Default::default()
        }
    }

    #[test]
    fn views_only_receive_while_signed_in() {
        let (mut d, hub) = dashboard();
        hub.dispatch(&cpu(1.0));
        assert!(d.views().cpu.lock().unwrap().history().is_empty());

        d.apply(SessionState::SignedIn("alice".into()));
        d.apply(SessionState::SignedIn("alice".into()));
        assert_eq!(hub.reader_count(), 8);
        hub.dispatch(&cpu(2.0));
        assert_eq!(d.views().cpu.lock().unwrap().history().len(), 1);

        d.apply(SessionState::SignedOut);
        assert_eq!(hub.reader_count(), 0);
        hub.dispatch(&cpu(3.0));
        assert_eq!(d.views().cpu.lock().unwrap().history().len(), 1);
    }

    #[tokio::test]
    async fn follows_identity_stream() {
        let (mut d, hub) = dashboard();
        let (tx, rx) = watch::channel(SessionState::SignedIn("bob".into()));
        let task = tokio::spawn(async move {
            d.follow(rx).await;
            d
        });
        tokio::task::yield_now().await;
        tx.send(SessionState::SignedOut).unwrap();
        drop(tx);
        let d = task.await.unwrap();
        assert_eq!(*d.session(), SessionState::SignedOut);
        assert!(!d.is_mounted());
        assert_eq!(hub.reader_count(), 0);
    }
}
