//! Shared agent state: sysinfo handles, the latest frame and the broadcast fan-out.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use sysinfo::{Components, CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};

pub type SharedSystem = Arc<Mutex<System>>;
pub type SharedNetworks = Arc<Mutex<Networks>>;
pub type SharedComponents = Arc<Mutex<Components>>;
pub type SharedDisks = Arc<Mutex<Disks>>;

/// Frames buffered per client before a slow socket starts skipping.
const FRAME_BACKLOG: usize = 8;

#[derive(Clone)]
pub struct AppState {
    // Persistent sysinfo handles
    pub sys: SharedSystem,
    pub networks: SharedNetworks,
    pub components: SharedComponents,
    pub disks: SharedDisks,

    // Last serialized frame, sent to a client as soon as it connects
    pub last_frame: Arc<RwLock<String>>,
    pub frames: broadcast::Sender<String>,

    // Adaptive sampling controls
    pub client_count: Arc<AtomicUsize>,
    pub wake_sampler: Arc<Notify>,
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(auth_token: Option<String>) -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh);
        sys.refresh_cpu_all();
        let (frames, _) = broadcast::channel(FRAME_BACKLOG);
        Self {
            sys: Arc::new(Mutex::new(sys)),
            networks: Arc::new(Mutex::new(Networks::new_with_refreshed_list())),
            components: Arc::new(Mutex::new(Components::new_with_refreshed_list())),
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
            last_frame: Arc::new(RwLock::new(String::new())),
            frames,
            client_count: Arc::new(AtomicUsize::new(0)),
            wake_sampler: Arc::new(Notify::new()),
            auth_token,
        }
    }
}
