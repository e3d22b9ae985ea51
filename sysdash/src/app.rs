//! App state and main loop: input handling, view mounting and drawing.

use std::{
    fs, io,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::Context;
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::{sync::watch, time::sleep};
use tracing::{info, warn};

use sysdash::channel::Hub;
use sysdash::session::{Dashboard, SessionState};
use sysdash::threshold::{AlertLog, ConfigHandle, ThresholdConfig};
use sysdash::views::network::ConnectionKey;
use sysdash::views::process::ProcessKey;
use sysdash::views::{SyntheticMode, ViewContext, ViewSet};
use sysdash::ws;

use crate::profiles::config_dir;
use crate::ui::{
    alerts::draw_alerts,
    cpu::{draw_cpu_avg_graph, draw_cpu_detail},
    disks::draw_disks,
    header::{draw_header, HeaderInfo, TABS},
    mem::{draw_mem, draw_memory_detail},
    net::{draw_net, draw_network_detail},
    processes::{draw_processes, scroll_clamp, scroll_handle_key},
};

const ALERT_LOG_CAPACITY: usize = 50;
const TICK: Duration = Duration::from_millis(250);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Overview,
    Cpu,
    Memory,
    Network,
    Processes,
}

impl Tab {
    const ALL: [Tab; 5] = [Tab::Overview, Tab::Cpu, Tab::Memory, Tab::Network, Tab::Processes];

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    fn next(self) -> Tab {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn export_name(self) -> &'static str {
        match self {
            Tab::Overview => "overview",
            Tab::Cpu => "cpu_data",
            Tab::Memory => "memory_data",
            Tab::Network => "network_data",
            Tab::Processes => "process_data",
        }
    }
}

pub struct App {
    hub: Hub,
    config: ConfigHandle,
    alerts: Arc<AlertLog>,
    views: ViewSet,
    synthetic: SyntheticMode,
    user: String,

    tab: Tab,
    paused: bool,
    scroll: usize,
    searching: bool,
    status_line: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new(thresholds: ThresholdConfig, synthetic: SyntheticMode, user: String) -> Self {
        let config = ConfigHandle::new(thresholds);
        let alerts = Arc::new(AlertLog::new(ALERT_LOG_CAPACITY));
        let ctx = ViewContext::new(config.clone(), alerts.clone()).with_synthetic(synthetic);
        Self {
            hub: Hub::new(),
            config,
            alerts,
            views: ViewSet::new(&ctx),
            synthetic,
            user,
            tab: Tab::Overview,
            paused: false,
            scroll: 0,
            searching: false,
            status_line: None,
            should_quit: false,
        }
    }

    pub async fn run(&mut self, url: &str, tls_ca: Option<&str>) -> anyhow::Result<()> {
        // Connect first so a bad URL never touches the terminal
        let socket = ws::connect(url, tls_ca)
            .await
            .with_context(|| format!("connecting to {url}"))?;

        // Identity gate: signed in for the life of the UI
        let (identity_tx, identity_rx) = watch::channel(SessionState::SignedIn(self.user.clone()));
        let mut dashboard = Dashboard::new(self.hub.clone(), self.views.clone());
        let gate = tokio::spawn(async move { dashboard.follow(identity_rx).await });
        let pump = tokio::spawn(ws::pump(socket, self.hub.clone()));

        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self.event_loop(&mut terminal).await;

        // Teardown
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        let _ = identity_tx.send(SessionState::SignedOut);
        drop(identity_tx);
        let _ = gate.await;
        match tokio::time::timeout(Duration::from_secs(2), pump).await {
            Ok(Ok(reason)) => info!("upstream finished: {}", reason),
            Ok(Err(e)) => warn!("pump task failed: {}", e),
            Err(_) => warn!("upstream did not close in time"),
        }
        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Press {
                        self.on_key(k);
                    }
                }
            }
            if self.should_quit {
                break;
            }

            terminal.draw(|f| self.draw(f))?;
            sleep(TICK).await;
        }
        Ok(())
    }

    fn on_key(&mut self, k: KeyEvent) {
        if self.searching {
            let mut procs = lock(&self.views.processes);
            match k.code {
                KeyCode::Enter | KeyCode::Esc => self.searching = false,
                KeyCode::Backspace => {
                    procs.search.pop();
                }
                KeyCode::Char(c) => procs.search.push(c),
                _ => {}
            }
            self.scroll = 0;
            return;
        }

        match k.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.switch_tab(self.tab.next()),
            KeyCode::Char(c @ '1'..='5') => {
                let idx = c as usize - '1' as usize;
                self.switch_tab(Tab::ALL[idx]);
            }
            KeyCode::Char('a') => self.toggle_alerts(),
            KeyCode::Char('p') => {
                self.paused = !self.paused;
                self.views.set_paused(self.paused);
            }
            KeyCode::Char('e') => self.export(),
            _ => match self.tab {
                Tab::Processes => self.on_process_key(k),
                Tab::Network => self.on_network_key(k),
                _ => {}
            },
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.scroll = 0;
    }

    fn toggle_alerts(&mut self) {
        let cur = self.config.current();
        self.config
            .on_save(cur.thresholds, cur.update_interval_ms, !cur.enabled);
        let state = if cur.enabled { "off" } else { "on" };
        info!("threshold monitoring switched {}", state);
        self.status_line = Some(format!("monitoring {state}"));
    }

    fn on_process_key(&mut self, k: KeyEvent) {
        let mut procs = lock(&self.views.processes);
        let key = match k.code {
            KeyCode::Char('c') => Some(ProcessKey::Cpu),
            KeyCode::Char('m') => Some(ProcessKey::Memory),
            KeyCode::Char('n') => Some(ProcessKey::Name),
            KeyCode::Char('i') => Some(ProcessKey::Pid),
            KeyCode::Char('s') => Some(ProcessKey::Status),
            KeyCode::Char('/') => {
                self.searching = true;
                None
            }
            _ => {
                scroll_handle_key(&mut self.scroll, k, 10);
                scroll_clamp(&mut self.scroll, procs.visible().len(), 1);
                None
            }
        };
        if let Some(key) = key {
            procs.request_sort(key);
        }
    }

    fn on_network_key(&mut self, k: KeyEvent) {
        let mut net = lock(&self.views.network_detail);
        match k.code {
            KeyCode::Char('o') => net.request_sort(ConnectionKey::Protocol),
            KeyCode::Char('l') => net.request_sort(ConnectionKey::LocalPort),
            KeyCode::Char('r') => net.request_sort(ConnectionKey::RemotePort),
            KeyCode::Char('s') => net.request_sort(ConnectionKey::Status),
            KeyCode::Char('n') => net.request_sort(ConnectionKey::Process),
            KeyCode::Char('T') => net.filter.tcp = !net.filter.tcp,
            KeyCode::Char('U') => net.filter.udp = !net.filter.udp,
            KeyCode::Char('I') => net.filter.icmp = !net.filter.icmp,
            KeyCode::Char('O') => net.filter.other = !net.filter.other,
            _ => {
                scroll_handle_key(&mut self.scroll, k, 10);
                scroll_clamp(&mut self.scroll, net.visible_connections().len(), 1);
            }
        }
    }

    fn export(&mut self) {
        let json = match self.tab {
            Tab::Overview => lock(&self.views.cpu).export_json(),
            Tab::Cpu => lock(&self.views.cpu_detail).export_json(),
            Tab::Memory => lock(&self.views.memory_detail).export_json(),
            Tab::Network => lock(&self.views.network_detail).export_json(),
            Tab::Processes => lock(&self.views.processes).export_json(),
        };
        let result = json
            .map_err(anyhow::Error::from)
            .and_then(|data| write_export(self.tab.export_name(), &data));
        self.status_line = Some(match result {
            Ok(path) => format!("exported to {}", path.display()),
            Err(e) => {
                warn!("export failed: {:#}", e);
                format!("export failed: {e}")
            }
        });
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let area = f.area();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2), // header + tabs
                Constraint::Min(10),   // body
                Constraint::Length(1), // status line
            ])
            .split(area);

        let connection = self.hub.state();
        draw_header(
            f,
            rows[0],
            &HeaderInfo {
                user: &self.user,
                connection: &connection,
                config: self.config.current(),
                paused: self.paused,
                synthetic: self.synthetic.is_on(),
                tab: self.tab.index(),
            },
        );

        match self.tab {
            Tab::Overview => self.draw_overview(f, rows[1]),
            Tab::Cpu => draw_cpu_detail(f, rows[1], &lock(&self.views.cpu_detail)),
            Tab::Memory => draw_memory_detail(f, rows[1], &lock(&self.views.memory_detail)),
            Tab::Network => {
                draw_network_detail(f, rows[1], &lock(&self.views.network_detail), self.scroll)
            }
            Tab::Processes => draw_processes(
                f,
                rows[1],
                &lock(&self.views.processes),
                self.scroll,
                self.searching,
            ),
        }

        let status = self
            .status_line
            .clone()
            .unwrap_or_else(|| format!("tab {}: {}", self.tab.index() + 1, TABS[self.tab.index()]));
        f.render_widget(ratatui::widgets::Paragraph::new(status), rows[2]);
    }

    fn draw_overview(&self, f: &mut ratatui::Frame<'_>, area: ratatui::layout::Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Ratio(1, 3), // cpu
                Constraint::Length(3),   // memory
                Constraint::Min(8),      // disk + net | alerts
            ])
            .split(area);
        draw_cpu_avg_graph(f, rows[0], &lock(&self.views.cpu));
        draw_mem(f, rows[1], &lock(&self.views.memory));

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[2]);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(6)])
            .split(bottom[0]);
        draw_disks(f, left[0], &lock(&self.views.disk));
        draw_net(
            f,
            left[1],
            &lock(&self.views.network),
            self.config.current().update_interval_ms,
        );
        draw_alerts(
            f,
            bottom[1],
            &self.alerts.recent(),
            self.config.current().enabled,
        );
    }
}

fn write_export(name: &str, data: &str) -> anyhow::Result<PathBuf> {
    let dir = config_dir().join("exports");
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{name}_{}.json", Utc::now().format("%Y%m%dT%H%M%SZ")));
    fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(c: KeyCode) -> KeyEvent {
        KeyEvent::new(c, KeyModifiers::NONE)
    }

    fn app() -> App {
        App::new(ThresholdConfig::default(), SyntheticMode::Off, "tester".into())
    }

    #[test]
    fn tabs_cycle_and_select() {
        let mut a = app();
        a.on_key(key(KeyCode::Char('4')));
        assert_eq!(a.tab, Tab::Network);
        a.on_key(key(KeyCode::Tab));
        assert_eq!(a.tab, Tab::Processes);
        a.on_key(key(KeyCode::Tab));
        assert_eq!(a.tab, Tab::Overview);
    }

    #[test]
    fn alert_toggle_saves_config() {
        let mut a = app();
        assert!(!a.config.current().enabled);
        a.on_key(key(KeyCode::Char('a')));
        assert!(a.config.current().enabled);
        assert_eq!(a.config.current().thresholds, ThresholdConfig::default().thresholds);
    }

    #[test]
    fn search_mode_captures_keys() {
        let mut a = app();
        a.on_key(key(KeyCode::Char('5')));
        a.on_key(key(KeyCode::Char('/')));
        for c in "sshq".chars() {
            a.on_key(key(KeyCode::Char(c)));
        }
        assert!(!a.should_quit);
        a.on_key(key(KeyCode::Backspace));
        a.on_key(key(KeyCode::Enter));
        assert_eq!(lock(&a.views.processes).search, "ssh");
        a.on_key(key(KeyCode::Char('q')));
        assert!(a.should_quit);
    }

    #[test]
    fn pause_reaches_views() {
        let mut a = app();
        a.on_key(key(KeyCode::Char('p')));
        assert!(lock(&a.views.cpu).status().paused);
        assert!(lock(&a.views.processes).status().paused);
    }
}
