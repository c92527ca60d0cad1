//! Application struct and event loop.
//!
//! Owns the terminal, the widget state and the receiving end of the
//! presentation bridge. Background work (sampling, speed test scheduling)
//! runs on tokio tasks and reaches the widget only through the bridge.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::constants::*;
use crate::logging;
use crate::monitor::{PingProbe, RollingWindow, SamplingLoop, SysinfoCounters};
use crate::speedtest::{initial_due, ProviderChain, SpeedTestScheduler, TriggerKind};
use crate::store::StateStore;
use crate::ui::{
    self, Bounds, HoverGuard, PresentationBridge, UiMutation, WidgetState,
};
use crate::utils::{schedule_delta, KeepRunning};

pub struct App {
    config: Config,
    state: WidgetState,
    store: Arc<StateStore>,
    hover: HoverGuard,

    bridge: PresentationBridge,
    ui_rx: mpsc::UnboundedReceiver<UiMutation>,

    scheduler: Option<SpeedTestScheduler>,
    keep_running: KeepRunning,
    tasks: Vec<JoinHandle<()>>,
    last_spinner: Instant,
}

impl App {
    pub fn new(config: Config, store: StateStore) -> Self {
        let store = Arc::new(store);
        let saved = store.speedtest();
        let state = WidgetState::new(store.opacity(), saved);
        let (bridge, ui_rx) = PresentationBridge::channel();

        Self {
            config,
            state,
            store,
            hover: HoverGuard::new(),
            bridge,
            ui_rx,
            scheduler: None,
            keep_running: KeepRunning::new(),
            tasks: Vec::new(),
            last_spinner: Instant::now(),
        }
    }

    /// Spawn the sampling loop and, if enabled, the speed test scheduler.
    fn start_background(&mut self) {
        let cadence = Duration::from_millis(self.config.sample_interval_ms);
        let probe = PingProbe::new(
            &self.config.ping_host,
            Duration::from_millis(self.config.ping_timeout_ms),
        );
        let sampling = SamplingLoop::new(
            Box::new(SysinfoCounters::new()),
            Arc::new(probe),
            RollingWindow::shared(self.config.window_capacity),
            self.bridge.clone(),
            cadence,
            self.config.peak_noise_floor_mbps,
            self.keep_running.clone(),
        );
        self.tasks.push(sampling.spawn());

        let st = &self.config.speedtest;
        if !st.enabled {
            log::info!("[SPEEDTEST] Scheduler disabled");
            return;
        }

        let chain = ProviderChain::standard(
            st,
            Box::new(SysinfoCounters::new()),
            self.keep_running.clone(),
        );
        let interval = schedule_delta(st.interval_secs);
        let next_due = initial_due(
            self.store.speedtest().map(|r| r.timestamp),
            Utc::now(),
            interval,
            schedule_delta(st.startup_grace_secs),
        );
        log::info!(
            "[SPEEDTEST] Backends: {} | next run {}",
            chain.names().join(" -> "),
            next_due.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );

        let scheduler = SpeedTestScheduler::new(
            Arc::new(chain),
            Arc::clone(&self.store),
            self.bridge.clone(),
            interval,
            next_due,
        );
        self.tasks.push(scheduler.spawn_poll(
            Duration::from_secs(st.poll_interval_secs),
            self.keep_running.clone(),
        ));
        self.scheduler = Some(scheduler);
    }

    pub async fn run(&mut self) -> Result<()> {
        // Terminal init
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange
        )?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let size = terminal.size()?;
        self.place_widget(size.width, size.height);
        self.start_background();

        // Main loop
        while !self.state.should_quit {
            terminal.draw(|frame| ui::render(frame, &self.state))?;

            self.drain_ui_mutations();

            if event::poll(Duration::from_millis(EVENT_POLL_MS))? {
                self.handle_event(event::read()?);
            }

            self.hover.tick(&mut self.state, Instant::now());
            self.tick_spinner();
        }

        // Cleanup
        logging::section("App exit");
        self.keep_running.stop();
        // Loops may be parked in a sleep or a ping; don't wait them out
        for task in self.tasks.drain(..) {
            task.abort();
        }

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture,
            DisableFocusChange
        )?;
        terminal.show_cursor()?;
        Ok(())
    }

    // ── Channel draining ─────────────────────────────────────────

    fn drain_ui_mutations(&mut self) {
        while let Ok(mutation) = self.ui_rx.try_recv() {
            self.state.apply(mutation);
        }
    }

    // ── Input ────────────────────────────────────────────────────

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(width, height) => self.place_widget(width, height),
            // No more mouse reports once the pointer leaves the terminal
            Event::FocusLost => self.state.pointer = None,
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.should_quit = true;
            }
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Char('s') => self.run_speedtest_now(),
            KeyCode::Char('h') => self.state.toggle_visible(),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let value = self.state.nudge_opacity(1);
                self.persist_opacity(value);
            }
            KeyCode::Char('-') => {
                let value = self.state.nudge_opacity(-1);
                self.persist_opacity(value);
            }
            KeyCode::Char('0') => {
                self.state.opacity = OPACITY_DEFAULT;
                self.persist_opacity(OPACITY_DEFAULT);
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if !matches!(
            mouse.kind,
            MouseEventKind::Moved | MouseEventKind::Drag(_) | MouseEventKind::Down(_)
        ) {
            return;
        }
        self.state.pointer = Some((mouse.column, mouse.row));
        if self.state.is_shown() && self.hover.bounds().contains(mouse.column, mouse.row) {
            self.hover.on_pointer_enter(&mut self.state, Instant::now());
        }
    }

    fn run_speedtest_now(&mut self) {
        match &self.scheduler {
            Some(scheduler) => {
                if !scheduler.trigger(TriggerKind::Manual) {
                    self.state.set_status("Speedtest already running".to_string());
                }
            }
            None => self.state.set_status("Speedtest disabled".to_string()),
        }
    }

    fn persist_opacity(&mut self, value: f64) {
        self.state.opacity = self.store.set_opacity(value);
        log::info!("[APP] Opacity set to {:.2}", self.state.opacity);
    }

    // ── Periodic ─────────────────────────────────────────────────

    fn place_widget(&mut self, width: u16, height: u16) {
        let r = ui::widget_rect(Rect::new(0, 0, width, height));
        let bounds = Bounds {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        };
        self.hover.place(bounds);
        log::info!(
            "[APP] Placed at x={} y={} size={}x{} opacity={:.2}",
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height,
            self.state.opacity
        );
    }

    fn tick_spinner(&mut self) {
        if self.last_spinner.elapsed() >= Duration::from_millis(SPINNER_FRAME_MS) {
            self.state.tick();
            self.last_spinner = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(dir: &tempfile::TempDir) -> App {
        let mut app = App::new(
            Config::default(),
            StateStore::open(dir.path().join("state.json")),
        );
        app.place_widget(80, 24);
        app
    }

    fn move_to(app: &mut App, column: u16, row: u16) {
        app.handle_event(Event::Mouse(MouseEvent {
            kind: MouseEventKind::Moved,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }));
    }

    fn inside(app: &App) -> (u16, u16) {
        let b = app.hover.bounds();
        (b.x + 1, b.y + 1)
    }

    #[test]
    fn pointer_over_widget_keeps_it_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        let (column, row) = inside(&app);
        move_to(&mut app, column, row);
        assert!(!app.state.is_shown());

        let later = Instant::now() + Duration::from_millis(HOVER_POLL_MS * 3);
        app.hover.tick(&mut app.state, later);
        assert!(!app.state.is_shown());
    }

    #[test]
    fn focus_lost_restores_hidden_widget() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir);
        let (column, row) = inside(&app);
        move_to(&mut app, column, row);
        assert!(!app.state.is_shown());

        app.handle_event(Event::FocusLost);
        assert_eq!(app.state.pointer, None);

        let later = Instant::now() + Duration::from_millis(HOVER_POLL_MS * 3);
        app.hover.tick(&mut app.state, later);
        assert!(app.state.is_shown());
    }
}
