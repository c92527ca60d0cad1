use std::time::{Duration, Instant};

use crate::constants::{
    GRAPH_SCALE_FLOOR_MBPS, OPACITY_DEFAULT, OPACITY_STEP, STATUS_MESSAGE_TIMEOUT_SECS,
};
use crate::models::{SampleTick, SpeedTestResult, SUMMARY_PLACEHOLDER};
use crate::store::clamp_opacity;

use super::bridge::UiMutation;
use super::hover::HoverSurface;

/// Everything the widget renders. Owned by the presentation loop and only
/// changed there, either by a drained [`UiMutation`] or by input handling.
#[derive(Debug, Clone)]
pub struct WidgetState {
    pub down_mbps: f64,
    pub up_mbps: f64,
    pub window: Vec<SampleTick>,
    pub scale: f64,

    /// Small speed test readouts; `None` shows placeholders.
    pub speedtest: Option<SpeedTestResult>,
    pub summary: String,
    pub busy: bool,

    pub opacity: f64,
    /// Shown/hidden by the user.
    pub visible: bool,
    /// Hidden by the hover guard.
    pub hover_hidden: bool,
    pub pointer: Option<(u16, u16)>,

    pub tick_count: u64,
    pub status_message: Option<(String, Instant)>,
    pub should_quit: bool,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self::new(OPACITY_DEFAULT, None)
    }
}

impl WidgetState {
    /// Fresh state, pre-populated from a saved result when there is one.
    pub fn new(opacity: f64, saved: Option<SpeedTestResult>) -> Self {
        Self {
            down_mbps: 0.0,
            up_mbps: 0.0,
            window: Vec::new(),
            scale: GRAPH_SCALE_FLOOR_MBPS,
            speedtest: saved,
            summary: saved
                .map(|r| r.summary())
                .unwrap_or_else(|| SUMMARY_PLACEHOLDER.to_string()),
            busy: false,
            opacity: clamp_opacity(opacity),
            visible: true,
            hover_hidden: false,
            pointer: None,
            tick_count: 0,
            status_message: None,
            should_quit: false,
        }
    }

    pub fn apply(&mut self, mutation: UiMutation) {
        match mutation {
            UiMutation::Tick {
                sample,
                window,
                scale,
            } => {
                self.down_mbps = sample.download_mbps;
                self.up_mbps = sample.upload_mbps;
                self.window = window;
                self.scale = scale.max(GRAPH_SCALE_FLOOR_MBPS);
            }
            UiMutation::PingTransition(t) => self.set_status(t.label().to_string()),
            UiMutation::Peak { direction, mbps } => {
                self.set_status(format!("New {} peak {:.2} Mb/s", direction, mbps))
            }
            UiMutation::SpeedTestStarted => self.busy = true,
            UiMutation::SpeedTestLabelsReset => self.speedtest = None,
            UiMutation::SpeedTestResultReady(result) => self.speedtest = Some(result),
            UiMutation::SpeedTestSummary(text) => self.summary = text,
            UiMutation::SpeedTestFinished => self.busy = false,
        }
    }

    pub fn set_status(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now()));
    }

    /// The transient message, if it has not expired yet.
    pub fn active_status(&self) -> Option<&str> {
        self.status_message.as_ref().and_then(|(msg, at)| {
            (at.elapsed() < Duration::from_secs(STATUS_MESSAGE_TIMEOUT_SECS)).then_some(msg.as_str())
        })
    }

    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
    }

    /// Whether the widget is drawn at all.
    pub fn is_shown(&self) -> bool {
        self.visible && !self.hover_hidden
    }

    pub fn toggle_visible(&mut self) {
        self.visible = !self.visible;
        log::info!(
            "[TRAY] {} window",
            if self.visible { "Show" } else { "Hide" }
        );
    }

    /// Opacity one step up or down, clamped. Returns the new value.
    pub fn nudge_opacity(&mut self, steps: i32) -> f64 {
        self.opacity = clamp_opacity(self.opacity + OPACITY_STEP * f64::from(steps));
        self.opacity
    }

    pub fn down_readout(&self) -> String {
        match &self.speedtest {
            Some(r) => format!("↓ {:.2} Mb/s", r.down_mbps),
            None => "↓ -- Mb/s".to_string(),
        }
    }

    pub fn up_readout(&self) -> String {
        match &self.speedtest {
            Some(r) => format!("↑ {:.2} Mb/s", r.up_mbps),
            None => "↑ -- Mb/s".to_string(),
        }
    }
}

impl HoverSurface for WidgetState {
    fn show(&mut self) {
        self.hover_hidden = false;
    }

    fn hide(&mut self) {
        self.hover_hidden = true;
    }

    fn pointer_position(&self) -> Option<(u16, u16)> {
        self.pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{OPACITY_MAX, OPACITY_MIN};
    use crate::models::{Direction, PingTransition, Throughput};
    use chrono::Utc;

    fn result(down: f64, up: f64) -> SpeedTestResult {
        SpeedTestResult::new(
            Throughput {
                down_mbps: down,
                up_mbps: up,
            },
            Utc::now(),
        )
    }

    #[test]
    fn starts_with_placeholders() {
        let s = WidgetState::default();
        assert_eq!(s.summary, "Speedtest: --");
        assert_eq!(s.down_readout(), "↓ -- Mb/s");
        assert_eq!(s.up_readout(), "↑ -- Mb/s");
        assert!(s.is_shown());
    }

    #[test]
    fn saved_result_prepopulates_labels() {
        let s = WidgetState::new(0.8, Some(result(95.1, 10.2)));
        assert_eq!(s.summary, "Speedtest: 95.1↓ | 10.2↑ Mb/s");
        assert_eq!(s.down_readout(), "↓ 95.10 Mb/s");
        assert_eq!(s.up_readout(), "↑ 10.20 Mb/s");
    }

    #[test]
    fn tick_updates_live_values_and_graph() {
        let mut s = WidgetState::default();
        let sample = SampleTick::new(
            Utc::now(),
            Throughput {
                down_mbps: 12.5,
                up_mbps: 3.25,
            },
            true,
        );
        s.apply(UiMutation::Tick {
            sample,
            window: vec![sample],
            scale: 12.5,
        });
        assert_eq!(s.down_mbps, 12.5);
        assert_eq!(s.up_mbps, 3.25);
        assert_eq!(s.window.len(), 1);
        assert_eq!(s.scale, 12.5);
    }

    #[test]
    fn manual_run_lifecycle() {
        let mut s = WidgetState::new(0.72, Some(result(1.0, 1.0)));
        s.apply(UiMutation::SpeedTestStarted);
        s.apply(UiMutation::SpeedTestLabelsReset);
        assert!(s.busy);
        assert_eq!(s.down_readout(), "↓ -- Mb/s");

        s.apply(UiMutation::SpeedTestSummary("Speedtest: failed".into()));
        s.apply(UiMutation::SpeedTestFinished);
        assert!(!s.busy);
        assert_eq!(s.summary, "Speedtest: failed");
        assert!(s.speedtest.is_none());
    }

    #[test]
    fn transitions_and_peaks_become_status_messages() {
        let mut s = WidgetState::default();
        s.apply(UiMutation::PingTransition(PingTransition::Dropped));
        assert_eq!(s.active_status(), Some("Ping dropped"));
        s.apply(UiMutation::Peak {
            direction: Direction::Downstream,
            mbps: 42.0,
        });
        assert_eq!(s.active_status(), Some("New downstream peak 42.00 Mb/s"));
    }

    #[test]
    fn expired_status_is_hidden() {
        let mut s = WidgetState::default();
        s.status_message = Some((
            "old".into(),
            Instant::now() - Duration::from_secs(STATUS_MESSAGE_TIMEOUT_SECS + 1),
        ));
        assert_eq!(s.active_status(), None);
    }

    #[test]
    fn opacity_nudges_clamp() {
        let mut s = WidgetState::new(0.95, None);
        assert_eq!(s.nudge_opacity(5), OPACITY_MAX);
        let mut s = WidgetState::new(0.45, None);
        assert_eq!(s.nudge_opacity(-5), OPACITY_MIN);
    }

    #[test]
    fn hover_and_manual_visibility_are_independent() {
        let mut s = WidgetState::default();
        s.hide();
        assert!(!s.is_shown());
        s.show();
        assert!(s.is_shown());
        s.toggle_visible();
        assert!(!s.is_shown());
        s.show();
        assert!(!s.is_shown());
    }
}
