//! Progress state machine.
//!
//! Consumes classified output lines and turns them into a monotonic
//! sequence of progress events. It never decides success or failure; the
//! orchestrator does that from the exit code and then calls `complete` or
//! `fail`.

use tracing::{debug, warn};

use super::rules::{LineKind, classify};
use crate::events::{FlashPhase, ProgressEvent};
use crate::plan::ImagePlan;

/// Percent marks for each phase.
///
/// Writes share the band `write_start..write_end` evenly between images.
/// The band ends below `reset` so the reset mark never moves progress
/// backwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressLayout {
    pub connecting: f64,
    pub chip: f64,
    pub stub: f64,
    pub write_start: f64,
    pub write_end: f64,
    pub reset: f64,
}

impl Default for ProgressLayout {
    fn default() -> Self {
        Self {
            connecting: 5.0,
            chip: 15.0,
            stub: 20.0,
            write_start: 25.0,
            write_end: 92.5,
            reset: 95.0,
        }
    }
}

/// What one line produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub kind: LineKind,
    /// At most one event per line.
    pub event: Option<ProgressEvent>,
}

pub struct ProgressTracker {
    names: Vec<String>,
    plan: ImagePlan,
    layout: ProgressLayout,
    phase: FlashPhase,
    current: Option<usize>,
    verified: bool,
    percent: u8,
}

impl ProgressTracker {
    pub fn new(plan: &ImagePlan) -> Self {
        Self::with_layout(plan, ProgressLayout::default())
    }

    pub fn with_layout(plan: &ImagePlan, layout: ProgressLayout) -> Self {
        Self {
            names: plan.entries().iter().map(|e| e.name.clone()).collect(),
            plan: plan.clone(),
            layout,
            phase: FlashPhase::Idle,
            current: None,
            verified: false,
            percent: 0,
        }
    }

    pub fn phase(&self) -> FlashPhase {
        self.phase
    }

    /// Last emitted percent.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Plan index of the image being written, if known.
    pub fn current_image(&self) -> Option<usize> {
        self.current
    }

    fn share(&self) -> f64 {
        (self.layout.write_end - self.layout.write_start) / self.names.len().max(1) as f64
    }

    fn start_percent(&self, index: usize) -> f64 {
        self.layout.write_start + index as f64 * self.share()
    }

    fn end_percent(&self, index: usize) -> f64 {
        self.start_percent(index + 1)
    }

    fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("Image")
    }

    fn emit(&mut self, phase: FlashPhase, value: f64, message: String) -> ProgressEvent {
        let percent = (value.floor().clamp(0.0, 100.0) as u8).max(self.percent);
        self.phase = phase;
        self.percent = percent;
        ProgressEvent::new(phase, percent, message)
    }

    /// Fixed-percent phases only ever move forward.
    fn advance(&mut self, phase: FlashPhase, value: f64, message: String) -> Option<ProgressEvent> {
        if phase.rank() <= self.phase.rank() {
            debug!(from = %self.phase, to = %phase, "Ignoring backward phase marker");
            return None;
        }
        Some(self.emit(phase, value, message))
    }

    /// Initial event when the tool has been started.
    pub fn begin(&mut self) -> ProgressEvent {
        let value = self.layout.connecting;
        self.emit(FlashPhase::Connecting, value, "Connecting to device".to_string())
    }

    /// Classify `line` and update state.
    pub fn feed(&mut self, line: &str) -> Feed {
        let kind = classify(line);
        let event = match &kind {
            LineKind::Connecting => {
                let value = self.layout.connecting;
                self.advance(FlashPhase::Connecting, value, "Connecting to device".to_string())
            }
            LineKind::ChipDetected { detail } => {
                let value = self.layout.chip;
                let message = if detail.is_empty() {
                    "Detecting chip".to_string()
                } else {
                    format!("Chip detected: {}", detail)
                };
                self.advance(FlashPhase::DetectingChip, value, message)
            }
            LineKind::StubReady => {
                let value = self.layout.stub;
                self.advance(FlashPhase::PreparingStub, value, "Preparing flasher stub".to_string())
            }
            LineKind::Write { address, percent } => self.on_write(*address, *percent, line),
            LineKind::HashVerified => self.on_verified(),
            LineKind::Reset => {
                let value = self.layout.reset;
                self.advance(FlashPhase::Resetting, value, "Restarting device".to_string())
            }
            LineKind::ErrorMarker | LineKind::Unclassified => None,
        };
        Feed { kind, event }
    }

    fn resolve_index(&self, address: u32) -> Option<usize> {
        let from = match self.current {
            None => 0,
            Some(i) if self.verified => i + 1,
            Some(i) => i,
        };
        if let Some(index) = self.plan.find_by_address(address, from) {
            return Some(index);
        }
        // Chunk inside the image being written.
        let i = self.current?;
        let start = self.plan.get(i)?.address;
        let next = self.plan.get(i + 1).map(|e| e.address);
        let inside = address > start && next.is_none_or(|n| n <= start || address < n);
        inside.then_some(i)
    }

    fn on_write(&mut self, address: Option<u32>, percent: Option<f64>, line: &str) -> Option<ProgressEvent> {
        let resolved = address.and_then(|a| self.resolve_index(a));
        if address.is_some() && resolved.is_none() {
            warn!(line = %line, "Write at an address outside the image plan");
            return None;
        }

        let mut started = false;
        if let Some(index) = resolved
            && self.current != Some(index)
        {
            self.current = Some(index);
            self.verified = false;
            started = true;
        }

        let index = self.current?;
        let name = self.name(index).to_string();
        match percent {
            Some(p) => {
                let total = self.start_percent(index) + p * self.share() / 100.0;
                Some(self.emit(
                    FlashPhase::WritingImage(index),
                    total,
                    format!("Uploading {} ({:.0}%)", name, p),
                ))
            }
            None if started => {
                let value = self.start_percent(index);
                Some(self.emit(
                    FlashPhase::WritingImage(index),
                    value,
                    format!("{} upload started", name),
                ))
            }
            None => None,
        }
    }

    fn on_verified(&mut self) -> Option<ProgressEvent> {
        let index = self.current?;
        if self.verified {
            return None;
        }
        self.verified = true;
        let value = self.end_percent(index);
        let mut message = format!("{} verified", self.name(index));
        if index + 1 < self.names.len() {
            message.push_str(&format!(", preparing {}", self.name(index + 1)));
        }
        Some(self.emit(FlashPhase::VerifyingImage(index), value, message))
    }

    /// Terminal success event.
    pub fn complete(&mut self) -> ProgressEvent {
        self.emit(FlashPhase::Done, 100.0, "Upload complete".to_string())
    }

    /// Terminal failure event. Reports 0 percent.
    pub fn fail(&mut self, message: impl Into<String>) -> ProgressEvent {
        self.phase = FlashPhase::Failed;
        self.percent = 0;
        ProgressEvent::new(FlashPhase::Failed, 0, message)
    }
}
