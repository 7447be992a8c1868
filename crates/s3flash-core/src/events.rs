//! Event system for UI decoupling.
//!
//! Allows CLI/TUI/GUI callers to follow a flash attempt without
//! tight coupling to the orchestrator.

use std::fmt;
use std::sync::mpsc::Sender;

use crate::orchestrator::FlashResult;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Flash sequence phases used for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Nothing has happened yet.
    Idle,
    /// Tool started, syncing with the ROM bootloader.
    Connecting,
    /// Chip type is being identified.
    DetectingChip,
    /// Flasher stub is being uploaded.
    PreparingStub,
    /// Image at the given plan index is being written.
    WritingImage(usize),
    /// Image at the given plan index passed its hash check.
    VerifyingImage(usize),
    /// Device is being reset into the new firmware.
    Resetting,
    /// All images written, tool exited cleanly.
    Done,
    /// Attempt failed.
    Failed,
}

impl FlashPhase {
    /// Ordering rank used to keep phase transitions moving forward.
    pub(crate) fn rank(&self) -> usize {
        match self {
            FlashPhase::Idle => 0,
            FlashPhase::Connecting => 1,
            FlashPhase::DetectingChip => 2,
            FlashPhase::PreparingStub => 3,
            FlashPhase::WritingImage(_) | FlashPhase::VerifyingImage(_) => 4,
            FlashPhase::Resetting => 5,
            FlashPhase::Done | FlashPhase::Failed => 6,
        }
    }

    /// Whether this phase ends an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlashPhase::Done | FlashPhase::Failed)
    }
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Idle => write!(f, "Idle"),
            FlashPhase::Connecting => write!(f, "Connecting"),
            FlashPhase::DetectingChip => write!(f, "Detecting Chip"),
            FlashPhase::PreparingStub => write!(f, "Preparing Stub"),
            FlashPhase::WritingImage(i) => write!(f, "Writing Image {}", i),
            FlashPhase::VerifyingImage(i) => write!(f, "Verifying Image {}", i),
            FlashPhase::Resetting => write!(f, "Resetting"),
            FlashPhase::Done => write!(f, "Done"),
            FlashPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// A single normalized progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: FlashPhase,
    /// Overall progress, 0-100.
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(phase: FlashPhase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Events emitted during a flash attempt.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// External tool launched against a port.
    Started { port: String, baud: u32 },
    /// Normalized progress.
    Progress(ProgressEvent),
    /// Raw output line from the tool, or an orchestrator note.
    Log { level: LogLevel, message: String },
    /// Terminal outcome. Delivered exactly once per attempt.
    Finished(FlashResult),
}

/// Observer trait for receiving flash events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait FlashObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &FlashEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FlashObserver for NullObserver {
    fn on_event(&self, _event: &FlashEvent) {}
}

/// Observer that forwards events over an mpsc channel.
///
/// Send errors are ignored: a caller that dropped its receiver has
/// stopped listening, the attempt still runs to completion.
pub struct ChannelObserver {
    sender: Sender<FlashEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<FlashEvent>) -> Self {
        Self { sender }
    }
}

impl FlashObserver for ChannelObserver {
    fn on_event(&self, event: &FlashEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::Started { port, baud } => {
                tracing::info!(port = %port, baud = baud, "Flash started");
            }
            FlashEvent::Progress(p) => {
                tracing::info!(phase = %p.phase, progress = %format!("{}%", p.percent), "{}", p.message);
            }
            FlashEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            FlashEvent::Finished(Ok(())) => {
                tracing::info!("Flash complete");
            }
            FlashEvent::Finished(Err(e)) if e.is_cancelled() => {
                tracing::warn!("Flash cancelled");
            }
            FlashEvent::Finished(Err(e)) => {
                tracing::error!(error = %e, "Flash failed");
            }
        }
    }
}
