//! Flash orchestrator - runs one image-plan upload at a time.
//!
//! Validates the plan, launches the flashing tool, feeds its output through
//! the progress tracker and classifies the exit code. Attempts run on a
//! dedicated worker thread; events reach the caller over a channel.
//!
//! Cancelling kills the tool mid-write. Images already written stay on the
//! device, there is no rollback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::events::{ChannelObserver, FlashEvent, FlashObserver, LogLevel};
use crate::plan::{ImagePlan, MissingFiles};
use crate::process::{
    ConnectionParams, FlashProcess, OutputLine, ProcessLauncher, SystemLauncher, ToolConfig,
};
use crate::progress::{LineKind, ProgressTracker};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("Missing image files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    #[error("Failed to launch flash tool: {0}")]
    Launch(String),

    #[error("Flash tool exited with code {0}")]
    ExternalToolFailed(i32),

    #[error("Flash cancelled")]
    Cancelled,

    #[error("A flash attempt is already running")]
    Busy,

    #[error("Flash worker failed: {0}")]
    Internal(String),
}

impl FlashError {
    /// Cancellation is caller-initiated, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlashError::Cancelled)
    }
}

impl From<MissingFiles> for FlashError {
    fn from(e: MissingFiles) -> Self {
        FlashError::MissingFiles(e.0)
    }
}

/// Terminal outcome of one attempt.
pub type FlashResult = Result<(), FlashError>;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// How long one output poll waits before checking for cancellation.
    pub poll_interval: Duration,
    /// How long to keep draining output after a kill.
    pub kill_grace: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            kill_grace: Duration::from_secs(2),
        }
    }
}

type ActiveSlot = Arc<Mutex<Option<CancelToken>>>;

/// Marks an attempt as active until dropped.
struct AttemptGuard {
    slot: ActiveSlot,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Handle to an attempt running on the worker thread.
pub struct FlashHandle {
    events: Receiver<FlashEvent>,
    cancel: CancelToken,
    worker: JoinHandle<FlashResult>,
}

impl FlashHandle {
    /// Progress, log lines and finally `Finished`, in production order.
    pub fn events(&self) -> &Receiver<FlashEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the attempt ends.
    pub fn wait(self) -> FlashResult {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(FlashError::Internal("worker thread panicked".to_string())))
    }
}

/// Coordinates device, plan, process and tracker for one attempt at a time.
pub struct FlashOrchestrator<L: ProcessLauncher> {
    launcher: Arc<L>,
    tool: ToolConfig,
    options: OrchestratorOptions,
    active: ActiveSlot,
}

impl FlashOrchestrator<SystemLauncher> {
    /// Orchestrator running the real tool named in `tool`.
    pub fn new(tool: ToolConfig) -> Self {
        let launcher = SystemLauncher::new(tool.program.clone());
        Self::with_launcher(tool, launcher)
    }
}

impl<L: ProcessLauncher + 'static> FlashOrchestrator<L> {
    pub fn with_launcher(tool: ToolConfig, launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
            tool,
            options: OrchestratorOptions::default(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Request cancellation of the active attempt. Returns false when idle.
    pub fn cancel(&self) -> bool {
        match self.active.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(token) => {
                info!("Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn acquire(&self, cancel: CancelToken) -> Result<AttemptGuard, FlashError> {
        let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("Rejecting flash request, attempt already active");
            return Err(FlashError::Busy);
        }
        *slot = Some(cancel);
        Ok(AttemptGuard {
            slot: Arc::clone(&self.active),
        })
    }

    /// Start an attempt on a worker thread.
    ///
    /// Returns `Busy` immediately, without side effects, while another
    /// attempt is active.
    pub fn flash(&self, params: ConnectionParams, plan: ImagePlan) -> Result<FlashHandle, FlashError> {
        let cancel = CancelToken::new();
        let guard = self.acquire(cancel.clone())?;
        let (tx, rx) = mpsc::channel();

        let launcher = Arc::clone(&self.launcher);
        let tool = self.tool.clone();
        let options = self.options;
        let token = cancel.clone();

        let worker = thread::Builder::new()
            .name("s3flash-worker".to_string())
            .spawn(move || {
                let observer = ChannelObserver::new(tx);
                let result = attempt(
                    launcher.as_ref(),
                    &tool,
                    &options,
                    &params,
                    &plan,
                    &observer,
                    &token,
                );
                drop(guard);
                observer.on_event(&FlashEvent::Finished(result.clone()));
                result
            })
            .map_err(|e| FlashError::Internal(e.to_string()))?;

        Ok(FlashHandle {
            events: rx,
            cancel,
            worker,
        })
    }

    /// Run an attempt on the calling thread.
    ///
    /// Use `cancel` from another thread to abort it.
    pub fn run<O: FlashObserver + ?Sized>(
        &self,
        params: &ConnectionParams,
        plan: &ImagePlan,
        observer: &O,
    ) -> FlashResult {
        let cancel = CancelToken::new();
        let guard = self.acquire(cancel.clone())?;
        let result = attempt(
            self.launcher.as_ref(),
            &self.tool,
            &self.options,
            params,
            plan,
            observer,
            &cancel,
        );
        drop(guard);
        observer.on_event(&FlashEvent::Finished(result.clone()));
        result
    }
}

enum Drain {
    Closed,
    Cancelled,
}

#[instrument(skip_all, fields(port = %params.device, baud = %params.baud))]
fn attempt<L: ProcessLauncher + ?Sized, O: FlashObserver + ?Sized>(
    launcher: &L,
    tool: &ToolConfig,
    options: &OrchestratorOptions,
    params: &ConnectionParams,
    plan: &ImagePlan,
    observer: &O,
    cancel: &CancelToken,
) -> FlashResult {
    let mut tracker = ProgressTracker::new(plan);
    let fail = |tracker: &mut ProgressTracker, err: FlashError| -> FlashResult {
        observer.on_event(&FlashEvent::Log {
            level: LogLevel::Error,
            message: err.to_string(),
        });
        observer.on_event(&FlashEvent::Progress(tracker.fail(err.to_string())));
        Err(err)
    };

    if let Err(missing) = plan.validate() {
        return fail(&mut tracker, missing.into());
    }
    if cancel.is_cancelled() {
        return Err(FlashError::Cancelled);
    }

    let args = tool.build_args(plan, params);
    let mut process = match launcher.launch(&args) {
        Ok(p) => p,
        Err(e) => return fail(&mut tracker, FlashError::Launch(e.to_string())),
    };

    observer.on_event(&FlashEvent::Started {
        port: params.device.clone(),
        baud: params.baud.as_u32(),
    });
    observer.on_event(&FlashEvent::Progress(tracker.begin()));

    // The tool may close its output before it exits, so cancellation is
    // still honoured while waiting for the exit code.
    let exit = match pump(process.as_mut(), &mut tracker, observer, cancel, options) {
        Drain::Closed => await_exit(process.as_mut(), cancel, options),
        Drain::Cancelled => None,
    };
    let Some(code) = exit else {
        terminate(process.as_mut(), options);
        observer.on_event(&FlashEvent::Log {
            level: LogLevel::Warn,
            message: "Flash cancelled; images already written remain on the device".to_string(),
        });
        return Err(FlashError::Cancelled);
    };
    info!(exit_code = code, "Flash tool finished");

    if code == 0 {
        observer.on_event(&FlashEvent::Progress(tracker.complete()));
        Ok(())
    } else {
        fail(&mut tracker, FlashError::ExternalToolFailed(code))
    }
}

/// Forward output lines until the stream closes or cancellation is
/// requested.
fn pump<O: FlashObserver + ?Sized>(
    process: &mut dyn FlashProcess,
    tracker: &mut ProgressTracker,
    observer: &O,
    cancel: &CancelToken,
    options: &OrchestratorOptions,
) -> Drain {
    loop {
        if cancel.is_cancelled() {
            return Drain::Cancelled;
        }
        let line = match process.read_line(options.poll_interval) {
            OutputLine::Line(line) => line,
            OutputLine::Pending => continue,
            OutputLine::Closed => return Drain::Closed,
        };
        if cancel.is_cancelled() {
            return Drain::Cancelled;
        }

        let feed = tracker.feed(&line);
        let level = if feed.kind == LineKind::ErrorMarker {
            LogLevel::Error
        } else {
            LogLevel::Debug
        };
        observer.on_event(&FlashEvent::Log {
            level,
            message: line,
        });
        if let Some(event) = feed.event {
            observer.on_event(&FlashEvent::Progress(event));
        }
    }
}

/// Poll for the exit code once output has closed. `None` when cancelled
/// first.
fn await_exit(
    process: &mut dyn FlashProcess,
    cancel: &CancelToken,
    options: &OrchestratorOptions,
) -> Option<i32> {
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        match process.try_wait() {
            Ok(Some(code)) => return Some(code),
            Ok(None) => thread::sleep(options.poll_interval),
            Err(e) => {
                warn!(error = %e, "Could not reap flash tool");
                return Some(-1);
            }
        }
    }
}

/// Kill the tool, discard what is left of its output and reap it.
fn terminate(process: &mut dyn FlashProcess, options: &OrchestratorOptions) {
    if let Err(e) = process.kill() {
        warn!(error = %e, "Kill failed");
    }
    let deadline = Instant::now() + options.kill_grace;
    while Instant::now() < deadline {
        if process.read_line(options.poll_interval) == OutputLine::Closed {
            break;
        }
    }
    match process.wait() {
        Ok(code) => info!(exit_code = code, "Flash tool terminated"),
        Err(e) => warn!(error = %e, "Could not reap flash tool"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FlashPhase, ProgressEvent};
    use crate::process::{BaudRate, MockLauncher, MockStep};
    use std::fs;
    use tempfile::TempDir;

    struct RecordingObserver {
        events: Mutex<Vec<FlashEvent>>,
    }

    impl RecordingObserver {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<FlashEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl FlashObserver for RecordingObserver {
        fn on_event(&self, event: &FlashEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn image_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["bootloader.bin", "partitions.bin", "firmware.bin"] {
            fs::write(dir.path().join(name), [0xFFu8; 32]).unwrap();
        }
        dir
    }

    fn params() -> ConnectionParams {
        ConnectionParams::new("/dev/ttyUSB0", BaudRate::B460800)
    }

    fn fast() -> OrchestratorOptions {
        OrchestratorOptions {
            poll_interval: Duration::from_millis(5),
            kill_grace: Duration::from_millis(200),
        }
    }

    const SCRIPT: &[&str] = &[
        "Connecting....",
        "Chip is ESP32-S3 (QFN56) (revision v0.2)",
        "Uploading stub...",
        "Writing at 0x00000000... (0 %)",
        "Writing at 0x00002000... (50 %)",
        "Writing at 0x00003000... (100 %)",
        "Hash of data verified.",
        "Writing at 0x00008000... (100 %)",
        "Hash of data verified.",
        "Writing at 0x00010000... (100 %)",
        "Hash of data verified.",
        "Hard resetting via RTS pin...",
    ];

    fn progress(events: &[FlashEvent]) -> Vec<ProgressEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                FlashEvent::Progress(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_successful_flash() {
        let dir = image_dir();
        let launcher = MockLauncher::with_lines(SCRIPT.iter().copied(), 0);
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher.clone())
            .with_options(fast());
        let observer = RecordingObserver::new();

        let plan = ImagePlan::standard(dir.path(), 0x0);
        assert_eq!(orch.run(&params(), &plan, &observer), Ok(()));

        let events = observer.events();
        let progress = progress(&events);
        assert_eq!(progress.first().unwrap().phase, FlashPhase::Connecting);
        assert_eq!(progress.last().unwrap().phase, FlashPhase::Done);
        assert_eq!(progress.last().unwrap().percent, 100);
        assert!(progress.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert!(matches!(events.last(), Some(FlashEvent::Finished(Ok(())))));

        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert!(launches[0].contains(&"460800".to_string()));
        assert_eq!(launcher.wait_count(), 1);
        assert!(!orch.is_busy());
    }

    #[test]
    fn test_log_lines_keep_output_order() {
        let dir = image_dir();
        let launcher = MockLauncher::with_lines(SCRIPT.iter().copied(), 0);
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher)
            .with_options(fast());
        let observer = RecordingObserver::new();
        orch.run(&params(), &ImagePlan::standard(dir.path(), 0x0), &observer)
            .unwrap();

        let lines: Vec<String> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FlashEvent::Log {
                    level: LogLevel::Debug,
                    message,
                } => Some(message),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = SCRIPT.iter().map(|s| s.to_string()).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_missing_files_never_launch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("partitions.bin"), [0u8; 4]).unwrap();
        let launcher = MockLauncher::new(0);
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher.clone());
        let observer = RecordingObserver::new();

        let result = orch.run(&params(), &ImagePlan::standard(dir.path(), 0x0), &observer);
        assert_eq!(
            result,
            Err(FlashError::MissingFiles(vec![
                "Bootloader".into(),
                "Firmware".into()
            ]))
        );
        assert_eq!(launcher.launch_count(), 0);
        assert_eq!(progress(&observer.events()).last().unwrap().phase, FlashPhase::Failed);
    }

    #[test]
    fn test_launch_error() {
        let dir = image_dir();
        let orch = FlashOrchestrator::with_launcher(
            ToolConfig::default(),
            MockLauncher::failing("permission denied"),
        );
        let observer = RecordingObserver::new();
        let result = orch.run(&params(), &ImagePlan::standard(dir.path(), 0x0), &observer);
        assert!(matches!(result, Err(FlashError::Launch(msg)) if msg.contains("permission denied")));
        assert!(
            !observer
                .events()
                .iter()
                .any(|e| matches!(e, FlashEvent::Started { .. }))
        );
    }

    #[test]
    fn test_nonzero_exit_fails_regardless_of_phase() {
        let dir = image_dir();
        let launcher = MockLauncher::with_lines(SCRIPT.iter().copied(), 2);
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher)
            .with_options(fast());
        let observer = RecordingObserver::new();

        let result = orch.run(&params(), &ImagePlan::standard(dir.path(), 0x0), &observer);
        assert_eq!(result, Err(FlashError::ExternalToolFailed(2)));

        let progress = progress(&observer.events());
        let last = progress.last().unwrap();
        assert_eq!(last.phase, FlashPhase::Failed);
        assert_eq!(last.percent, 0);
        assert!(progress.iter().any(|p| p.phase == FlashPhase::Resetting));
    }

    #[test]
    fn test_error_lines_logged_at_error_level() {
        let dir = image_dir();
        let launcher = MockLauncher::with_lines(
            ["Connecting....", "A fatal error occurred: Failed to connect to ESP32-S3"],
            2,
        );
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher)
            .with_options(fast());
        let observer = RecordingObserver::new();
        let _ = orch.run(&params(), &ImagePlan::standard(dir.path(), 0x0), &observer);

        assert!(observer.events().iter().any(|e| matches!(
            e,
            FlashEvent::Log { level: LogLevel::Error, message } if message.starts_with("A fatal error")
        )));
    }

    #[test]
    fn test_busy_rejects_second_attempt() {
        let dir = image_dir();
        let mut launcher = MockLauncher::with_lines(["Connecting...."], 0);
        launcher.push_step(MockStep::Hang);
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher.clone())
            .with_options(fast());

        let plan = ImagePlan::standard(dir.path(), 0x0);
        let handle = orch.flash(params(), plan.clone()).unwrap();
        assert!(orch.is_busy());
        assert!(matches!(orch.flash(params(), plan.clone()), Err(FlashError::Busy)));
        assert_eq!(
            orch.run(&params(), &plan, &RecordingObserver::new()),
            Err(FlashError::Busy)
        );

        assert!(orch.cancel());
        assert_eq!(handle.wait(), Err(FlashError::Cancelled));
        assert_eq!(launcher.launch_count(), 1);

        // Slot is free again once the attempt has ended.
        assert!(!orch.is_busy());
        assert!(!orch.cancel());
    }

    #[test]
    fn test_cancel_mid_flash() {
        let dir = image_dir();
        let mut launcher = MockLauncher::with_lines(
            [
                "Chip is ESP32-S3",
                "Uploading stub...",
                "Writing at 0x00000000... (10 %)",
            ],
            0,
        );
        launcher.push_step(MockStep::Hang);
        launcher.push_line("Writing at 0x00002000... (90 %)");
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher.clone())
            .with_options(fast());

        let handle = orch
            .flash(params(), ImagePlan::standard(dir.path(), 0x0))
            .unwrap();

        // Wait until the write has started.
        loop {
            match handle.events().recv_timeout(Duration::from_secs(5)).unwrap() {
                FlashEvent::Progress(p) if p.phase == FlashPhase::WritingImage(0) => break,
                _ => {}
            }
        }

        handle.cancel();
        assert!(handle.cancel_token().is_cancelled());
        let (result, rx_events) = handle.wait_collect();
        assert_eq!(result, Err(FlashError::Cancelled));

        assert!(
            !rx_events
                .iter()
                .any(|e| matches!(e, FlashEvent::Progress(_)))
        );
        assert!(matches!(
            rx_events.last(),
            Some(FlashEvent::Finished(Err(FlashError::Cancelled)))
        ));
        assert_eq!(launcher.kill_count(), 1);
        assert_eq!(launcher.wait_count(), 1);
    }

    #[test]
    fn test_finished_delivered_once() {
        let dir = image_dir();
        let launcher = MockLauncher::with_lines(SCRIPT.iter().copied(), 0);
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher)
            .with_options(fast());
        let handle = orch
            .flash(params(), ImagePlan::standard(dir.path(), 0x0))
            .unwrap();
        let (result, events) = handle.wait_collect();
        assert_eq!(result, Ok(()));
        let finished = events
            .iter()
            .filter(|e| matches!(e, FlashEvent::Finished(_)))
            .count();
        assert_eq!(finished, 1);

        // A new attempt may start right after the previous one finished.
        let again = orch
            .flash(params(), ImagePlan::standard(dir.path(), 0x0))
            .unwrap();
        assert_eq!(again.wait(), Ok(()));
    }

    #[test]
    fn test_cancel_after_output_closed() {
        let dir = image_dir();
        let launcher = MockLauncher::with_lines(["Connecting...."], 0).lingering();
        let orch = FlashOrchestrator::with_launcher(ToolConfig::default(), launcher.clone())
            .with_options(fast());

        let handle = orch
            .flash(params(), ImagePlan::standard(dir.path(), 0x0))
            .unwrap();
        loop {
            if let FlashEvent::Log { message, .. } =
                handle.events().recv_timeout(Duration::from_secs(5)).unwrap()
            {
                assert_eq!(message, "Connecting....");
                break;
            }
        }
        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());

        handle.cancel();
        let (result, _) = handle.wait_collect();
        assert_eq!(result, Err(FlashError::Cancelled));
        assert_eq!(launcher.kill_count(), 1);
        assert!(!orch.is_busy());
    }

    #[cfg(unix)]
    fn sh_tool(script: &str) -> ToolConfig {
        ToolConfig {
            program: "sh".into(),
            program_args: vec!["-c".into(), script.into()],
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_real_process_after_output_closed() {
        let dir = image_dir();
        let orch = FlashOrchestrator::new(sh_tool("echo Connecting....; exec >&- 2>&-; exec sleep 8"))
            .with_options(fast());

        let handle = orch
            .flash(params(), ImagePlan::standard(dir.path(), 0x0))
            .unwrap();
        thread::sleep(Duration::from_millis(500));
        let cancelled_at = Instant::now();
        assert!(orch.cancel());

        assert_eq!(handle.wait(), Err(FlashError::Cancelled));
        assert!(cancelled_at.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_process_stderr_stays_in_order() {
        let dir = image_dir();
        let orch = FlashOrchestrator::new(sh_tool(
            "echo Connecting....; echo 'A fatal error occurred: no serial data' 1>&2; \
             echo 'Hard resetting via RTS pin...'; exit 2",
        ))
        .with_options(fast());
        let observer = RecordingObserver::new();

        let result = orch.run(&params(), &ImagePlan::standard(dir.path(), 0x0), &observer);
        assert_eq!(result, Err(FlashError::ExternalToolFailed(2)));

        // Raw tool lines come first, the failure summary follows them.
        let lines: Vec<(LogLevel, String)> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FlashEvent::Log { level, message } => Some((level, message)),
                _ => None,
            })
            .take(3)
            .collect();
        assert_eq!(
            lines,
            vec![
                (LogLevel::Debug, "Connecting....".to_string()),
                (
                    LogLevel::Error,
                    "A fatal error occurred: no serial data".to_string()
                ),
                (LogLevel::Debug, "Hard resetting via RTS pin...".to_string()),
            ]
        );
    }

    impl FlashHandle {
        /// Join the worker and collect everything still queued.
        fn wait_collect(self) -> (FlashResult, Vec<FlashEvent>) {
            let FlashHandle {
                events, worker, ..
            } = self;
            let result = worker.join().unwrap();
            (result, events.try_iter().collect())
        }
    }
}
