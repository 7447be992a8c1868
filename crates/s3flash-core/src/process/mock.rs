//! Scripted flash process for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::traits::{FlashProcess, OutputLine, ProcessError, ProcessLauncher};

/// One step of a scripted output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Emit a line.
    Line(String),
    /// Report one idle poll.
    Pending,
    /// Stay idle until killed.
    Hang,
}

#[derive(Debug, Default)]
struct MockState {
    launches: Vec<Vec<String>>,
    kills: usize,
    waits: usize,
}

/// Mock launcher that hands out processes replaying a fixed script.
#[derive(Clone)]
pub struct MockLauncher {
    script: Vec<MockStep>,
    exit_code: i32,
    linger: bool,
    launch_error: Option<String>,
    state: Arc<Mutex<MockState>>,
}

impl MockLauncher {
    pub fn new(exit_code: i32) -> Self {
        Self {
            script: Vec::new(),
            exit_code,
            linger: false,
            launch_error: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Launcher whose processes print `lines` then exit with `exit_code`.
    pub fn with_lines<I, S>(lines: I, exit_code: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut launcher = Self::new(exit_code);
        for line in lines {
            launcher.push_line(line);
        }
        launcher
    }

    /// Launcher that fails to start anything.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut launcher = Self::new(0);
        launcher.launch_error = Some(message.into());
        launcher
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.script.push(MockStep::Line(line.into()));
    }

    pub fn push_step(&mut self, step: MockStep) {
        self.script.push(step);
    }

    /// Processes keep running after closing their output, until killed.
    pub fn lingering(mut self) -> Self {
        self.linger = true;
        self
    }

    /// Argument vectors of every launched process.
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.lock().launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.lock().launches.len()
    }

    pub fn kill_count(&self) -> usize {
        self.lock().kills
    }

    pub fn wait_count(&self) -> usize {
        self.lock().waits
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, args: &[String]) -> Result<Box<dyn FlashProcess>, ProcessError> {
        if let Some(message) = &self.launch_error {
            return Err(ProcessError::Launch {
                program: "mock".to_string(),
                message: message.clone(),
            });
        }
        self.lock().launches.push(args.to_vec());
        Ok(Box::new(MockProcess {
            script: self.script.iter().cloned().collect(),
            exit_code: self.exit_code,
            linger: self.linger,
            killed: false,
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockProcess {
    script: VecDeque<MockStep>,
    exit_code: i32,
    linger: bool,
    killed: bool,
    state: Arc<Mutex<MockState>>,
}

impl FlashProcess for MockProcess {
    fn read_line(&mut self, timeout: Duration) -> OutputLine {
        if self.killed {
            return OutputLine::Closed;
        }
        match self.script.front() {
            None => OutputLine::Closed,
            Some(MockStep::Hang) => {
                thread::sleep(timeout.min(Duration::from_millis(10)));
                OutputLine::Pending
            }
            Some(_) => match self.script.pop_front() {
                Some(MockStep::Line(line)) => OutputLine::Line(line),
                _ => OutputLine::Pending,
            },
        }
    }

    fn wait(&mut self) -> Result<i32, ProcessError> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).waits += 1;
        Ok(if self.killed { -1 } else { self.exit_code })
    }

    fn try_wait(&mut self) -> Result<Option<i32>, ProcessError> {
        if self.linger && !self.killed {
            return Ok(None);
        }
        self.wait().map(Some)
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        if !self.killed {
            self.killed = true;
            self.state.lock().unwrap_or_else(|e| e.into_inner()).kills += 1;
        }
        Ok(())
    }
}
