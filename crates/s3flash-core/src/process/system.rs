//! Flash process backed by a real child process.

use std::io::{self, BufRead, BufReader, PipeReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::traits::{FlashProcess, OutputLine, ProcessError, ProcessLauncher};

/// Longest run of bytes forwarded as one line when the tool never ends it.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Launches the configured program with stdout and stderr sharing one pipe.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    program: String,
}

impl SystemLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn launch_error(&self, e: io::Error) -> ProcessError {
        ProcessError::Launch {
            program: self.program.clone(),
            message: e.to_string(),
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    #[instrument(skip(self, args), fields(program = %self.program))]
    fn launch(&self, args: &[String]) -> Result<Box<dyn FlashProcess>, ProcessError> {
        debug!(args = ?args, "Launching flash tool");

        // One pipe for both streams keeps lines in the order they were written.
        let (output, writer) = io::pipe().map_err(|e| self.launch_error(e))?;
        let err_writer = writer.try_clone().map_err(|e| self.launch_error(e))?;

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(err_writer);
        let spawned = command.spawn();
        // The command holds the parent's write ends; the stream only closes
        // once they are gone.
        drop(command);
        let child = spawned.map_err(|e| self.launch_error(e))?;

        info!(pid = child.id(), "Flash tool started");

        let (tx, rx) = mpsc::channel();
        let reader = spawn_reader(output, tx);

        Ok(Box::new(SystemProcess {
            child,
            lines: rx,
            reader: Some(reader),
            reaped: false,
        }))
    }
}

/// Pump the merged output into the line channel.
///
/// Both `\n` and `\r` end a line since the tool redraws progress in place.
fn spawn_reader(pipe: PipeReader, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut pending = Vec::new();
        loop {
            let buf = match reader.fill_buf() {
                Ok([]) => break,
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Output read failed");
                    break;
                }
            };
            let len = buf.len();
            for &byte in buf {
                if byte == b'\n' || byte == b'\r' {
                    if !flush_line(&tx, &mut pending) {
                        return;
                    }
                } else {
                    if pending.len() >= MAX_LINE_BYTES && !flush_line(&tx, &mut pending) {
                        return;
                    }
                    pending.push(byte);
                }
            }
            reader.consume(len);
        }
        flush_line(&tx, &mut pending);
    })
}

/// Send the buffered bytes as one trimmed line. False once the receiver is
/// gone.
fn flush_line(tx: &Sender<String>, pending: &mut Vec<u8>) -> bool {
    let line = String::from_utf8_lossy(pending).trim().to_string();
    pending.clear();
    line.is_empty() || tx.send(line).is_ok()
}

pub struct SystemProcess {
    child: Child,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    reaped: bool,
}

impl SystemProcess {
    fn reap(&mut self, status: ExitStatus) -> i32 {
        self.reaped = true;
        // A reader still blocked here means a grandchild kept the pipe
        // open; it exits on its own once that closes.
        if let Some(reader) = self.reader.take_if(|r| r.is_finished()) {
            let _ = reader.join();
        }
        let code = status.code().unwrap_or(-1);
        debug!(exit_code = code, "Flash tool exited");
        code
    }
}

impl FlashProcess for SystemProcess {
    fn read_line(&mut self, timeout: Duration) -> OutputLine {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => OutputLine::Line(line),
            Err(RecvTimeoutError::Timeout) => OutputLine::Pending,
            Err(RecvTimeoutError::Disconnected) => OutputLine::Closed,
        }
    }

    fn wait(&mut self) -> Result<i32, ProcessError> {
        let status = self
            .child
            .wait()
            .map_err(|e| ProcessError::Wait(e.to_string()))?;
        Ok(self.reap(status))
    }

    fn try_wait(&mut self) -> Result<Option<i32>, ProcessError> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| ProcessError::Wait(e.to_string()))?;
        Ok(status.map(|s| self.reap(s)))
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        match self.child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => {
                warn!(pid = self.child.id(), "Killing flash tool");
                self.child
                    .kill()
                    .map_err(|e| ProcessError::Kill(e.to_string()))
            }
        }
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.kill();
            let _ = self.child.wait();
        }
    }
}
