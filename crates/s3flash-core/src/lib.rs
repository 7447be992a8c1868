//! s3flash-core: flash orchestration for ESP32-S3 boards.
//!
//! The bootloader protocol itself is left to an external tool (esptool);
//! this crate picks the serial port, launches the tool for a multi-image
//! write, turns its streamed output into monotonic progress and exposes the
//! whole attempt as a cancellable, observable operation.
//!
//! # Architecture
//!
//! - **Device**: serial port enumeration and target guessing
//! - **Plan**: the ordered (address, binary) pairs to write
//! - **Process**: tool arguments and child process abstraction (system, mock)
//! - **Progress**: line classification rules and the progress tracker
//! - **Events**: Observer pattern for UI decoupling
//! - **Orchestrator**: worker thread, busy guard and cancellation
//! - **Config**: TOML persisted settings
//!
//! # Example
//!
//! ```no_run
//! use s3flash_core::{
//!     BaudRate, ConnectionParams, DeviceCatalog, FlashEvent, FlashOrchestrator, ImagePlan,
//!     ToolConfig,
//! };
//!
//! let catalog = DeviceCatalog::new();
//! let devices = catalog.list();
//! let port = catalog.select(&devices).expect("no serial device");
//!
//! let plan = ImagePlan::standard("build", 0x0);
//! let orchestrator = FlashOrchestrator::new(ToolConfig::default());
//! let handle = orchestrator
//!     .flash(ConnectionParams::new(&port.identifier, BaudRate::B921600), plan)
//!     .expect("busy");
//!
//! for event in handle.events() {
//!     if let FlashEvent::Progress(p) = &event {
//!         println!("{:3}% {}", p.percent, p.message);
//!     }
//!     if let FlashEvent::Finished(result) = event {
//!         result.expect("flash failed");
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod device;
pub mod events;
pub mod orchestrator;
pub mod plan;
pub mod process;
pub mod progress;

// Re-exports for convenience
pub use config::{ConfigError, FlasherConfig};
pub use device::{DEFAULT_KEYWORDS, DeviceCatalog, SerialDevice};
pub use events::{
    ChannelObserver, FlashEvent, FlashObserver, FlashPhase, LogLevel, NullObserver, ProgressEvent,
    TracingObserver,
};
pub use orchestrator::{
    CancelToken, FlashError, FlashHandle, FlashOrchestrator, FlashResult, OrchestratorOptions,
};
pub use plan::{EmptyPlan, ImageEntry, ImagePlan, MissingFiles};
pub use process::{
    BaudRate, ConnectionParams, FlashProcess, MockLauncher, OutputLine, ProcessError,
    ProcessLauncher, SystemLauncher, ToolConfig,
};
pub use progress::{ProgressTracker, classify};
