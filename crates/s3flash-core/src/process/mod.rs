//! Flash process layer.

pub mod command;
pub mod mock;
pub mod system;
pub mod traits;

pub use command::{BaudRate, ConnectionParams, InvalidBaudRate, ToolConfig};
pub use mock::{MockLauncher, MockStep};
pub use system::SystemLauncher;
pub use traits::{FlashProcess, OutputLine, ProcessError, ProcessLauncher};
