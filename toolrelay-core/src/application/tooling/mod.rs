mod error;
mod interface;
mod process;

pub use error::TransportError;
pub use interface::{SessionConnector, ToolDescriptor, ToolSession};
pub use process::{StdioConnector, StdioSession};
