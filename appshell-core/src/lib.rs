//! Platform-neutral services behind the Appshell bridge: error codes, the
//! native menu registry, file system operations, the Node helper supervisor
//! and launch helpers.

pub mod error;
pub mod fs;
pub mod launch;
pub mod menu;
pub mod node;
pub mod util;

pub use error::ErrorCode;
