//! CLI commands implementation

pub mod check;
pub mod init;
pub mod serve;
pub mod status;
pub mod sync;

pub use check::*;
pub use init::*;
pub use serve::*;
pub use status::*;
pub use sync::*;
