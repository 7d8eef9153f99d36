//! Device plumbing: serial transports and frame sources.
//!
//! Nothing outside this module and the two controllers that own them
//! ([`IlluminationController`](crate::illumination::IlluminationController) and
//! [`FrameFeed`](crate::feed::FrameFeed)) touches a device handle.

pub mod directory;
pub mod mock;
pub mod serial;

pub use directory::DirectorySource;
pub use mock::{MockFrameSource, MockOpener, MockWire, SyntheticSource};
pub use serial::{available_ports, SerialportOpener};
