//! The proxy core: per-device Bridge, protocol framing, unit-ID remapping,
//! the client-facing session loop, and the upstream connection.

pub mod bridge;
pub mod protocol;
pub mod remap;
pub mod session;
pub mod upstream;
