//! Library half of `trustmesh-node`: the composition root and its
//! configuration types, split out of the binary so integration tests can
//! construct a `Node` directly instead of spawning a subprocess.

pub mod config;
pub mod node;
