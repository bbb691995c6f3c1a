//! Test server container management.

pub mod lifecycle;
