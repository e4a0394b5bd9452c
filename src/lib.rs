//! gmu - commit ordering and version garbage collection for a
//! vector-clock multiversion store
//!
//! Each node keeps its prepared transactions in a queue sorted by the
//! local component of their versions and applies them in that order once
//! every entry ahead has its final version. Three collectors prune what
//! no reader can still see.

pub mod cli;
pub mod cluster;
pub mod commit;
pub mod commit_log;
pub mod config;
pub mod container;
pub mod gc;
pub mod node;
pub mod observability;
pub mod transaction;
pub mod version;
