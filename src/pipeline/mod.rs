//! Concrete pipeline tasks and the factory that wires them into a graph.
//!
//! Every variant here differs only in what its `is_done`/`execute` check and
//! do; the scheduler treats them uniformly through the task contract.

pub mod decrypt;
pub mod download;
pub mod extract;
pub mod factory;
pub mod images;
pub mod persist;

pub use decrypt::DecryptTask;
pub use download::{DownloadFlow, DownloadTask};
pub use extract::ExtractTask;
pub use factory::TaskFactory;
pub use images::CopyImageTask;
pub use persist::{SaveDetailTask, SaveVersionTask};
