//! Agent Executor: performs FS operations and child-process exec
//! inside the local user environment. All paths are resolved against the
//! host's real filesystem; containment checks live in `op15-permission`,
//! not here.

pub mod exec;
pub mod fs_ops;

pub use exec::{run as exec_run, ExecOutcome};
pub use fs_ops::{delete, list, mv, read, write, DirEntry, EntryKind};
