//! Services module - filesystem-facing logic around the launcher core.
//!
//! # Components
//!
//! - [`library`]: discovers installed builds by reading the `.blinfo` record
//!   in every `<library>/<branch>/<build>/` folder, and writes those records
//!   back for freshly installed builds.
//!
//! The services have no dependency on the queue or any front end; tasks and
//! the CLI call into them.

pub mod library;

pub use library::{LibraryError, read_build_info, scan_library, write_build_info};
