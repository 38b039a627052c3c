//! Data models exposed by the file management API.
//!
//! A [`file::File`] is a read-through projection of live store state; it is
//! rebuilt on every request and never cached.

pub mod file;
