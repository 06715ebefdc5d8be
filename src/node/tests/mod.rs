//! Unit tests for node sessions, driven through a scripted transport and a
//! fake clock.

mod bundles;
mod exec;
mod files;
