// ABOUTME: Library root for berth - container runtime client for Docker and Podman.
// ABOUTME: The doctor binary is in main.rs.

pub mod config;
pub mod error;
pub mod runtime;
pub mod types;
