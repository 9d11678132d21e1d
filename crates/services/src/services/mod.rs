pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod local_mirror;
pub mod notification;
pub mod postgrest;
pub mod remote_store;
pub mod samples;
