//! CLI subcommand implementations for the `scout` binary.

pub mod doctor;
pub mod scan_cmd;
