//! Subcommands of the `emlctl` binary.

pub mod cmd_parse;
pub mod cmd_roundtrip;
pub mod cmd_scales;
pub mod cmd_set;
pub mod cmd_validate;
pub mod common;
