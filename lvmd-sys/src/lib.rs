// SPDX-License-Identifier: GPL-3.0-only

//! Low-level LVM operations for lvmd
//!
//! This crate talks to the `lvm` tool family:
//! - Spawning `lvm <subcommand>` behind a configurable prefix
//!   (e.g. an `nsenter` wrapper when running in a container)
//! - Decoding the JSON reports of `vgs`, `lvs` and `fullreport`
//! - Mutating logical volumes (`lvcreate`, `lvresize`, `lvrename`,
//!   `lvchange`, `lvremove`)
//!
//! Everything here blocks on child processes; async callers should move the
//! calls onto a blocking thread.

pub mod command;
pub mod error;
pub mod lvm;
pub mod report;

pub use command::{LvmCommand, LvmStream};
pub use error::{CommandError, Result, SysError};
pub use lvm::{CreateVolume, LvmBackend, LvmTool};
