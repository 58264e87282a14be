//! Command-line front end for FIP: the `fip` master driver and the
//! `fip-module` demo module.

pub mod commands;
pub mod demo;
pub mod logging;
pub mod session;
