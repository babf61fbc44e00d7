//! Debug shell core for flight-controller class boards on no-std embedded platforms.
//!
//! For a runnable host harness, see the `mock-mcu` crate in this workspace.
#![no_std]

extern crate alloc;

pub mod utils;
