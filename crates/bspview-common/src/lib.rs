#![allow(clippy::needless_range_loop, clippy::too_many_arguments, clippy::manual_range_contains)]

pub mod q_shared;
pub mod qfiles;
pub mod crc;
pub mod compression;
pub mod error;
