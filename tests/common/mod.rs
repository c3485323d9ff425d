#![allow(dead_code)]

pub mod counter;
pub mod observers;
pub mod strategies;

pub use counter::*;
pub use observers::*;
