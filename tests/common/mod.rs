#![allow(dead_code)]

pub mod harness;
pub mod strategies;
pub mod stubs;

pub use harness::*;
pub use strategies::*;
pub use stubs::*;
