#![allow(dead_code)]

pub mod gate;
pub mod ops;
pub mod rig;
