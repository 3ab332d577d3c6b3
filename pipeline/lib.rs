#![deny(unused_imports)]

pub mod data;
pub mod features;
pub mod linalg;
pub mod model;
pub mod output;
pub mod pipeline;
