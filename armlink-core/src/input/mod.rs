// File: src/input/mod.rs

pub mod json_lines;

pub use json_lines::{JsonLinesSampler, SampleMode};
