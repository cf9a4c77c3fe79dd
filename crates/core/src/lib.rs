#![deny(warnings)]

pub mod config;
pub mod narration;
pub mod pipeline;
pub mod tts;
