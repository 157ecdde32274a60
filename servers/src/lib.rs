//! Shared plumbing for the pipeline binaries: settings resolution, shutdown
//! signalling, reading synthesis for the generator, and the dashboard's HTTP
//! surface.

pub mod pipeline;
pub mod web;
