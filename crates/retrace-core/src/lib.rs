//! Core engine for retrace.
//!
//! This crate provides the incremental lookup-tracking harness:
//! - Lookup recording protocol for compiler front ends
//! - String interning for recorded names and scopes
//! - Source to output artifact tracking across build steps
//! - Annotation lexing, rendering and verification against expected sources
//! - Compiler invocation boundary (trait plus external process adapter)
//! - Modification plans, fixture preparation and the step orchestrator
//! - Build log rendering, configuration and error types

pub mod annotate;
pub mod buildlog;
pub mod compiler;
pub mod config;
pub mod diff;
pub mod error;
pub mod fixture;
pub mod intern;
pub mod orchestrator;
pub mod outputs;
pub mod plan;
pub mod recorder;
pub mod text;
pub mod types;
pub mod verify;
