//! retrace: incremental compilation lookup verification.
//!
//! Records every name lookup a compiler performs, renders the lookups back
//! into the compiled sources as inline `/*...*/` annotations and checks them
//! against the annotated fixture, step by step through an incremental build.

pub use retrace_core::annotate;
pub use retrace_core::buildlog;
pub use retrace_core::compiler;
pub use retrace_core::config;
pub use retrace_core::diff;
pub use retrace_core::error;
pub use retrace_core::fixture;
pub use retrace_core::intern;
pub use retrace_core::orchestrator;
pub use retrace_core::outputs;
pub use retrace_core::plan;
pub use retrace_core::recorder;
pub use retrace_core::text;
pub use retrace_core::types;
pub use retrace_core::verify;
