// ============================================================================
// src/cmd/mod.rs – command subsystem root
// ============================================================================
pub mod activate; // zbe activate
pub mod base; // core shell execution utilities (Cmd, OutputData)
pub mod create; // zbe create

// Re-export common types for convenience:
pub use base::Cmd;
