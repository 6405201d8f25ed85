/// Standardise how messages are sent into and out of
/// the current control system. Provide test suite to
/// ensure interfaces are respected.
pub mod control {
    /// Gate commands come from external callers over the
    /// API listener. Each command maps to one operation
    /// on the rig.
    pub mod gate;
}

/// Reports generated by the system for external callers
/// and the periodic status log line.
pub mod status {
    /// Serialisable report payloads.
    pub mod report;
}
