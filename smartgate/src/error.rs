use thiserror::Error;

/// Faults the control system can encounter. None of them are treated as
/// fatal: sensor faults fall back to the last known good value, actuator
/// faults are rejected commands, and network faults are reported to the
/// caller exactly once with no automatic retry.
#[derive(Debug, Error)]
pub enum GateError {
    /// No echo pulse came back within the bounded wait. The reading is
    /// discarded and the last known good distance is reused.
    #[error("no echo received within {timeout_ms} ms")]
    SensorTimeout { timeout_ms: u64 },

    /// The echo produced a distance outside the measurable band of the
    /// ranging module, treated as a spurious reading.
    #[error("distance {value_cm:.1} cm outside the measurable range")]
    SensorOutOfRange { value_cm: f32 },

    /// A servo command outside the mechanical range of the actuator.
    /// The gate state is left untouched.
    #[error("servo angle {angle} outside the 0-180 degree range")]
    InvalidAngle { angle: i32 },

    /// The companion camera module could not be contacted at all.
    #[error("camera module unreachable: {0}")]
    RemoteUnreachable(String),

    /// The companion camera module answered with a non success status.
    #[error("camera module returned HTTP {0}")]
    RemoteError(u16),

    /// A GPIO or PWM level fault reported by the hardware layer.
    #[error("device fault: {0}")]
    Device(String),
}
