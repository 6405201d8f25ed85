/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on location, name etc.
pub mod hardware {
    /// Device interface for the gate servo.
    pub mod servo;
    /// Device interface for the ultrasonic ranging module.
    pub mod ultrasonic;
}
