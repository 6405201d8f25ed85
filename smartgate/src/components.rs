/// Components that together operate the access gate.
pub mod gate {
    /// Components that provide sensing capability.
    pub mod sensing {
        /// The ultrasonic ranging sensor with its read cache.
        pub mod distance_sensor;
    }
    /// Components that provide actuation capability.
    pub mod actuating {
        /// The servo that moves the physical gate.
        pub mod gate_servo;
    }
    /// Components that talk to companion devices over the network.
    pub mod remote {
        /// HTTP client for the companion camera module.
        pub mod camera_link;
    }
    /// Components that schedule the periodic work of the system.
    pub mod supervising {
        /// The cooperative main loop and the rig it drives.
        pub mod control_loop;
    }
    /// Components that expose the system to external callers.
    pub mod interface {
        /// Line delimited JSON command listener.
        pub mod api_listener;
    }
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::gate::actuating::gate_servo::*;
    pub use crate::components::gate::interface::api_listener::*;
    pub use crate::components::gate::remote::camera_link::*;
    pub use crate::components::gate::sensing::distance_sensor::*;
    pub use crate::components::gate::supervising::control_loop::*;
}
