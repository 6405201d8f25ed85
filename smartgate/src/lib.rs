/**
The smartgate control system runs an access gate: an ultrasonic ranging
sensor watches for approaching objects, a servo drives the physical gate
between its open and closed positions, and a companion camera module is
asked for photos over its small REST surface. Using a common component and
device pattern, functionality is separated out, making iterations and code
management easier as the project progresses; rather than managing a singular
and highly coupled monolithic binary. Every hardware unit sits behind a
trait so components can be exercised on a host machine without the gate
hardware attached.
*/

/// Components in the system are created by grouping together
/// devices into a logical unit that performs some function
/// for the overall control system.
pub mod components;
/// Devices that are an atomic unit, and can be composed
/// with other devices into components to perform some function.
pub mod devices;
/// Error taxonomy for the control system. Nothing in here is
/// fatal; every fault is either recovered locally or reported
/// back to the caller that requested the operation.
pub mod error;
/// Message structure for communication into and out of the
/// control system, such as the command protocol spoken by
/// the API listener.
pub mod messages;
/// Development utilities for working with time sources and
/// configuration files in tests.
pub mod utils;
