/// Monotonic time sources used by the rate limited components.
/// Injected as a trait object so tests can drive time by hand.
pub mod clock;
/// Macros to check test resources exist at compile time.
pub mod tests;
