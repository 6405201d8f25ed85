use crate::error::GateError;
use rppal::gpio::{Gpio, InputPin, OutputPin};
use std::time::{Duration, Instant};

/// Length of the trigger pulse that starts a measurement, as per the
/// HC-SR04 data sheet.
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Settle time on the trigger line before the pulse is raised.
const TRIGGER_SETTLE: Duration = Duration::from_micros(2);

/// An ultrasonic ranging module that can time one echo pulse. The wait is
/// bounded by the caller supplied timeout on both edges, so a missing or
/// stuck echo line can never hold the control loop longer than the timeout.
pub trait RangingDevice: Send + Sync {
    /// Emit a trigger pulse and return the width of the echo pulse, or
    /// `None` when no echo came back inside `timeout`.
    fn measure_echo(&mut self, timeout: Duration) -> Option<Duration>;
}

/// HC-SR04 ranging module wired to two GPIO lines. The echo timing is a
/// busy wait because the pulse widths involved are far below what a thread
/// sleep can resolve; the bound on the wait keeps the block short.
pub struct HcSr04 {
    trigger: OutputPin,
    echo: InputPin,
}

impl HcSr04 {
    /// Claim the trigger and echo GPIO lines and park the trigger low.
    ///
    /// * `trigger_pin`: BCM number of the trigger line.
    /// * `echo_pin`: BCM number of the echo line.
    pub fn new(trigger_pin: u8, echo_pin: u8) -> Result<Self, GateError> {
        let gpio = Gpio::new().map_err(|e| GateError::Device(e.to_string()))?;
        let mut trigger = gpio
            .get(trigger_pin)
            .map_err(|e| GateError::Device(e.to_string()))?
            .into_output();
        let echo = gpio
            .get(echo_pin)
            .map_err(|e| GateError::Device(e.to_string()))?
            .into_input();
        trigger.set_low();
        Ok(Self { trigger, echo })
    }
}

impl RangingDevice for HcSr04 {
    fn measure_echo(&mut self, timeout: Duration) -> Option<Duration> {
        self.trigger.set_low();
        spin_wait(TRIGGER_SETTLE);
        self.trigger.set_high();
        spin_wait(TRIGGER_PULSE);
        self.trigger.set_low();

        let deadline = Instant::now() + timeout;

        // Wait for the rising edge of the echo pulse.
        while self.echo.is_low() {
            if Instant::now() >= deadline {
                return None;
            }
        }
        let rise = Instant::now();

        // Time the pulse until the falling edge.
        while self.echo.is_high() {
            if Instant::now() >= deadline {
                return None;
            }
        }
        Some(rise.elapsed())
    }
}

/// Microsecond scale wait. `thread::sleep` cannot hit these widths.
fn spin_wait(duration: Duration) {
    let end = Instant::now() + duration;
    while Instant::now() < end {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    #[test]
    /// Wiring check for a module on the default gate pins. An open bench
    /// with nothing in front of the module should still produce an echo
    /// from the far wall within the 30 ms data sheet maximum.
    fn test_echo_pulse_on_hardware() {
        let mut module = HcSr04::new(5, 18).expect("Failed to claim GPIO lines");
        let echo = module.measure_echo(Duration::from_millis(30));
        assert!(echo.is_some(), "No echo from the ranging module");
    }

    #[test]
    fn spin_wait_blocks_for_at_least_the_requested_time() {
        let start = Instant::now();
        spin_wait(Duration::from_micros(50));
        assert!(start.elapsed() >= Duration::from_micros(50));
    }
}
