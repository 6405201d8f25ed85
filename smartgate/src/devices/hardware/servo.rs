use crate::error::GateError;
use rppal::gpio::{Gpio, OutputPin};
use std::time::Duration;

/// Standard 50 Hz servo frame.
const PWM_PERIOD: Duration = Duration::from_millis(20);

/// Pulse width at 0 degrees.
const MIN_PULSE_US: u64 = 500;

/// Pulse width at 180 degrees.
const MAX_PULSE_US: u64 = 2400;

/// A positional actuator that can be commanded to an absolute angle.
/// Angle validation happens in the component above; a device receives
/// angles already clamped to its mechanical range.
pub trait ServoDevice: Send + Sync {
    /// Hold the output shaft at `angle` degrees.
    fn write_angle(&mut self, angle: u8) -> Result<(), GateError>;
}

/// Hobby servo driven with software PWM on a GPIO line.
pub struct SoftPwmServo {
    pin: OutputPin,
}

impl SoftPwmServo {
    /// Claim the GPIO line for the servo signal wire.
    ///
    /// * `servo_pin`: BCM number of the signal line.
    pub fn new(servo_pin: u8) -> Result<Self, GateError> {
        let gpio = Gpio::new().map_err(|e| GateError::Device(e.to_string()))?;
        let pin = gpio
            .get(servo_pin)
            .map_err(|e| GateError::Device(e.to_string()))?
            .into_output();
        Ok(Self { pin })
    }
}

impl ServoDevice for SoftPwmServo {
    fn write_angle(&mut self, angle: u8) -> Result<(), GateError> {
        self.pin
            .set_pwm(PWM_PERIOD, pulse_width_for(angle))
            .map_err(|e| GateError::Device(e.to_string()))
    }
}

/// Map an angle onto the pulse band of the servo.
pub fn pulse_width_for(angle: u8) -> Duration {
    let angle = u64::from(angle.min(180));
    Duration::from_micros(MIN_PULSE_US + angle * (MAX_PULSE_US - MIN_PULSE_US) / 180)
}
