use crate::devices::hardware::servo::{ServoDevice, SoftPwmServo};
use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::Path, time::Duration};
use uuid::Uuid;

/// Logical position of the gate. This mirrors the last successfully
/// issued command, not physical ground truth; there is no position
/// feedback on the mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Open,
    Closed,
}

/// Configuration for the gate servo component.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
pub struct GateServoConfig {
    /// BCM number of the servo signal line.
    servo_pin: u8,
    /// Angle the gate is commanded to when opening.
    #[serde(default = "GateServoConfig::default_open_angle")]
    open_angle: u8,
    /// Angle the gate is commanded to when closing.
    #[serde(default = "GateServoConfig::default_closed_angle")]
    closed_angle: u8,
    /// Pause after each command, assumed long enough for the mechanism
    /// to finish moving before the call returns.
    #[serde(default = "GateServoConfig::default_settle_ms")]
    settle_ms: u64,
}

impl GateServoConfig {
    /// Create a servo config with the default gate angles.
    ///
    /// * `servo_pin`: BCM number of the signal line.
    pub fn new(servo_pin: u8) -> Self {
        Self {
            servo_pin,
            open_angle: Self::default_open_angle(),
            closed_angle: Self::default_closed_angle(),
            settle_ms: Self::default_settle_ms(),
        }
    }

    /// Override the two named gate angles.
    ///
    /// * `open_angle`: angle commanded by open.
    /// * `closed_angle`: angle commanded by close.
    pub fn with_angles(mut self, open_angle: u8, closed_angle: u8) -> Self {
        self.open_angle = open_angle;
        self.closed_angle = closed_angle;
        self
    }

    /// Override the mechanical settle pause, tests set this to zero.
    pub fn with_settle_ms(mut self, settle_ms: u64) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    /// Build the config by reading a file, this is a helper function.
    ///
    /// * `filepath`: path to config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Self {
        let file = Path::new(&filepath);
        if file.is_file() {
            let config_file = config::Config::builder()
                .add_source(config::File::new(
                    &file.to_string_lossy(),
                    config::FileFormat::Yaml,
                ))
                .build()
                .expect("Failed read config");

            config_file
                .try_deserialize::<GateServoConfig>()
                .expect("Failed to parse config file into struct")
        } else {
            panic!("Could not locate the config file {:?}", file);
        }
    }

    fn default_open_angle() -> u8 {
        0
    }

    fn default_closed_angle() -> u8 {
        95
    }

    fn default_settle_ms() -> u64 {
        500
    }
}

/// Gate servo component. Tracks the logical gate state and the last
/// commanded angle, and pauses after each command so that the physical
/// gate has (nominally) finished moving by the time a call returns.
pub struct GateServo {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    config: GateServoConfig,
    device: Box<dyn ServoDevice>,
    state: GateState,
    /// Angle of the last successfully issued command.
    current_angle: u8,
}

impl GateServo {
    /// Create a servo component around an already constructed device.
    /// The gate is assumed closed until [`GateServo::initialise`] has
    /// driven it there.
    ///
    /// * `config`: angles and settle timing.
    /// * `device`: the servo hardware, or a double in tests.
    pub fn new(config: GateServoConfig, device: Box<dyn ServoDevice>) -> Self {
        let current_angle = config.closed_angle;
        Self {
            uuid: Uuid::new_v4(),
            config,
            device,
            state: GateState::Closed,
            current_angle,
        }
    }

    /// Create a servo component claiming the GPIO line named in the
    /// config. Only works on the gate hardware itself.
    ///
    /// * `config`: angles, settle timing and pin parameters.
    pub fn from_config(config: GateServoConfig) -> Result<Self, GateError> {
        let device = SoftPwmServo::new(config.servo_pin)?;
        Ok(Self::new(config, Box::new(device)))
    }

    /// Return the unique identifier of the servo component.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Drive the gate to its closed angle so the logical state matches
    /// the mechanism on startup.
    pub async fn initialise(&mut self) -> Result<(), GateError> {
        self.close().await
    }

    /// Command the gate to its open angle and wait out the settle pause.
    pub async fn open(&mut self) -> Result<(), GateError> {
        self.device.write_angle(self.config.open_angle)?;
        self.state = GateState::Open;
        self.current_angle = self.config.open_angle;
        self.settle().await;
        log::info!(
            "gate {} OPENED (servo at {} degrees)",
            self.uuid,
            self.current_angle
        );
        Ok(())
    }

    /// Command the gate to its closed angle and wait out the settle pause.
    pub async fn close(&mut self) -> Result<(), GateError> {
        self.device.write_angle(self.config.closed_angle)?;
        self.state = GateState::Closed;
        self.current_angle = self.config.closed_angle;
        self.settle().await;
        log::info!(
            "gate {} CLOSED (servo at {} degrees)",
            self.uuid,
            self.current_angle
        );
        Ok(())
    }

    /// Command an arbitrary angle. The logical open or closed state is
    /// inferred from which side of the midpoint between the two named
    /// angles the command lands on; an approximation, the gate has no
    /// feedback to confirm it.
    ///
    /// * `angle`: target angle in degrees, must be within 0 to 180.
    pub async fn set_position(&mut self, angle: i32) -> Result<(), GateError> {
        if !(0..=180).contains(&angle) {
            return Err(GateError::InvalidAngle { angle });
        }
        let angle = angle as u8;

        self.device.write_angle(angle)?;
        self.state = self.infer_state(angle);
        self.current_angle = angle;
        self.settle().await;
        log::info!("gate {} servo position set to {} degrees", self.uuid, angle);
        Ok(())
    }

    /// Which named position a custom angle is closest to.
    fn infer_state(&self, angle: u8) -> GateState {
        let midpoint = (u16::from(self.config.open_angle) + u16::from(self.config.closed_angle)) / 2;
        let open_side = if self.config.open_angle >= self.config.closed_angle {
            u16::from(angle) > midpoint
        } else {
            u16::from(angle) < midpoint
        };
        if open_side {
            GateState::Open
        } else {
            GateState::Closed
        }
    }

    /// True when the last successful command left the gate open.
    pub fn is_open(&self) -> bool {
        self.state == GateState::Open
    }

    /// Logical gate state of the last successful command.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Angle of the last successful command.
    pub fn current_angle(&self) -> u8 {
        self.current_angle
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
    }
}
