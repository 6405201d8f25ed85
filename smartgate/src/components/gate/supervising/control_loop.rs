use crate::components::gate::actuating::gate_servo::GateServo;
use crate::components::gate::remote::camera_link::CameraLink;
use crate::components::gate::sensing::distance_sensor::DistanceSensor;
use crate::utils::clock::{Clock, MonotonicClock};
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::Path, sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

/// The full set of components the system operates on. Constructed once
/// at startup and shared behind one mutex, so the control loop and the
/// API listener can never mutate the same actuator or sensor cache at
/// the same time.
pub struct GateRig {
    /// The ranging sensor with its read cache.
    pub distance_sensor: DistanceSensor,
    /// The servo that moves the physical gate.
    pub gate_servo: GateServo,
    /// The HTTP client for the companion camera module.
    pub camera_link: CameraLink,
    /// Runtime toggle for capture on detection. Off by default; the
    /// automatic path caused request storms on the camera module when
    /// it was always on.
    auto_capture_enabled: bool,
}

impl GateRig {
    /// Group already constructed components into a rig.
    pub fn new(
        distance_sensor: DistanceSensor,
        gate_servo: GateServo,
        camera_link: CameraLink,
    ) -> Self {
        Self {
            distance_sensor,
            gate_servo,
            camera_link,
            auto_capture_enabled: false,
        }
    }

    /// Whether capture on detection is currently switched on.
    pub fn auto_capture_enabled(&self) -> bool {
        self.auto_capture_enabled
    }

    /// Flip the capture on detection toggle, returning the new state.
    pub fn toggle_auto_capture(&mut self) -> bool {
        self.auto_capture_enabled = !self.auto_capture_enabled;
        log::info!(
            "auto capture {}",
            if self.auto_capture_enabled { "enabled" } else { "disabled" }
        );
        self.auto_capture_enabled
    }
}

/// Configuration for the cooperative main loop.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
pub struct ControlLoopConfig {
    /// Fixed delay between loop iterations.
    #[serde(default = "ControlLoopConfig::default_tick_interval_ms")]
    tick_interval_ms: u64,
    /// Cadence of the status log line.
    #[serde(default = "ControlLoopConfig::default_status_interval_ms")]
    status_interval_ms: u64,
    /// Minimum spacing between automatic capture attempts while an
    /// object stays in front of the gate.
    #[serde(default = "ControlLoopConfig::default_auto_capture_interval_ms")]
    auto_capture_interval_ms: u64,
}

impl ControlLoopConfig {
    /// Create a loop config with the default cadences.
    pub fn new() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            status_interval_ms: Self::default_status_interval_ms(),
            auto_capture_interval_ms: Self::default_auto_capture_interval_ms(),
        }
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
                .try_deserialize::<ControlLoopConfig>()
                .expect("Failed to parse config file into struct")
        } else {
            panic!("Could not locate the config file {:?}", file);
        }
    }

    fn default_tick_interval_ms() -> u64 {
        150
    }

    fn default_status_interval_ms() -> u64 {
        20_000
    }

    fn default_auto_capture_interval_ms() -> u64 {
        5_000
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The cooperative main loop. Each iteration polls the sensor (which
/// rate limits itself), runs the capture on detection check, and writes
/// the periodic status line. Nothing in an iteration waits longer than
/// the explicit timeout of the peripheral involved.
pub struct ControlLoop {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    config: ControlLoopConfig,
    clock: Box<dyn Clock>,
    last_status_ms: Option<u64>,
    last_auto_capture_ms: Option<u64>,
}

impl ControlLoop {
    /// Create a loop by consuming a config.
    pub fn new(config: ControlLoopConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            config,
            clock: Box::new(MonotonicClock::new()),
            last_status_ms: None,
            last_auto_capture_ms: None,
        }
    }

    /// Create a loop by reading the config parameters from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Self {
        Self::new(ControlLoopConfig::from_file(filepath))
    }

    /// Replace the time source, used by tests to drive the cadences.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return the unique identifier of the loop.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Fixed delay between iterations.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.tick_interval_ms)
    }

    /// One loop iteration over the rig.
    pub async fn tick(&mut self, rig: &mut GateRig) {
        rig.distance_sensor.update();
        self.run_auto_capture(rig).await;
        self.report_status(rig);
    }

    /// Capture on detection. Only runs when the runtime toggle is on,
    /// and at most once per configured interval while an object stays
    /// in front of the gate.
    async fn run_auto_capture(&mut self, rig: &mut GateRig) {
        if !rig.auto_capture_enabled() || !rig.distance_sensor.object_detected() {
            return;
        }

        let now_ms = self.clock.now_ms();
        if let Some(last_ms) = self.last_auto_capture_ms {
            if now_ms.saturating_sub(last_ms) < self.config.auto_capture_interval_ms {
                return;
            }
        }
        self.last_auto_capture_ms = Some(now_ms);

        log::info!(
            "loop {}: object at {:.1} cm, requesting auto capture",
            self.uuid,
            rig.distance_sensor.last_distance()
        );
        let outcome = rig.camera_link.request_capture().await;
        log::debug!("loop {}: auto capture outcome {:?}", self.uuid, outcome);
    }

    /// Write the status line when its cadence is due.
    fn report_status(&mut self, rig: &GateRig) {
        let now_ms = self.clock.now_ms();
        if !self.status_due(now_ms) {
            return;
        }
        log::info!(
            "status - distance: {:.1} cm | gate: {} | auto capture: {}",
            rig.distance_sensor.last_distance(),
            if rig.gate_servo.is_open() { "OPEN" } else { "CLOSED" },
            if rig.auto_capture_enabled() { "ON" } else { "OFF" },
        );
    }

    fn status_due(&mut self, now_ms: u64) -> bool {
        let due = match self.last_status_ms {
            Some(last_ms) => now_ms.saturating_sub(last_ms) >= self.config.status_interval_ms,
            None => true,
        };
        if due {
            self.last_status_ms = Some(now_ms);
        }
        due
    }
}

/// Unit struct for running the loop as a task.
pub struct ControlLoopController;

impl ControlLoopController {
    /// Spawn the loop onto the runtime. Each iteration takes the rig
    /// mutex, runs one tick, and releases it before sleeping, so the
    /// API listener is never starved.
    ///
    /// * `control_loop`: the configured loop, consumed by the task.
    /// * `rig`: shared component rig.
    pub fn start(mut control_loop: ControlLoop, rig: Arc<Mutex<GateRig>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(control_loop.tick_interval());
            loop {
                ticker.tick().await;
                let mut guard = rig.lock().await;
                control_loop.tick(&mut guard).await;
                drop(guard);
            }
        })
    }
}

/// Paths to the component config files that make up one gate system.
/// This is what the controller binary consumes.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug)]
pub struct GateSystemConfig {
    /// Path to the sensor component config.
    pub distance_sensor_config_file: String,
    /// Path to the servo component config.
    pub gate_servo_config_file: String,
    /// Path to the camera link component config.
    pub camera_link_config_file: String,
    /// Path to the loop config.
    pub control_loop_config_file: String,
    /// Path to the API listener config.
    pub api_listener_config_file: String,
}

impl GateSystemConfig {
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
                .try_deserialize::<GateSystemConfig>()
                .expect("Failed to parse config file into struct")
        } else {
            panic!("Could not locate the config file {:?}", file);
        }
    }
}
