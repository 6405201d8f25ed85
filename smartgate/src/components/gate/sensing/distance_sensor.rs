use crate::devices::hardware::ultrasonic::{HcSr04, RangingDevice};
use crate::error::GateError;
use crate::utils::clock::{Clock, MonotonicClock};
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::Path, time::Duration};
use uuid::Uuid;

/// Speed of sound scaled for the conversion used by the ranging module:
/// echo microseconds * 0.034 cm/us, halved for the out and back path.
const SOUND_CM_PER_US: f32 = 0.034;

/// Readings below this are inside the dead band of the module and are
/// treated as spurious.
const MIN_VALID_CM: f32 = 2.0;

/// Readings above this are beyond the rated range of the module and are
/// treated as spurious.
const MAX_VALID_CM: f32 = 400.0;

/// Sentinel reported while no valid reading has ever been captured.
pub const OUT_OF_RANGE_CM: f32 = 999.0;

/// One ranging attempt. When `valid` is false the value carries the last
/// known good distance (or [`OUT_OF_RANGE_CM`] when none exists yet) so a
/// caller can always act on `value_cm` directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceReading {
    /// Distance to the nearest reflecting object in centimetres.
    pub value_cm: f32,
    /// Component clock time the reading was taken.
    pub measured_at_ms: u64,
    /// False when the echo timed out or the value was filtered out.
    pub valid: bool,
}

/// Configuration for the ranging sensor component.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct DistanceSensorConfig {
    /// BCM number of the trigger line.
    trigger_pin: u8,
    /// BCM number of the echo line.
    echo_pin: u8,
    /// Bounded wait for the echo pulse. The short timeout trades maximum
    /// range for a loop that can never stall on a missing echo.
    #[serde(default = "DistanceSensorConfig::default_echo_timeout_ms")]
    echo_timeout_ms: u64,
    /// Minimum spacing between physical reads. The module needs settle
    /// time between pulses and each read blocks the caller.
    #[serde(default = "DistanceSensorConfig::default_min_read_interval_ms")]
    min_read_interval_ms: u64,
    /// Distance below which an object counts as approaching the gate.
    #[serde(default = "DistanceSensorConfig::default_detection_threshold_cm")]
    detection_threshold_cm: f32,
}

impl DistanceSensorConfig {
    /// Create a sensor config with the default timing parameters.
    ///
    /// * `trigger_pin`: BCM number of the trigger line.
    /// * `echo_pin`: BCM number of the echo line.
    pub fn new(trigger_pin: u8, echo_pin: u8) -> Self {
        Self {
            trigger_pin,
            echo_pin,
            echo_timeout_ms: Self::default_echo_timeout_ms(),
            min_read_interval_ms: Self::default_min_read_interval_ms(),
            detection_threshold_cm: Self::default_detection_threshold_cm(),
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
                .try_deserialize::<DistanceSensorConfig>()
                .expect("Failed to parse config file into struct")
        } else {
            panic!("Could not locate the config file {:?}", file);
        }
    }

    fn default_echo_timeout_ms() -> u64 {
        15
    }

    fn default_min_read_interval_ms() -> u64 {
        500
    }

    fn default_detection_threshold_cm() -> f32 {
        20.0
    }
}

/// Ranging sensor component. Owns the ranging device and a cache of the
/// last known good reading; all callers read the cache, only the rate
/// limited poll path touches the hardware.
pub struct DistanceSensor {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    config: DistanceSensorConfig,
    device: Box<dyn RangingDevice>,
    clock: Box<dyn Clock>,
    /// Last reading that passed the outlier filter.
    last_valid: Option<DistanceReading>,
    /// Time of the last physical read attempt, valid or not.
    last_poll_ms: Option<u64>,
}

impl DistanceSensor {
    /// Create a sensor component around an already constructed device.
    ///
    /// * `config`: timing and filtering parameters.
    /// * `device`: the ranging hardware, or a double in tests.
    pub fn new(config: DistanceSensorConfig, device: Box<dyn RangingDevice>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            config,
            device,
            clock: Box::new(MonotonicClock::new()),
            last_valid: None,
            last_poll_ms: None,
        }
    }

    /// Create a sensor component claiming the GPIO lines named in the
    /// config. Only works on the gate hardware itself.
    ///
    /// * `config`: timing, filtering and pin parameters.
    pub fn from_config(config: DistanceSensorConfig) -> Result<Self, GateError> {
        let device = HcSr04::new(config.trigger_pin, config.echo_pin)?;
        Ok(Self::new(config, Box::new(device)))
    }

    /// Replace the time source, used by tests to drive the read throttle.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return the unique identifier of the sensor.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Perform one physical ranging attempt and classify the result. A
    /// timed out or filtered reading comes back with `valid` false and the
    /// last known good value; the cache is never clobbered by a bad read.
    pub fn read_distance(&mut self) -> DistanceReading {
        let now_ms = self.clock.now_ms();
        self.last_poll_ms = Some(now_ms);

        let echo = self
            .device
            .measure_echo(Duration::from_millis(self.config.echo_timeout_ms));

        match self.classify(echo) {
            Ok(value_cm) => {
                let reading = DistanceReading {
                    value_cm,
                    measured_at_ms: now_ms,
                    valid: true,
                };
                self.last_valid = Some(reading);
                reading
            }
            Err(fault) => {
                log::debug!("sensor {}: {fault}, reusing last distance", self.uuid);
                DistanceReading {
                    value_cm: self.last_distance(),
                    measured_at_ms: now_ms,
                    valid: false,
                }
            }
        }
    }

    /// Turn an echo pulse into a distance, rejecting timeouts and values
    /// outside the measurable band.
    fn classify(&self, echo: Option<Duration>) -> Result<f32, GateError> {
        let echo = echo.ok_or(GateError::SensorTimeout {
            timeout_ms: self.config.echo_timeout_ms,
        })?;

        let value_cm = echo.as_micros() as f32 * SOUND_CM_PER_US / 2.0;
        if value_cm > MIN_VALID_CM && value_cm < MAX_VALID_CM {
            Ok(value_cm)
        } else {
            Err(GateError::SensorOutOfRange { value_cm })
        }
    }

    /// Last known good distance, or [`OUT_OF_RANGE_CM`] before the first
    /// valid reading.
    pub fn last_distance(&self) -> f32 {
        self.last_valid
            .map(|reading| reading.value_cm)
            .unwrap_or(OUT_OF_RANGE_CM)
    }

    /// Last reading that passed the filter, with its capture time.
    pub fn last_reading(&self) -> Option<DistanceReading> {
        self.last_valid
    }

    /// True when the last known good distance puts an object inside
    /// `threshold_cm`. Pure over the cache, never touches the hardware.
    pub fn is_object_detected(&self, threshold_cm: f32) -> bool {
        match self.last_valid {
            Some(reading) => reading.value_cm > 0.0 && reading.value_cm < threshold_cm,
            None => false,
        }
    }

    /// Detection verdict at the configured threshold.
    pub fn object_detected(&self) -> bool {
        self.is_object_detected(self.config.detection_threshold_cm)
    }

    /// Configured detection threshold in centimetres.
    pub fn detection_threshold_cm(&self) -> f32 {
        self.config.detection_threshold_cm
    }

    /// Rate limited poll. Performs a physical read only when the minimum
    /// interval has passed since the last attempt, otherwise a no-op, so
    /// the blocking pulse timing cannot starve the loop that calls this
    /// every tick.
    pub fn update(&mut self) {
        let now_ms = self.clock.now_ms();
        let due = match self.last_poll_ms {
            Some(last_ms) => now_ms.saturating_sub(last_ms) >= self.config.min_read_interval_ms,
            None => true,
        };
        if due {
            self.read_distance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_file_path;
    use crate::utils::clock::ManualClock;
    use rstest::rstest;
    use serial_test::serial;
    use std::{
        collections::VecDeque,
        fs::OpenOptions,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    /// Ranging double that replays a queue of echo results and counts how
    /// often the hardware would have been touched.
    struct ScriptedEcho {
        echoes: VecDeque<Option<Duration>>,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedEcho {
        fn new(echoes: Vec<Option<Duration>>) -> (Self, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    echoes: echoes.into(),
                    reads: reads.clone(),
                },
                reads,
            )
        }
    }

    impl RangingDevice for ScriptedEcho {
        fn measure_echo(&mut self, _timeout: Duration) -> Option<Duration> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.echoes.pop_front().flatten()
        }
    }

    /// Echo pulse width that converts back to roughly `cm` centimetres.
    fn echo_for_cm(cm: f32) -> Option<Duration> {
        Some(Duration::from_micros((cm * 2.0 / SOUND_CM_PER_US) as u64))
    }

    fn sensor_with(echoes: Vec<Option<Duration>>) -> (DistanceSensor, ManualClock) {
        let (device, _) = ScriptedEcho::new(echoes);
        let clock = ManualClock::new();
        let sensor = DistanceSensor::new(DistanceSensorConfig::new(5, 18), Box::new(device))
            .with_clock(Box::new(clock.clone()));
        (sensor, clock)
    }

    #[test]
    fn test_timeout_before_any_valid_reading_reports_sentinel() {
        let (mut sensor, _clock) = sensor_with(vec![None]);

        let reading = sensor.read_distance();

        assert!(!reading.valid);
        assert_eq!(reading.value_cm, OUT_OF_RANGE_CM);
        assert_eq!(sensor.last_distance(), OUT_OF_RANGE_CM);
    }

    #[test]
    fn test_valid_reading_is_cached() {
        let (mut sensor, clock) = sensor_with(vec![echo_for_cm(50.0)]);
        clock.set(42);

        let reading = sensor.read_distance();

        assert!(reading.valid);
        assert!((reading.value_cm - 50.0).abs() < 0.1);
        assert_eq!(reading.measured_at_ms, 42);
        assert!((sensor.last_distance() - 50.0).abs() < 0.1);
    }

    #[test]
    /// Five consecutive timeouts after a valid 50 cm reading must leave
    /// the cached distance untouched.
    fn test_timeouts_fall_back_to_last_known_good() {
        let (mut sensor, _clock) =
            sensor_with(vec![echo_for_cm(50.0), None, None, None, None, None]);

        assert!(sensor.read_distance().valid);
        for _ in 0..5 {
            let reading = sensor.read_distance();
            assert!(!reading.valid);
            assert!((reading.value_cm - 50.0).abs() < 0.1);
        }
        assert!((sensor.last_distance() - 50.0).abs() < 0.1);
    }

    #[rstest]
    #[case(500.0)]
    #[case(1.0)]
    #[case(0.0)]
    fn test_out_of_band_values_are_discarded(#[case] raw_cm: f32) {
        let (mut sensor, _clock) = sensor_with(vec![echo_for_cm(50.0), echo_for_cm(raw_cm)]);

        sensor.read_distance();
        let before = sensor.last_distance();
        let reading = sensor.read_distance();

        assert!(!reading.valid);
        assert_eq!(sensor.last_distance(), before);
    }

    #[rstest]
    #[case(None, 20.0, false)]
    #[case(echo_for_cm(50.0), 60.0, true)]
    #[case(echo_for_cm(50.0), 20.0, false)]
    #[case(echo_for_cm(50.0), 0.0, false)]
    fn test_object_detection_predicate(
        #[case] echo: Option<Duration>,
        #[case] threshold_cm: f32,
        #[case] expected: bool,
    ) {
        let (mut sensor, _clock) = sensor_with(vec![echo]);
        sensor.read_distance();

        assert_eq!(sensor.is_object_detected(threshold_cm), expected);
    }

    #[test]
    /// The poll wrapper must not touch the hardware faster than the
    /// configured minimum interval, no matter how often it is called.
    fn test_update_rate_limits_physical_reads() {
        let (device, reads) = ScriptedEcho::new(vec![echo_for_cm(30.0); 10]);
        let clock = ManualClock::new();
        let mut sensor = DistanceSensor::new(DistanceSensorConfig::new(5, 18), Box::new(device))
            .with_clock(Box::new(clock.clone()));

        sensor.update();
        clock.advance(100);
        sensor.update();
        clock.advance(100);
        sensor.update();
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        clock.advance(300);
        sensor.update();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[serial]
    fn test_write_component_config_to_file() {
        let config = DistanceSensorConfig::new(5, 18);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(test_file_path!(
                "/config/components/gate/sensing/distance_sensor.yaml"
            ))
            .expect("Failed to open file");
        serde_yaml::to_writer(file, &config).expect("Failed to write yaml");

        let read_config = DistanceSensorConfig::from_file(test_file_path!(
            "/config/components/gate/sensing/distance_sensor.yaml"
        ));
        assert_eq!(
            config, read_config,
            "Failed to read write sensor config"
        );
    }
}
