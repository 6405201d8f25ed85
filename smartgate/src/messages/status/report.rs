use crate::components::gate::actuating::gate_servo::GateState;
use crate::components::gate::remote::camera_link::CaptureOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of the whole system, answered to the `status` command and
/// written to the periodic status log line.
#[derive(Serialize, Debug)]
pub struct SystemStatus {
    /// Last known good distance in centimetres.
    pub distance_cm: f32,
    /// Detection verdict at the configured threshold.
    pub object_detected: bool,
    /// Logical gate state of the last successful command.
    pub gate: GateState,
    /// Angle of the last successful servo command.
    pub gate_angle: u8,
    /// Whether automatic capture on detection is switched on.
    pub auto_capture: bool,
    /// Host of the companion camera module.
    pub remote_host: String,
    /// Whether the camera module answered the reachability probe.
    pub remote_reachable: bool,
    /// Wall clock time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Answer to the `distance` command, carrying a forced reading.
#[derive(Serialize, Debug)]
pub struct DistanceReport {
    /// Distance reported by the forced ranging attempt.
    pub distance_cm: f32,
    /// False when the attempt timed out or was filtered, in which case
    /// `distance_cm` carries the last known good value.
    pub valid: bool,
    /// Detection verdict at the configured threshold.
    pub detected: bool,
    /// The threshold the verdict was taken against.
    pub threshold_cm: f32,
}

/// Answer to the gate movement commands.
#[derive(Serialize, Debug)]
pub struct GateReport {
    pub status: ReportStatus,
    /// Logical gate state after the command.
    pub gate: GateState,
    /// Servo angle after the command.
    pub angle: u8,
}

/// Answer to the `capture` command.
#[derive(Serialize, Debug)]
pub struct CaptureReport {
    pub status: ReportStatus,
    /// What happened to the request, in wire friendly words.
    pub outcome: &'static str,
    /// HTTP status from the camera module when it answered with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl CaptureReport {
    /// Fold a capture outcome into a report. Throttled requests are soft
    /// rejections, not errors.
    pub fn from_outcome(outcome: CaptureOutcome) -> Self {
        match outcome {
            CaptureOutcome::Accepted => Self {
                status: ReportStatus::Success,
                outcome: "accepted",
                code: None,
            },
            CaptureOutcome::Throttled => Self {
                status: ReportStatus::Success,
                outcome: "throttled",
                code: None,
            },
            CaptureOutcome::Failed { code } => Self {
                status: ReportStatus::Error,
                outcome: "failed",
                code,
            },
        }
    }
}

/// Answer to any command the system refused or could not parse.
#[derive(Serialize, Debug)]
pub struct CommandError {
    pub status: ReportStatus,
    pub message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            message: message.into(),
        }
    }
}

/// Success or error marker shared by all reports.
#[derive(Serialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Error,
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_capture_report_keeps_throttle_distinct_from_failure() {
        let throttled = CaptureReport::from_outcome(CaptureOutcome::Throttled);
        assert_eq!(throttled.status, ReportStatus::Success);
        assert_eq!(throttled.outcome, "throttled");

        let failed = CaptureReport::from_outcome(CaptureOutcome::Failed { code: Some(502) });
        assert_eq!(failed.status, ReportStatus::Error);
        assert_eq!(failed.code, Some(502));
    }

    #[test]
    fn test_capture_report_serialises_without_null_code() {
        let report = CaptureReport::from_outcome(CaptureOutcome::Accepted);
        let raw = serde_json::to_value(&report).unwrap();

        assert_eq!(raw["status"], "success");
        assert_eq!(raw["outcome"], "accepted");
        assert!(raw.get("code").is_none());
    }

    #[test]
    fn test_gate_state_serialises_in_snake_case() {
        let report = GateReport {
            status: ReportStatus::Success,
            gate: GateState::Open,
            angle: 0,
        };
        let raw = serde_json::to_value(&report).unwrap();

        assert_eq!(raw["gate"], "open");
    }
}
