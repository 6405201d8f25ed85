use serde::Deserialize;

/// Command sent by an external caller over the API listener. One JSON
/// document per line, tagged by the `command` field.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GateCommand {
    /// Full system status snapshot.
    Status,
    /// Force a physical ranging attempt and report the verdict.
    Distance,
    /// Drive the gate to its open angle.
    OpenGate,
    /// Drive the gate to its closed angle.
    CloseGate,
    /// Drive the servo to an arbitrary angle.
    SetPosition {
        /// Target angle in degrees, valid within 0 to 180.
        angle: i32,
    },
    /// Ask the camera module to capture a photo.
    Capture,
    /// Fetch the status document of the camera module.
    RemoteStatus,
    /// Point the camera link at a different host.
    SetRemoteHost {
        /// Host (and optional port) of the camera module.
        host: String,
    },
    /// Flip the automatic capture on detection behaviour.
    ToggleAutoCapture,
}

#[cfg(test)]
mod tests {

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"command": "status"}"#)]
    #[case(r#"{"command": "distance"}"#)]
    #[case(r#"{"command": "open_gate"}"#)]
    #[case(r#"{"command": "close_gate"}"#)]
    #[case(
        r#"{"command": "set_position",
            "angle": 45}"#
    )]
    #[case(r#"{"command": "capture"}"#)]
    #[case(r#"{"command": "remote_status"}"#)]
    #[case(
        r#"{"command": "set_remote_host",
            "host": "10.244.250.144"}"#
    )]
    #[case(r#"{"command": "toggle_auto_capture"}"#)]
    fn test_parse_gate_command(#[case] raw_string: &str) {
        let _parsed: GateCommand = serde_json::from_str(raw_string).unwrap();
    }

    #[rstest]
    #[case((
        r#"{"command": "set_position", "angle": 95}"#,
        GateCommand::SetPosition { angle: 95 }
    ))]
    #[case((
        r#"{"command": "set_remote_host", "host": "192.168.4.1:8080"}"#,
        GateCommand::SetRemoteHost { host: String::from("192.168.4.1:8080") }
    ))]
    #[case((r#"{"command": "open_gate"}"#, GateCommand::OpenGate))]
    fn test_parse_and_compare_gate_command(#[case] args: (&str, GateCommand)) {
        let parsed: GateCommand = serde_json::from_str(args.0).unwrap();

        assert_eq!(parsed, args.1, "Failed to parse command correctly");
    }

    #[rstest]
    #[case(r#"{"command": "self_destruct"}"#)]
    #[case(r#"{"command": "set_position"}"#)]
    #[case(r#"{"angle": 45}"#)]
    #[case("not json at all")]
    fn test_reject_malformed_commands(#[case] raw_string: &str) {
        assert!(serde_json::from_str::<GateCommand>(raw_string).is_err());
    }
}
