use crate::components::gate::supervising::control_loop::GateRig;
use crate::messages::control::gate::GateCommand;
use crate::messages::status::report::{
    CaptureReport, CommandError, DistanceReport, GateReport, ReportStatus, SystemStatus,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{ffi::OsStr, path::Path, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use uuid::Uuid;

/// Configuration for the API listener component.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug)]
pub struct ApiListenerConfig {
    /// Port the listener binds on all interfaces.
    port: i32,
}

impl ApiListenerConfig {
    /// Create a listener config.
    ///
    /// * `port`: TCP port to listen on.
    pub fn new(port: i32) -> Self {
        Self { port }
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
                .try_deserialize::<ApiListenerConfig>()
                .expect("Failed to parse config file into struct")
        } else {
            panic!("Could not locate the config file {:?}", file);
        }
    }
}

/// Line delimited JSON command listener. Each line is one
/// [`GateCommand`], each reply one JSON document. Commands take the rig
/// mutex for their duration, so every mutation is serialized with the
/// control loop.
pub struct ApiListener {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    config: ApiListenerConfig,
}

impl ApiListener {
    /// Create a listener by consuming a config.
    pub fn new(config: ApiListenerConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            config,
        }
    }

    /// Create a listener by reading the config parameters from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Self {
        Self::new(ApiListenerConfig::from_file(filepath))
    }

    /// Return the unique identifier of the listener.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Unit struct for running the listener as the foreground task.
pub struct ApiListenerController;

impl ApiListenerController {
    /// Bind the port and serve connections until the process ends.
    ///
    /// * `listener`: the configured listener, consumed here.
    /// * `rig`: shared component rig.
    pub async fn start(listener: ApiListener, rig: Arc<Mutex<GateRig>>) {
        let socket = TcpListener::bind(format!("0.0.0.0:{}", listener.config.port))
            .await
            .expect("Failed to bind port");
        log::info!(
            "api listener {} serving on port {}",
            listener.uuid,
            listener.config.port
        );

        loop {
            if let Ok((connection, peer)) = socket.accept().await {
                log::debug!("api listener {}: connection from {peer}", listener.uuid);
                let connection_rig = rig.clone();
                tokio::spawn(async move {
                    handle_connection(connection, connection_rig).await;
                });
            }
        }
    }
}

/// Handle one connection, one JSON command per line, until the peer
/// hangs up. A malformed line gets an error reply and the connection
/// stays open.
///
/// * `socket`: accepted TCP connection.
/// * `rig`: shared component rig.
async fn handle_connection(mut socket: TcpStream, rig: Arc<Mutex<GateRig>>) {
    let (read_stream, mut write_stream) = socket.split();
    let mut read_stream = BufReader::new(read_stream);
    let mut data = Vec::new();

    loop {
        data.clear();
        let bytes_read = match read_stream.read_until(b'\n', &mut data).await {
            Ok(bytes_read) => bytes_read,
            Err(e) => {
                log::warn!("connection read failed {e}");
                break;
            }
        };
        if bytes_read == 0 {
            break;
        }
        if data.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let reply = match serde_json::from_slice::<GateCommand>(&data) {
            Ok(command) => execute_command(command, &rig).await,
            Err(e) => {
                log::warn!("received a malformed request {e:?}, data: {:?}", &data);
                json!(CommandError::new(format!("malformed command: {e}")))
            }
        };

        let mut line = reply.to_string();
        line.push('\n');
        if write_stream.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Run one command against the rig and build its reply document. The
/// mutex guard is held for the duration of the command, which keeps the
/// serialization contract with the control loop.
///
/// * `command`: parsed command from the wire.
/// * `rig`: shared component rig.
pub async fn execute_command(command: GateCommand, rig: &Mutex<GateRig>) -> serde_json::Value {
    let mut guard = rig.lock().await;

    match command {
        GateCommand::Status => {
            let remote_reachable = guard.camera_link.is_reachable().await;
            json!(SystemStatus {
                distance_cm: guard.distance_sensor.last_distance(),
                object_detected: guard.distance_sensor.object_detected(),
                gate: guard.gate_servo.state(),
                gate_angle: guard.gate_servo.current_angle(),
                auto_capture: guard.auto_capture_enabled(),
                remote_host: guard.camera_link.host().to_string(),
                remote_reachable,
                timestamp: Utc::now(),
            })
        }
        GateCommand::Distance => {
            let reading = guard.distance_sensor.read_distance();
            json!(DistanceReport {
                distance_cm: reading.value_cm,
                valid: reading.valid,
                detected: guard.distance_sensor.object_detected(),
                threshold_cm: guard.distance_sensor.detection_threshold_cm(),
            })
        }
        GateCommand::OpenGate => match guard.gate_servo.open().await {
            Ok(()) => gate_report(&guard),
            Err(e) => json!(CommandError::new(e.to_string())),
        },
        GateCommand::CloseGate => match guard.gate_servo.close().await {
            Ok(()) => gate_report(&guard),
            Err(e) => json!(CommandError::new(e.to_string())),
        },
        GateCommand::SetPosition { angle } => match guard.gate_servo.set_position(angle).await {
            Ok(()) => gate_report(&guard),
            Err(e) => json!(CommandError::new(e.to_string())),
        },
        GateCommand::Capture => {
            let outcome = guard.camera_link.request_capture().await;
            json!(CaptureReport::from_outcome(outcome))
        }
        GateCommand::RemoteStatus => guard.camera_link.remote_status().await,
        GateCommand::SetRemoteHost { host } => {
            guard.camera_link.set_host(host);
            json!({
                "status": "success",
                "remote_host": guard.camera_link.host(),
            })
        }
        GateCommand::ToggleAutoCapture => {
            let enabled = guard.toggle_auto_capture();
            json!({
                "status": "success",
                "auto_capture": enabled,
            })
        }
    }
}

fn gate_report(rig: &GateRig) -> serde_json::Value {
    json!(GateReport {
        status: ReportStatus::Success,
        gate: rig.gate_servo.state(),
        angle: rig.gate_servo.current_angle(),
    })
}
