//! Gate controller binary.
use clap::Parser;
use smartgate::components::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file naming the component configs of the system.
    #[arg(short, long)]
    filepath: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    let system = GateSystemConfig::from_file(args.filepath);

    let distance_sensor =
        DistanceSensor::from_config(DistanceSensorConfig::from_file(
            &system.distance_sensor_config_file,
        ))
        .expect("Failed to claim the ranging sensor GPIO lines");
    let mut gate_servo =
        GateServo::from_config(GateServoConfig::from_file(&system.gate_servo_config_file))
            .expect("Failed to claim the servo GPIO line");
    gate_servo
        .initialise()
        .await
        .expect("Failed to drive the gate closed");
    let camera_link = CameraLink::from_config_file(&system.camera_link_config_file);
    log::info!("components ready, camera module at {}", camera_link.host());

    let rig = Arc::new(Mutex::new(GateRig::new(
        distance_sensor,
        gate_servo,
        camera_link,
    )));

    let control_loop = ControlLoop::from_config_file(&system.control_loop_config_file);
    ControlLoopController::start(control_loop, rig.clone());

    let listener = ApiListener::from_config_file(&system.api_listener_config_file);
    ApiListenerController::start(listener, rig).await;
}
