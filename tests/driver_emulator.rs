use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_broadcast::{Receiver, RecvError};
use futures::StreamExt;
use mideaxye::climate::{ClimateMode, ClimateSnapshot, ControlRequest};
use mideaxye::config::DriverConfig;
use mideaxye::driver::Event;
use mideaxye::emulator::{self, UnitState};
use mideaxye::protocol::codec::{BusFrame, XyeCodec};
use mideaxye::protocol::commands::{CommandCode, OperationMode, Temperature};
use mideaxye::runner::{self, Input};
use mideaxye::telemetry::Sensor;
use tokio::io::duplex;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;


fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::max())
        .is_test(true)
        .try_init();
}

async fn next_climate(events: &mut Receiver<Event>, pred: impl Fn(&ClimateSnapshot) -> bool) -> ClimateSnapshot {
    timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Ok(Event::Climate(snapshot)) if pred(&snapshot) => return snapshot,
                Ok(_) | Err(RecvError::Overflowed(_)) => {},
                Err(err) => panic!("events: {err}"),
            }
        }
    }).await.expect("timed out waiting for climate event")
}

async fn wait_for_unit(unit: &Arc<Mutex<UnitState>>, pred: impl Fn(&UnitState) -> bool) {
    timeout(Duration::from_secs(60), async {
        loop {
            if pred(&unit.lock().expect("lock")) {
                return
            }
            sleep(Duration::from_millis(100)).await;
        }
    }).await.expect("timed out waiting for the unit")
}


#[tokio::test(start_paused = true)]
async fn test_drive_emulated_unit() {
    init_logger();

    let (controller, unit_side) = duplex(1024);

    let unit = Arc::new(Mutex::new(UnitState {
        mode: OperationMode::Cool,
        ..Default::default()
    }));
    tokio::spawn(emulator::serve(Framed::new(unit_side, XyeCodec::new()), unit.clone()));

    let (handle, task) = runner::spawn(controller, DriverConfig::default());
    let mut events = handle.subscribe();

    // first query fills in the snapshot
    let snapshot = next_climate(&mut events, |s| s.mode == ClimateMode::Cool).await;
    assert_eq!(snapshot.current_temperature, Some(22.5));
    assert_eq!(snapshot.target_temperature, 24.0);

    handle.send(Input::Control(ControlRequest {
        mode: Some(ClimateMode::Heat),
        target_temperature: Some(21.0),
        ..Default::default()
    })).await.expect("send");

    wait_for_unit(&unit, |u| u.mode == OperationMode::Heat).await;
    assert_eq!(unit.lock().expect("lock").target_temperature, Temperature::from_celsius(21.0).raw);

    let snapshot = next_climate(&mut events, |s| s.mode == ClimateMode::Heat).await;
    assert_eq!(snapshot.target_temperature, 21.0);

    handle.send(Input::RemoteTemperature(19.6)).await.expect("send");
    wait_for_unit(&unit, |u| u.follow_me_temperature == Some(20)).await;
    assert!(unit.lock().expect("lock").follow_me_initialized);

    // closing the inputs stops the driver
    drop(handle);
    timeout(Duration::from_secs(10), task).await
        .expect("driver didn't stop")
        .expect("join")
        .expect("driver");
}

#[tokio::test(start_paused = true)]
async fn test_switch_off_from_auto() {
    init_logger();

    let (controller, unit_side) = duplex(1024);

    let unit = Arc::new(Mutex::new(UnitState {
        mode: OperationMode::Auto,
        ..Default::default()
    }));
    tokio::spawn(emulator::serve(Framed::new(unit_side, XyeCodec::new()), unit.clone()));

    let (handle, _task) = runner::spawn(controller, DriverConfig::default());
    let mut events = handle.subscribe();
    next_climate(&mut events, |s| s.mode == ClimateMode::Auto).await;

    handle.send(Input::Control(ControlRequest {
        mode: Some(ClimateMode::Off),
        ..Default::default()
    })).await.expect("send");

    wait_for_unit(&unit, |u| u.mode == OperationMode::Off).await;

    // plenty of full cycles, each with a set
    sleep(Duration::from_secs(20)).await;

    let unit = unit.lock().expect("lock");
    assert_eq!(unit.mode, OperationMode::Off);
    assert!(unit.was_auto);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_published() {
    let (controller, unit_side) = duplex(1024);

    let unit = Arc::new(Mutex::new(UnitState::default()));
    tokio::spawn(emulator::serve(Framed::new(unit_side, XyeCodec::new()), unit.clone()));

    let (handle, _task) = runner::spawn(controller, DriverConfig::default());
    let mut events = handle.subscribe();

    let outdoor = timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Ok(Event::Telemetry(Sensor::OutdoorTemperature, value)) => return value,
                Ok(_) | Err(RecvError::Overflowed(_)) => {},
                Err(err) => panic!("events: {err}"),
            }
        }
    }).await.expect("timed out");

    assert_eq!(outdoor, 11.0);
}

#[tokio::test(start_paused = true)]
async fn test_static_pressure_while_off() {
    let (controller, unit_side) = duplex(1024);

    let unit = Arc::new(Mutex::new(UnitState::default()));
    tokio::spawn(emulator::serve(Framed::new(unit_side, XyeCodec::new()), unit.clone()));

    let (handle, _task) = runner::spawn(controller, DriverConfig::default());
    let mut events = handle.subscribe();
    next_climate(&mut events, |s| s.mode == ClimateMode::Off).await;

    handle.send(Input::StaticPressure(20)).await.expect("send");
    handle.send(Input::StaticPressure(7)).await.expect("send");

    wait_for_unit(&unit, |u| u.static_pressure == 7).await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_unit_keeps_polling() {
    init_logger();

    let (controller, unit_side) = duplex(1024);
    let mut unit_side = Framed::new(unit_side, XyeCodec::new());

    let (_handle, _task) = runner::spawn(controller, DriverConfig::default());

    // nobody answers, yet queries keep coming
    for _ in 0..3 {
        let frame = timeout(Duration::from_secs(5), unit_side.next()).await
            .expect("no frame")
            .expect("stream ended")
            .expect("decode");

        assert!(matches!(frame, BusFrame::Tx(frame) if frame.id.command() == Some(CommandCode::Query)));
    }
}
