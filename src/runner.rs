use anyhow::{Result, Context, bail};
use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};
use log::{debug, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::climate::ControlRequest;
use crate::config::{DriverConfig, PortIo};
use crate::driver::{Driver, Event};
use crate::protocol::codec::RX_FRAME_SIZE;


const INPUT_CAPACITY: usize = 16;
const EVENT_CAPACITY: usize = 64;


/// Host requests fed to a running driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    Control(ControlRequest),
    /// `None` toggles
    Power(Option<bool>),
    RemoteTemperature(f32),
    StaticPressure(u8),
}


/// Talks to a driver task started with [`spawn`].
#[derive(Clone)]
pub struct DriverHandle {
    inputs: mpsc::Sender<Input>,
    events: InactiveReceiver<Event>,
}

impl DriverHandle {
    pub async fn send(&self, input: Input) -> Result<()> {
        self.inputs.send(input).await
            .context("driver task has stopped")
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<Event> {
        self.events.activate_cloned()
    }
}


/// Run a driver on `port` in a new task.
pub fn spawn<P>(port: P, config: DriverConfig) -> (DriverHandle, JoinHandle<Result<()>>) where
    P: PortIo + 'static
{
    let (inputs_send, inputs_recv) = mpsc::channel(INPUT_CAPACITY);

    let (mut events_send, events_recv) = broadcast(EVENT_CAPACITY);
    events_send.set_overflow(true);

    let handle = DriverHandle {
        inputs: inputs_send,
        events: events_recv.deactivate(),
    };

    let task = tokio::spawn(run(Driver::new(config), port, inputs_recv, events_send));

    (handle, task)
}


fn apply_input(driver: &mut Driver, input: Input) {
    trace!("input: {input:?}");

    match input {
        Input::Control(request) => driver.control(request),
        Input::Power(Some(on)) => driver.set_power(on),
        Input::Power(None) => driver.toggle_power(),
        Input::RemoteTemperature(temperature) => driver.on_remote_temperature(temperature, Instant::now()),
        Input::StaticPressure(pressure) => {
            // already logged, the previous setting stays in place
            let _ = driver.set_static_pressure(pressure);
        }
    }
}

fn publish(driver: &mut Driver, events: &Sender<Event>) {
    for event in driver.drain_events() {
        // nobody listening is fine
        let _ = events.try_broadcast(event);
    }
}


/// Drive `port` until the input channel closes or the port fails.
///
/// Each tick sends at most one frame, then collects whatever arrives within
/// the response window and hands it to the driver, whole.
pub async fn run<P>(mut driver: Driver, mut port: P, mut inputs: mpsc::Receiver<Input>, events: Sender<Event>) -> Result<()> where
    P: PortIo
{
    let period = driver.config().period;
    let response_timeout = driver.config().response_timeout;

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut scratch = [0x00; RX_FRAME_SIZE * 2];
    let mut received = Vec::with_capacity(RX_FRAME_SIZE * 2);

    loop {
        select! {
            _ = tick.tick() => {},
            input = inputs.recv() => {
                match input {
                    Some(input) => apply_input(&mut driver, input),
                    None => {
                        debug!("input channel closed, stopping driver");
                        return Ok(())
                    }
                }
                publish(&mut driver, &events);
                continue;
            }
        }

        let frame = match driver.poll_transmit(Instant::now()) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                publish(&mut driver, &events);
                continue;
            },
            Err(err) => {
                warn!("failed to build frame: {err}");
                continue;
            }
        };

        let bytes = frame.encode();
        trace!("TX: {bytes:02x?}");
        port.write_all(&bytes).await.context("failed to write to port")?;
        port.flush().await.context("failed to flush port")?;

        received.clear();
        let deadline = Instant::now() + response_timeout;

        loop {
            select! {
                _ = sleep_until(deadline) => break,
                read = port.read(&mut scratch) => {
                    match read.context("failed to read from port")? {
                        0 => bail!("port closed"),
                        n => received.extend_from_slice(&scratch[..n]),
                    }
                },
                Some(input) = inputs.recv() => {
                    // doesn't touch the exchange in flight, only what comes after
                    apply_input(&mut driver, input);
                }
            }
        }

        trace!("RX: {received:02x?}");

        // errors are logged by the driver, the cycle carries on regardless
        let _ = driver.handle_response(&received, Instant::now());

        publish(&mut driver, &events);
    }
}
