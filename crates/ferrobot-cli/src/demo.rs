//! Robots the binary brings up: a simulated bench and, when the host exposes
//! one, its first kernel thermal zone.

use std::sync::Arc;
use std::time::Duration;

use ferrobot_hal::adaptors::HostAdaptor;
use ferrobot_hal::aio::{GroveRotaryDriver, ThermalZoneDriver};
use ferrobot_hal::gpio::{LedDriver, RelayDriver};
use ferrobot_hal::{Connection, Device, SimAdaptor, scaler};
use ferrobot_kernel::Robot;
use ferrobot_types::{FerroError, Value};
use tracing::warn;

pub const POT_PIN: &str = "0";
pub const LED_PIN: &str = "13";
pub const RELAY_PIN: &str = "7";
pub const THERMAL_ZONE: &str = "thermal_zone0";
pub const HEARTBEAT: &str = "heartbeat";

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Triangle wave over `0..=1023`.
fn sweep() -> impl FnMut() -> i32 + Send + 'static {
    let mut step = 0i32;
    move || {
        step = (step + 16) % 2048;
        if step < 1024 { step } else { 2047 - step }
    }
}

/// `demo`: a potentiometer (0–100 %), an LED blinking once a second and a
/// relay, all on a [`SimAdaptor`]. The work publishes `"heartbeat"` events.
///
/// # Errors
///
/// Only on duplicate names, which cannot happen here.
pub fn sim_robot() -> Result<Arc<Robot>, FerroError> {
    let sim = Arc::new(SimAdaptor::new());
    sim.set_name("sim");
    sim.set_analog_generator(POT_PIN, sweep());

    let robot = Robot::new("demo");
    robot.add_connection(sim.clone())?;

    let pot = Arc::new(
        GroveRotaryDriver::new(sim.clone(), POT_PIN).with_interval(Duration::from_millis(250)),
    );
    pot.set_name("pot");
    pot.set_scaler(scaler::linear(0, 1023, 0.0, 100.0));
    let led = Arc::new(LedDriver::new(sim.clone(), LED_PIN));
    led.set_name("led");
    let relay = Arc::new(RelayDriver::new(sim, RELAY_PIN));
    relay.set_name("relay");
    robot.add_device(pot.clone())?;
    robot.add_device(led.clone())?;
    robot.add_device(relay)?;

    let blink = Arc::clone(&led);
    robot.add_command("Blink", move |_| {
        blink.toggle()?;
        Ok(Value::from(blink.state()))
    });

    robot.eventer().add_event(HEARTBEAT);
    let eventer = robot.eventer().clone();
    robot.set_work(move |mut token| {
        let (led, pot, eventer) = (Arc::clone(&led), Arc::clone(&pot), eventer.clone());
        async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
            let mut beat = 0i64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        beat += 1;
                        if let Err(e) = led.toggle() {
                            warn!(error = %e, "led toggle failed");
                        }
                        eventer.publish(
                            HEARTBEAT,
                            Value::map([("beat", Value::from(beat)), ("pot", Value::from(pot.value()))]),
                        );
                    }
                }
            }
        }
    });

    Ok(Arc::new(robot))
}

/// `host`: the host's [`THERMAL_ZONE`], or `None` when it has none.
///
/// # Errors
///
/// Only on duplicate names, which cannot happen here.
pub fn host_robot(host: Arc<HostAdaptor>) -> Result<Option<Arc<Robot>>, FerroError> {
    if !host.has_zone(THERMAL_ZONE) {
        return Ok(None);
    }
    host.set_name("host");
    let robot = Robot::new("host");
    robot.add_connection(host.clone())?;
    let zone = Arc::new(ThermalZoneDriver::new(host, THERMAL_ZONE).with_interval(Duration::from_secs(2)));
    zone.set_name(THERMAL_ZONE);
    robot.add_device(zone)?;
    Ok(Some(Arc::new(robot)))
}
