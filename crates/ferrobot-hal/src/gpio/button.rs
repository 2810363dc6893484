use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use ferrobot_middleware::Eventer;
use ferrobot_types::FerroError;

use super::{ERROR, PUSH, RELEASE};
use crate::connection::{Connection, DigitalReader};
use crate::device::{Device, DriverBase};
use crate::poller::Poller;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A push button on a digital input.
///
/// While started it polls the pin and publishes `"push"` when the level
/// leaves the default state, `"release"` when it returns, and `"error"` when
/// a read fails. Readings of `-1` are ignored.
pub struct ButtonDriver {
    base: DriverBase,
    reader: Arc<dyn DigitalReader>,
    pin: String,
    eventer: Eventer,
    interval: Duration,
    default_state: Arc<AtomicI32>,
    active: Arc<AtomicBool>,
    poller: Poller,
}

impl ButtonDriver {
    pub fn new<C: DigitalReader + 'static>(connection: Arc<C>, pin: &str) -> Self {
        let conn: Arc<dyn Connection> = connection.clone();
        let eventer = Eventer::new();
        for topic in [PUSH, RELEASE, ERROR] {
            eventer.add_event(topic);
        }
        Self {
            base: DriverBase::new("Button", conn),
            reader: connection,
            pin: pin.to_string(),
            eventer,
            interval: DEFAULT_POLL_INTERVAL,
            default_state: Arc::new(AtomicI32::new(0)),
            active: Arc::new(AtomicBool::new(false)),
            poller: Poller::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Level of the released button; `1` for pull-up wiring.
    pub fn with_default_state(self, state: i32) -> Self {
        self.set_default_state(state);
        self
    }

    pub fn set_default_state(&self, state: i32) {
        self.default_state.store(state, Ordering::SeqCst);
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Whether the button is currently pushed.
    pub fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &Eventer {
        &self.eventer
    }
}

impl Device for ButtonDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        "Button"
    }

    fn start(&self) -> Result<(), FerroError> {
        let reader = Arc::clone(&self.reader);
        let pin = self.pin.clone();
        let eventer = self.eventer.clone();
        let default_state = Arc::clone(&self.default_state);
        let active = Arc::clone(&self.active);
        let mut state = default_state.load(Ordering::SeqCst);
        self.poller.start(&self.name(), self.interval, move || match reader.digital_read(&pin) {
            Err(e) => eventer.publish(ERROR, e.to_string()),
            Ok(level) if level != state && level != -1 => {
                state = level;
                if level != default_state.load(Ordering::SeqCst) {
                    active.store(true, Ordering::SeqCst);
                    eventer.publish(PUSH, level);
                } else {
                    active.store(false, Ordering::SeqCst);
                    eventer.publish(RELEASE, level);
                }
            }
            Ok(_) => {}
        })?;
        Ok(())
    }

    fn halt(&self) -> Result<(), FerroError> {
        self.poller.halt();
        Ok(())
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAdaptor;
    use ferrobot_middleware::EventReceiver;

    fn topics(rx: &mut EventReceiver) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(format!("{}={}", event.topic, event.payload));
        }
        out
    }

    fn sim() -> Arc<SimAdaptor> {
        let sim = Arc::new(SimAdaptor::new());
        sim.connect().unwrap();
        sim
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_push_and_release() {
        let sim = sim();
        sim.script_digital("5", [0, 1, 1, -1, 0].map(Ok));
        let button = ButtonDriver::new(Arc::clone(&sim), "5");
        let mut push = button.events().subscribe(PUSH).unwrap();
        let mut release = button.events().subscribe(RELEASE).unwrap();
        button.start().unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(button.active());
        tokio::time::sleep(Duration::from_millis(50)).await;
        button.halt().unwrap();

        assert_eq!(topics(&mut push), vec!["push=1".to_string()]);
        assert_eq!(topics(&mut release), vec!["release=0".to_string()]);
        assert!(!button.active());
    }

    #[tokio::test(start_paused = true)]
    async fn pull_up_wiring_inverts_events() {
        let sim = sim();
        sim.script_digital("5", [1, 0, 1].map(Ok));
        let button = ButtonDriver::new(Arc::clone(&sim), "5").with_default_state(1);
        let mut push = button.events().subscribe(PUSH).unwrap();
        let mut release = button.events().subscribe(RELEASE).unwrap();
        button.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        button.halt().unwrap();
        assert_eq!(topics(&mut push), vec!["push=0".to_string()]);
        assert_eq!(topics(&mut release), vec!["release=1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_are_published() {
        let sim = sim();
        sim.script_digital("5", [Err(FerroError::io("5", "bounce"))]);
        let button = ButtonDriver::new(Arc::clone(&sim), "5");
        let mut errors = button.events().subscribe(ERROR).unwrap();
        button.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        button.halt().unwrap();
        let seen = topics(&mut errors);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("bounce"));
    }

    #[tokio::test]
    async fn zero_interval_is_an_error() {
        let button = ButtonDriver::new(sim(), "5").with_interval(Duration::ZERO);
        assert!(matches!(button.start(), Err(FerroError::Config(_))));
    }
}
