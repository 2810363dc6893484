//! [`WorkRegistry`] – the scheduled units a robot owns.
//!
//! Units started through [`Robot::every`](crate::Robot::every) or
//! [`Robot::after`](crate::Robot::after) are keyed by a fresh [`Uuid`] and
//! cancelled together when the robot halts.

use std::collections::BTreeMap;
use std::time::Duration;

use ferrobot_middleware::{TaskHandle, after, every};
use ferrobot_types::FerroError;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Every,
    After,
}

/// Snapshot of one registered unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnitInfo {
    pub id: Uuid,
    pub kind: WorkKind,
    pub period: Duration,
    pub ticks: u64,
}

struct WorkUnit {
    kind: WorkKind,
    period: Duration,
    handle: TaskHandle,
}

#[derive(Default)]
pub struct WorkRegistry {
    units: Mutex<BTreeMap<Uuid, WorkUnit>>,
}

impl WorkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Same as [`ferrobot_middleware::every`].
    pub fn every<F>(&self, period: Duration, f: F) -> Result<Uuid, FerroError>
    where
        F: FnMut() + Send + 'static,
    {
        let handle = every(period, f)?;
        Ok(self.insert(WorkKind::Every, period, handle))
    }

    /// # Errors
    ///
    /// Same as [`ferrobot_middleware::after`].
    pub fn after<F>(&self, delay: Duration, f: F) -> Result<Uuid, FerroError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = after(delay, f)?;
        Ok(self.insert(WorkKind::After, delay, handle))
    }

    fn insert(&self, kind: WorkKind, period: Duration, handle: TaskHandle) -> Uuid {
        let id = Uuid::new_v4();
        self.units.lock().insert(id, WorkUnit { kind, period, handle });
        id
    }

    /// Active units; finished ones are dropped from the registry.
    pub fn units(&self) -> Vec<WorkUnitInfo> {
        let mut units = self.units.lock();
        units.retain(|_, unit| !unit.handle.is_finished());
        units
            .iter()
            .map(|(id, unit)| WorkUnitInfo {
                id: *id,
                kind: unit.kind,
                period: unit.period,
                ticks: unit.handle.ticks(),
            })
            .collect()
    }

    /// Cancel one unit. Returns `false` for unknown ids.
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.units.lock().remove(id) {
            Some(unit) => {
                unit.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every unit and return how many there were.
    pub fn cancel_all(&self) -> usize {
        let units = std::mem::take(&mut *self.units.lock());
        for unit in units.values() {
            unit.handle.cancel();
        }
        units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn every_units_are_listed_and_cancelled() {
        let registry = WorkRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let id = registry
            .every(Duration::from_millis(10), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;

        let units = registry.units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, id);
        assert_eq!(units[0].kind, WorkKind::Every);
        assert_eq!(units[0].ticks, 3);

        assert!(registry.cancel(&id));
        assert!(!registry.cancel(&id));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_after_units_are_pruned() {
        let registry = WorkRegistry::new();
        registry.after(Duration::from_millis(5), || {}).unwrap();
        registry.every(Duration::from_millis(5), || {}).unwrap();
        assert_eq!(registry.units().len(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let units = registry.units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, WorkKind::Every);
        assert_eq!(registry.cancel_all(), 1);
        assert!(registry.units().is_empty());
    }

    #[test]
    fn outside_runtime_is_an_error() {
        let registry = WorkRegistry::new();
        assert!(matches!(
            registry.after(Duration::from_millis(1), || {}),
            Err(FerroError::Runtime(_))
        ));
    }
}
