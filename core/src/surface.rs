use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::plan::MealPlan;

/// The boolean fields of [`SharedSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    AppRunning,
    SyncRunning,
    EnrichmentRunning,
}

/// Copy of every flag, taken under one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurfaceStatus {
    pub app_running: bool,
    pub sync_running: bool,
    pub enrichment_running: bool,
}

#[derive(Debug)]
struct SurfaceState {
    status: SurfaceStatus,
    plan: Option<MealPlan>,
}

/// Process-wide coordination state shared by the foreground and every agent.
///
/// Holds no logic. Every read and write goes through one mutex, and no method
/// blocks beyond waiting for it.
#[derive(Debug)]
pub struct SharedSurface {
    state: Mutex<SurfaceState>,
}

impl Default for SharedSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSurface {
    /// `app_running` starts true; the agent flags start false; no plan.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                status: SurfaceStatus {
                    app_running: true,
                    sync_running: false,
                    enrichment_running: false,
                },
                plan: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, flag: Flag) -> bool {
        let state = self.lock();
        match flag {
            Flag::AppRunning => state.status.app_running,
            Flag::SyncRunning => state.status.sync_running,
            Flag::EnrichmentRunning => state.status.enrichment_running,
        }
    }

    pub fn set(&self, flag: Flag, value: bool) {
        let mut state = self.lock();
        match flag {
            Flag::AppRunning => state.status.app_running = value,
            Flag::SyncRunning => state.status.sync_running = value,
            Flag::EnrichmentRunning => state.status.enrichment_running = value,
        }
    }

    #[must_use]
    pub fn status(&self) -> SurfaceStatus {
        self.lock().status
    }

    /// Replace the active plan, returning the previous one.
    pub fn install_plan(&self, plan: MealPlan) -> Option<MealPlan> {
        self.lock().plan.replace(plan)
    }

    pub fn take_plan(&self) -> Option<MealPlan> {
        self.lock().plan.take()
    }

    /// Snapshot of the active plan.
    #[must_use]
    pub fn plan(&self) -> Option<MealPlan> {
        self.lock().plan.clone()
    }

    /// Run `f` against the active plan while holding the lock. Keep `f` short:
    /// it must not touch the store or the network.
    pub fn with_plan<R>(&self, f: impl FnOnce(&mut MealPlan) -> R) -> Option<R> {
        self.lock().plan.as_mut().map(f)
    }
}

/// Sets a flag on creation and clears it when dropped, unwinding included.
#[derive(Debug)]
#[must_use = "the flag clears as soon as the guard is dropped"]
pub struct FlagGuard<'a> {
    surface: &'a SharedSurface,
    flag: Flag,
}

impl<'a> FlagGuard<'a> {
    pub fn raise(surface: &'a SharedSurface, flag: Flag) -> Self {
        surface.set(flag, true);
        Self { surface, flag }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.surface.set(self.flag, false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::plan::{Day, Meal};
    use crate::test_support::sample_recipe;

    #[test]
    fn test_initial_status() {
        let surface = SharedSurface::new();
        assert_eq!(
            surface.status(),
            SurfaceStatus {
                app_running: true,
                sync_running: false,
                enrichment_running: false,
            }
        );
        assert!(surface.plan().is_none());
    }

    #[test]
    fn test_flags_are_independent() {
        let surface = SharedSurface::new();
        surface.set(Flag::SyncRunning, true);
        assert!(surface.get(Flag::SyncRunning));
        assert!(!surface.get(Flag::EnrichmentRunning));
        surface.set(Flag::AppRunning, false);
        assert!(!surface.get(Flag::AppRunning));
        assert!(surface.get(Flag::SyncRunning));
    }

    #[test]
    fn test_flag_guard_clears_on_drop() {
        let surface = SharedSurface::new();
        {
            let _guard = FlagGuard::raise(&surface, Flag::EnrichmentRunning);
            assert!(surface.get(Flag::EnrichmentRunning));
        }
        assert!(!surface.get(Flag::EnrichmentRunning));
    }

    #[test]
    fn test_flag_guard_clears_on_panic() {
        let surface = Arc::new(SharedSurface::new());
        let worker = Arc::clone(&surface);
        let result = thread::spawn(move || {
            let _guard = FlagGuard::raise(&worker, Flag::SyncRunning);
            panic!("worker died");
        })
        .join();
        assert!(result.is_err());
        assert!(!surface.get(Flag::SyncRunning));
    }

    #[test]
    fn test_plan_install_take_and_mutate() {
        let surface = SharedSurface::new();
        assert!(surface.install_plan(MealPlan::new(Day::Monday, Day::Tuesday)).is_none());

        let changed = surface.with_plan(|plan| {
            plan.day_mut(Day::Tuesday)
                .map(|d| d.set(Meal::Lunch, Some(sample_recipe("L1"))))
                .is_some()
        });
        assert_eq!(changed, Some(true));

        let snapshot = surface.plan().unwrap();
        assert_eq!(
            snapshot.day(Day::Tuesday).unwrap().get(Meal::Lunch).unwrap().uid,
            "L1"
        );

        let previous = surface.install_plan(MealPlan::new(Day::Friday, Day::Friday));
        assert_eq!(previous, Some(snapshot));
        assert!(surface.take_plan().is_some());
        assert!(surface.take_plan().is_none());
        assert!(surface.with_plan(|_| ()).is_none());
    }
}
