use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::ledger::Ledger;
use super::timers::TimerHost;
use crate::claims::{ClaimStore, LeaseManager};
use crate::error::LeaseError;
use crate::notices::Notifier;
use crate::types::{Cue, NoticeKind, OwnerId, TickOutcome};
use crate::world::WorldRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingState<H> {
    NoTimer,
    Running(H),
}

/// Per-owner recurring duty charges.
///
/// An owner has a timer exactly while they are present and hold at least
/// one claim. Every start goes through `ensure_running`, which refuses to
/// schedule a second timer, so an owner is never charged twice per interval.
pub struct BillingScheduler<T: TimerHost> {
    timers: T,
    interval: Duration,
    duty_per_cell: u64,
    present: BTreeSet<OwnerId>,
    running: BTreeMap<OwnerId, T::Handle>,
}

impl<T: TimerHost> BillingScheduler<T> {
    pub fn new(timers: T, interval_secs: u64, duty_per_cell: u64) -> Self {
        Self {
            timers,
            interval: Duration::from_secs(interval_secs),
            duty_per_cell,
            present: BTreeSet::new(),
            running: BTreeMap::new(),
        }
    }

    // =========================================================================
    // PRESENCE
    // =========================================================================

    /// Re-acquire the owner's tickets, announce them and start billing with
    /// an immediate charge. Returns the owner's active claim count.
    pub fn owner_joined<S, W, N, L>(
        &mut self,
        manager: &mut LeaseManager<S, W, N>,
        ledger: &mut L,
        owner: &str,
    ) -> Result<u32, LeaseError>
    where
        S: ClaimStore,
        W: WorldRuntime,
        N: Notifier,
        L: Ledger,
    {
        self.present.insert(owner.to_string());
        manager.activate_owner(owner);

        let count = manager.claims(owner).len() as u32;
        if count > 0 {
            manager.notify(
                owner,
                NoticeKind::ClaimsLoaded { count, interval_secs: self.interval.as_secs() },
                None,
            );
        }

        self.claims_changed(manager, ledger, owner)?;
        Ok(manager.active_claims(owner))
    }

    /// Stop billing, then release the owner's tickets. Claims stay persisted.
    pub fn owner_left<S, W, N>(&mut self, manager: &mut LeaseManager<S, W, N>, owner: &str) -> u32
    where
        S: ClaimStore,
        W: WorldRuntime,
        N: Notifier,
    {
        self.present.remove(owner);
        self.cancel(owner);
        manager.deactivate_owner(owner)
    }

    /// Bring the timer in line with the owner's claim set. A timer that is
    /// started here charges once immediately.
    pub fn claims_changed<S, W, N, L>(
        &mut self,
        manager: &mut LeaseManager<S, W, N>,
        ledger: &mut L,
        owner: &str,
    ) -> Result<Option<TickOutcome>, LeaseError>
    where
        S: ClaimStore,
        W: WorldRuntime,
        N: Notifier,
        L: Ledger,
    {
        if manager.claims(owner).is_empty() {
            self.cancel(owner);
            return Ok(None);
        }
        if !self.present.contains(owner) || !self.ensure_running(owner) {
            return Ok(None);
        }
        self.tick(manager, ledger, owner).map(Some)
    }

    // =========================================================================
    // CHARGING
    // =========================================================================

    /// Charge one interval's duty, or tear every lease down if it cannot be paid.
    pub fn tick<S, W, N, L>(
        &mut self,
        manager: &mut LeaseManager<S, W, N>,
        ledger: &mut L,
        owner: &str,
    ) -> Result<TickOutcome, LeaseError>
    where
        S: ClaimStore,
        W: WorldRuntime,
        N: Notifier,
        L: Ledger,
    {
        let claims = manager.claims(owner);
        if !self.present.contains(owner) || claims.is_empty() {
            self.cancel(owner);
            return Ok(TickOutcome::Idle);
        }

        let cells = claims.len() as u32;
        if let Some(duty) = self.duty_per_cell.checked_mul(cells as u64) {
            if ledger.has_funds(owner, duty) {
                match ledger.withdraw(owner, duty) {
                    Ok(_) => {
                        manager.notify(owner, NoticeKind::FeePaid { amount: duty, cells }, None);
                        return Ok(TickOutcome::Charged { amount: duty, cells });
                    }
                    Err(e) => log!("Withdrawal for {} failed: {}", owner, e),
                }
            }
        } else {
            log!("Duty for {} overflows: {} cells at {}", owner, cells, self.duty_per_cell);
        }

        self.cancel(owner);
        let revoked = manager.revoke_all(owner)?;
        let count = revoked.len() as u32;
        manager.notify(owner, NoticeKind::LeaseRevoked { cells: count }, Some(Cue::LeaseRevoked));
        ledger.on_revoked(owner, count);
        log!("Insufficient funds: revoked {} claims of {}", count, owner);
        Ok(TickOutcome::Revoked { cells: revoked })
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Start the owner's timer unless one is already running.
    pub fn ensure_running(&mut self, owner: &str) -> bool {
        if self.running.contains_key(owner) {
            return false;
        }
        let handle = self.timers.start(owner, self.interval);
        self.running.insert(owner.to_string(), handle);
        true
    }

    pub fn cancel(&mut self, owner: &str) -> bool {
        match self.running.remove(owner) {
            Some(handle) => {
                self.timers.cancel(handle);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let handles: Vec<T::Handle> = std::mem::take(&mut self.running).into_values().collect();
        for handle in &handles {
            self.timers.cancel(*handle);
        }
        handles.len()
    }

    /// Forget who is present; the host reports joins again after a restart.
    pub fn clear_presence(&mut self) {
        self.present.clear();
    }

    /// Restart billing for owners that were present before an upgrade.
    ///
    /// No immediate charge: the interval they were in was already paid.
    pub fn resume<S, W, N>(&mut self, manager: &LeaseManager<S, W, N>, owners: &[OwnerId]) -> usize
    where
        S: ClaimStore,
        W: WorldRuntime,
        N: Notifier,
    {
        let mut started = 0;
        for owner in owners {
            self.present.insert(owner.clone());
            if !manager.claims(owner).is_empty() && self.ensure_running(owner) {
                started += 1;
            }
        }
        log!("Resumed billing for {} of {} present owners", started, owners.len());
        started
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn state(&self, owner: &str) -> BillingState<T::Handle> {
        match self.running.get(owner) {
            Some(handle) => BillingState::Running(*handle),
            None => BillingState::NoTimer,
        }
    }

    pub fn is_present(&self, owner: &str) -> bool {
        self.present.contains(owner)
    }

    pub fn present_owners(&self) -> Vec<OwnerId> {
        self.present.iter().cloned().collect()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn duty_per_cell(&self) -> u64 {
        self.duty_per_cell
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }
}
