use std::collections::BTreeSet;

use crate::billing::{BillingScheduler, BillingState, Ledger, TimerHost};
use crate::claims::{ClaimStore, LeaseManager};
use crate::config::{LeaseConfig, MAX_PENDING_COMMANDS};
use crate::error::LeaseError;
use crate::notices::Notifier;
use crate::types::{BillingStatus, CellKey, ClaimOutcome, EventOutcome, OwnerId, TickOutcome, WorldEvent};
use crate::world::WorldRuntime;

/// Single entry point for everything the host reports.
///
/// Claim, anchor and join events are refused until `start` has reconciled
/// the persisted claims with the world, and while the host is too far
/// behind on applying world commands. Removals and departures are always
/// accepted.
pub struct ChunkLoader<S, W, N, L, T: TimerHost> {
    manager: LeaseManager<S, W, N>,
    billing: BillingScheduler<T>,
    ledger: L,
    ready: bool,
}

impl<S, W, N, L, T> ChunkLoader<S, W, N, L, T>
where
    S: ClaimStore,
    W: WorldRuntime,
    N: Notifier,
    L: Ledger,
    T: TimerHost,
{
    pub fn new(config: LeaseConfig, store: S, world: W, notifier: N, ledger: L, timers: T) -> Self {
        let billing = BillingScheduler::new(timers, config.billing_interval_secs, config.duty_per_cell);
        Self {
            manager: LeaseManager::new(config, store, world, notifier),
            billing,
            ledger,
            ready: false,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Ticket every persisted claim and start accepting events.
    pub fn start(&mut self) -> usize {
        let tickets = self.manager.load_all();
        self.ready = true;
        tickets
    }

    /// Stop every timer, forget presence and release every ticket.
    pub fn stop(&mut self) -> usize {
        self.billing.cancel_all();
        self.billing.clear_presence();
        let released = self.manager.unload_all();
        self.ready = false;
        released
    }

    pub fn resume_billing(&mut self, owners: &[OwnerId]) -> usize {
        self.billing.resume(&self.manager, owners)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub fn dispatch(&mut self, event: WorldEvent) -> Result<EventOutcome, LeaseError> {
        self.manager.world_mut().observe(&event);

        match event {
            WorldEvent::HostStarted => {
                self.start();
                Ok(EventOutcome::Reconciled { tickets: self.manager.tickets().len() as u64 })
            }
            WorldEvent::HostStopping => {
                self.stop();
                Ok(EventOutcome::Reconciled { tickets: self.manager.tickets().len() as u64 })
            }
            WorldEvent::RealmLoaded { realm, .. } => {
                if self.ready {
                    self.manager.load_realm(&realm);
                }
                Ok(EventOutcome::Observed)
            }
            WorldEvent::RealmUnloaded { realm } => {
                self.manager.unload_realm(&realm);
                Ok(EventOutcome::Observed)
            }
            WorldEvent::OwnerLeft { owner } => {
                let released = self.billing.owner_left(&mut self.manager, &owner);
                Ok(EventOutcome::Left { owner, released })
            }
            WorldEvent::OwnerJoined { owner } => {
                self.ensure_accepting()?;
                let active_claims = self.billing.owner_joined(&mut self.manager, &mut self.ledger, &owner)?;
                Ok(EventOutcome::Presence { owner, active_claims })
            }
            WorldEvent::AnchorCreated { owner, base } => {
                self.ensure_accepting()?;
                let (outcome, revoked) = self.manager.on_anchor_created(&owner, &base)?;
                let mut affected: BTreeSet<OwnerId> = revoked.into_iter().map(|r| r.owner).collect();
                affected.insert(owner);
                self.settle(affected)?;
                Ok(EventOutcome::Claim(outcome))
            }
            WorldEvent::AnchorRemoved { actor, base } => {
                self.ensure_ready()?;
                let report = self.manager.on_anchor_removed(actor.as_deref(), &base)?;
                self.settle(report.revoked.iter().map(|r| r.owner.clone()).collect())?;
                Ok(EventOutcome::Revoked(report.revoked))
            }
        }
    }

    pub fn claim(&mut self, owner: &str, center: &CellKey) -> Result<ClaimOutcome, LeaseError> {
        self.ensure_accepting()?;
        let outcome = self.manager.claim(owner, center)?;
        if outcome.created() {
            self.billing.claims_changed(&mut self.manager, &mut self.ledger, owner)?;
        }
        Ok(outcome)
    }

    pub fn release(&mut self, owner: &str, center: &CellKey) -> Result<bool, LeaseError> {
        self.ensure_ready()?;
        let released = self.manager.release(owner, center)?;
        if released {
            self.billing.claims_changed(&mut self.manager, &mut self.ledger, owner)?;
        }
        Ok(released)
    }

    pub fn billing_tick(&mut self, owner: &str) -> Result<TickOutcome, LeaseError> {
        self.billing.tick(&mut self.manager, &mut self.ledger, owner)
    }

    pub fn billing_status(&self, owner: &str) -> BillingStatus {
        let claims = self.manager.claims(owner).len() as u32;
        BillingStatus {
            owner: owner.to_string(),
            present: self.billing.is_present(owner),
            running: matches!(self.billing.state(owner), BillingState::Running(_)),
            claims,
            duty_per_tick: self.billing.duty_per_cell().saturating_mul(claims as u64),
            balance: self.ledger.balance(owner),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn manager(&self) -> &LeaseManager<S, W, N> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut LeaseManager<S, W, N> {
        &mut self.manager
    }

    pub fn billing(&self) -> &BillingScheduler<T> {
        &self.billing
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    fn ensure_ready(&self) -> Result<(), LeaseError> {
        if self.ready {
            Ok(())
        } else {
            Err(LeaseError::NotLoaded)
        }
    }

    /// Ready, and the host has kept up with the command outbox.
    fn ensure_accepting(&self) -> Result<(), LeaseError> {
        self.ensure_ready()?;
        let pending = self.manager.world().pending_commands();
        if pending >= MAX_PENDING_COMMANDS {
            log!("Refusing new claims: {} world commands pending", pending);
            return Err(LeaseError::Backlogged { pending });
        }
        Ok(())
    }

    /// Realign billing for owners whose claim sets just changed.
    fn settle(&mut self, owners: BTreeSet<OwnerId>) -> Result<(), LeaseError> {
        for owner in owners {
            self.billing.claims_changed(&mut self.manager, &mut self.ledger, &owner)?;
        }
        Ok(())
    }
}
