use candid::{CandidType, Deserialize};
use ic_stable_structures::storable::Bound;
use ic_stable_structures::Storable;
use std::borrow::Cow;
use std::fmt::Debug;
use std::time::Duration;

use crate::types::OwnerId;

/// Source of recurring per-owner billing ticks.
pub trait TimerHost {
    type Handle: Copy + Debug;

    /// Schedule a tick for `owner` every `interval`. The first fires one
    /// interval from now.
    fn start(&mut self, owner: &str, interval: Duration) -> Self::Handle;

    fn cancel(&mut self, handle: Self::Handle);
}

/// `ic-cdk-timers` backed host. Each tick calls `on_tick` with the owner.
#[derive(Clone, Copy)]
pub struct IcTimers {
    on_tick: fn(OwnerId),
}

impl IcTimers {
    pub fn new(on_tick: fn(OwnerId)) -> Self {
        Self { on_tick }
    }
}

impl TimerHost for IcTimers {
    type Handle = ic_cdk_timers::TimerId;

    fn start(&mut self, owner: &str, interval: Duration) -> Self::Handle {
        let owner = owner.to_string();
        let on_tick = self.on_tick;
        ic_cdk_timers::set_timer_interval(interval, move || {
            let owner = owner.clone();
            async move { on_tick(owner) }
        })
    }

    fn cancel(&mut self, handle: Self::Handle) {
        ic_cdk_timers::clear_timer(handle);
    }
}

/// Owners present when the canister was last upgraded.
///
/// Timers do not survive an upgrade, so `pre_upgrade` writes this list and
/// `post_upgrade` restarts billing for it.
#[derive(CandidType, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceList(pub Vec<OwnerId>);

impl Storable for PresenceList {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(candid::encode_one(self).expect(
            "CRITICAL: Failed to encode PresenceList. \
             This should never happen unless there's a bug in candid serialization."
        ))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<'_, [u8]>) -> Self {
        candid::decode_one(&bytes).expect(
            "CRITICAL: Failed to decode PresenceList from stable storage. \
             This indicates storage corruption or an incompatible canister upgrade."
        )
    }

    const BOUND: Bound = Bound::Unbounded;
}
