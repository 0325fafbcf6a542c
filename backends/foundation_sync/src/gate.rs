//! Ticket-ordered shared resource for two competing groups.
//!
//! Members of one group may share the resource up to a fixed capacity, but
//! never together with members of the other group. Every entry attempt draws
//! a ticket and admission happens strictly in ticket order, so a steady
//! stream from one group can not starve the other: a late arrival from the
//! group inside still queues behind an earlier arrival from the group
//! outside.

use core::fmt;
use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use derive_more::{Display, Into};

use crate::cancel::{self, CancellationToken, DEFAULT_POLL_INTERVAL};
use crate::errors::{SyncError, SyncResult};

/// The two groups competing for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Group {
    #[display("group-a")]
    A,
    #[display("group-b")]
    B,
}

/// The place in line a caller was given when it asked to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Into)]
pub struct Ticket(u64);

impl Ticket {
    #[must_use]
    pub fn number(self) -> u64 {
        self.0
    }
}

struct GateState {
    occupancy: usize,
    active_group: Option<Group>,
    next_ticket: u64,
    serving: u64,
    /// Tickets whose holders gave up before being served.
    abandoned: BTreeSet<u64>,
}

impl GateState {
    fn admissible(&self, group: Group, capacity: usize) -> bool {
        match self.active_group {
            None => self.occupancy == 0,
            Some(current) => current == group && self.occupancy < capacity,
        }
    }

    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

/// A bounded, group-exclusive gate with first-come-first-served admission.
///
/// ```
/// use foundation_sync::gate::{FairnessGate, Group};
/// use foundation_sync::CancellationToken;
///
/// let gate = FairnessGate::new(2);
/// let never = CancellationToken::never();
///
/// gate.enter_group_a(&never).unwrap();
/// gate.enter_group_a(&never).unwrap();
/// assert_eq!(gate.occupancy(), 2);
/// assert_eq!(gate.active_group(), Some(Group::A));
///
/// assert!(gate.leave_group_a());
/// assert!(gate.leave_group_a());
/// assert_eq!(gate.active_group(), None);
/// ```
pub struct FairnessGate {
    capacity: usize,
    state: Mutex<GateState>,
    changed: Condvar,
    poll: Duration,
}

impl FairnessGate {
    /// Creates a gate admitting at most `capacity` members at once.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "gate capacity must be > 0");
        Self {
            capacity,
            state: Mutex::new(GateState {
                occupancy: 0,
                active_group: None,
                next_ticket: 0,
                serving: 0,
                abandoned: BTreeSet::new(),
            }),
            changed: Condvar::new(),
            poll: DEFAULT_POLL_INTERVAL,
        }
    }

    /// # Errors
    ///
    /// Returns [`SyncError::InvalidCapacity`] if `capacity` is 0.
    pub fn try_new(capacity: usize) -> SyncResult<Self> {
        if capacity == 0 {
            return Err(SyncError::InvalidCapacity(capacity));
        }
        Ok(Self::new(capacity))
    }

    /// Sets how long a cancellable waiter sleeps between token checks.
    #[must_use]
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Takes a ticket for `group` and blocks until it is admitted.
    ///
    /// Admission needs the ticket to be next in line and the resource to be
    /// either empty or held by `group` with room to spare.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `cancel` fires before admission.
    /// The ticket is given up and the callers behind it move forward.
    pub fn enter(&self, group: Group, cancel: &CancellationToken) -> SyncResult<Ticket> {
        let mut state = cancel::lock(&self.state);
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        loop {
            if ticket == state.serving && state.admissible(group, self.capacity) {
                state.occupancy += 1;
                state.active_group = Some(group);
                state.advance();
                let occupancy = state.occupancy;
                drop(state);

                // the next ticket may be admissible right away
                self.changed.notify_all();
                tracing::trace!(%group, ticket, occupancy, "gate admitted");
                return Ok(Ticket(ticket));
            }

            if cancel.is_cancelled() {
                if ticket == state.serving {
                    state.advance();
                    drop(state);
                    self.changed.notify_all();
                } else {
                    state.abandoned.insert(ticket);
                }
                tracing::debug!(%group, ticket, "gate entry cancelled");
                return Err(SyncError::Cancelled);
            }

            state = cancel::park(&self.changed, state, cancel, self.poll);
        }
    }

    /// Records that one member of `group` left.
    ///
    /// Returns `false` and changes nothing when the resource is not held by
    /// `group`.
    pub fn leave(&self, group: Group) -> bool {
        let mut state = cancel::lock(&self.state);
        if state.active_group != Some(group) {
            drop(state);
            tracing::warn!(%group, "gate leave ignored, group is not inside");
            return false;
        }

        state.occupancy -= 1;
        if state.occupancy == 0 {
            state.active_group = None;
        }
        drop(state);

        self.changed.notify_all();
        true
    }

    /// Enters like [`FairnessGate::enter`] and returns a pass that leaves the
    /// gate when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `cancel` fires before admission.
    pub fn admit(&self, group: Group, cancel: &CancellationToken) -> SyncResult<GatePass<'_>> {
        let ticket = self.enter(group, cancel)?;
        Ok(GatePass {
            gate: self,
            group,
            ticket,
        })
    }

    /// # Errors
    ///
    /// See [`FairnessGate::enter`].
    pub fn enter_group_a(&self, cancel: &CancellationToken) -> SyncResult<Ticket> {
        self.enter(Group::A, cancel)
    }

    pub fn leave_group_a(&self) -> bool {
        self.leave(Group::A)
    }

    /// # Errors
    ///
    /// See [`FairnessGate::enter`].
    pub fn enter_group_b(&self, cancel: &CancellationToken) -> SyncResult<Ticket> {
        self.enter(Group::B, cancel)
    }

    pub fn leave_group_b(&self) -> bool {
        self.leave(Group::B)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn occupancy(&self) -> usize {
        cancel::lock(&self.state).occupancy
    }

    #[must_use]
    pub fn active_group(&self) -> Option<Group> {
        cancel::lock(&self.state).active_group
    }

    /// Number of tickets drawn so far, admitted or not.
    #[must_use]
    pub fn tickets_issued(&self) -> u64 {
        cancel::lock(&self.state).next_ticket
    }
}

impl fmt::Debug for FairnessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = cancel::lock(&self.state);
        f.debug_struct("FairnessGate")
            .field("capacity", &self.capacity)
            .field("occupancy", &state.occupancy)
            .field("active_group", &state.active_group)
            .field("next_ticket", &state.next_ticket)
            .field("serving", &state.serving)
            .finish_non_exhaustive()
    }
}

/// RAII pass returned by [`FairnessGate::admit`].
pub struct GatePass<'a> {
    gate: &'a FairnessGate,
    group: Group,
    ticket: Ticket,
}

impl GatePass<'_> {
    #[must_use]
    pub fn group(&self) -> Group {
        self.group
    }

    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        self.gate.leave(self.group);
    }
}

impl fmt::Debug for GatePass<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePass")
            .field("group", &self.group)
            .field("ticket", &self.ticket)
            .finish()
    }
}
