use std::fmt;

use crate::PriorityWeights;

/// Logical time supplied by the caller. The dispatcher never reads a wall clock.
pub type Time = i64;

/// Caller-assigned order identifier, unique among scheduled orders
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An `Order` is a request for a single one-way delivery by the drone.
///
/// The priority is computed once, when the order is built, and is never
/// recomputed afterwards, even when the flight time is edited.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    /// Unique identifier assigned by the caller
    id: OrderId,
    /// Logical time at which the order was placed
    creation_time: Time,
    /// Monetary value of the order
    value: u64,
    /// One-way flight duration from the nest to the destination
    flight_time: Time,
    /// Priority score, frozen at creation
    priority: f64,
    /// Scheduled one-way arrival time
    arrival_estimate: Time,
}

impl Order {
    /// Builds a new order, scoring it with `weights`.
    ///
    /// The arrival estimate starts out as if the drone were idle
    /// (`creation_time + flight_time`); the dispatcher reschedules it before
    /// the order is stored.
    pub fn new(
        id: OrderId,
        creation_time: Time,
        value: u64,
        flight_time: Time,
        weights: &PriorityWeights,
    ) -> Self {
        Self {
            id,
            creation_time,
            value,
            flight_time,
            priority: weights.priority(value, creation_time),
            arrival_estimate: creation_time.saturating_add(flight_time),
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn creation_time(&self) -> Time {
        self.creation_time
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn flight_time(&self) -> Time {
        self.flight_time
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn arrival_estimate(&self) -> Time {
        self.arrival_estimate
    }

    /// Time at which the drone leaves the nest for this order
    pub fn departure_time(&self) -> Time {
        self.arrival_estimate.saturating_sub(self.flight_time)
    }

    /// Time at which the drone is back at the nest after this order
    pub fn return_time(&self) -> Time {
        self.arrival_estimate.saturating_add(self.flight_time)
    }

    /// Arrival estimate after moving by `delta`, or `None` when the
    /// departure or return time would leave the `Time` range
    pub fn checked_shift(&self, delta: Time) -> Option<Time> {
        let arrival = self.arrival_estimate.checked_add(delta)?;
        arrival.checked_sub(self.flight_time)?;
        arrival.checked_add(self.flight_time)?;
        Some(arrival)
    }

    /// Arrival estimate after `retime(flight_time)`, or `None` when the
    /// new return time would leave the `Time` range
    pub fn checked_retime(&self, flight_time: Time) -> Option<Time> {
        let arrival = self.departure_time().checked_add(flight_time)?;
        arrival.checked_add(flight_time)?;
        Some(arrival)
    }

    /// Whether the drone has already left (or delivered) for this order at `now`
    pub fn is_out_for_delivery(&self, now: Time) -> bool {
        self.departure_time() <= now
    }

    /// Whether the order counts as delivered at `now`
    pub fn is_delivered_by(&self, now: Time) -> bool {
        self.arrival_estimate <= now
    }

    /// Schedules the order to arrive at `arrival_estimate`
    pub fn schedule_at(&mut self, arrival_estimate: Time) {
        self.arrival_estimate = arrival_estimate;
    }

    /// Moves the arrival estimate by `delta` (negative = earlier).
    /// Saturates at the ends of the `Time` range; see `checked_shift`.
    pub fn shift(&mut self, delta: Time) {
        self.arrival_estimate = self.arrival_estimate.saturating_add(delta);
    }

    /// Replaces the one-way flight time, keeping the departure time fixed.
    /// The priority is left untouched.
    pub fn retime(&mut self, flight_time: Time) {
        self.arrival_estimate = self.departure_time().saturating_add(flight_time);
        self.flight_time = flight_time;
    }
}
