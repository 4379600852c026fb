use itertools::Itertools;

use crate::{DispatchError, Order, OrderId, Time};

/// Result of a successful `create`
#[derive(Clone, Debug, PartialEq)]
pub struct Creation {
    /// The new order with its arrival estimate
    pub created: Order,
    /// Lower-priority orders pushed back by the new order, ascending by ETA
    pub cascaded: Vec<Order>,
    /// Orders delivered by the time of the call, ascending by ETA
    pub delivered: Vec<Order>,
}

/// Result of a successful `cancel`
#[derive(Clone, Debug, PartialEq)]
pub struct Cancellation {
    pub cancelled: Order,
    /// Orders moved earlier by the freed round trip, ascending by ETA
    pub cascaded: Vec<Order>,
    pub delivered: Vec<Order>,
}

/// Result of a successful `update_flight_time`
#[derive(Clone, Debug, PartialEq)]
pub struct FlightTimeUpdate {
    /// The edited order together with every order shifted by the edit,
    /// ascending by ETA
    pub affected: Vec<Order>,
    pub delivered: Vec<Order>,
}

/// A single-drone dispatcher for incoming orders.
///
/// All times are logical and supplied by the caller, who must pass
/// non-decreasing `now` values across calls. Returned orders are copies;
/// the dispatcher is the only owner of scheduled orders.
pub trait Dispatcher {
    /// Orders currently scheduled and not yet delivered
    type ScheduledOrders<'a>: Iterator<Item = &'a Order>
    where
        Self: 'a;

    /// Returns every scheduled order, in no particular order
    fn scheduled_orders<'a>(&'a self) -> Self::ScheduledOrders<'a>;

    /// Removes and returns every order whose arrival estimate is at or before
    /// `now`, ascending by ETA. Calling it again with the same `now` returns
    /// nothing.
    fn purge_delivered(&mut self, now: Time) -> Vec<Order>;

    /// Schedules a new order behind every order of equal or higher priority
    fn create(
        &mut self,
        id: OrderId,
        now: Time,
        value: u64,
        flight_time: Time,
    ) -> Result<Creation, DispatchError>;

    /// Cancels an order the drone has not yet left for
    fn cancel(&mut self, id: OrderId, now: Time) -> Result<Cancellation, DispatchError>;

    /// Changes the one-way flight time of an order the drone has not yet left for
    fn update_flight_time(
        &mut self,
        id: OrderId,
        now: Time,
        flight_time: Time,
    ) -> Result<FlightTimeUpdate, DispatchError>;

    /// Delivers everything that remains, ascending by ETA. Nothing is
    /// scheduled afterwards.
    fn shutdown(&mut self) -> Vec<Order>;

    /// Looks up a scheduled order
    fn find(&self, id: OrderId) -> Option<&Order> {
        self.scheduled_orders().find(|order| order.id() == id)
    }

    /// Returns a copy of a scheduled order
    fn info(&self, id: OrderId) -> Result<Order, DispatchError> {
        self.find(id).cloned().ok_or(DispatchError::NotFound(id))
    }

    /// Orders arriving within `[from, to]`, ascending by ETA
    fn range(&self, from: Time, to: Time) -> Vec<Order> {
        self.scheduled_orders()
            .filter(|order| (from..=to).contains(&order.arrival_estimate()))
            .cloned()
            .sorted_by_key(by_arrival)
            .collect()
    }

    /// Number of scheduled orders arriving strictly before `id`.
    /// An unknown id yields `0` rather than an error.
    fn rank(&self, id: OrderId) -> usize {
        let Some(eta) = self.find(id).map(Order::arrival_estimate) else {
            return 0;
        };

        self.scheduled_orders()
            .filter(|order| order.arrival_estimate() < eta)
            .count()
    }
}

/// Sort key used for every "ascending by ETA" list; ties go to the lower id
pub fn by_arrival(order: &Order) -> (Time, OrderId) {
    (order.arrival_estimate(), order.id())
}
