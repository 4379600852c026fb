use std::cmp::Reverse;

use itertools::Itertools;
use schema::{
    by_arrival, Cancellation, Creation, DispatchError, Dispatcher, FlightTimeUpdate, Order,
    OrderId, PriorityWeights, Time,
};

use crate::tree::{self, PriorityTree};

/// Single-drone dispatcher which serves orders strictly by priority score.
///
/// Every scheduled order lives in a `PriorityTree`. The drone is implicit:
/// an order's arrival estimate already accounts for every round trip
/// scheduled ahead of it, and at most one order is in flight at a time.
#[derive(Debug, Default)]
pub struct DispatchScheduler {
    /// Weights used to score new orders
    weights: PriorityWeights,
    /// Orders that have not yet been delivered
    tree: PriorityTree,
    /// Order the drone has left for but not yet delivered, as of the last purge
    active_flight: Option<OrderId>,
}

impl DispatchScheduler {
    pub fn new(weights: PriorityWeights) -> Self {
        Self {
            weights,
            tree: PriorityTree::new(),
            active_flight: None,
        }
    }

    /// Number of scheduled orders
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// The order the drone is flying for, as of the last operation.
    ///
    /// Re-derived after every purge and after every change to the schedule,
    /// so an in-flight order pushed back by a later create is dropped here
    /// once its new departure is no longer in the past.
    pub fn active_flight(&self) -> Option<Order> {
        self.active_flight.and_then(|id| self.tree.get(id)).cloned()
    }

    /// Whether the underlying tree still satisfies the AVL invariant
    pub fn is_balanced(&self) -> bool {
        self.tree.is_balanced()
    }

    /// Re-derives the in-flight order from the scheduled set at `now`.
    ///
    /// Candidates are orders whose departure is strictly before `now`; if
    /// more than one qualifies the earliest departure wins, then the lower id.
    fn observe_flight(&mut self, now: Time) {
        self.active_flight = self
            .tree
            .iter()
            .filter(|order| order.departure_time() < now)
            .min_by_key(|order| (order.departure_time(), order.id()))
            .map(Order::id);

        if let Some(id) = self.active_flight {
            log::debug!("order {} is in flight at {}", id, now);
        }
    }

    /// Fails unless `id` is scheduled and the drone has not yet left for it
    fn ensure_pending(&self, id: OrderId, now: Time) -> Result<&Order, DispatchError> {
        match self.tree.get(id) {
            Some(order) if !order.is_out_for_delivery(now) => Ok(order),
            _ => Err(DispatchError::AlreadyDelivered(id)),
        }
    }

    /// Arrival estimate for `order` given everything currently scheduled.
    ///
    /// The order queues behind the latest-arriving order of equal or higher
    /// priority (ties: the later return, then the lower id). With nothing
    /// ahead of it, it only waits for a flight already under way.
    /// `None` if the arrival or the matching return leaves the `Time` range.
    fn arrival_for(&self, order: &Order, now: Time) -> Option<Time> {
        let anchor = self
            .tree
            .iter_at_least(order.priority())
            .max_by_key(|ahead| {
                (
                    ahead.arrival_estimate(),
                    ahead.return_time(),
                    Reverse(ahead.id()),
                )
            });

        let previous = anchor.or_else(|| self.active_flight.and_then(|id| self.tree.get(id)));
        let start = previous.map_or(now, Order::return_time);
        let arrival = start.checked_add(order.flight_time())?;
        arrival.checked_add(order.flight_time())?;
        Some(arrival)
    }

    /// Whether every order matching `moves` can be shifted by `delta`
    fn can_shift(&self, delta: Time, moves: impl Fn(&Order) -> bool) -> bool {
        self.tree
            .iter()
            .filter(|order| moves(order))
            .all(|order| order.checked_shift(delta).is_some())
    }
}

impl Dispatcher for DispatchScheduler {
    type ScheduledOrders<'a> = tree::Iter<'a>;

    fn scheduled_orders(&self) -> Self::ScheduledOrders<'_> {
        self.tree.iter()
    }

    fn find(&self, id: OrderId) -> Option<&Order> {
        self.tree.get(id)
    }

    fn purge_delivered(&mut self, now: Time) -> Vec<Order> {
        let delivered = self
            .tree
            .drain_where(|order| order.is_delivered_by(now))
            .into_iter()
            .sorted_by_key(by_arrival)
            .collect::<Vec<_>>();

        if !delivered.is_empty() {
            log::debug!("{} orders delivered by {}", delivered.len(), now);
        }
        self.observe_flight(now);

        delivered
    }

    fn create(
        &mut self,
        id: OrderId,
        now: Time,
        value: u64,
        flight_time: Time,
    ) -> Result<Creation, DispatchError> {
        let delivered = self.purge_delivered(now);

        if flight_time <= 0 {
            log::warn!("rejecting order {}: flight time {}", id, flight_time);
            return Err(DispatchError::InvalidFlightTime(flight_time));
        }
        if self.tree.contains(id) {
            log::warn!("rejecting order {}: already scheduled", id);
            return Err(DispatchError::DuplicateId(id));
        }

        let mut order = Order::new(id, now, value, flight_time, &self.weights);
        let waits_for_flight = self.tree.iter_at_least(order.priority()).next().is_none();
        // Only a flight the new order has to wait for is exempt: it is already
        // under way and cannot be pushed back.
        let exempt = self.active_flight.filter(|_| waits_for_flight);

        let schedule = self
            .arrival_for(&order, now)
            .zip(flight_time.checked_mul(2))
            .filter(|&(_, round_trip)| {
                self.can_shift(round_trip, |lower| {
                    lower.priority() < order.priority() && Some(lower.id()) != exempt
                })
            });
        let Some((arrival, round_trip)) = schedule else {
            log::warn!("rejecting order {}: flight time {} overflows", id, flight_time);
            return Err(DispatchError::TimeOverflow(id));
        };

        order.schedule_at(arrival);
        self.tree.insert(order.clone())?;

        let mut cascaded = vec![];
        self.tree.for_each_below_mut(order.priority(), |lower| {
            if Some(lower.id()) != exempt {
                lower.shift(round_trip);
                cascaded.push(lower.clone());
            }
        });
        self.observe_flight(now);

        log::info!(
            "order {} created at {} with priority {}, ETA {} ({} orders pushed back)",
            id,
            now,
            order.priority(),
            order.arrival_estimate(),
            cascaded.len()
        );

        Ok(Creation {
            created: order,
            cascaded: cascaded.into_iter().sorted_by_key(by_arrival).collect(),
            delivered,
        })
    }

    fn cancel(&mut self, id: OrderId, now: Time) -> Result<Cancellation, DispatchError> {
        let delivered = self.purge_delivered(now);

        let target = self.ensure_pending(id, now)?;
        let (key, old_arrival) = (target.priority(), target.arrival_estimate());
        let freed = target.flight_time().checked_mul(2);
        let Some(freed) = freed.filter(|&freed| {
            self.can_shift(-freed, |later| later.arrival_estimate() > old_arrival)
        }) else {
            log::warn!("refusing to cancel order {}: shifted times overflow", id);
            return Err(DispatchError::TimeOverflow(id));
        };
        let cancelled = self.tree.remove(id, key)?;

        let mut cascaded = vec![];
        self.tree.for_each_mut(|later| {
            if later.arrival_estimate() > old_arrival {
                later.shift(-freed);
                cascaded.push(later.clone());
            }
        });
        self.observe_flight(now);

        log::info!(
            "order {} cancelled at {} ({} orders moved earlier)",
            id,
            now,
            cascaded.len()
        );

        Ok(Cancellation {
            cancelled,
            cascaded: cascaded.into_iter().sorted_by_key(by_arrival).collect(),
            delivered,
        })
    }

    fn update_flight_time(
        &mut self,
        id: OrderId,
        now: Time,
        flight_time: Time,
    ) -> Result<FlightTimeUpdate, DispatchError> {
        let delivered = self.purge_delivered(now);

        let target = self.ensure_pending(id, now)?;
        if flight_time <= 0 {
            log::warn!("rejecting flight time {} for order {}", flight_time, id);
            return Err(DispatchError::InvalidFlightTime(flight_time));
        }

        let old_arrival = target.arrival_estimate();
        let retimed = target.checked_retime(flight_time);
        let delta = flight_time
            .checked_sub(target.flight_time())
            .and_then(|difference| difference.checked_mul(2))
            .filter(|&delta| {
                self.can_shift(delta, |later| {
                    later.id() != id && later.arrival_estimate() > old_arrival
                })
            });
        let (Some(_), Some(delta)) = (retimed, delta) else {
            log::warn!("rejecting flight time {} for order {}: overflows", flight_time, id);
            return Err(DispatchError::TimeOverflow(id));
        };

        let mut affected = vec![];
        self.tree.for_each_mut(|order| {
            if order.id() == id {
                order.retime(flight_time);
                affected.push(order.clone());
            } else if order.arrival_estimate() > old_arrival {
                order.shift(delta);
                affected.push(order.clone());
            }
        });
        self.observe_flight(now);

        log::info!(
            "order {} flight time set to {} at {} ({} orders affected)",
            id,
            flight_time,
            now,
            affected.len()
        );

        Ok(FlightTimeUpdate {
            affected: affected.into_iter().sorted_by_key(by_arrival).collect(),
            delivered,
        })
    }

    fn shutdown(&mut self) -> Vec<Order> {
        self.active_flight = None;
        let remaining = self
            .tree
            .drain()
            .into_iter()
            .sorted_by_key(by_arrival)
            .collect::<Vec<_>>();

        log::info!("shutting down with {} orders left to deliver", remaining.len());
        remaining
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn unit_scheduler() -> DispatchScheduler {
        DispatchScheduler::new(PriorityWeights::unit())
    }

    fn etas(orders: &[Order]) -> Vec<(u64, Time)> {
        orders
            .iter()
            .map(|order| (order.id().0, order.arrival_estimate()))
            .collect()
    }

    fn snapshot(scheduler: &DispatchScheduler) -> Vec<(u64, Time)> {
        let orders = scheduler
            .scheduled_orders()
            .cloned()
            .sorted_by_key(|order| order.id())
            .collect::<Vec<_>>();
        etas(&orders)
    }

    #[test]
    fn test_first_order_departs_immediately() {
        let mut scheduler = unit_scheduler();
        let creation = scheduler.create(OrderId(1), 0, 200, 3).unwrap();

        assert_eq!(creation.created.arrival_estimate(), 3);
        assert_eq!(creation.created.priority(), 4.0);
        assert!(creation.cascaded.is_empty());
        assert!(creation.delivered.is_empty());
    }

    #[test]
    fn test_lower_priority_queues_behind_round_trip() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap();

        let b = scheduler.create(OrderId(2), 1, 100, 2).unwrap();
        assert_eq!(b.created.priority(), 1.0);
        assert_eq!(b.created.arrival_estimate(), 8);
        assert!(b.cascaded.is_empty());
        assert_eq!(scheduler.info(OrderId(1)).unwrap().arrival_estimate(), 3);

        let cancellation = scheduler.cancel(OrderId(2), 4).unwrap();
        assert_eq!(cancellation.cancelled.id(), OrderId(2));
        assert!(cancellation.cascaded.is_empty());
        assert_eq!(etas(&cancellation.delivered), vec![(1, 3)]);

        assert_eq!(scheduler.rank(OrderId(1)), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_higher_priority_waits_for_active_flight() {
        let mut scheduler = unit_scheduler();
        // 101: priority 4, departs 2, arrives 6, back at 10
        scheduler.create(OrderId(101), 2, 300, 4).unwrap();

        // 102 outranks 101, but 101 is already in the air at 3
        let creation = scheduler.create(OrderId(102), 3, 600, 3).unwrap();
        assert_eq!(creation.created.arrival_estimate(), 13);
        assert!(creation.cascaded.is_empty());
        assert_eq!(scheduler.active_flight().map(|o| o.id()), Some(OrderId(101)));
        assert_eq!(scheduler.info(OrderId(101)).unwrap().arrival_estimate(), 6);
    }

    #[test]
    fn test_higher_priority_jumps_the_queue() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 100, 5).unwrap(); // p 2, ETA 5
        scheduler.create(OrderId(2), 0, 50, 2).unwrap(); // p 1, ETA 5+5+2 = 12

        // At time 0 nothing has departed yet, so the new top order leaves now.
        let creation = scheduler.create(OrderId(3), 0, 500, 1).unwrap();
        assert_eq!(creation.created.arrival_estimate(), 1);
        assert_eq!(etas(&creation.cascaded), vec![(1, 7), (2, 14)]);
    }

    #[test]
    fn test_in_flight_order_is_not_pushed_back() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 100, 5).unwrap(); // p 2, departs 0, ETA 5
        scheduler.create(OrderId(2), 0, 50, 2).unwrap(); // p 1, ETA 12

        // At 1 the drone is flying order 1; order 3 outranks everyone.
        let creation = scheduler.create(OrderId(3), 1, 500, 1).unwrap(); // p 9
        assert_eq!(creation.created.arrival_estimate(), 5 + 5 + 1);
        assert_eq!(etas(&creation.cascaded), vec![(2, 14)]);
        assert_eq!(scheduler.info(OrderId(1)).unwrap().arrival_estimate(), 5);
    }

    #[test]
    fn test_equal_priority_queues_behind() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 100, 2).unwrap(); // p 2, ETA 2
        let creation = scheduler.create(OrderId(2), 0, 100, 3).unwrap(); // p 2
        assert_eq!(creation.created.arrival_estimate(), 2 + 2 + 3);
        assert!(creation.cascaded.is_empty());

        assert!(scheduler.cancel(OrderId(1), 0).is_err());
        assert!(scheduler.is_balanced());
    }

    #[test]
    fn test_create_then_cancel_restores_schedule() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 400, 3).unwrap();
        scheduler.create(OrderId(2), 1, 200, 4).unwrap();
        scheduler.create(OrderId(3), 2, 100, 2).unwrap();
        let before = snapshot(&scheduler);

        let creation = scheduler.create(OrderId(9), 2, 300, 5).unwrap();
        assert!(!creation.cascaded.is_empty());
        scheduler.cancel(OrderId(9), 2).unwrap();

        assert_eq!(snapshot(&scheduler), before);
    }

    #[test]
    fn test_cancel_in_flight_or_unknown() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap();

        assert_eq!(
            scheduler.cancel(OrderId(1), 0),
            Err(DispatchError::AlreadyDelivered(OrderId(1)))
        );
        assert_eq!(
            scheduler.cancel(OrderId(42), 0),
            Err(DispatchError::AlreadyDelivered(OrderId(42)))
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_cancel_moves_later_orders_earlier() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(101), 2, 300, 4).unwrap(); // ETA 6
        scheduler.create(OrderId(102), 3, 600, 3).unwrap(); // ETA 13
        scheduler.create(OrderId(103), 7, 200, 2).unwrap(); // ETA 18, 101 delivered
        scheduler.create(OrderId(104), 8, 500, 3).unwrap(); // ETA 19, 103 -> 24

        let cancellation = scheduler.cancel(OrderId(102), 9).unwrap();
        assert_eq!(etas(&cancellation.cascaded), vec![(104, 13), (103, 18)]);
        assert!(cancellation.delivered.is_empty());
    }

    #[test]
    fn test_update_flight_time_ripples() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1001), 1, 200, 3).unwrap(); // ETA 4
        scheduler.create(OrderId(1002), 3, 250, 6).unwrap(); // ETA 13
        scheduler.create(OrderId(1003), 8, 100, 3).unwrap(); // ETA 22
        scheduler.create(OrderId(1004), 13, 100, 5).unwrap(); // ETA 30

        let update = scheduler.update_flight_time(OrderId(1003), 15, 1).unwrap();
        assert_eq!(etas(&update.affected), vec![(1003, 20), (1004, 26)]);
        assert!(update.delivered.is_empty());

        let edited = scheduler.info(OrderId(1003)).unwrap();
        assert_eq!(edited.flight_time(), 1);
        // Priority is frozen at creation
        assert_eq!(edited.priority(), 2.0 - 8.0);
    }

    #[test]
    fn test_update_rejected_once_departed() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap();

        assert_eq!(
            scheduler.update_flight_time(OrderId(1), 1, 5),
            Err(DispatchError::AlreadyDelivered(OrderId(1)))
        );
        assert_eq!(scheduler.info(OrderId(1)).unwrap().flight_time(), 3);
    }

    #[test]
    fn test_invalid_flight_time() {
        let mut scheduler = unit_scheduler();
        assert_eq!(
            scheduler.create(OrderId(1), 0, 200, 0),
            Err(DispatchError::InvalidFlightTime(0))
        );
        scheduler.create(OrderId(2), 0, 200, 3).unwrap();
        scheduler.create(OrderId(3), 0, 100, 3).unwrap();
        assert_eq!(
            scheduler.update_flight_time(OrderId(3), 0, -1),
            Err(DispatchError::InvalidFlightTime(-1))
        );
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_overflowing_flight_time_is_rejected() {
        let mut scheduler = unit_scheduler();
        assert_eq!(
            scheduler.create(OrderId(1), 0, 100, Time::MAX / 2 + 1),
            Err(DispatchError::TimeOverflow(OrderId(1)))
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_overflowing_cascade_leaves_schedule_untouched() {
        let mut scheduler = unit_scheduler();
        let long_haul = Time::MAX / 3;
        scheduler.create(OrderId(1), 0, 50, long_haul).unwrap(); // p 1

        // Fits on its own, but pushing order 1 back by its round trip does not
        assert_eq!(
            scheduler.create(OrderId(2), 0, 500, long_haul),
            Err(DispatchError::TimeOverflow(OrderId(2)))
        );
        assert_eq!(scheduler.len(), 1);
        assert_eq!(
            scheduler.info(OrderId(1)).unwrap().arrival_estimate(),
            long_haul
        );
    }

    #[test]
    fn test_overflowing_update_is_rejected() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap(); // ETA 3
        scheduler.create(OrderId(2), 0, 100, 2).unwrap(); // ETA 8

        assert_eq!(
            scheduler.update_flight_time(OrderId(2), 0, Time::MAX / 2),
            Err(DispatchError::TimeOverflow(OrderId(2)))
        );
        let unchanged = scheduler.info(OrderId(2)).unwrap();
        assert_eq!(unchanged.flight_time(), 2);
        assert_eq!(unchanged.arrival_estimate(), 8);
    }

    #[test]
    fn test_pushed_back_flight_is_no_longer_active() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 100, 5).unwrap(); // p 2, departs 0, ETA 5
        scheduler.create(OrderId(2), 1, 600, 1).unwrap(); // p 11, waits for 1: ETA 11
        assert_eq!(scheduler.active_flight().map(|o| o.id()), Some(OrderId(1)));

        // Order 3 queues behind order 2, so nothing is exempt from its cascade
        let creation = scheduler.create(OrderId(3), 2, 400, 1).unwrap(); // p 6
        assert_eq!(creation.created.arrival_estimate(), 13);
        assert_eq!(etas(&creation.cascaded), vec![(1, 7)]);

        // Order 1 now departs at 2, which is not before 2
        assert!(scheduler.active_flight().is_none());
    }

    #[test]
    fn test_duplicate_id() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap();
        assert_eq!(
            scheduler.create(OrderId(1), 1, 900, 1),
            Err(DispatchError::DuplicateId(OrderId(1)))
        );
        assert_eq!(scheduler.info(OrderId(1)).unwrap().value(), 200);
    }

    #[test]
    fn test_purge_is_monotone() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap(); // ETA 3
        scheduler.create(OrderId(2), 0, 100, 2).unwrap(); // ETA 8
        scheduler.create(OrderId(3), 0, 50, 1).unwrap(); // ETA 11

        let delivered = scheduler.purge_delivered(8);
        assert_eq!(etas(&delivered), vec![(1, 3), (2, 8)]);
        assert!(delivered.iter().all(|order| order.arrival_estimate() <= 8));
        assert!(scheduler.purge_delivered(8).is_empty());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_queries() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 200, 3).unwrap(); // ETA 3
        scheduler.create(OrderId(2), 0, 100, 2).unwrap(); // ETA 8
        scheduler.create(OrderId(3), 0, 50, 1).unwrap(); // ETA 11

        assert_eq!(etas(&scheduler.range(3, 8)), vec![(1, 3), (2, 8)]);
        assert!(scheduler.range(12, 20).is_empty());

        for order in scheduler.scheduled_orders() {
            let earlier = scheduler
                .scheduled_orders()
                .filter(|other| other.arrival_estimate() < order.arrival_estimate())
                .count();
            assert_eq!(scheduler.rank(order.id()), earlier);
        }
        assert_eq!(scheduler.rank(OrderId(3)), 2);
        assert_eq!(scheduler.rank(OrderId(99)), 0);

        assert_eq!(
            scheduler.info(OrderId(99)),
            Err(DispatchError::NotFound(OrderId(99)))
        );
    }

    #[test]
    fn test_shutdown_delivers_everything() {
        let mut scheduler = unit_scheduler();
        scheduler.create(OrderId(1), 0, 50, 1).unwrap();
        scheduler.create(OrderId(2), 0, 200, 3).unwrap();
        scheduler.create(OrderId(3), 0, 100, 2).unwrap();

        let remaining = scheduler.shutdown();
        let arrivals = remaining
            .iter()
            .map(Order::arrival_estimate)
            .collect::<Vec<_>>();
        assert_eq!(remaining.len(), 3);
        assert!(arrivals.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(scheduler.is_empty());
        assert!(scheduler.shutdown().is_empty());
        assert!(scheduler.active_flight().is_none());
    }
}
