//! Text rendering of dispatcher results, one line per event.

use itertools::Itertools;
use schema::{Order, OrderId};

pub fn created(order: &Order) -> String {
    format!(
        "Order {} has been created - ETA: {}",
        order.id(),
        order.arrival_estimate()
    )
}

/// `None` when nothing was updated
pub fn updated(orders: &[Order]) -> Option<String> {
    (!orders.is_empty()).then(|| {
        format!(
            "Updated ETAs: [{}]",
            orders
                .iter()
                .map(|order| format!("{}:{}", order.id(), order.arrival_estimate()))
                .join(",")
        )
    })
}

pub fn delivered(order: &Order) -> String {
    format!(
        "Order {} has been delivered at time {}",
        order.id(),
        order.arrival_estimate()
    )
}

pub fn cancelled(id: OrderId) -> String {
    format!("Order {} has been canceled", id)
}

pub fn cannot_cancel(id: OrderId) -> String {
    format!("Cannot cancel. Order {} has already been delivered", id)
}

pub fn cannot_update(id: OrderId) -> String {
    format!("Cannot update. Order {} has already been delivered", id)
}

pub fn order_info(order: &Order) -> String {
    format!(
        "[{}, {}, {}, {}, {}]",
        order.id(),
        order.creation_time(),
        order.value(),
        order.flight_time(),
        order.arrival_estimate()
    )
}

pub fn range(orders: &[Order]) -> String {
    if orders.is_empty() {
        return "There are no orders in that time period".to_string();
    }
    format!("[{}]", orders.iter().map(Order::id).join(","))
}

pub fn rank(id: OrderId, ahead: usize) -> String {
    format!("Order {} will be delivered after {} orders", id, ahead)
}
