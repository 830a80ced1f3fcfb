//! Order lifecycle state machine.
//!
//! ```text
//! PENDING ──────────────► PARTIALLY_FILLED
//!    │  │                     │  │
//!    │  ├────► FILLED ◄───────┘  │
//!    │  ├────► CANCELLED ◄───────┤
//!    │  └────► REJECTED          │
//!    └───────► EXPIRED ◄─────────┘
//! ```
//!
//! FILLED, CANCELLED, REJECTED and EXPIRED are terminal. A cancel or timeout
//! on a partially filled order leaves the filled portion intact; the machine
//! never retroactively un-fills.

use crate::models::OrderStatus;

/// Validates order status transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a status transition is valid.
    #[must_use]
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From Pending
            (OrderStatus::Pending, OrderStatus::PartiallyFilled)
                | (OrderStatus::Pending, OrderStatus::Filled)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Pending, OrderStatus::Expired)
                // From PartiallyFilled
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Cancelled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Expired)
        )
    }

    /// All valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
                OrderStatus::Rejected,
                OrderStatus::Expired,
            ],
            OrderStatus::PartiallyFilled => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
                OrderStatus::Expired,
            ],
            // Terminal states
            OrderStatus::Filled
            | OrderStatus::Cancelled
            | OrderStatus::Rejected
            | OrderStatus::Expired => vec![],
        }
    }
}
