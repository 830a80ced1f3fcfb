//! Value types shared across the pipeline.

pub mod market;
pub mod order;
pub mod signal;

pub use market::{Bar, BrokerAccount, Quote};
pub use order::{
    OrderPurpose, OrderRequest, OrderSide, OrderStatus, OrderType, OrderValidationError,
    TimeInForce,
};
pub use signal::{Signal, SignalAction};
