//! The simulated exchange and funding settlement.

pub mod funding;
pub mod sim;

pub use funding::{FundingClock, FundingTape};
pub use sim::{OrderError, SimExchange};
