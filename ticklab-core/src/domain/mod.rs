//! Domain types for TickLab.

pub mod bar;
pub mod book;
pub mod funding;
pub mod market;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use book::{BookLevel, BookSnapshot};
pub use funding::FundingRate;
pub use market::MarketState;
pub use order::{Order, OrderId, OrderKind, PendingOrder, Side};
pub use position::Position;
pub use trade::{Trade, TradePrint};
