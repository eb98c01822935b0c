pub mod error;
pub mod rate_limiter;
pub mod service;
pub mod sweeper;

pub use error::ApplicationError;
pub use rate_limiter::RateLimiter;
pub use service::{
    HoldPolicy, InventoryApplicationService, PaymentEventKind, ReservationService,
    SettlementOutcome, SettlementService,
};
pub use sweeper::{ExpirySweeper, SweepReport};
