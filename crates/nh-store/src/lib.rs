//! Relational persistence layer: typed repositories over notifications and their
//! append-only state-transition logs (§4.2).

pub mod postgres;
pub mod repository;

pub use postgres::PostgresStore;
pub use repository::{
    NewNotificationLog, NotificationLogRepository, NotificationRepository, Result, StatsLast24h,
    StoreError,
};
