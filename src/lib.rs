//! Update-detection and notification-delivery pipeline for tracked
//! external resources (GitHub repositories, Stack Overflow questions).
//!
//! A [`scheduler::Scheduler`] periodically pages through the
//! [`store::LinkStore`], hands each batch to the
//! [`processor::LinkProcessor`], which dispatches every link to the
//! [`handlers::UpdateHandler`] for its source type. Handlers fetch
//! items newer than the link's watermark via a resource client
//! (retrying with backoff behind a circuit breaker), render messages
//! and push them through the [`notify::NotificationSender`] failover
//! chain towards the messaging front end.

pub mod config;
pub mod errors;
pub mod github;
pub mod handlers;
pub mod logger;
pub mod notify;
pub mod processor;
pub mod resilience;
pub mod scheduler;
pub mod stackoverflow;
pub mod store;
