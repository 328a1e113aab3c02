//! Fan-out dispatch engine for comment activity events.
//!
//! Pipeline for one event:
//! 1. An upstream comment action constructs a validated
//!    [`herald_common::types::EventPayload`]
//! 2. [`resolver::RecipientResolver`] computes the ordered, deduplicated
//!    recipient set from the payload's membership snapshot
//! 3. [`dispatcher::ChannelDispatcher`] attempts delivery per
//!    (recipient, channel) triple, consulting the [`ledger::DeliveryLedger`]
//!    before every attempt and recording every outcome back into it
//!
//! The ledger is the only shared mutable state; its atomic pending
//! transition is what gives the pipeline at-most-once delivered-notification
//! semantics under retries and concurrent dispatch workers.

pub mod dispatcher;
pub mod ledger;
pub mod postgres;
pub mod resolver;
pub mod traits;
