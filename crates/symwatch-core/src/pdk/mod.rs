//! Building blocks for derivers.
//!
//! A deriver consumes a [`RawEvent`] coming from the kernel instrumentation layer
//! and either synthesizes a higher level [`Payload`] or stays silent. Each run has
//! exactly three outcomes:
//!
//! - `Ok(Some(payload))`: an event is derived
//! - `Ok(None)`: nothing interesting happened, the raw event is suppressed
//! - `Err(err)`: the raw event couldn't be processed
//!
//! [`SingleEventDeriver`] turns a payload deriver into a full [`Event`] deriver,
//! copying the header of the source event.

mod config;
mod deriver;

pub use crate::event::{Event, ExtractionError, Payload, RawEvent};
pub use config::*;
pub use deriver::*;
