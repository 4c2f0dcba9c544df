//! bibfilter-core: Core types for beam-induced background filtering.
//!
//! This crate provides the shared data model: hits and their sensor
//! addresses, events with named collections, cell-ID decoding, per-hit
//! acceptance flags, and the [`EventFilter`] trait implemented by every
//! background-rejection algorithm.
//!

pub mod acceptance;
pub mod decoder;
pub mod error;
pub mod event;
pub mod filter;
pub mod hit;

pub use acceptance::AcceptanceMap;
pub use decoder::{BitFieldDecoder, CellIdDecoder};
pub use error::{Error, Result};
pub use event::{relations_by_hit, Event, HitCollection, McParticle, Relation, Track};
pub use filter::{EventFilter, EventSummary, RunStatistics};
pub use hit::{wrap_phi, Hit, Position, SensorAddress};
