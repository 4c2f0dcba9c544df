//! Event and collection types.
//!
//! An [`Event`] holds every collection of one bunch crossing keyed by
//! name. Lookups return [`Error::MissingCollection`] instead of failing
//! hard so callers can skip the event and carry on.

use crate::decoder::BitFieldDecoder;
use crate::error::{Error, Result};
use crate::hit::{Hit, Position, SensorAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hits of one detector subsystem plus their cell-ID schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitCollection {
    /// Cell-ID schema string.
    #[serde(default)]
    pub encoding: String,
    /// Hits in input order.
    pub hits: Vec<Hit>,
}

impl HitCollection {
    /// Creates an empty collection with the given schema.
    #[must_use]
    pub fn new(encoding: impl Into<String>) -> Self {
        Self {
            encoding: encoding.into(),
            hits: Vec::new(),
        }
    }

    /// Creates an empty collection sharing another collection's schema.
    #[must_use]
    pub fn like(other: &Self, capacity: usize) -> Self {
        Self {
            encoding: other.encoding.clone(),
            hits: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the collection has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Appends a hit.
    pub fn push(&mut self, hit: Hit) {
        self.hits.push(hit);
    }

    /// Builds a decoder for this collection's schema.
    ///
    /// # Errors
    /// Returns [`Error::InvalidEncoding`] if the schema is malformed.
    pub fn decoder(&self) -> Result<BitFieldDecoder> {
        BitFieldDecoder::new(&self.encoding)
    }

    /// Decodes the sensor address of every hit, in order.
    ///
    /// # Errors
    /// Fails if the schema is malformed or lacks an address field.
    pub fn sensor_addresses(&self) -> Result<Vec<SensorAddress>> {
        let decoder = self.decoder()?;
        self.hits
            .iter()
            .map(|hit| SensorAddress::decode(&decoder, hit.cell_id))
            .collect()
    }
}

/// Weighted link from a reconstructed hit to its simulated origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Index of the reconstructed hit in its collection.
    pub from: usize,
    /// Identifier of the simulated hit.
    pub to: u64,
    /// Relation weight.
    #[serde(default = "unit_weight")]
    pub weight: f32,
}

fn unit_weight() -> f32 {
    1.0
}

impl Relation {
    /// Creates a relation.
    #[must_use]
    pub fn new(from: usize, to: u64, weight: f32) -> Self {
        Self { from, to, weight }
    }
}

/// Groups relations by their reconstructed-hit index.
#[must_use]
pub fn relations_by_hit(relations: &[Relation], n_hits: usize) -> Vec<Vec<Relation>> {
    let mut grouped = vec![Vec::new(); n_hits];
    for rel in relations {
        if let Some(slot) = grouped.get_mut(rel.from) {
            slot.push(*rel);
        } else {
            log::warn!(
                "relation points at hit {} but collection holds {} hits",
                rel.from,
                n_hits
            );
        }
    }
    grouped
}

/// A reconstructed track and the tracker hits attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub hits: Vec<Hit>,
}

/// Generator-level particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McParticle {
    /// Momentum (GeV).
    pub momentum: Position,
    /// Energy (GeV).
    pub energy: f64,
    /// Generator status; 1 marks final-state particles.
    pub generator_status: i32,
}

/// One event with its named collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub run: i32,
    #[serde(default)]
    pub number: i32,
    #[serde(default)]
    pub hits: BTreeMap<String, HitCollection>,
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<Relation>>,
    #[serde(default)]
    pub tracks: BTreeMap<String, Vec<Track>>,
    #[serde(default)]
    pub particles: BTreeMap<String, Vec<McParticle>>,
}

impl Event {
    /// Creates an empty event.
    #[must_use]
    pub fn new(run: i32, number: i32) -> Self {
        Self {
            run,
            number,
            ..Self::default()
        }
    }

    /// Looks up a hit collection.
    ///
    /// # Errors
    /// Returns [`Error::MissingCollection`] if absent.
    pub fn hit_collection(&self, name: &str) -> Result<&HitCollection> {
        self.hits
            .get(name)
            .ok_or_else(|| Error::MissingCollection(name.to_string()))
    }

    /// Looks up a relation collection.
    ///
    /// # Errors
    /// Returns [`Error::MissingCollection`] if absent.
    pub fn relation_collection(&self, name: &str) -> Result<&[Relation]> {
        self.relations
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingCollection(name.to_string()))
    }

    /// Looks up a track collection.
    ///
    /// # Errors
    /// Returns [`Error::MissingCollection`] if absent.
    pub fn track_collection(&self, name: &str) -> Result<&[Track]> {
        self.tracks
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingCollection(name.to_string()))
    }

    /// Looks up an MC particle collection.
    ///
    /// # Errors
    /// Returns [`Error::MissingCollection`] if absent.
    pub fn particle_collection(&self, name: &str) -> Result<&[McParticle]> {
        self.particles
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingCollection(name.to_string()))
    }

    /// Stores a hit collection, replacing any with the same name.
    pub fn add_hits(&mut self, name: impl Into<String>, collection: HitCollection) {
        self.hits.insert(name.into(), collection);
    }

    /// Stores a relation collection, replacing any with the same name.
    pub fn add_relations(&mut self, name: impl Into<String>, relations: Vec<Relation>) {
        self.relations.insert(name.into(), relations);
    }
}
