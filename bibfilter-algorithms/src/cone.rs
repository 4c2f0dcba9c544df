//! Truth-cone selection for calorimeter hits.
//!
//! Keeps only hits within a fixed opening angle of a final-state
//! generator particle. Useful to isolate the signal shower when studying
//! background rejection.

use bibfilter_core::{
    relations_by_hit, Event, EventFilter, EventSummary, Hit, HitCollection, McParticle,
    Relation, Result,
};

/// Event filter keeping calorimeter hits inside a cone around MC truth.
pub struct ConeFilter {
    width: f64,
    particles: String,
    input: String,
    output: String,
    relations: Option<(String, String)>,
}

impl ConeFilter {
    /// Default cone half-angle (rad).
    pub const DEFAULT_WIDTH: f64 = 0.2;
    /// Default MC particle collection.
    pub const DEFAULT_PARTICLES: &'static str = "MCParticle";
    /// Default input collection.
    pub const DEFAULT_INPUT: &'static str = "EcalBarrelCollectionRec";
    /// Default output collection.
    pub const DEFAULT_OUTPUT: &'static str = "EcalBarrelCollectionConed";
    /// Default output relation collection.
    pub const DEFAULT_OUTPUT_RELATIONS: &'static str = "EcalBarrelRelationsSimConed";

    /// Creates the filter.
    #[must_use]
    pub fn new(
        width: f64,
        particles: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            width,
            particles: particles.into(),
            input: input.into(),
            output: output.into(),
            relations: None,
        }
    }

    /// Propagates relations from `input` to `output`.
    #[must_use]
    pub fn with_relations(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.relations = Some((input.into(), output.into()));
        self
    }

    fn in_cone(&self, particles: &[McParticle], hit: &Hit) -> bool {
        particles
            .iter()
            .filter(|p| p.generator_status == 1)
            .any(|p| p.momentum.angle(&hit.position) < self.width)
    }
}

impl EventFilter for ConeFilter {
    fn name(&self) -> &'static str {
        "cone"
    }

    fn process_event(&mut self, event: &mut Event) -> Result<EventSummary> {
        let particles = event.particle_collection(&self.particles)?;
        let collection = event.hit_collection(&self.input)?;
        let input_relations = match &self.relations {
            Some((name, _)) => Some(relations_by_hit(
                event.relation_collection(name)?,
                collection.len(),
            )),
            None => None,
        };

        let mut coned = HitCollection::like(collection, collection.len());
        let mut out_relations = Vec::new();
        for (i, hit) in collection.hits.iter().enumerate() {
            if !self.in_cone(particles, hit) {
                continue;
            }
            let out_index = coned.len();
            coned.push(*hit);
            if let Some(grouped) = &input_relations {
                out_relations.extend(
                    grouped[i]
                        .iter()
                        .map(|rel| Relation::new(out_index, rel.to, rel.weight)),
                );
            }
        }

        let summary = EventSummary::new(collection.len(), coned.len());
        event.add_hits(self.output.clone(), coned);
        if let Some((_, output)) = &self.relations {
            event.add_relations(output.clone(), out_relations);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibfilter_core::Position;

    fn particle(px: f64, py: f64, pz: f64, status: i32) -> McParticle {
        McParticle {
            momentum: Position::new(px, py, pz),
            energy: 10.0,
            generator_status: status,
        }
    }

    #[test]
    fn test_cone_with_relations() {
        let mut hits = HitCollection::new("layer:6");
        hits.push(Hit::new(0, Position::new(1500.0, 10.0, 0.0), 0.1, 0.0));
        hits.push(Hit::new(1, Position::new(0.0, 1500.0, 0.0), 0.1, 0.0));
        hits.push(Hit::new(2, Position::new(1500.0, -100.0, 50.0), 0.1, 0.0));

        let mut event = Event::new(0, 1);
        event.add_hits("Ecal", hits);
        event.add_relations(
            "EcalRel",
            vec![
                Relation::new(0, 100, 0.5),
                Relation::new(1, 101, 1.0),
                Relation::new(2, 102, 0.25),
            ],
        );
        event.particles.insert(
            "MCParticle".into(),
            vec![particle(5.0, 0.0, 0.0, 1), particle(0.0, 5.0, 0.0, 2)],
        );

        let mut filter = ConeFilter::new(0.2, "MCParticle", "Ecal", "EcalConed")
            .with_relations("EcalRel", "EcalRelConed");
        let summary = filter.process_event(&mut event).unwrap();
        assert_eq!(summary, EventSummary::new(3, 2));

        let rels = event.relation_collection("EcalRelConed").unwrap();
        assert_eq!(rels, &[Relation::new(0, 100, 0.5), Relation::new(1, 102, 0.25)]);
    }

    #[test]
    fn test_missing_particles() {
        let mut event = Event::new(0, 1);
        event.add_hits("Ecal", HitCollection::new("layer:6"));
        let mut filter = ConeFilter::new(0.2, "MCParticle", "Ecal", "EcalConed");
        assert!(filter.process_event(&mut event).is_err());
    }
}
