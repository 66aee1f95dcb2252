use std::cmp::Reverse;

use rayon::prelude::*;

use crate::{
    core::container::handle::{RoadId, SectionRef},
    error::Anomaly,
    junction::Junction,
    unit::Priority,
};

use super::{
    definition::RoadDefinition,
    sampler::{SampledRoad, SplineSampler},
    section::CrossSection,
};

/// A road in the network with its cross-sections.
#[derive(Debug, Clone)]
pub struct Road {
    pub id: RoadId,
    pub definition: RoadDefinition,
    pub sections: Vec<CrossSection>,
    /// The last cross-section connects back to the first one.
    pub closed: bool,
    pub length: f64,
    /// Excluded roads take no part in detection, harmonization or rasterization.
    pub excluded: bool,
}

impl Road {
    /// Check if the cross-section is one of the two ends of an open road.
    pub fn is_endpoint(&self, index: usize) -> bool {
        !self.closed
            && !self.sections.is_empty()
            && (index == 0 || index + 1 == self.sections.len())
    }

    /// Index of the next cross-section, wrapping around closed roads.
    pub fn next_index(&self, index: usize) -> Option<usize> {
        if index + 1 < self.sections.len() {
            Some(index + 1)
        } else if self.closed && !self.sections.is_empty() {
            Some(0)
        } else {
            None
        }
    }

    /// Index of the previous cross-section, wrapping around closed roads.
    pub fn previous_index(&self, index: usize) -> Option<usize> {
        if index > 0 {
            Some(index - 1)
        } else if self.closed && !self.sections.is_empty() {
            Some(self.sections.len() - 1)
        } else {
            None
        }
    }

    /// Mean distance between consecutive cross-sections.
    pub fn spacing(&self) -> f64 {
        let intervals = if self.closed {
            self.sections.len()
        } else {
            self.sections.len().saturating_sub(1)
        };
        if intervals == 0 {
            0.0
        } else {
            self.length / intervals as f64
        }
    }

    /// Running distance from the cross-section `from` forward to the cross-section `to`.
    ///
    /// On closed roads the distance wraps through the seam.
    pub fn forward_distance(&self, from: f64, to: f64) -> f64 {
        if self.closed && to < from {
            to + self.length - from
        } else {
            to - from
        }
    }

    /// Index of the cross-section nearest to the running distance.
    pub fn nearest_index(&self, distance: f64) -> usize {
        let upper = self
            .sections
            .partition_point(|section| section.distance < distance)
            .min(self.sections.len().saturating_sub(1));
        if upper > 0
            && (distance - self.sections[upper - 1].distance).abs()
                <= (self.sections[upper].distance - distance).abs()
        {
            upper - 1
        } else {
            upper
        }
    }

    /// Interpolate a per-section value at a running distance.
    ///
    /// Distances are clamped on open roads and wrapped on closed roads.
    pub fn interpolate<F>(&self, distance: f64, value: F) -> Option<f64>
    where
        F: Fn(&CrossSection) -> Option<f64>,
    {
        let first = self.sections.first()?;
        let last = self.sections.last()?;
        let distance = if self.closed && self.length > 0.0 {
            distance.rem_euclid(self.length)
        } else {
            distance.clamp(first.distance, last.distance)
        };

        let upper = self
            .sections
            .partition_point(|section| section.distance <= distance);
        if upper == 0 {
            return value(first);
        }
        let lower = &self.sections[upper - 1];
        let (upper, upper_distance) = match self.sections.get(upper) {
            Some(section) => (section, section.distance),
            None if self.closed => (first, self.length),
            None => return value(lower),
        };
        let (v0, v1) = (value(lower)?, value(upper)?);
        let span = upper_distance - lower.distance;
        if span <= 0.0 {
            return Some(v0);
        }
        Some(v0 + (v1 - v0) * (distance - lower.distance) / span)
    }

    /// Raw (baseline) elevation at a running distance.
    pub fn raw_elevation_at(&self, distance: f64) -> Option<f64> {
        self.interpolate(distance, |section| section.raw_elevation)
    }

    /// Target elevation at a running distance.
    pub fn elevation_at(&self, distance: f64) -> Option<f64> {
        self.interpolate(distance, |section| section.elevation)
    }

    /// Longitudinal slope of the raw elevation at a running distance.
    pub fn raw_slope_at(&self, distance: f64) -> f64 {
        self.gradient(distance, |section| section.raw_elevation)
    }

    /// Longitudinal slope of the target elevation at a running distance.
    pub fn slope_at(&self, distance: f64) -> f64 {
        self.gradient(distance, |section| section.elevation)
    }

    /// Finite difference over one sample spacing on each side, shortened at the ends of open roads.
    fn gradient<F>(&self, distance: f64, value: F) -> f64
    where
        F: Fn(&CrossSection) -> Option<f64>,
    {
        let step = self.spacing();
        let (d0, d1) = if self.closed {
            (distance - step, distance + step)
        } else {
            ((distance - step).max(0.0), (distance + step).min(self.length))
        };
        let run = d1 - d0;
        match (self.interpolate(d0, &value), self.interpolate(d1, &value)) {
            (Some(h0), Some(h1)) if run > 0.0 => (h1 - h0) / run,
            _ => 0.0,
        }
    }
}

/// All roads, their cross-sections and the junctions between them.
///
/// Everything outside the network refers to roads and sections by handle.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    roads: Vec<Road>,
    junctions: Vec<Junction>,
}

impl RoadNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the network by sampling every road definition.
    ///
    /// Roads are sampled in parallel. Invalid curves stay in the network as excluded roads so that
    /// road IDs keep matching the input order.
    pub fn from_definitions(
        definitions: Vec<RoadDefinition>,
        sampler: &SplineSampler,
    ) -> (Self, Vec<Anomaly>) {
        let sampled = definitions
            .into_par_iter()
            .enumerate()
            .map(|(id, definition)| {
                let id = RoadId::new(id);
                let result = sampler.sample(id, &definition.curve);
                (id, definition, result)
            })
            .collect::<Vec<_>>();

        let mut anomalies = Vec::new();
        let roads = sampled
            .into_iter()
            .map(|(id, mut definition, result)| {
                if definition.blend_distance < definition.half_width {
                    anomalies.push(Anomaly::BlendNarrowerThanCore {
                        road: id,
                        half_width: definition.half_width,
                        blend_distance: definition.blend_distance,
                    });
                    definition.blend_distance = definition.half_width;
                }
                match result {
                    Ok(SampledRoad {
                        sections,
                        closed,
                        length,
                    }) => Road {
                        id,
                        definition,
                        sections,
                        closed,
                        length,
                        excluded: false,
                    },
                    Err(anomaly) => {
                        anomalies.push(anomaly);
                        Road {
                            id,
                            definition,
                            sections: Vec::new(),
                            closed: false,
                            length: 0.0,
                            excluded: true,
                        }
                    }
                }
            })
            .collect();

        (
            Self {
                roads,
                junctions: Vec::new(),
            },
            anomalies,
        )
    }

    /// Get all roads, excluded ones included.
    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    /// Iterate over roads taking part in the run.
    pub fn active_roads(&self) -> impl Iterator<Item = &Road> {
        self.roads.iter().filter(|road| !road.excluded)
    }

    pub fn road(&self, id: RoadId) -> Option<&Road> {
        self.roads.get(id.as_num())
    }

    pub fn section(&self, section: SectionRef) -> Option<&CrossSection> {
        self.road(section.road)?.sections.get(section.index)
    }

    pub fn junctions(&self) -> &[Junction] {
        &self.junctions
    }

    pub fn priority(&self, id: RoadId) -> Priority {
        self.road(id)
            .map(|road| road.definition.priority)
            .unwrap_or_default()
    }

    /// Total order over roads: higher priority first, then earlier input.
    pub fn rank(&self, id: RoadId) -> (Priority, Reverse<RoadId>) {
        (self.priority(id), Reverse(id))
    }

    /// Check if road `a` wins conflicts against road `b`.
    pub fn outranks(&self, a: RoadId, b: RoadId) -> bool {
        self.rank(a) > self.rank(b)
    }

    pub(crate) fn roads_mut(&mut self) -> &mut [Road] {
        &mut self.roads
    }

    pub(crate) fn junctions_mut(&mut self) -> &mut [Junction] {
        &mut self.junctions
    }

    pub(crate) fn set_junctions(&mut self, junctions: Vec<Junction>) {
        self.junctions = junctions;
    }
}
