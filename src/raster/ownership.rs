use std::{cmp::Ordering, collections::BTreeMap};

use rayon::prelude::*;

use crate::{
    core::{
        container::handle::RoadId,
        geometry::{rect::OrientedRect, site::Site},
        heightmap::Heightmap,
    },
    params::HarmonizeParams,
    road::network::{Road, RoadNetwork},
    unit::Priority,
};

use super::falloff::FalloffKind;

/// Claim of a road on one cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellClaim {
    pub road: RoadId,
    pub priority: Priority,
    /// Perpendicular distance from the road centerline.
    pub distance: f64,
    /// Target elevation of the road at the cell.
    pub elevation: f64,
    pub half_width: f64,
    /// Width of the blend band at the cell, after widening for the shoulder slope.
    pub blend_distance: f64,
}

impl CellClaim {
    /// Check if the cell lies in the protected core of the road.
    pub fn in_core(&self) -> bool {
        self.distance <= self.half_width
    }

    /// Distance into the blend band, 0 at the edge of the core and 1 at its outer edge.
    pub fn normalized_blend(&self) -> f64 {
        if self.in_core() {
            0.0
        } else if self.blend_distance > 0.0 {
            (self.distance - self.half_width) / self.blend_distance
        } else {
            f64::INFINITY
        }
    }

    /// Check if the claim wins the cell over another one.
    ///
    /// Higher priority wins, then the closer claim, then the earlier road.
    pub fn outranks(&self, other: &Self) -> bool {
        match self.priority.cmp(&other.priority) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match self.distance.total_cmp(&other.distance) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => self.road < other.road,
            },
        }
    }
}

/// Grids of cell ownership and the blend accumulators, at heightmap resolution.
#[derive(Debug, Clone)]
pub struct OwnershipLayers {
    width: usize,
    height: usize,
    owners: Vec<Option<CellClaim>>,
    /// Product of `1 - w` over every road footprint covering the cell.
    blend_keep: Vec<f64>,
    /// Sum of the falloff weights.
    blend_weight: Vec<f64>,
    /// Sum of the falloff weights times the road targets.
    blend_target: Vec<f64>,
}

impl OwnershipLayers {
    fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            owners: vec![None; size],
            blend_keep: vec![1.0; size],
            blend_weight: vec![0.0; size],
            blend_target: vec![0.0; size],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Get the winning claim of the cell.
    pub fn owner(&self, index: usize) -> Option<&CellClaim> {
        self.owners.get(index)?.as_ref()
    }

    /// Target elevation of the owner of the cell.
    pub fn elevation(&self, index: usize) -> Option<f64> {
        self.owner(index).map(|claim| claim.elevation)
    }

    /// Distance from the owner's centerline.
    pub fn distance(&self, index: usize) -> Option<f64> {
        self.owner(index).map(|claim| claim.distance)
    }

    /// Combined blend weight of every footprint covering the cell.
    pub fn blend_factor(&self, index: usize) -> f64 {
        self.blend_keep
            .get(index)
            .map_or(0.0, |keep| 1.0 - keep)
    }

    /// Weighted mean of the targets of every footprint covering the cell.
    pub fn blend_target(&self, index: usize) -> Option<f64> {
        let weight = *self.blend_weight.get(index)?;
        (weight > 0.0).then(|| self.blend_target[index] / weight)
    }

    /// Number of cells claimed by at least one road.
    pub fn claimed_cells(&self) -> usize {
        self.owners.iter().filter(|owner| owner.is_some()).count()
    }

    fn register(&mut self, index: usize, claim: CellClaim, falloff: FalloffKind) {
        let replace = match &self.owners[index] {
            Some(owner) => claim.outranks(owner),
            None => true,
        };
        if replace {
            self.owners[index] = Some(claim);
        }
        let weight = if claim.in_core() {
            1.0
        } else {
            falloff.weight(claim.normalized_blend())
        };
        if weight > 0.0 {
            self.blend_keep[index] *= 1.0 - weight;
            self.blend_weight[index] += weight;
            self.blend_target[index] += weight * claim.elevation;
        }
    }
}

/// Rasterizes road cores and blend footprints into ownership layers.
#[derive(Debug, Clone)]
pub struct OwnershipBuilder {
    falloff: FalloffKind,
    widen_limit: f64,
}

impl OwnershipBuilder {
    pub fn new(params: &HarmonizeParams) -> Self {
        Self {
            falloff: params.falloff,
            widen_limit: params.shoulder_widen_limit.max(1.0),
        }
    }

    /// Build the layers of all active roads.
    ///
    /// Claims are computed per road in parallel, then merged in road order.
    pub fn build(&self, network: &RoadNetwork, terrain: &Heightmap) -> OwnershipLayers {
        let roads = network.active_roads().collect::<Vec<_>>();
        let claims = roads
            .par_iter()
            .map(|road| self.road_claims(road, terrain))
            .collect::<Vec<_>>();

        let mut layers = OwnershipLayers::new(terrain.width(), terrain.height());
        for road_claims in claims {
            for (index, (_, claim)) in road_claims {
                layers.register(index, claim, self.falloff);
            }
        }
        layers
    }

    /// Blend band of a cross-section, widened so that the shoulder stays within the maximum slope.
    fn effective_blend(&self, road: &Road, target: f64, ground: Option<f64>) -> f64 {
        let nominal = road.definition.blend_distance;
        let grade = road.definition.max_shoulder_slope.grade();
        match ground {
            Some(ground) if grade > 0.0 => ((target - ground).abs() / grade)
                .max(nominal)
                .min(nominal * self.widen_limit),
            _ => nominal,
        }
    }

    /// Claims of one road, keyed by cell index.
    ///
    /// Each cell keeps the claim of the nearest cross-section, with the distance to it.
    fn road_claims(&self, road: &Road, terrain: &Heightmap) -> BTreeMap<usize, (f64, CellClaim)> {
        let cell = terrain.cell_size();
        let half_width = road.definition.half_width;
        let mut claims: BTreeMap<usize, (f64, CellClaim)> = BTreeMap::new();

        for (index, section) in road.sections.iter().enumerate() {
            let Some(target) = section.target() else {
                continue;
            };
            let previous = road.previous_index(index).map(|i| &road.sections[i]);
            let next = road.next_index(index).map(|i| &road.sections[i]);
            let gap_behind = previous.map_or(0.0, |other| other.site.distance(&section.site));
            let gap_ahead = next.map_or(0.0, |other| other.site.distance(&section.site));

            let blend_distance =
                self.effective_blend(road, target, terrain.sample(&section.site));
            let rect = OrientedRect::new(
                section.site,
                section.tangent,
                gap_behind * 0.5 + cell,
                gap_ahead * 0.5 + cell,
                half_width + blend_distance,
            );
            let (min, max) = rect.get_bounds();
            let Some(range) = terrain.cells_within(min, max) else {
                continue;
            };

            for row in range.rows.0..=range.rows.1 {
                for col in range.cols.0..=range.cols.1 {
                    let site = Site::new(col as f64 * cell, row as f64 * cell);
                    let Some((along, across)) = rect.local_coordinates(&site) else {
                        continue;
                    };
                    let cell_index = terrain.index(col, row);
                    let proximity = site.distance(&section.site);
                    if claims
                        .get(&cell_index)
                        .is_some_and(|(closest, _)| *closest <= proximity)
                    {
                        continue;
                    }

                    let (neighbor, gap) = if along >= 0.0 {
                        (next, gap_ahead)
                    } else {
                        (previous, gap_behind)
                    };
                    let elevation = match neighbor.and_then(|other| other.target()) {
                        Some(other) if gap > 0.0 => {
                            let t = (along.abs() / gap).min(1.0);
                            target + (other - target) * t
                        }
                        _ => target,
                    };

                    claims.insert(
                        cell_index,
                        (
                            proximity,
                            CellClaim {
                                road: road.id,
                                priority: road.definition.priority,
                                distance: across.abs(),
                                elevation,
                                half_width,
                                blend_distance,
                            },
                        ),
                    );
                }
            }
        }
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::{
        definition::{ControlCurve, RoadDefinition},
        sampler::SplineSampler,
    };

    fn claim(road: usize, priority: i32, distance: f64) -> CellClaim {
        CellClaim {
            road: RoadId::new(road),
            priority: Priority::new(priority),
            distance,
            elevation: 0.0,
            half_width: 2.0,
            blend_distance: 4.0,
        }
    }

    #[test]
    fn test_claim_order() {
        assert!(claim(1, 3, 5.0).outranks(&claim(0, 1, 0.0)));
        assert!(claim(1, 1, 1.0).outranks(&claim(0, 1, 2.0)));
        assert!(claim(0, 1, 1.0).outranks(&claim(1, 1, 1.0)));
        assert!(!claim(1, 1, 1.0).outranks(&claim(0, 1, 1.0)));

        assert!(claim(0, 0, 2.0).in_core());
        assert_eq!(claim(0, 0, 4.0).normalized_blend(), 0.5);
    }

    fn flat_road(elevation: f64) -> (RoadNetwork, Heightmap) {
        let definition = RoadDefinition::new(ControlCurve::new(vec![
            Site::new(2.0, 20.0),
            Site::new(38.0, 20.0),
        ]))
        .half_width(3.0)
        .blend_distance(5.0);
        let (mut network, _) =
            RoadNetwork::from_definitions(vec![definition], &SplineSampler::new(1.0, 1.0));
        for section in network.roads_mut()[0].sections.iter_mut() {
            section.raw_elevation = Some(elevation);
            section.elevation = Some(elevation);
        }
        (network, Heightmap::from_fn(41, 41, 1.0, |_| elevation).unwrap())
    }

    #[test]
    fn test_road_footprint() {
        let (network, terrain) = flat_road(2.0);
        let layers = OwnershipBuilder::new(&HarmonizeParams::default()).build(&network, &terrain);

        let on_centerline = layers.owner(terrain.index(20, 20)).unwrap();
        assert!(on_centerline.in_core());
        assert!(on_centerline.distance < 1e-6);
        assert_eq!(on_centerline.elevation, 2.0);

        let in_band = layers.owner(terrain.index(20, 26)).unwrap();
        assert!(!in_band.in_core());
        assert!((in_band.distance - 6.0).abs() < 1e-6);
        assert!(layers.blend_factor(terrain.index(20, 26)) > 0.0);
        assert_eq!(layers.blend_target(terrain.index(20, 26)), Some(2.0));

        assert!(layers.owner(terrain.index(20, 29)).is_none());
        assert!(layers.owner(terrain.index(20, 2)).is_none());
        assert_eq!(layers.blend_factor(terrain.index(20, 2)), 0.0);
    }

    #[test]
    fn test_shoulder_widens_footprint() {
        let (mut network, terrain) = flat_road(0.0);
        for section in network.roads_mut()[0].sections.iter_mut() {
            section.elevation = Some(6.0);
        }
        // 6 m above the terrain with a 1:1.5 shoulder needs a 9 m band.
        let layers = OwnershipBuilder::new(&HarmonizeParams::default()).build(&network, &terrain);
        let far = layers.owner(terrain.index(20, 31)).unwrap();
        assert!((far.blend_distance - 9.0).abs() < 1e-6);

        // The widening is capped.
        let layers = OwnershipBuilder::new(&HarmonizeParams::default().shoulder_widen_limit(1.2))
            .build(&network, &terrain);
        assert!(layers.owner(terrain.index(20, 31)).is_none());
    }
}
