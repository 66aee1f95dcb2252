use std::collections::{BTreeMap, BTreeSet};

use glam::DVec2;
use rayon::prelude::*;

use crate::{
    core::{container::handle::RoadId, heightmap::Heightmap},
    junction::{Contributor, ContributorRole, Junction, JunctionType},
    params::{HarmonizeParams, RingElevationMode},
    road::network::{Road, RoadNetwork},
};

use super::profile::{clamp_grade, JunctionProfile, ProfileShape};

/// Direction along a road, relative to its running distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }

    /// Direction leading from a road end into the road.
    pub fn outward(index: usize) -> Self {
        if index == 0 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

/// Slope of a continuous road as read by a road approaching it.
///
/// The sign flips when the approach runs against the tangent of the continuous road.
pub fn approach_adjusted_slope(slope: f64, tangent: DVec2, approach: DVec2) -> f64 {
    if tangent.dot(approach) < 0.0 {
        -slope
    } else {
        slope
    }
}

/// Profile requested by a junction on one road.
#[derive(Debug, Clone, Copy)]
struct ProfileRequest {
    road: RoadId,
    /// Running distance of the junction anchor.
    anchor: f64,
    direction: Direction,
    profile: JunctionProfile,
}

impl ProfileRequest {
    /// Offset of a running distance from the anchor, negative behind it.
    fn offset(&self, road: &Road, distance: f64) -> f64 {
        let offset = (distance - self.anchor) * self.direction.sign();
        if road.closed && road.length > 0.0 {
            let half = road.length * 0.5;
            (offset + half).rem_euclid(road.length) - half
        } else {
            offset
        }
    }
}

/// Outcome of harmonizing one junction.
#[derive(Debug, Clone, Default)]
struct JunctionPlan {
    elevation: Option<f64>,
    blend_distance: f64,
    /// Slope of each contributor, in contributor order.
    slopes: Vec<f64>,
    requests: Vec<ProfileRequest>,
}

/// Order in which junctions are planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanPass {
    /// Junctions writing profiles through the interior of a road, planned on the raw surface.
    Reshaping,
    /// Road ends attaching to a leading continuous road, planned on its harmonized surface.
    Attaching,
}

/// Computes junction elevations and writes slope-continuous profiles onto the roads.
pub struct ElevationHarmonizer<'a> {
    params: &'a HarmonizeParams,
}

impl<'a> ElevationHarmonizer<'a> {
    pub fn new(params: &'a HarmonizeParams) -> Self {
        Self { params }
    }

    /// Harmonize every junction of the network.
    ///
    /// Junctions reshaping a road through its interior are planned first, in parallel, and their
    /// profiles applied. Road ends attaching to a leading road are then planned against its
    /// harmonized surface. Roads without requests keep their raw elevation.
    pub fn harmonize(&self, network: &mut RoadNetwork, terrain: &Heightmap) {
        let mut plans = vec![JunctionPlan::default(); network.junctions().len()];
        for pass in [PlanPass::Reshaping, PlanPass::Attaching] {
            let planned = {
                let network: &RoadNetwork = network;
                network
                    .junctions()
                    .par_iter()
                    .enumerate()
                    .filter(|(_, junction)| self.pass(network, junction) == pass)
                    .map(|(i, junction)| {
                        (i, self.plan(network, terrain, junction).unwrap_or_default())
                    })
                    .collect::<Vec<_>>()
            };
            for (i, plan) in planned {
                plans[i] = plan;
            }
            apply_plans(network, &plans);
        }

        for (junction, plan) in network.junctions_mut().iter_mut().zip(plans) {
            junction.elevation = plan.elevation;
            junction.blend_distance = plan.blend_distance;
            for (contributor, slope) in junction.contributors.iter_mut().zip(plan.slopes) {
                contributor.slope = slope;
            }
        }
    }

    fn pass(&self, network: &RoadNetwork, junction: &Junction) -> PlanPass {
        let attached = match junction.junction_type {
            JunctionType::TJunction | JunctionType::RoundaboutConnection => true,
            JunctionType::YJunction | JunctionType::CrossRoads | JunctionType::ComplexMeet => {
                continuous_of(junction).is_some()
            }
            JunctionType::MidSplineCrossing | JunctionType::Endpoint => false,
        };
        if attached && attached_leader(network, junction).is_none() {
            PlanPass::Attaching
        } else {
            PlanPass::Reshaping
        }
    }

    /// Closed rings held at one elevation never take profiles.
    fn is_uniform_ring(&self, road: &Road) -> bool {
        road.closed && self.params.ring_mode == RingElevationMode::Uniform
    }

    fn plan(
        &self,
        network: &RoadNetwork,
        terrain: &Heightmap,
        junction: &Junction,
    ) -> Option<JunctionPlan> {
        match junction.junction_type {
            JunctionType::TJunction | JunctionType::RoundaboutConnection => {
                self.plan_attached(network, junction)
            }
            JunctionType::YJunction | JunctionType::CrossRoads | JunctionType::ComplexMeet => {
                if continuous_of(junction).is_some() {
                    self.plan_attached(network, junction)
                } else {
                    self.plan_meet(network, junction)
                }
            }
            JunctionType::MidSplineCrossing => self.plan_crossing(network, junction),
            JunctionType::Endpoint => self.plan_endpoint(network, terrain, junction),
        }
    }

    /// Road ends meeting the interior of a continuous road.
    ///
    /// Unless a road end leads, the ends take the harmonized surface of the continuous road.
    fn plan_attached(&self, network: &RoadNetwork, junction: &Junction) -> Option<JunctionPlan> {
        let continuous = continuous_of(junction)?;
        let main = network.road(continuous.road())?;
        let main_tangent = main.sections.get(continuous.section.index)?.tangent;

        let mut slopes = vec![0.0; junction.contributors.len()];
        let mut requests = Vec::new();
        let elevation = match attached_leader(network, junction) {
            None => {
                let elevation = main.elevation_at(continuous.distance)?;
                let main_slope = main.slope_at(continuous.distance);
                for (i, contributor) in junction.contributors.iter().enumerate() {
                    if contributor.role == ContributorRole::Continuous {
                        slopes[i] = main_slope;
                        continue;
                    }
                    let road = network.road(contributor.road())?;
                    let section = road.sections.get(contributor.section.index)?;
                    let direction = Direction::outward(contributor.section.index);
                    let approach = section.tangent * direction.sign();
                    let anchor_slope = approach_adjusted_slope(main_slope, main_tangent, approach)
                        * main_tangent.dot(approach).abs();
                    slopes[i] = anchor_slope * direction.sign();
                    requests.extend(self.request(
                        road,
                        contributor.distance,
                        direction,
                        elevation,
                        anchor_slope,
                        ProfileShape::Hermite,
                    ));
                }
                elevation
            }
            Some(leader) => {
                let leader_road = network.road(leader.road())?;
                let elevation = leader_road.raw_elevation_at(leader.distance)?;
                for (i, contributor) in junction.contributors.iter().enumerate() {
                    let road = network.road(contributor.road())?;
                    let slope = road.raw_slope_at(contributor.distance);
                    slopes[i] = slope;
                    if contributor.road() == leader.road() {
                        continue;
                    }
                    let directions = if contributor.role == ContributorRole::Continuous {
                        vec![Direction::Forward, Direction::Backward]
                    } else {
                        vec![Direction::outward(contributor.section.index)]
                    };
                    for direction in directions {
                        requests.extend(self.request(
                            road,
                            contributor.distance,
                            direction,
                            elevation,
                            slope * direction.sign(),
                            ProfileShape::Hermite,
                        ));
                    }
                }
                elevation
            }
        };

        Some(JunctionPlan {
            elevation: Some(elevation),
            blend_distance: widest_blend(&requests),
            slopes,
            requests,
        })
    }

    /// Road ends meeting each other.
    fn plan_meet(&self, network: &RoadNetwork, junction: &Junction) -> Option<JunctionPlan> {
        let top = junction
            .contributors
            .iter()
            .map(|contributor| network.priority(contributor.road()))
            .max()?;
        let leaders = junction
            .contributors
            .iter()
            .map(|contributor| contributor.road())
            .filter(|road| network.priority(*road) == top)
            .collect::<BTreeSet<_>>();
        let dominant = (leaders.len() == 1)
            .then(|| leaders.iter().next().copied())
            .flatten();

        let elevation = match dominant {
            Some(road) => {
                let contributor = junction.contributors_of(road).next()?;
                network.road(road)?.raw_elevation_at(contributor.distance)?
            }
            None => weighted_elevation(network, &junction.contributors)?,
        };

        let mut slopes = vec![0.0; junction.contributors.len()];
        let mut requests = Vec::new();
        for (i, contributor) in junction.contributors.iter().enumerate() {
            let road = network.road(contributor.road())?;
            let slope = road.raw_slope_at(contributor.distance);
            slopes[i] = slope;
            if dominant == Some(road.id) {
                continue;
            }
            let direction = Direction::outward(contributor.section.index);
            requests.extend(self.request(
                road,
                contributor.distance,
                direction,
                elevation,
                slope * direction.sign(),
                ProfileShape::Hermite,
            ));
        }

        Some(JunctionPlan {
            elevation: Some(elevation),
            blend_distance: widest_blend(&requests),
            slopes,
            requests,
        })
    }

    /// Two roads crossing: both follow their own slope through a shared elevation.
    ///
    /// A uniform ring imposes its elevation on the crossing.
    fn plan_crossing(&self, network: &RoadNetwork, junction: &Junction) -> Option<JunctionPlan> {
        let ring = junction
            .contributors
            .iter()
            .filter(|contributor| {
                network
                    .road(contributor.road())
                    .is_some_and(|road| self.is_uniform_ring(road))
            })
            .max_by_key(|contributor| network.rank(contributor.road()));
        let elevation = match ring {
            Some(ring) => network.road(ring.road())?.raw_elevation_at(ring.distance)?,
            None => weighted_elevation(network, &junction.contributors)?,
        };
        let mut slopes = vec![0.0; junction.contributors.len()];
        let mut requests = Vec::new();
        for (i, contributor) in junction.contributors.iter().enumerate() {
            let road = network.road(contributor.road())?;
            let slope = road.raw_slope_at(contributor.distance);
            slopes[i] = slope;
            for direction in [Direction::Forward, Direction::Backward] {
                requests.extend(self.request(
                    road,
                    contributor.distance,
                    direction,
                    elevation,
                    slope * direction.sign(),
                    ProfileShape::Hermite,
                ));
            }
        }
        Some(JunctionPlan {
            elevation: Some(elevation),
            blend_distance: widest_blend(&requests),
            slopes,
            requests,
        })
    }

    /// Dead end fading into the surrounding terrain.
    fn plan_endpoint(
        &self,
        network: &RoadNetwork,
        terrain: &Heightmap,
        junction: &Junction,
    ) -> Option<JunctionPlan> {
        let contributor = junction.contributors.first()?;
        let road = network.road(contributor.road())?;
        let elevation = terrain
            .mean_around(&junction.site, road.definition.half_width)
            .or_else(|| road.raw_elevation_at(contributor.distance))?;
        let slope = road.raw_slope_at(contributor.distance);
        let direction = Direction::outward(contributor.section.index);
        let requests = self
            .request(
                road,
                contributor.distance,
                direction,
                elevation,
                slope * direction.sign(),
                ProfileShape::Fade,
            )
            .into_iter()
            .collect::<Vec<_>>();
        Some(JunctionPlan {
            elevation: Some(elevation),
            blend_distance: widest_blend(&requests),
            slopes: vec![slope; junction.contributors.len()],
            requests,
        })
    }

    /// Build the profile leading from a junction anchor along a road.
    ///
    /// The blend distance grows with the elevation gap to stay within the allowed slope,
    /// bounded by the configured maximum and the road available in that direction.
    fn request(
        &self,
        road: &Road,
        anchor: f64,
        direction: Direction,
        anchor_value: f64,
        anchor_slope: f64,
        shape: ProfileShape,
    ) -> Option<ProfileRequest> {
        if self.is_uniform_ring(road) {
            return None;
        }
        let grade = road
            .definition
            .max_surface_slope
            .min(self.params.max_slope)
            .grade()
            .max(0.0);
        let available = available_length(road, anchor, direction);
        let raw_anchor = road.raw_elevation_at(anchor)?;
        let required = if grade > 0.0 {
            (anchor_value - raw_anchor).abs() / grade
        } else {
            f64::INFINITY
        };
        let blend_distance = required
            .max(self.params.default_blend_distance)
            .min(self.params.max_blend_distance)
            .min(available);
        if !(blend_distance > 0.0) {
            return None;
        }
        let ease_distance = self
            .params
            .ease_distance(blend_distance)
            .min(available - blend_distance)
            .max(0.0);

        let end = anchor + direction.sign() * blend_distance;
        let original_end = road.raw_elevation_at(end)?;
        let end_slope = (road.raw_slope_at(end) * direction.sign()).clamp(-grade, grade);
        let end_value = match shape {
            ProfileShape::Hermite => {
                let reach = grade * blend_distance;
                anchor_value + (original_end - anchor_value).clamp(-reach, reach)
            }
            ProfileShape::Fade => original_end,
        };

        Some(ProfileRequest {
            road: road.id,
            anchor,
            direction,
            profile: JunctionProfile {
                anchor_value,
                anchor_slope: anchor_slope.clamp(-grade, grade),
                blend_distance,
                end_value,
                end_slope,
                ease_distance,
                shape,
            },
        })
    }
}

/// Apply the profiles requested by every plan, road by road.
///
/// Each road starts again from its raw elevation, so applying a growing set of plans is safe.
fn apply_plans(network: &mut RoadNetwork, plans: &[JunctionPlan]) {
    let mut requests: BTreeMap<RoadId, Vec<ProfileRequest>> = BTreeMap::new();
    for request in plans.iter().flat_map(|plan| plan.requests.iter()) {
        requests.entry(request.road).or_default().push(*request);
    }

    network
        .roads_mut()
        .par_iter_mut()
        .filter(|road| !road.excluded)
        .for_each(|road| {
            if let Some(requests) = requests.get(&road.id) {
                apply_requests(road, requests);
            }
        });
}

fn continuous_of(junction: &Junction) -> Option<&Contributor> {
    junction
        .contributors
        .iter()
        .find(|contributor| contributor.role == ContributorRole::Continuous)
}

/// Terminating road taking the lead over the continuous road of an attached junction.
///
/// A ring always carries its connectors.
fn attached_leader(network: &RoadNetwork, junction: &Junction) -> Option<Contributor> {
    let main = network.road(continuous_of(junction)?.road())?;
    if main.closed {
        return None;
    }
    junction
        .contributors
        .iter()
        .filter(|contributor| contributor.role == ContributorRole::Terminating)
        .max_by_key(|contributor| network.rank(contributor.road()))
        .filter(|strongest| network.outranks(strongest.road(), main.id))
        .copied()
}

/// Combine the requested profiles of one road and write its target elevations.
///
/// Profiles are weighted by their influence; the section nearest to each anchor is pinned to
/// the anchor so that the final grade clamp does not move it.
fn apply_requests(road: &mut Road, requests: &[ProfileRequest]) {
    let n = road.sections.len();
    let mut values = road
        .sections
        .iter()
        .map(|section| {
            let original = section.raw_elevation.unwrap_or(0.0);
            let (sum, weight) = requests
                .iter()
                .filter_map(|request| {
                    let offset = request.offset(road, section.distance);
                    let value = request.profile.value(offset, original)?;
                    Some((value, request.profile.influence(offset)))
                })
                .fold((0.0, 0.0), |(sum, weight), (value, influence)| {
                    (sum + value * influence, weight + influence)
                });
            if weight > 0.0 {
                sum / weight
            } else {
                original
            }
        })
        .collect::<Vec<_>>();

    let mut pinned = vec![false; n];
    for request in requests {
        let index = road.nearest_index(request.anchor);
        let Some(section) = road.sections.get(index) else {
            continue;
        };
        let offset = request.offset(road, section.distance);
        values[index] = request.profile.anchor_value_at(offset);
        pinned[index] = true;
    }

    let distances = road
        .sections
        .iter()
        .map(|section| section.distance)
        .collect::<Vec<_>>();
    clamp_grade(
        &mut values,
        &distances,
        road.definition.max_surface_slope.grade(),
        &pinned,
    );

    for (section, value) in road.sections.iter_mut().zip(values) {
        section.elevation = Some(value);
    }
}

/// Length of road ahead of the anchor in a direction.
fn available_length(road: &Road, anchor: f64, direction: Direction) -> f64 {
    if road.closed {
        return road.length * 0.5;
    }
    match direction {
        Direction::Forward => road.length - anchor,
        Direction::Backward => anchor,
    }
    .max(0.0)
}

/// Priority-weighted mean of the raw elevations of the contributors.
///
/// The lowest priority weighs 1, and each priority step above it adds 1.
fn weighted_elevation(network: &RoadNetwork, contributors: &[Contributor]) -> Option<f64> {
    let lowest = contributors
        .iter()
        .map(|contributor| network.priority(contributor.road()).value())
        .min()?;
    let (sum, weight) = contributors
        .iter()
        .map(|contributor| {
            let road = network.road(contributor.road())?;
            let elevation = road.raw_elevation_at(contributor.distance)?;
            let weight = 1.0 + (network.priority(road.id).value() - lowest) as f64;
            Some((elevation * weight, weight))
        })
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .fold((0.0, 0.0), |(sum, weight), (value, w)| (sum + value, weight + w));
    (weight > 0.0).then(|| sum / weight)
}

fn widest_blend(requests: &[ProfileRequest]) -> f64 {
    requests
        .iter()
        .map(|request| request.profile.blend_distance)
        .fold(0.0, f64::max)
}
