use std::collections::{BTreeMap, BTreeSet};

use glam::DVec2;
use rstar::{RTree, RTreeObject};

use crate::{
    core::{
        container::{
            disjoint_set::DisjointSet,
            handle::{JunctionIdGenerator, RoadId, SectionRef},
            index_object::{SectionTreeObject, SegmentTreeObject},
        },
        geometry::{line_segment::LineSegment, site::Site, spline::COINCIDENT_EPSILON},
    },
    error::Anomaly,
    road::network::{Road, RoadNetwork},
};

use super::{Contributor, ContributorRole, Junction, JunctionType};

/// Candidates closer to each other than this are treated as equidistant.
const TIE_EPSILON: f64 = 1e-9;

/// Crossings whose directions are closer to parallel than this are degenerate.
const CROSSING_ANGLE_EPSILON: f64 = 1e-6;

/// Junctions found in a network and the anomalies met on the way.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub junctions: Vec<Junction>,
    pub anomalies: Vec<Anomaly>,
}

/// Meeting of roads before an ID is assigned.
#[derive(Debug, Clone)]
struct Meeting {
    site: Site,
    junction_type: JunctionType,
    contributors: Vec<Contributor>,
}

impl Meeting {
    fn involves(&self, road: RoadId) -> bool {
        self.contributors
            .iter()
            .any(|contributor| contributor.road() == road)
    }
}

/// Exact contact point on the centerline of a road.
#[derive(Debug, Clone, Copy)]
struct Contact {
    /// Cross-section nearest to the contact point.
    section: SectionRef,
    site: Site,
    distance: f64,
}

/// Road end meeting the interior of another road.
#[derive(Debug, Clone, Copy)]
struct Attachment {
    endpoint: SectionRef,
    gap: f64,
    contact: Contact,
}

/// Point where the centerlines of two roads cross.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    site: Site,
    first: Contact,
    second: Contact,
    first_direction: DVec2,
    second_direction: DVec2,
}

/// Finds and classifies the meeting points between the roads of a network.
#[derive(Debug, Clone)]
pub struct JunctionDetector {
    radius: f64,
}

impl JunctionDetector {
    /// Create a detector searching other roads within `radius` of each road end.
    pub fn new(radius: f64) -> Self {
        Self {
            radius: radius.max(0.0),
        }
    }

    /// Detect all junctions of the active roads.
    ///
    /// Road ends are resolved first; crossings away from the resulting junctions follow.
    /// Junction IDs are assigned in that order.
    pub fn detect(&self, network: &RoadNetwork) -> Detection {
        let mut anomalies = Vec::new();
        let mut meetings = self.detect_meetings(network, &mut anomalies);
        let crossings = self.detect_crossings(network, &meetings, &mut anomalies);
        meetings.extend(crossings);

        let mut generator = JunctionIdGenerator::default();
        let junctions = meetings
            .into_iter()
            .map(|meeting| {
                Junction::new(
                    generator.generate_id(),
                    meeting.site,
                    meeting.junction_type,
                    meeting.contributors,
                )
            })
            .collect();

        Detection {
            junctions,
            anomalies,
        }
    }

    /// Group road ends meeting each other or the interior of other roads.
    fn detect_meetings(&self, network: &RoadNetwork, anomalies: &mut Vec<Anomaly>) -> Vec<Meeting> {
        let tree = RTree::bulk_load(
            network
                .active_roads()
                .flat_map(|road| {
                    road.sections
                        .iter()
                        .map(|section| SectionTreeObject::new(section.site, section.handle()))
                })
                .collect::<Vec<_>>(),
        );

        let endpoints = network
            .active_roads()
            .filter(|road| !road.closed && !road.sections.is_empty())
            .flat_map(|road| {
                let last = road.sections.len() - 1;
                [0, last]
                    .into_iter()
                    .map(move |index| SectionRef::new(road.id, index))
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let mut groups = DisjointSet::new(&endpoints);
        let mut attachments = BTreeMap::new();
        let mut dropped = BTreeSet::new();

        for &endpoint in &endpoints {
            let Some(site) = network.section(endpoint).map(|section| section.site) else {
                continue;
            };
            let Some((matched, gap)) = self.nearest_other(network, &tree, endpoint.road, &site)
            else {
                continue;
            };
            let matched_is_endpoint = network
                .road(matched.road)
                .is_some_and(|road| road.is_endpoint(matched.index));
            if matched_is_endpoint {
                groups.union(endpoint, matched);
                continue;
            }
            match project_on_road(network, matched, &site) {
                Some(contact) => {
                    attachments.insert(
                        endpoint,
                        Attachment {
                            endpoint,
                            gap,
                            contact,
                        },
                    );
                }
                None => {
                    anomalies.push(Anomaly::DegenerateJunction {
                        x: site.x,
                        y: site.y,
                    });
                    dropped.insert(endpoint);
                }
            }
        }

        // Road ends touching the same road close to each other share one junction.
        let mut by_road: BTreeMap<RoadId, Vec<Attachment>> = BTreeMap::new();
        for attachment in attachments.values() {
            by_road
                .entry(attachment.contact.section.road)
                .or_default()
                .push(*attachment);
        }
        for list in by_road.values_mut() {
            list.sort_by(|a, b| {
                a.contact
                    .distance
                    .total_cmp(&b.contact.distance)
                    .then(a.endpoint.cmp(&b.endpoint))
            });
            for pair in list.windows(2) {
                if pair[0].contact.site.distance(&pair[1].contact.site) <= self.radius {
                    groups.union(pair[0].endpoint, pair[1].endpoint);
                }
            }
            if let (Some(first), Some(last)) = (list.first(), list.last()) {
                if list.len() > 2
                    && first.contact.site.distance(&last.contact.site) <= self.radius
                {
                    groups.union(first.endpoint, last.endpoint);
                }
            }
        }

        groups
            .get_all_sets()
            .into_iter()
            .filter(|members| !members.iter().any(|member| dropped.contains(member)))
            .filter_map(|members| self.classify(network, &members, &attachments, anomalies))
            .collect()
    }

    /// Nearest cross-section of another road within the radius.
    ///
    /// Equidistant candidates are resolved by road rank, then by section order.
    fn nearest_other(
        &self,
        network: &RoadNetwork,
        tree: &RTree<SectionTreeObject>,
        road: RoadId,
        site: &Site,
    ) -> Option<(SectionRef, f64)> {
        tree.locate_within_distance(site.as_array(), self.radius * self.radius)
            .filter(|object| object.section().road != road)
            .map(|object| (object.section(), object.site().distance(site)))
            .min_by(|(a, a_distance), (b, b_distance)| {
                if (a_distance - b_distance).abs() > TIE_EPSILON {
                    a_distance.total_cmp(b_distance)
                } else {
                    network
                        .rank(b.road)
                        .cmp(&network.rank(a.road))
                        .then(a.cmp(b))
                }
            })
    }

    fn classify(
        &self,
        network: &RoadNetwork,
        members: &[SectionRef],
        attachments: &BTreeMap<SectionRef, Attachment>,
        anomalies: &mut Vec<Anomaly>,
    ) -> Option<Meeting> {
        let terminating_roads = members
            .iter()
            .map(|member| member.road)
            .collect::<BTreeSet<_>>();

        // The highest ranked road touched by the group carries the junction.
        let continuous = members
            .iter()
            .filter_map(|member| attachments.get(member))
            .filter(|attachment| !terminating_roads.contains(&attachment.contact.section.road))
            .min_by(|a, b| {
                network
                    .rank(b.contact.section.road)
                    .cmp(&network.rank(a.contact.section.road))
                    .then(a.gap.total_cmp(&b.gap))
                    .then(a.endpoint.cmp(&b.endpoint))
            });

        let mut contributors = Vec::with_capacity(members.len() + 1);
        for &member in members {
            let section = network.section(member)?;
            if !is_valid_direction(section.tangent) {
                anomalies.push(Anomaly::DegenerateJunction {
                    x: section.site.x,
                    y: section.site.y,
                });
                return None;
            }
            contributors.push(Contributor::new(
                member,
                section.distance,
                true,
                ContributorRole::Terminating,
            ));
        }

        let (site, junction_type) = match continuous {
            Some(attachment) => {
                let road = network.road(attachment.contact.section.road)?;
                contributors.push(Contributor::new(
                    attachment.contact.section,
                    attachment.contact.distance,
                    false,
                    ContributorRole::Continuous,
                ));
                let junction_type = if road.closed {
                    JunctionType::RoundaboutConnection
                } else {
                    match members.len() {
                        1 => JunctionType::TJunction,
                        2 => JunctionType::CrossRoads,
                        _ => JunctionType::ComplexMeet,
                    }
                };
                (attachment.contact.site, junction_type)
            }
            None => {
                let sum = members
                    .iter()
                    .filter_map(|member| network.section(*member))
                    .fold(DVec2::ZERO, |sum, section| sum + DVec2::from(section.site));
                let junction_type = match members.len() {
                    1 => JunctionType::Endpoint,
                    2 => JunctionType::YJunction,
                    3 | 4 => JunctionType::CrossRoads,
                    _ => JunctionType::ComplexMeet,
                };
                (Site::from(sum / members.len() as f64), junction_type)
            }
        };

        Some(Meeting {
            site,
            junction_type,
            contributors,
        })
    }

    /// Find the crossings between pairs of roads away from the junctions found so far.
    fn detect_crossings(
        &self,
        network: &RoadNetwork,
        meetings: &[Meeting],
        anomalies: &mut Vec<Anomaly>,
    ) -> Vec<Meeting> {
        let segments = network
            .active_roads()
            .flat_map(road_segments)
            .collect::<Vec<_>>();
        let tree = RTree::bulk_load(segments.clone());

        let mut crossings = Vec::new();
        for object in &segments {
            let road = object.sections().0.road;
            for other in tree.locate_in_envelope_intersecting(&object.segment().envelope()) {
                if other.sections().0.road <= road {
                    continue;
                }
                let Some(intersection) = object.segment().get_intersection(other.segment()) else {
                    continue;
                };
                let (Some(first), Some(second)) = (
                    contact_on_segment(network, object, intersection.t_self),
                    contact_on_segment(network, other, intersection.t_other),
                ) else {
                    continue;
                };
                crossings.push(Crossing {
                    site: intersection.site,
                    first,
                    second,
                    first_direction: object.segment().0.vector_to(&object.segment().1),
                    second_direction: other.segment().0.vector_to(&other.segment().1),
                });
            }
        }
        crossings.sort_by(|a, b| {
            (a.first.section.road, a.second.section.road)
                .cmp(&(b.first.section.road, b.second.section.road))
                .then(a.first.distance.total_cmp(&b.first.distance))
                .then(a.second.distance.total_cmp(&b.second.distance))
        });

        let mut accepted: Vec<Crossing> = Vec::new();
        for crossing in crossings {
            let (first, second) = (crossing.first.section.road, crossing.second.section.road);
            let near_meeting = meetings.iter().any(|meeting| {
                meeting.involves(first)
                    && meeting.involves(second)
                    && meeting.site.distance(&crossing.site) <= self.radius
            });
            let duplicate = accepted.iter().any(|other| {
                other.first.section.road == first
                    && other.second.section.road == second
                    && other.site.distance(&crossing.site) <= self.radius
            });
            if !(near_meeting || duplicate) {
                accepted.push(crossing);
            }
        }

        accepted
            .into_iter()
            .filter_map(|crossing| {
                let (a, b) = (
                    crossing.first_direction.normalize_or_zero(),
                    crossing.second_direction.normalize_or_zero(),
                );
                if a.perp_dot(b).abs() < CROSSING_ANGLE_EPSILON {
                    anomalies.push(Anomaly::DegenerateJunction {
                        x: crossing.site.x,
                        y: crossing.site.y,
                    });
                    return None;
                }
                let contributors = [crossing.first, crossing.second]
                    .into_iter()
                    .map(|contact| {
                        let is_endpoint = network
                            .road(contact.section.road)
                            .is_some_and(|road| road.is_endpoint(contact.section.index));
                        Contributor::new(
                            contact.section,
                            contact.distance,
                            is_endpoint,
                            ContributorRole::PassThrough,
                        )
                    })
                    .collect();
                Some(Meeting {
                    site: crossing.site,
                    junction_type: JunctionType::MidSplineCrossing,
                    contributors,
                })
            })
            .collect()
    }
}

fn is_valid_direction(tangent: DVec2) -> bool {
    tangent.is_finite() && tangent.length_squared() > 0.5
}

/// Centerline pieces between consecutive cross-sections of a road.
fn road_segments(road: &Road) -> Vec<SegmentTreeObject> {
    let count = if road.closed {
        road.sections.len()
    } else {
        road.sections.len().saturating_sub(1)
    };
    (0..count)
        .filter_map(|index| {
            let next = road.next_index(index)?;
            let (start, end) = (&road.sections[index], &road.sections[next]);
            Some(SegmentTreeObject::new(
                LineSegment::new(start.site, end.site),
                start.handle(),
                end.handle(),
            ))
        })
        .collect()
}

/// Contact point at the parametric position `t` of a centerline piece.
fn contact_on_segment(
    network: &RoadNetwork,
    object: &SegmentTreeObject,
    t: f64,
) -> Option<Contact> {
    let (start, end) = object.sections();
    let road = network.road(start.road)?;
    let (s0, s1) = (road.sections.get(start.index)?, road.sections.get(end.index)?);
    let mut distance = s0.distance + road.forward_distance(s0.distance, s1.distance) * t;
    if road.closed && distance >= road.length {
        distance -= road.length;
    }
    Some(Contact {
        section: if t <= 0.5 { start } else { end },
        site: object.segment().0.lerp(&object.segment().1, t),
        distance,
    })
}

/// Project a site on the centerline of a road around one of its cross-sections.
///
/// Return None if the centerline is degenerate there.
fn project_on_road(network: &RoadNetwork, section: SectionRef, site: &Site) -> Option<Contact> {
    let road = network.road(section.road)?;
    let pieces = [
        road.previous_index(section.index)
            .map(|previous| (previous, section.index)),
        road.next_index(section.index)
            .map(|next| (section.index, next)),
    ];

    let mut best: Option<(f64, Contact)> = None;
    for (a, b) in pieces.into_iter().flatten() {
        let (s0, s1) = (&road.sections[a], &road.sections[b]);
        let segment = LineSegment::new(s0.site, s1.site);
        if segment.length() <= COINCIDENT_EPSILON {
            return None;
        }
        let (projection, t) = segment.get_projection(site);
        let gap = projection.distance(site);
        let mut distance = s0.distance + road.forward_distance(s0.distance, s1.distance) * t;
        if road.closed && distance >= road.length {
            distance -= road.length;
        }
        if best.map_or(true, |(best_gap, _)| gap < best_gap) {
            best = Some((
                gap,
                Contact {
                    section: SectionRef::new(road.id, if t <= 0.5 { a } else { b }),
                    site: projection,
                    distance,
                },
            ));
        }
    }
    best.map(|(_, contact)| contact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::{
        definition::{ControlCurve, RoadDefinition},
        sampler::SplineSampler,
    };

    fn road(points: &[(f64, f64)]) -> RoadDefinition {
        RoadDefinition::new(points.iter().map(|&(x, y)| Site::new(x, y)).collect::<ControlCurve>())
    }

    fn detect(definitions: Vec<RoadDefinition>) -> (RoadNetwork, Detection) {
        let (network, _) =
            RoadNetwork::from_definitions(definitions, &SplineSampler::new(1.0, 1.0));
        let detection = JunctionDetector::new(10.0).detect(&network);
        (network, detection)
    }

    fn of_type(detection: &Detection, junction_type: JunctionType) -> Vec<&Junction> {
        detection
            .junctions
            .iter()
            .filter(|junction| junction.junction_type == junction_type)
            .collect()
    }

    #[test]
    fn test_t_junction() {
        let (_, detection) = detect(vec![
            road(&[(0.0, 0.0), (100.0, 0.0)]),
            road(&[(50.0, 60.0), (50.0, 5.0)]),
        ]);
        let t = of_type(&detection, JunctionType::TJunction);
        assert_eq!(t.len(), 1);
        assert!(t[0].site.distance(&Site::new(50.0, 0.0)) < 1e-6);

        let continuous = t[0].contributors_of(RoadId::new(0)).next().unwrap();
        assert_eq!(continuous.role, ContributorRole::Continuous);
        assert!((continuous.distance - 50.0).abs() < 1e-6);
        assert!(!continuous.is_endpoint);

        let terminating = t[0].contributors_of(RoadId::new(1)).next().unwrap();
        assert_eq!(terminating.role, ContributorRole::Terminating);
        assert!(terminating.is_endpoint);

        // Both ends of the main road and the far end of the branch are dead ends.
        assert_eq!(of_type(&detection, JunctionType::Endpoint).len(), 3);
        assert!(of_type(&detection, JunctionType::MidSplineCrossing).is_empty());
        assert!(detection.anomalies.is_empty());
    }

    #[test]
    fn test_y_junction() {
        let (_, detection) = detect(vec![
            road(&[(0.0, 0.0), (50.0, 0.0)]),
            road(&[(50.0, 0.0), (50.0, 50.0)]),
        ]);
        let y = of_type(&detection, JunctionType::YJunction);
        assert_eq!(y.len(), 1);
        assert_eq!(y[0].contributors.len(), 2);
        assert!(y[0].site.distance(&Site::new(50.0, 0.0)) < 1e-6);
        assert_eq!(of_type(&detection, JunctionType::Endpoint).len(), 2);
    }

    #[test]
    fn test_crossroads_on_continuous_road() {
        let (_, detection) = detect(vec![
            road(&[(0.0, 0.0), (100.0, 0.0)]),
            road(&[(50.0, 50.0), (50.0, 3.0)]),
            road(&[(50.0, -50.0), (50.0, -3.0)]),
        ]);
        let crossroads = of_type(&detection, JunctionType::CrossRoads);
        assert_eq!(crossroads.len(), 1);
        assert_eq!(crossroads[0].contributors.len(), 3);
        assert!(of_type(&detection, JunctionType::TJunction).is_empty());
    }

    #[test]
    fn test_mid_spline_crossing() {
        let (_, detection) = detect(vec![
            road(&[(0.0, 50.0), (100.0, 50.0)]),
            road(&[(50.0, 0.0), (50.0, 100.0)]),
        ]);
        let crossing = of_type(&detection, JunctionType::MidSplineCrossing);
        assert_eq!(crossing.len(), 1);
        assert!(crossing[0].site.distance(&Site::new(50.0, 50.0)) < 1e-6);
        assert!(crossing[0]
            .contributors
            .iter()
            .all(|contributor| contributor.role == ContributorRole::PassThrough
                && (contributor.distance - 50.0).abs() < 1e-6));
        assert_eq!(of_type(&detection, JunctionType::Endpoint).len(), 4);
        // Crossings come after road end junctions.
        assert_eq!(
            detection.junctions.last().unwrap().junction_type,
            JunctionType::MidSplineCrossing
        );
    }

    #[test]
    fn test_roundabout_connection() {
        let ring = (0..16)
            .map(|i| {
                let angle = i as f64 / 16.0 * std::f64::consts::TAU;
                (50.0 + 20.0 * angle.cos(), 50.0 + 20.0 * angle.sin())
            })
            .chain(std::iter::once((70.0, 50.0)))
            .collect::<Vec<_>>();
        let (network, detection) = detect(vec![
            road(&ring),
            road(&[(50.0, 110.0), (50.0, 72.0)]),
        ]);
        assert!(network.roads()[0].closed);
        let roundabout = of_type(&detection, JunctionType::RoundaboutConnection);
        assert_eq!(roundabout.len(), 1);
        assert!(roundabout[0].site.distance(&Site::new(50.0, 70.0)) < 0.5);
        assert_eq!(of_type(&detection, JunctionType::Endpoint).len(), 1);
    }

    #[test]
    fn test_ids_are_sequential_and_deterministic() {
        let definitions = vec![
            road(&[(0.0, 50.0), (100.0, 50.0)]),
            road(&[(50.0, 0.0), (50.0, 100.0)]),
            road(&[(0.0, 0.0), (100.0, 0.0)]),
        ];
        let (_, first) = detect(definitions.clone());
        let (_, second) = detect(definitions);
        assert_eq!(first.junctions, second.junctions);
        assert!(first
            .junctions
            .iter()
            .enumerate()
            .all(|(i, junction)| junction.id.as_num() == i));
    }
}
