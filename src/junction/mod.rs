pub mod detector;

use crate::core::{
    container::handle::{JunctionId, RoadId, SectionRef},
    geometry::site::Site,
};

/// Classification of a meeting point between roads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JunctionType {
    /// A dead end: the end of a road meeting nothing.
    Endpoint,
    /// The end of one road meeting the interior of another road.
    TJunction,
    /// The ends of two roads meeting each other.
    YJunction,
    /// Three or four road ends, or two road ends on the interior of another road.
    CrossRoads,
    /// Any larger meeting.
    ComplexMeet,
    /// Two roads crossing each other away from their ends.
    MidSplineCrossing,
    /// The end of a road meeting a closed ring.
    RoundaboutConnection,
}

impl JunctionType {
    pub const ALL: [JunctionType; 7] = [
        JunctionType::Endpoint,
        JunctionType::TJunction,
        JunctionType::YJunction,
        JunctionType::CrossRoads,
        JunctionType::ComplexMeet,
        JunctionType::MidSplineCrossing,
        JunctionType::RoundaboutConnection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JunctionType::Endpoint => "endpoint",
            JunctionType::TJunction => "t-junction",
            JunctionType::YJunction => "y-junction",
            JunctionType::CrossRoads => "crossroads",
            JunctionType::ComplexMeet => "complex",
            JunctionType::MidSplineCrossing => "crossing",
            JunctionType::RoundaboutConnection => "roundabout",
        }
    }
}

/// How a road takes part in a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContributorRole {
    /// The road runs through the junction and carries it.
    Continuous,
    /// The road ends at the junction.
    Terminating,
    /// The road crosses another road without ending.
    PassThrough,
}

/// A road taking part in a junction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contributor {
    /// Cross-section of the road nearest to the junction.
    pub section: SectionRef,
    /// Running distance of the exact contact point along the road.
    pub distance: f64,
    pub is_endpoint: bool,
    pub role: ContributorRole,
    /// Signed longitudinal slope of the road at the junction, along its running distance.
    ///
    /// Set by the harmonizer.
    pub slope: f64,
}

impl Contributor {
    pub fn new(
        section: SectionRef,
        distance: f64,
        is_endpoint: bool,
        role: ContributorRole,
    ) -> Self {
        Self {
            section,
            distance,
            is_endpoint,
            role,
            slope: 0.0,
        }
    }

    pub fn road(&self) -> RoadId {
        self.section.road
    }
}

/// A meeting point between roads, or a dead end.
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub id: JunctionId,
    pub site: Site,
    pub junction_type: JunctionType,
    /// Harmonized elevation. Unset until the harmonizer runs.
    pub elevation: Option<f64>,
    /// Distance along the roads over which the junction elevation is blended.
    pub blend_distance: f64,
    /// Contributors ordered by road.
    pub contributors: Vec<Contributor>,
}

impl Junction {
    pub fn new(
        id: JunctionId,
        site: Site,
        junction_type: JunctionType,
        mut contributors: Vec<Contributor>,
    ) -> Self {
        contributors.sort_by(|a, b| {
            a.section
                .cmp(&b.section)
                .then(a.distance.total_cmp(&b.distance))
        });
        Self {
            id,
            site,
            junction_type,
            elevation: None,
            blend_distance: 0.0,
            contributors,
        }
    }

    /// Iterate over the roads of the junction, without duplicates.
    pub fn roads(&self) -> impl Iterator<Item = RoadId> + '_ {
        self.contributors
            .iter()
            .enumerate()
            .filter(|(i, contributor)| {
                *i == 0 || self.contributors[i - 1].road() != contributor.road()
            })
            .map(|(_, contributor)| contributor.road())
    }

    pub fn involves(&self, road: RoadId) -> bool {
        self.contributors
            .iter()
            .any(|contributor| contributor.road() == road)
    }

    pub fn contributors_of(&self, road: RoadId) -> impl Iterator<Item = &Contributor> {
        self.contributors
            .iter()
            .filter(move |contributor| contributor.road() == road)
    }
}
