use rstar::{PointDistance, RTreeObject};

use crate::core::geometry::{line_segment::LineSegment, site::Site};

use super::handle::SectionRef;

/// Cross-section registered in an R-tree by its center site.
#[derive(Debug, Clone)]
pub struct SectionTreeObject {
    site: Site,
    section: SectionRef,
}

impl SectionTreeObject {
    pub fn new(site: Site, section: SectionRef) -> Self {
        Self { site, section }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn section(&self) -> SectionRef {
        self.section
    }
}

impl RTreeObject for SectionTreeObject {
    type Envelope = rstar::AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        rstar::AABB::from_point(self.site.as_array())
    }
}

impl PointDistance for SectionTreeObject {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.site.x - point[0];
        let dy = self.site.y - point[1];
        dx * dx + dy * dy
    }
}

impl PartialEq for SectionTreeObject {
    fn eq(&self, other: &Self) -> bool {
        self.section == other.section
    }
}

/// Centerline piece between two consecutive cross-sections, registered in an R-tree.
#[derive(Debug, Clone)]
pub struct SegmentTreeObject {
    segment: LineSegment,
    start: SectionRef,
    end: SectionRef,
}

impl SegmentTreeObject {
    pub fn new(segment: LineSegment, start: SectionRef, end: SectionRef) -> Self {
        Self {
            segment,
            start,
            end,
        }
    }

    pub fn segment(&self) -> &LineSegment {
        &self.segment
    }

    /// Get the cross-sections at the start and end of the segment.
    pub fn sections(&self) -> (SectionRef, SectionRef) {
        (self.start, self.end)
    }
}

impl RTreeObject for SegmentTreeObject {
    type Envelope = rstar::AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.segment.envelope()
    }
}

impl PointDistance for SegmentTreeObject {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.segment.distance_2(point)
    }
}

impl PartialEq for SegmentTreeObject {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}
