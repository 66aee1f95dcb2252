use std::fmt;

/// ID for identifying a road in the network.
///
/// The ID is the position of the road in the input list, so it doubles as the
/// deterministic tie-breaker between roads of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoadId(usize);

impl RoadId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_num(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of a cross-section: the owning road and the local sequence index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionRef {
    pub road: RoadId,
    pub index: usize,
}

impl SectionRef {
    pub fn new(road: RoadId, index: usize) -> Self {
        Self { road, index }
    }
}

/// ID for identifying a junction in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JunctionId(usize);

impl JunctionId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_num(&self) -> usize {
        self.0
    }
}

/// Hands out junction IDs in detection order, starting from 0.
#[derive(Debug, Clone, Default)]
pub struct JunctionIdGenerator {
    next_id: usize,
}

impl JunctionIdGenerator {
    pub fn generate_id(&mut self) -> JunctionId {
        let id = self.next_id;
        self.next_id += 1;
        JunctionId::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sequential_ids() {
        let mut generator = JunctionIdGenerator::default();
        assert_eq!(generator.generate_id(), JunctionId::new(0));
        assert_eq!(generator.generate_id(), JunctionId::new(1));
        assert_eq!(generator.generate_id().as_num(), 2);
    }

    #[test]
    fn test_section_order() {
        let a = SectionRef::new(RoadId::new(0), 5);
        let b = SectionRef::new(RoadId::new(1), 0);
        assert!(a < b);
        assert_eq!(RoadId::new(3).to_string(), "#3");
    }
}
