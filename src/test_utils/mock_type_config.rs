use crate::MockCatalogStore;
use crate::MockClock;
use crate::MockReplicator;
use crate::MockTabletFleet;
use crate::TypeConfig;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockTypeConfig;

impl TypeConfig for MockTypeConfig {
    type R = MockReplicator;

    type F = MockTabletFleet;

    type C = MockCatalogStore;

    type CL = MockClock;
}
