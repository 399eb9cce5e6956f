use std::fmt::Debug;

use crate::CatalogStore;
use crate::Clock;
use crate::Replicator;
use crate::TabletFleet;

/// Bundles the collaborators a coordinator is wired with.
pub trait TypeConfig:
    Sync + Send + Sized + Debug + Clone + Copy + Default + Eq + PartialEq + Ord + PartialOrd + 'static
{
    type R: Replicator;

    type F: TabletFleet;

    type C: CatalogStore;

    type CL: Clock;
}

pub mod alias {
    use super::TypeConfig;

    pub type ROF<T> = <T as TypeConfig>::R;

    pub type FOF<T> = <T as TypeConfig>::F;

    pub type COF<T> = <T as TypeConfig>::C;

    pub type CLOF<T> = <T as TypeConfig>::CL;
}
