//! CatalogStore
//!
//! The catalog manager owns tables, tablets and their lifecycle. The
//! coordinator only needs a narrow view of it:
//! - resolving a schedule filter into the tables/tablets it covers,
//! - resolving tablet ids into the table metadata sent on restore,
//! - persisting and scanning the coordinator's own records,
//! - hosting the metadata phase of a point-in-time restore,
//! - garbage collecting hidden objects no schedule can restore anymore.

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use super::EntityType;
use super::WriteBatch;
use super::WritePair;
use crate::HybridTime;
use crate::RestorationId;
use crate::Result;
use crate::ScheduleId;
use crate::SnapshotId;
use crate::TableId;
use crate::TabletId;

/// One catalog object captured by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub entity_type: EntityType,
    pub id: String,
    /// Serialized catalog metadata of the object, opaque to the coordinator.
    pub data: Vec<u8>,
}

impl CatalogEntry {
    pub fn new(
        entity_type: EntityType,
        id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            id: id.into(),
            data: Vec::new(),
        }
    }

    pub fn tablet(id: impl Into<String>) -> Self {
        Self::new(EntityType::Tablet, id)
    }

    pub fn table(id: impl Into<String>) -> Self {
        Self::new(EntityType::Table, id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub namespace: String,
    pub name: String,
    /// Serialized table schema, forwarded to workers on the tablet restore phase.
    pub schema: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletInfo {
    pub tablet_id: TabletId,
    pub table: TableInfo,
}

/// Selects a table either by id, or by namespace plus optional name.
/// A namespace without a name selects every table of the namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    pub table_id: Option<TableId>,
    pub namespace: Option<String>,
    pub table_name: Option<String>,
}

impl TableIdentifier {
    pub fn by_id(table_id: impl Into<TableId>) -> Self {
        Self {
            table_id: Some(table_id.into()),
            ..Default::default()
        }
    }

    pub fn by_name(
        namespace: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            table_id: None,
            namespace: Some(namespace.into()),
            table_name: Some(table_name.into()),
        }
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            table_id: None,
            namespace: Some(namespace.into()),
            table_name: None,
        }
    }

    pub fn matches(
        &self,
        table: &TableInfo,
    ) -> bool {
        if let Some(id) = &self.table_id {
            return *id == table.id;
        }
        let Some(namespace) = &self.namespace else {
            return false;
        };
        if *namespace != table.namespace {
            return false;
        }
        match &self.table_name {
            Some(name) => *name == table.name,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFilter {
    pub tables: Vec<TableIdentifier>,
}

impl ScheduleFilter {
    pub fn new(tables: Vec<TableIdentifier>) -> Self {
        Self { tables }
    }

    pub fn matches(
        &self,
        table: &TableInfo,
    ) -> bool {
        self.tables.iter().any(|identifier| identifier.matches(table))
    }
}

/// Per schedule, the time below which hidden objects are no longer restorable.
pub type ScheduleMinRestoreTime = BTreeMap<ScheduleId, HybridTime>;

/// A point-in-time restore parked between its metadata and tablet phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRestoration {
    pub snapshot_id: SnapshotId,
    pub restore_at: HybridTime,
    pub restoration_id: RestorationId,
    pub term: i64,
    pub filter: ScheduleFilter,
    /// Filled by the catalog store while reloading metadata as of `restore_at`.
    pub objects_to_restore: BTreeMap<String, EntityType>,
    pub obsolete_tablets: Vec<TabletId>,
    pub obsolete_tables: Vec<TableId>,
}

impl ScheduleRestoration {
    pub fn tablets_to_restore(&self) -> Vec<TabletId> {
        self.objects_to_restore
            .iter()
            .filter(|(_, entity_type)| **entity_type == EntityType::Tablet)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg_attr(test, automock)]
pub trait CatalogStore: Send + Sync + 'static {
    /// Tables matching `filter` and all of their tablets, as of now.
    fn collect_entries(
        &self,
        filter: &ScheduleFilter,
    ) -> Result<Vec<CatalogEntry>>;

    /// Resolves tablet ids, `None` for tablets the catalog does not know.
    fn tablet_infos(
        &self,
        tablet_ids: &[TabletId],
    ) -> Vec<Option<TabletInfo>>;

    /// Persists coordinator records.
    fn apply_write_batch(
        &self,
        batch: &WriteBatch,
    ) -> Result<()>;

    /// All live coordinator records of `entity_type`.
    fn scan(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<WritePair>>;

    /// Reloads catalog metadata as of `restoration.restore_at` for the objects
    /// covered by `restoration.filter` and records what has to be restored.
    fn restore_sys_catalog(
        &self,
        restoration: &mut ScheduleRestoration,
    ) -> Result<()>;

    fn verify_restored_objects(
        &self,
        restoration: &ScheduleRestoration,
    ) -> Result<()>;

    fn cleanup_hidden_objects(
        &self,
        schedule_min_restore_time: &ScheduleMinRestoreTime,
    );
}
