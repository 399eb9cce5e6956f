use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::decode_value;
use crate::CatalogEntry;
use crate::CatalogStore;
use crate::EntityType;
use crate::HybridTime;
use crate::RecordValue;
use crate::Result;
use crate::ScheduleFilter;
use crate::ScheduleId;
use crate::ScheduleMinRestoreTime;
use crate::ScheduleRestoration;
use crate::SnapshotError;
use crate::TableId;
use crate::TableInfo;
use crate::TabletId;
use crate::TabletInfo;
use crate::WriteBatch;
use crate::WritePair;

#[derive(Debug, Clone)]
struct TableRecord {
    info: TableInfo,
    tablets: Vec<TabletId>,
    created_at: HybridTime,
    hidden_at: Option<HybridTime>,
    /// Schedules that may still restore the table after it was hidden.
    retained_by: Vec<ScheduleId>,
}

impl TableRecord {
    fn existed_at(
        &self,
        time: HybridTime,
    ) -> bool {
        self.created_at <= time && self.hidden_at.map_or(true, |hidden_at| hidden_at > time)
    }
}

#[derive(Debug, Default)]
struct CatalogData {
    tables: BTreeMap<TableId, TableRecord>,
    tablet_to_table: BTreeMap<TabletId, TableId>,
    records: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// In-memory catalog store
///
/// Keeps a flat table/tablet catalog with creation and hide times, which is
/// enough to answer point-in-time questions for restores and hidden object
/// garbage collection.
#[derive(Debug, Default)]
pub struct MemCatalogStore {
    data: RwLock<CatalogData>,
}

impl MemCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(
        &self,
        info: TableInfo,
        tablets: &[&str],
        created_at: HybridTime,
    ) {
        let mut data = self.data.write();
        let tablets: Vec<TabletId> = tablets.iter().map(|t| t.to_string()).collect();
        for tablet_id in &tablets {
            data.tablet_to_table.insert(tablet_id.clone(), info.id.clone());
        }
        data.tables.insert(
            info.id.clone(),
            TableRecord {
                info,
                tablets,
                created_at,
                hidden_at: None,
                retained_by: Vec::new(),
            },
        );
    }

    /// Drops a table. It stays restorable by `retained_by` schedules until
    /// their min restore time passes `hidden_at`.
    pub fn hide_table(
        &self,
        table_id: &str,
        hidden_at: HybridTime,
        retained_by: Vec<ScheduleId>,
    ) -> Result<()> {
        let mut data = self.data.write();
        let table = data.tables.get_mut(table_id).ok_or_else(|| SnapshotError::NotFound {
            entity: "table",
            id: table_id.to_string(),
        })?;
        table.hidden_at = Some(hidden_at);
        table.retained_by = retained_by;
        Ok(())
    }

    pub fn table(
        &self,
        table_id: &str,
    ) -> Option<TableInfo> {
        self.data.read().tables.get(table_id).map(|t| t.info.clone())
    }

    pub fn contains_table(
        &self,
        table_id: &str,
    ) -> bool {
        self.data.read().tables.contains_key(table_id)
    }

    pub fn is_hidden(
        &self,
        table_id: &str,
    ) -> bool {
        self.data
            .read()
            .tables
            .get(table_id)
            .map(|t| t.hidden_at.is_some())
            .unwrap_or(false)
    }

    /// Number of live coordinator records of `entity_type`.
    pub fn record_count(
        &self,
        entity_type: EntityType,
    ) -> usize {
        self.data
            .read()
            .records
            .keys()
            .filter(|key| key.first() == Some(&entity_type.tag()))
            .count()
    }
}

impl CatalogStore for MemCatalogStore {
    fn collect_entries(
        &self,
        filter: &ScheduleFilter,
    ) -> Result<Vec<CatalogEntry>> {
        let data = self.data.read();
        let mut entries = Vec::new();
        for table in data.tables.values() {
            if table.hidden_at.is_some() || !filter.matches(&table.info) {
                continue;
            }
            entries.push(CatalogEntry {
                entity_type: EntityType::Table,
                id: table.info.id.clone(),
                data: bincode::serialize(&table.info)?,
            });
            entries.extend(table.tablets.iter().map(|t| CatalogEntry::tablet(t.clone())));
        }
        trace!("collected {} entries", entries.len());
        Ok(entries)
    }

    fn tablet_infos(
        &self,
        tablet_ids: &[TabletId],
    ) -> Vec<Option<TabletInfo>> {
        let data = self.data.read();
        tablet_ids
            .iter()
            .map(|tablet_id| {
                let table_id = data.tablet_to_table.get(tablet_id)?;
                let table = data.tables.get(table_id)?;
                Some(TabletInfo {
                    tablet_id: tablet_id.clone(),
                    table: table.info.clone(),
                })
            })
            .collect()
    }

    fn apply_write_batch(
        &self,
        batch: &WriteBatch,
    ) -> Result<()> {
        let mut data = self.data.write();
        for pair in batch.pairs() {
            match decode_value(&pair.value)? {
                RecordValue::Tombstone => {
                    data.records.remove(&pair.key);
                }
                RecordValue::Payload(_) => {
                    data.records.insert(pair.key.clone(), pair.value.clone());
                }
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        entity_type: EntityType,
    ) -> Result<Vec<WritePair>> {
        Ok(self
            .data
            .read()
            .records
            .iter()
            .filter(|(key, _)| key.first() == Some(&entity_type.tag()))
            .map(|(key, value)| WritePair {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn restore_sys_catalog(
        &self,
        restoration: &mut ScheduleRestoration,
    ) -> Result<()> {
        let mut data = self.data.write();
        let restore_at = restoration.restore_at;
        let mut obsolete = Vec::new();
        for (table_id, table) in data.tables.iter_mut() {
            if !restoration.filter.matches(&table.info) {
                continue;
            }
            if table.existed_at(restore_at) {
                table.hidden_at = None;
                table.retained_by.clear();
                restoration
                    .objects_to_restore
                    .insert(table_id.clone(), EntityType::Table);
                for tablet_id in &table.tablets {
                    restoration
                        .objects_to_restore
                        .insert(tablet_id.clone(), EntityType::Tablet);
                }
            } else if table.created_at > restore_at {
                obsolete.push(table_id.clone());
            }
        }
        for table_id in obsolete {
            if let Some(table) = data.tables.remove(&table_id) {
                for tablet_id in &table.tablets {
                    data.tablet_to_table.remove(tablet_id);
                }
                restoration.obsolete_tablets.extend(table.tablets);
                restoration.obsolete_tables.push(table_id);
            }
        }
        info!(
            "restored catalog as of {}: {} objects, {} obsolete tables",
            restore_at,
            restoration.objects_to_restore.len(),
            restoration.obsolete_tables.len()
        );
        Ok(())
    }

    fn verify_restored_objects(
        &self,
        restoration: &ScheduleRestoration,
    ) -> Result<()> {
        let data = self.data.read();
        for (id, entity_type) in &restoration.objects_to_restore {
            let present = match entity_type {
                EntityType::Table => data.tables.get(id).map_or(false, |t| t.hidden_at.is_none()),
                EntityType::Tablet => data.tablet_to_table.contains_key(id),
                _ => true,
            };
            if !present {
                return Err(SnapshotError::IllegalState(format!(
                    "restored {:?} {} missing from catalog",
                    entity_type, id
                ))
                .into());
            }
        }
        Ok(())
    }

    fn cleanup_hidden_objects(
        &self,
        schedule_min_restore_time: &ScheduleMinRestoreTime,
    ) {
        let mut data = self.data.write();
        let expired: Vec<TableId> = data
            .tables
            .iter()
            .filter_map(|(table_id, table)| {
                let hidden_at = table.hidden_at?;
                let retained = table.retained_by.iter().any(|schedule_id| {
                    schedule_min_restore_time
                        .get(schedule_id)
                        .map_or(false, |min_restore_time| *min_restore_time <= hidden_at)
                });
                (!retained).then(|| table_id.clone())
            })
            .collect();
        for table_id in expired {
            if let Some(table) = data.tables.remove(&table_id) {
                debug!("cleanup hidden table {}", table_id);
                for tablet_id in &table.tablets {
                    data.tablet_to_table.remove(tablet_id);
                }
            }
        }
    }
}
