//! Index snapshots with BLAKE3 hashing.
//!
//! An [`IndexSnapshot`] records what the manager's indices look like at a
//! point in time: every entity with its component kinds and hierarchy links,
//! and the members of every filter and group. Everything is listed in a
//! deterministic order, so two managers that went through the same
//! operations produce byte-identical snapshots and the same hash.
//!
//! Component *data* is not captured; components are arbitrary Rust types
//! and carry no serialization contract.
//!
//! # Usage
//!
//! ```
//! use prefab_engine::prelude::*;
//!
//! let mut driver = FrameDriver::from_config(FrameConfig::default()).unwrap();
//! driver.manager_mut().create_entity("root");
//! driver.run_frames(3, 1.0 / 60.0).unwrap();
//!
//! let snapshot = driver.capture_snapshot().unwrap();
//! assert_eq!(snapshot.frame, 3);
//! assert_eq!(snapshot.hash.len(), 64); // BLAKE3 hex digest
//! assert!(snapshot.verify().unwrap());
//! ```

use std::collections::BTreeMap;

use prefab_ecs::entity::EntityId;
use prefab_ecs::manager::EntityManager;
use serde::{Deserialize, Serialize};

use crate::driver::FrameDriver;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// One entity as seen by the indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    /// Attached kinds in name order.
    pub kinds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<EntityId>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<EntityId>,
    /// Tag name -> child, sorted by tag name.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<(String, EntityId)>,
}

/// Deterministic capture of a manager's indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Completed frames at capture time.
    pub frame: u64,
    /// Entities in ascending id order.
    pub entities: Vec<EntityRecord>,
    /// Filter name -> members, ascending.
    pub filters: BTreeMap<String, Vec<EntityId>>,
    /// Group name -> members, ascending.
    pub groups: BTreeMap<String, Vec<EntityId>>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of everything above.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 hex digest of the hashable snapshot state. The hash
/// field itself is not included.
fn compute_hash(
    frame: u64,
    entities: &[EntityRecord],
    filters: &BTreeMap<String, Vec<EntityId>>,
    groups: &BTreeMap<String, Vec<EntityId>>,
) -> Result<String, serde_json::Error> {
    #[derive(Serialize)]
    struct HashableState<'a> {
        frame: u64,
        entities: &'a [EntityRecord],
        filters: &'a BTreeMap<String, Vec<EntityId>>,
        groups: &'a BTreeMap<String, Vec<EntityId>>,
    }

    let json_bytes = serde_json::to_vec(&HashableState {
        frame,
        entities,
        filters,
        groups,
    })?;
    Ok(blake3::hash(&json_bytes).to_hex().to_string())
}

impl IndexSnapshot {
    /// Capture `manager`'s indices, labelled with `frame`.
    pub fn capture(manager: &EntityManager, frame: u64) -> Result<Self, serde_json::Error> {
        let entities: Vec<EntityRecord> = manager
            .entities()
            .map(|(id, entity)| EntityRecord {
                id,
                name: entity.name().to_owned(),
                kinds: entity
                    .component_kinds()
                    .map(|k| k.name().to_owned())
                    .collect(),
                external_id: entity.external_id().map(|ext| ext.to_string()),
                parent: entity.parent(),
                children: entity.children().to_vec(),
                tags: entity
                    .tags()
                    .into_iter()
                    .map(|(tag, child)| (tag.to_owned(), child))
                    .collect(),
            })
            .collect();

        let filters: BTreeMap<String, Vec<EntityId>> = manager
            .filter_names()
            .into_iter()
            .map(|name| (name.to_owned(), manager.get_all_using_filter_name(name)))
            .collect();

        let groups: BTreeMap<String, Vec<EntityId>> = manager
            .group_names()
            .into_iter()
            .map(|name| (name.to_owned(), manager.get_all_using_group_name(name)))
            .collect();

        let hash = compute_hash(frame, &entities, &filters, &groups)?;
        Ok(Self {
            frame,
            entities,
            filters,
            groups,
            hash,
        })
    }

    /// Recompute the hash and compare it with the recorded one.
    pub fn verify(&self) -> Result<bool, serde_json::Error> {
        let expected = compute_hash(self.frame, &self.entities, &self.filters, &self.groups)?;
        Ok(expected == self.hash)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// FrameDriver snapshot methods
// ---------------------------------------------------------------------------

impl FrameDriver {
    /// Capture the manager's indices at the current frame count.
    pub fn capture_snapshot(&self) -> Result<IndexSnapshot, serde_json::Error> {
        IndexSnapshot::capture(self.manager(), self.frame_count())
    }

    /// BLAKE3 hex digest of the current index state.
    pub fn state_hash(&self) -> Result<String, serde_json::Error> {
        Ok(self.capture_snapshot()?.hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
