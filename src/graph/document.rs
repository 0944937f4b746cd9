//! Provenance document - entities, activities, agents, relations
//!
//! The document is a content-addressed map from (kind, identifier) to a node's
//! attribute set, plus per-kind relation tables. `get-or-create` is the only
//! way to add a node, which makes the "each identifier appears at most once"
//! invariant mechanical: repeated construction of the same node merges
//! attributes instead of duplicating the record.

use std::collections::BTreeMap;
use std::path::Path;

use crate::Result;

/// Attribute set of one node, keyed by qualified attribute name.
pub type AttrMap = BTreeMap<String, String>;

/// Relation kinds emitted by the graph builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelationKind {
    /// Entity was generated by activity.
    WasGeneratedBy,
    /// Activity used entity.
    Used,
    /// Activity was associated with agent.
    WasAssociatedWith,
    /// Collection had member entity.
    HadMember,
    /// Activity was informed by another activity.
    WasInformedBy,
    /// Activity was started by another activity.
    WasStartedBy,
}

impl RelationKind {
    const ALL: [Self; 6] = [
        Self::WasGeneratedBy,
        Self::Used,
        Self::WasAssociatedWith,
        Self::HadMember,
        Self::WasInformedBy,
        Self::WasStartedBy,
    ];

    const fn json_key(self) -> &'static str {
        match self {
            Self::WasGeneratedBy => "wasGeneratedBy",
            Self::Used => "used",
            Self::WasAssociatedWith => "wasAssociatedWith",
            Self::HadMember => "hadMember",
            Self::WasInformedBy => "wasInformedBy",
            Self::WasStartedBy => "wasStartedBy",
        }
    }

    /// JSON role names for the (subject, object) pair of the relation.
    const fn roles(self) -> (&'static str, &'static str) {
        match self {
            Self::WasGeneratedBy => ("prov:entity", "prov:activity"),
            Self::Used => ("prov:activity", "prov:entity"),
            Self::WasAssociatedWith => ("prov:activity", "prov:agent"),
            Self::HadMember => ("prov:collection", "prov:entity"),
            Self::WasInformedBy => ("prov:informed", "prov:informant"),
            Self::WasStartedBy => ("prov:activity", "prov:starter"),
        }
    }

    const fn auto_id_prefix(self) -> &'static str {
        match self {
            Self::WasGeneratedBy => "gen",
            Self::Used => "use",
            Self::WasAssociatedWith => "assoc",
            Self::HadMember => "mem",
            Self::WasInformedBy => "inf",
            Self::WasStartedBy => "start",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Relation {
    id: Option<String>,
    subject: String,
    object: String,
}

/// Write-once provenance graph for one run.
#[derive(Debug, Clone, Default)]
pub struct ProvDocument {
    namespace: String,
    entities: BTreeMap<String, AttrMap>,
    activities: BTreeMap<String, AttrMap>,
    agents: BTreeMap<String, AttrMap>,
    relations: BTreeMap<RelationKind, Vec<Relation>>,
}

impl ProvDocument {
    /// Create an empty document under the given default namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Get or create the entity with the given identifier.
    pub fn entity(&mut self, id: &str) -> &mut AttrMap {
        self.entities.entry(id.to_string()).or_default()
    }

    /// Get or create the activity with the given identifier.
    pub fn activity(&mut self, id: &str) -> &mut AttrMap {
        self.activities.entry(id.to_string()).or_default()
    }

    /// Get or create the agent with the given identifier.
    pub fn agent(&mut self, id: &str) -> &mut AttrMap {
        self.agents.entry(id.to_string()).or_default()
    }

    /// Whether an entity with this identifier exists.
    #[must_use]
    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Whether an activity with this identifier exists.
    #[must_use]
    pub fn has_activity(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    /// Entity identifiers, in sorted order.
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Activity identifiers, in sorted order.
    pub fn activity_ids(&self) -> impl Iterator<Item = &str> {
        self.activities.keys().map(String::as_str)
    }

    /// Attributes of an entity, if it exists.
    #[must_use]
    pub fn entity_attrs(&self, id: &str) -> Option<&AttrMap> {
        self.entities.get(id)
    }

    /// Record `entity wasGeneratedBy activity`, optionally under a
    /// caller-supplied identifier. Identified relations are idempotent: a
    /// second call with the same identifier is a no-op.
    pub fn was_generated_by(&mut self, entity: &str, activity: &str, id: Option<&str>) {
        self.relate(RelationKind::WasGeneratedBy, entity, activity, id);
    }

    /// Record `activity used entity`.
    pub fn used(&mut self, activity: &str, entity: &str) {
        self.relate(RelationKind::Used, activity, entity, None);
    }

    /// Record `activity wasAssociatedWith agent`.
    pub fn was_associated_with(&mut self, activity: &str, agent: &str) {
        self.relate(RelationKind::WasAssociatedWith, activity, agent, None);
    }

    /// Record `collection hadMember entity`.
    pub fn had_member(&mut self, collection: &str, member: &str) {
        self.relate(RelationKind::HadMember, collection, member, None);
    }

    /// Record `informed wasInformedBy informant`.
    pub fn was_informed_by(&mut self, informed: &str, informant: &str) {
        self.relate(RelationKind::WasInformedBy, informed, informant, None);
    }

    /// Record `activity wasStartedBy starter`.
    pub fn was_started_by(&mut self, activity: &str, starter: &str) {
        self.relate(RelationKind::WasStartedBy, activity, starter, None);
    }

    /// Relations of one kind as (identifier, subject, object) triples, with
    /// auto-generated identifiers resolved.
    #[must_use]
    pub fn relations(&self, kind: RelationKind) -> Vec<(String, String, String)> {
        let Some(relations) = self.relations.get(&kind) else {
            return Vec::new();
        };
        relations
            .iter()
            .enumerate()
            .map(|(idx, rel)| {
                let id = rel
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("_:{}{idx}", kind.auto_id_prefix()));
                (id, rel.subject.clone(), rel.object.clone())
            })
            .collect()
    }

    fn relate(&mut self, kind: RelationKind, subject: &str, object: &str, id: Option<&str>) {
        let relations = self.relations.entry(kind).or_default();
        if let Some(id) = id {
            if relations.iter().any(|r| r.id.as_deref() == Some(id)) {
                return;
            }
        }
        relations.push(Relation {
            id: id.map(str::to_string),
            subject: subject.to_string(),
            object: object.to_string(),
        });
    }

    /// Render the document as its JSON-serializable graph form: top-level
    /// `entity`/`activity`/`agent` maps plus one map per relation kind.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Map, Value};

        let node_map = |nodes: &BTreeMap<String, AttrMap>| -> Value {
            let mut out = Map::new();
            for (id, attrs) in nodes {
                let attr_obj: Map<String, Value> = attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                out.insert(id.clone(), Value::Object(attr_obj));
            }
            Value::Object(out)
        };

        let mut doc = Map::new();
        doc.insert(
            "prefix".to_string(),
            json!({
                "default": self.namespace,
                "prov": "http://www.w3.org/ns/prov#",
                "xsd": "http://www.w3.org/2000/10/XMLSchema#",
                "prov-ml": "prov-ml",
            }),
        );
        doc.insert("entity".to_string(), node_map(&self.entities));
        doc.insert("activity".to_string(), node_map(&self.activities));
        doc.insert("agent".to_string(), node_map(&self.agents));

        for kind in RelationKind::ALL {
            let triples = self.relations(kind);
            if triples.is_empty() {
                continue;
            }
            let (subject_role, object_role) = kind.roles();
            let mut rel_map = Map::new();
            for (id, subject, object) in triples {
                rel_map.insert(
                    id,
                    json!({ subject_role: subject, object_role: object }),
                );
            }
            doc.insert(kind.json_key().to_string(), Value::Object(rel_map));
        }

        Value::Object(doc)
    }

    /// Write the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_get_or_create_never_duplicates() {
        let mut doc = ProvDocument::new("test");
        doc.entity("loss_TRAINING")
            .insert("prov-ml:name".to_string(), "loss".to_string());
        doc.entity("loss_TRAINING")
            .insert("prov-ml:context".to_string(), "TRAINING".to_string());

        assert_eq!(doc.entity_ids().count(), 1);
        let attrs = doc.entity_attrs("loss_TRAINING").unwrap();
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_identified_relation_is_idempotent() {
        let mut doc = ProvDocument::new("test");
        doc.was_generated_by("loss_TRAINING", "epoch_0", Some("loss_train_0_gen"));
        doc.was_generated_by("loss_TRAINING", "epoch_0", Some("loss_train_0_gen"));

        assert_eq!(doc.relations(RelationKind::WasGeneratedBy).len(), 1);
    }

    #[test]
    fn test_auto_relation_ids_are_deterministic() {
        let mut doc = ProvDocument::new("test");
        doc.used("run_execution", "lr");
        doc.used("run_execution", "batch_size");

        let used = doc.relations(RelationKind::Used);
        assert_eq!(used[0].0, "_:use0");
        assert_eq!(used[1].0, "_:use1");
    }

    #[test]
    fn test_json_shape() {
        let mut doc = ProvDocument::new("www.example.org");
        doc.entity("run_0")
            .insert("prov-ml:type".to_string(), "LearningStage".to_string());
        doc.activity("run_0_execution");
        doc.agent("alice");
        doc.was_associated_with("run_0_execution", "alice");

        let json = doc.to_json();
        assert_eq!(json["prefix"]["default"], "www.example.org");
        assert_eq!(json["entity"]["run_0"]["prov-ml:type"], "LearningStage");
        assert!(json["activity"]["run_0_execution"].is_object());
        assert_eq!(
            json["wasAssociatedWith"]["_:assoc0"]["prov:agent"],
            "alice"
        );
    }
}
