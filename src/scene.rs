use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::properties::{PropertyBag, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Location,
    Rotation,
    Scale,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Location => "location",
            Channel::Rotation => "rotation",
            Channel::Scale => "scale",
        }
    }
}

/// Where a keyframe or driver lands on an entity: either a tracked custom
/// property (bracketed-quoted form) or a built-in transform channel
/// decomposed into channel + axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyTarget {
    Custom(String),
    Channel { channel: Channel, axis: usize },
}

impl KeyTarget {
    /// Parses `["name"]`, `scale_x`-style channel paths, or a bare custom
    /// property name. A recognized channel with an unknown axis is invalid.
    pub fn parse(path: &str) -> Result<KeyTarget> {
        if let Some(inner) = path.strip_prefix("[\"").and_then(|r| r.strip_suffix("\"]")) {
            return Ok(KeyTarget::Custom(inner.to_string()));
        }
        if let Some((head, axis)) = path.split_once('_') {
            let channel = match head {
                "location" => Some(Channel::Location),
                "rotation" => Some(Channel::Rotation),
                "scale" => Some(Channel::Scale),
                _ => None,
            };
            if let Some(channel) = channel {
                let axis = match axis {
                    "x" => 0,
                    "y" => 1,
                    "z" => 2,
                    _ => return Err(EngineError::Target(path.to_string())),
                };
                return Ok(KeyTarget::Channel { channel, axis });
            }
        }
        Ok(KeyTarget::Custom(path.to_string()))
    }

    fn storage_key(&self) -> String {
        match self {
            KeyTarget::Custom(name) => format!("[\"{name}\"]"),
            KeyTarget::Channel { channel, axis } => {
                format!("{}.{}", channel.name(), ["x", "y", "z"][*axis])
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderNode {
    pub name: String,
    pub bag: PropertyBag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub nodes: Vec<ShaderNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub bag: PropertyBag,
    pub parent: Option<EntityId>,
    pub collection: Option<CollectionId>,
    pub transform: Transform,
    pub materials: Vec<MaterialId>,
    /// Set only on lightweight instance objects referencing a template.
    pub instance_of: Option<CollectionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub bag: PropertyBag,
    pub parent: Option<CollectionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverTarget {
    /// A transform channel or custom property on an object.
    Object { entity: EntityId, target: KeyTarget },
    /// The output value of a shader-graph node inside a material.
    NodeValue { material: MaterialId, node: String },
}

/// A synthesized driver: an expression over named variables, each bound to
/// a data path on the owning object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub target: DriverTarget,
    /// The object whose property bag the variables read from.
    pub variable_owner: EntityId,
    pub expression: String,
    pub variables: Vec<(String, String)>,
}

/// In-memory stand-in for the host scene graph. The engine assumes
/// exclusive access for the duration of one synchronous operation.
#[derive(Debug, Default)]
pub struct Scene {
    pub fps: f64,
    next_id: u64,
    entities: BTreeMap<EntityId, Entity>,
    collections: BTreeMap<CollectionId, Collection>,
    materials: BTreeMap<MaterialId, Material>,
    pub drivers: Vec<Driver>,
    keyframes: BTreeMap<(EntityId, String), Vec<Keyframe>>,
}

impl Scene {
    pub fn new(fps: f64) -> Scene {
        Scene {
            fps,
            ..Scene::default()
        }
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // --- entities ---

    pub fn add_entity(&mut self, name: &str, collection: Option<CollectionId>) -> EntityId {
        let id = EntityId(self.next());
        self.entities.insert(
            id,
            Entity {
                name: name.to_string(),
                bag: PropertyBag::new(),
                parent: None,
                collection,
                transform: Transform::default(),
                materials: Vec::new(),
                instance_of: None,
            },
        );
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn children_of(&self, id: EntityId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.parent == Some(id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Deletes an entity together with its keyframes and any drivers
    /// targeting it. Children are left to the caller; collection deletion
    /// sweeps whole member sets instead.
    pub fn delete_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
        self.keyframes.retain(|(owner, _), _| *owner != id);
        self.drivers.retain(|d| {
            !matches!(d.target, DriverTarget::Object { entity, .. } if entity == id)
                && d.variable_owner != id
        });
    }

    /// Deep copy of one entity: bag, transform and material references.
    /// Parent and children are left unset for the caller to rewire.
    pub fn duplicate_entity(&mut self, id: EntityId, into: Option<CollectionId>) -> Option<EntityId> {
        let source = self.entities.get(&id)?.clone();
        let new_id = EntityId(self.next());
        self.entities.insert(
            new_id,
            Entity {
                name: format!("{}_copy", source.name),
                bag: source.bag,
                parent: None,
                collection: into,
                transform: source.transform,
                materials: source.materials,
                instance_of: None,
            },
        );
        Some(new_id)
    }

    // --- collections ---

    pub fn add_collection(&mut self, name: &str, parent: Option<CollectionId>) -> CollectionId {
        let id = CollectionId(self.next());
        self.collections.insert(
            id,
            Collection {
                name: name.to_string(),
                bag: PropertyBag::new(),
                parent,
            },
        );
        id
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(&id)
    }

    pub fn collection_mut(&mut self, id: CollectionId) -> Option<&mut Collection> {
        self.collections.get_mut(&id)
    }

    pub fn collection_by_name(&self, name: &str) -> Option<CollectionId> {
        self.collections
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| *id)
    }

    pub fn child_collections(&self, id: CollectionId) -> Vec<CollectionId> {
        self.collections
            .iter()
            .filter(|(_, c)| c.parent == Some(id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Members of a collection, including members of nested child
    /// collections (the host's `all_objects` view).
    pub fn all_objects(&self, id: CollectionId) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| e.collection == Some(id))
            .map(|(id, _)| *id)
            .collect();
        for child in self.child_collections(id) {
            out.extend(self.all_objects(child));
        }
        out
    }

    /// Recursively deletes every object in the collection and its child
    /// collections, then the collections themselves.
    pub fn delete_collection_and_hierarchy(&mut self, id: CollectionId) {
        for entity in self.all_objects(id) {
            self.delete_entity(entity);
        }
        for child in self.child_collections(id) {
            self.delete_collection_and_hierarchy(child);
        }
        self.collections.remove(&id);
    }

    pub fn collections_with_property(&self, key: &str, value: &Value) -> Vec<CollectionId> {
        self.collections
            .iter()
            .filter(|(_, c)| c.bag.get(key) == Some(value))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Realized duplicate lookup by its `(track, note)` tags.
    pub fn find_collection_with_tags(&self, track: i64, note: i64) -> Option<CollectionId> {
        self.collections
            .iter()
            .find(|(_, c)| {
                c.bag.get("track").and_then(Value::as_float) == Some(track as f64)
                    && c.bag.get("note").and_then(Value::as_float) == Some(note as f64)
            })
            .map(|(id, _)| *id)
    }

    // --- instances ---

    pub fn create_collection_instance(
        &mut self,
        template: CollectionId,
        link_into: Option<CollectionId>,
    ) -> EntityId {
        let name = self
            .collections
            .get(&template)
            .map(|c| format!("Instance_{}", c.name))
            .unwrap_or_else(|| "Instance".to_string());
        let id = self.add_entity(&name, link_into);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.instance_of = Some(template);
        }
        id
    }

    pub fn find_collection_instances(&self, template: CollectionId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.instance_of == Some(template))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn instances(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.instance_of.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// First instance whose bag carries the given `(track, note)` tags.
    pub fn find_instance_with_tags(&self, track: i64, note: i64) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, e)| {
                e.instance_of.is_some()
                    && e.bag.get("track").and_then(Value::as_float) == Some(track as f64)
                    && e.bag.get("note").and_then(Value::as_float) == Some(note as f64)
            })
            .map(|(id, _)| *id)
    }

    // --- materials ---

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.next());
        self.materials.insert(id, material);
        id
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(&id)
    }

    /// Deep-copies a material so per-instance edits stop sharing state
    /// with siblings using the original asset.
    pub fn duplicate_material(&mut self, id: MaterialId) -> Option<MaterialId> {
        let mut copy = self.materials.get(&id)?.clone();
        copy.name = format!("{}_duplicate", copy.name);
        Some(self.add_material(copy))
    }

    // --- drivers & keyframes ---

    pub fn add_driver(&mut self, driver: Driver) {
        self.drivers.push(driver);
    }

    /// Current value of a target on an entity. A custom target missing from
    /// the bag (or non-numeric) is an addressing failure, reported upward.
    pub fn current_value(&self, id: EntityId, target: &KeyTarget) -> Result<f64> {
        let entity = self
            .entities
            .get(&id)
            .ok_or_else(|| EngineError::Target(format!("unknown entity {id:?}")))?;
        match target {
            KeyTarget::Custom(name) => entity
                .bag
                .get(name)
                .and_then(Value::as_float)
                .ok_or_else(|| EngineError::Target(name.clone())),
            KeyTarget::Channel { channel, axis } => {
                let t = &entity.transform;
                Ok(match channel {
                    Channel::Location => t.location[*axis],
                    Channel::Rotation => t.rotation[*axis],
                    Channel::Scale => t.scale[*axis],
                })
            }
        }
    }

    pub fn set_target_value(&mut self, id: EntityId, target: &KeyTarget, value: f64) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or_else(|| EngineError::Target(format!("unknown entity {id:?}")))?;
        match target {
            KeyTarget::Custom(name) => {
                // Only pre-existing custom properties are keyable; a typo'd
                // target must not silently grow a new property.
                if !entity.bag.contains_key(name) {
                    return Err(EngineError::Target(name.clone()));
                }
                entity.bag.insert(name.clone(), Value::Float(value));
            }
            KeyTarget::Channel { channel, axis } => {
                let t = &mut entity.transform;
                match channel {
                    Channel::Location => t.location[*axis] = value,
                    Channel::Rotation => t.rotation[*axis] = value,
                    Channel::Scale => t.scale[*axis] = value,
                }
            }
        }
        Ok(())
    }

    /// Samples the entity's *current* value of the target and records it at
    /// `frame`. Re-inserting at an existing frame overwrites that key.
    pub fn keyframe_insert(&mut self, id: EntityId, target: &KeyTarget, frame: i64) -> Result<()> {
        let value = self.current_value(id, target)?;
        let keys = self
            .keyframes
            .entry((id, target.storage_key()))
            .or_default();
        match keys.binary_search_by_key(&frame, |k| k.frame) {
            Ok(pos) => keys[pos].value = value,
            Err(pos) => keys.insert(pos, Keyframe { frame, value }),
        }
        Ok(())
    }

    pub fn keyframes(&self, id: EntityId, target: &KeyTarget) -> &[Keyframe] {
        self.keyframes
            .get(&(id, target.storage_key()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
