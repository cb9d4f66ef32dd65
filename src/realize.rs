use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use uuid::Uuid;

use crate::properties::{self, TrackedProperty, Value, PIX_ID, PIX_ID_DUPS, PIX_PREFIX};
use crate::scene::{
    CollectionId, Driver, DriverTarget, EntityId, KeyTarget, MaterialId, Scene,
};

/// True when any shader node of the material carries a tracked property.
pub fn has_customization(scene: &Scene, material: MaterialId) -> bool {
    scene
        .material(material)
        .map(|m| {
            m.nodes
                .iter()
                .any(|n| n.bag.keys().any(|k| k.starts_with(PIX_PREFIX)))
        })
        .unwrap_or(false)
}

/// Expands every live instance of the named template collections into
/// standalone duplicates.
///
/// Idempotent by destroy-and-rebuild: a template that already carries an
/// identifier first has all duplicates bearing its reverse index deleted.
/// Unknown template names are logged and skipped; the sweep continues.
pub fn realize_collections(scene: &mut Scene, names: &BTreeSet<String>, parent: Option<CollectionId>) {
    for name in names {
        let Some(template) = scene.collection_by_name(name) else {
            warn!("template collection '{name}' not found");
            continue;
        };

        let pix_id = match scene
            .collection(template)
            .and_then(|c| c.bag.get(PIX_ID))
            .cloned()
        {
            Some(id) => {
                for stale in scene.collections_with_property(PIX_ID_DUPS, &id) {
                    scene.delete_collection_and_hierarchy(stale);
                }
                id
            }
            None => {
                let id = Value::Text(Uuid::new_v4().to_string());
                if let Some(c) = scene.collection_mut(template) {
                    c.bag.insert(PIX_ID.to_string(), id.clone());
                }
                id
            }
        };

        for instance in scene.find_collection_instances(template) {
            realize_instance(scene, template, instance, &pix_id, parent);
        }
    }
}

/// Duplicates one template's full entity subgraph for one instance, tags
/// the duplicate, anchors it, and wires drivers. All-or-nothing per
/// instance: nothing here bails with the hierarchy half-copied.
fn realize_instance(
    scene: &mut Scene,
    template: CollectionId,
    instance: EntityId,
    pix_id: &Value,
    parent: Option<CollectionId>,
) {
    let Some(template_name) = scene.collection(template).map(|c| c.name.clone()) else {
        return;
    };
    let Some(instance_entity) = scene.entity(instance).cloned() else {
        return;
    };

    let duplicate = scene.add_collection(&format!("{template_name}_Duplicate"), parent);
    if let Some(c) = scene.collection_mut(duplicate) {
        c.bag.insert(PIX_ID_DUPS.to_string(), pix_id.clone());
        if let Some(track) = instance_entity.bag.get("track") {
            c.bag.insert("track".to_string(), track.clone());
        }
        if let Some(note) = instance_entity.bag.get("note") {
            c.bag.insert("note".to_string(), note.clone());
        }
    }

    // Root-first recursive copy: children are rewired to their duplicated
    // parent, never to an original.
    let members = scene.all_objects(template);
    let member_set: BTreeSet<EntityId> = members.iter().copied().collect();
    let mut old_to_new: BTreeMap<EntityId, EntityId> = BTreeMap::new();
    for &obj in &members {
        let obj_parent = scene.entity(obj).and_then(|e| e.parent);
        let is_root = obj_parent.map_or(true, |p| !member_set.contains(&p));
        if is_root {
            duplicate_recursive(scene, obj, None, duplicate, &mut old_to_new);
        }
    }

    // Synthetic anchor: duplicate roots hang under it, and it takes the
    // instance's transform so the whole duplicate moves as a unit.
    let anchor = scene.add_entity(&format!("Empty_{template_name}"), Some(duplicate));
    let roots: Vec<EntityId> = old_to_new
        .values()
        .copied()
        .filter(|&dup| scene.entity(dup).map_or(false, |e| e.parent.is_none()))
        .collect();
    for root in roots {
        if let Some(e) = scene.entity_mut(root) {
            e.parent = Some(anchor);
        }
    }
    if let Some(e) = scene.entity_mut(anchor) {
        e.transform = instance_entity.transform.clone();
    }

    scene.delete_entity(instance);

    duplicate_customized_materials(scene, duplicate);
    for obj in scene.all_objects(duplicate) {
        realize_object_properties(scene, obj);
        realize_material_node_properties(scene, obj);
    }
}

fn duplicate_recursive(
    scene: &mut Scene,
    obj: EntityId,
    new_parent: Option<EntityId>,
    into: CollectionId,
    old_to_new: &mut BTreeMap<EntityId, EntityId>,
) {
    let Some(dup) = scene.duplicate_entity(obj, Some(into)) else {
        return;
    };
    if let Some(e) = scene.entity_mut(dup) {
        e.parent = new_parent;
    }
    old_to_new.insert(obj, dup);
    for child in scene.children_of(obj) {
        if !old_to_new.contains_key(&child) {
            duplicate_recursive(scene, child, Some(dup), into, old_to_new);
        }
    }
}

/// Replaces every customized material slot in the collection with a deep
/// copy, so per-instance keyframes never leak through a shared asset.
/// Objects inside one duplicate keep sharing the one copy.
fn duplicate_customized_materials(scene: &mut Scene, collection: CollectionId) {
    let mut memo: HashMap<MaterialId, MaterialId> = HashMap::new();
    for obj in scene.all_objects(collection) {
        let Some(slots) = scene.entity(obj).map(|e| e.materials.clone()) else {
            continue;
        };
        for (slot, material) in slots.iter().enumerate() {
            if !has_customization(scene, *material) {
                continue;
            }
            let replacement = match memo.get(material) {
                Some(existing) => *existing,
                None => {
                    let Some(copy) = scene.duplicate_material(*material) else {
                        continue;
                    };
                    memo.insert(*material, copy);
                    copy
                }
            };
            if let Some(e) = scene.entity_mut(obj) {
                e.materials[slot] = replacement;
            }
        }
    }
}

/// Materializes an object's declared tracked properties: copies base values
/// onto the duplicate and synthesizes transform-channel drivers. A property
/// without an expression stays static; a name that is not a drivable
/// channel keeps its base value but gets no driver.
fn realize_object_properties(scene: &mut Scene, obj: EntityId) {
    let Some(tracked) = scene.entity(obj).map(|e| properties::parse_tracked(&e.bag)) else {
        return;
    };
    for prop in tracked {
        if let Some(e) = scene.entity_mut(obj) {
            properties::set_if_absent(&mut e.bag, &prop.name, prop.base_value.clone());
        }
        let Some(expression) = prop.expression.clone() else {
            debug!("no expression for '{}', kept static", prop.name);
            continue;
        };
        match KeyTarget::parse(&prop.name) {
            Ok(target @ KeyTarget::Channel { .. }) => {
                scene.add_driver(Driver {
                    target: DriverTarget::Object {
                        entity: obj,
                        target,
                    },
                    variable_owner: obj,
                    expression,
                    variables: bracketed_bindings(&prop),
                });
            }
            Ok(KeyTarget::Custom(name)) => {
                warn!("'{name}' is not a drivable object channel, skipped");
            }
            Err(err) => warn!("skipping driver for '{}': {err}", prop.name),
        }
    }
}

/// Materializes tracked properties declared on shader nodes: the base value
/// is mirrored onto the owning object's bag, and the driver targets the
/// node's output value.
fn realize_material_node_properties(scene: &mut Scene, obj: EntityId) {
    let Some(slots) = scene.entity(obj).map(|e| e.materials.clone()) else {
        return;
    };
    for material in slots {
        let nodes: Vec<(String, Vec<TrackedProperty>)> = match scene.material(material) {
            Some(m) => m
                .nodes
                .iter()
                .map(|n| (n.name.clone(), properties::parse_tracked(&n.bag)))
                .collect(),
            None => continue,
        };
        for (node_name, tracked) in nodes {
            for prop in tracked {
                if let Some(e) = scene.entity_mut(obj) {
                    properties::set_if_absent(&mut e.bag, &prop.name, prop.base_value.clone());
                }
                let Some(expression) = prop.expression.clone() else {
                    debug!("no expression for node property '{}'", prop.name);
                    continue;
                };
                scene.add_driver(Driver {
                    target: DriverTarget::NodeValue {
                        material,
                        node: node_name.clone(),
                    },
                    variable_owner: obj,
                    expression,
                    variables: prop.input_bindings.clone(),
                });
            }
        }
    }
}

/// Object-level driver variables address tracked custom properties in the
/// bracketed-quoted form.
fn bracketed_bindings(prop: &TrackedProperty) -> Vec<(String, String)> {
    prop.input_bindings
        .iter()
        .map(|(var, path)| (var.clone(), format!("[\"{path}\"]")))
        .collect()
}
