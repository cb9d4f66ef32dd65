use rand::Rng;

use crate::scene::{EntityId, Scene};

/// Per-track placement rectangle, in the plane's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for PlaneBounds {
    fn default() -> Self {
        PlaneBounds {
            x_min: -10.0,
            x_max: 10.0,
            y_min: -10.0,
            y_max: 10.0,
        }
    }
}

/// A precomputed landing spot on a host mesh face. The host extracts these
/// from geometry; the engine only consumes them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePlacement {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
}

/// Drops an instance at a random spot inside `bounds` on the plane,
/// aligned to the plane's rotation. The instance is unparented so its
/// transform is world-absolute.
pub fn distribute_on_plane<R: Rng>(
    scene: &mut Scene,
    instance: EntityId,
    plane: EntityId,
    bounds: PlaneBounds,
    rng: &mut R,
) {
    let Some(plane_transform) = scene.entity(plane).map(|e| e.transform.clone()) else {
        return;
    };
    let x = rng.gen_range(bounds.x_min..=bounds.x_max);
    let y = rng.gen_range(bounds.y_min..=bounds.y_max);

    let Some(e) = scene.entity_mut(instance) else {
        return;
    };
    e.transform.rotation = plane_transform.rotation;
    e.transform.location = [
        plane_transform.location[0] + x,
        plane_transform.location[1] + y,
        plane_transform.location[2],
    ];
    e.parent = None;
}

/// Pins an instance onto one face placement.
pub fn distribute_to_face(scene: &mut Scene, instance: EntityId, placement: &FacePlacement) {
    let Some(e) = scene.entity_mut(instance) else {
        return;
    };
    e.transform.rotation = placement.rotation;
    e.transform.location = placement.position;
    e.parent = None;
}
