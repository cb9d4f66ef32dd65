use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::analysis::{self, PerformanceDocument, TrackAnalysis};
use crate::distribute::{self, FacePlacement, PlaneBounds};
use crate::error::{EngineError, Result};
use crate::node_graph::resolve::{
    bound_paths, refresh_json_source, resolve_function, BoundPaths, ResolvedCall, ResolvedInput,
};
use crate::node_graph::{functions, NodeGraph, NodeKind};
use crate::paths;
use crate::properties::{Value, PIX_ID_DUPS, PIX_PREFIX, PIX_PROPERTIES};
use crate::realize;
use crate::scene::{CollectionId, EntityId, KeyTarget, Scene};
use crate::scheduler;

/// Outcome of one engine operation, mirrored into the report sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub level: ReportLevel,
    pub message: String,
}

/// Where a track's instances land during distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementSurface {
    /// Random scatter on a plane entity, inside the track's bounds.
    Plane(EntityId),
    /// Round-robin over a named host-supplied face list.
    FaceSet(String),
}

/// Per-track state, registered once per track on document processing and
/// preserved across re-runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSection {
    pub track_id: usize,
    pub enabled: bool,
    pub show: bool,
    pub bounds: PlaneBounds,
    pub surface: Option<PlacementSurface>,
    /// Per-track template collection, overriding the global choice.
    pub template: Option<String>,
}

impl TrackSection {
    fn new(track_id: usize) -> TrackSection {
        TrackSection {
            track_id,
            enabled: true,
            show: false,
            bounds: PlaneBounds {
                x_min: -2.0,
                x_max: 2.0,
                y_min: -2.0,
                y_max: 2.0,
            },
            surface: None,
            template: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackNoteToggle {
    pub track: usize,
    pub note: i64,
    pub enabled: bool,
}

/// One `MathBinding` node's work, snapshotted out of the graph so the
/// sweep can borrow the scene mutably.
struct BindingJob {
    target_property: String,
    start: f64,
    end: f64,
    paths: BoundPaths,
    call: ResolvedCall,
}

/// Owns everything one musical scene build needs: the scene, the loaded
/// performance, per-track state, node graphs, and the report sink. All
/// operations run synchronously on the caller's thread.
pub struct EngineContext {
    pub scene: Scene,
    pub graphs: Vec<NodeGraph>,
    /// Global template collection name, used when a track has no override.
    pub template_choice: Option<String>,
    /// Collection new instances and realized duplicates are linked into.
    pub target_parent: Option<CollectionId>,
    pub reports: Vec<Report>,
    performance: Option<PerformanceDocument>,
    analysis: Option<TrackAnalysis>,
    track_sections: BTreeMap<usize, TrackSection>,
    track_notes: BTreeMap<(usize, i64), TrackNoteToggle>,
    rng: StdRng,
}

impl EngineContext {
    pub fn new(fps: f64) -> EngineContext {
        EngineContext::with_seed(fps, rand::random())
    }

    /// Deterministic placement, for reproducible scatter.
    pub fn with_seed(fps: f64, seed: u64) -> EngineContext {
        EngineContext {
            scene: Scene::new(fps),
            graphs: Vec::new(),
            template_choice: None,
            target_parent: None,
            reports: Vec::new(),
            performance: None,
            analysis: None,
            track_sections: BTreeMap::new(),
            track_notes: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn performance(&self) -> Option<&PerformanceDocument> {
        self.performance.as_ref()
    }

    pub fn analysis(&self) -> Option<&TrackAnalysis> {
        self.analysis.as_ref()
    }

    pub fn track_section(&self, track: usize) -> Option<&TrackSection> {
        self.track_sections.get(&track)
    }

    pub fn track_section_mut(&mut self, track: usize) -> Option<&mut TrackSection> {
        self.track_sections.get_mut(&track)
    }

    pub fn note_toggle(&self, track: usize, note: i64) -> Option<&TrackNoteToggle> {
        self.track_notes.get(&(track, note))
    }

    pub fn note_toggle_mut(&mut self, track: usize, note: i64) -> Option<&mut TrackNoteToggle> {
        self.track_notes.get_mut(&(track, note))
    }

    fn report(&mut self, level: ReportLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ReportLevel::Info => info!("{message}"),
            ReportLevel::Warning => warn!("{message}"),
            ReportLevel::Error => log::error!("{message}"),
        }
        self.reports.push(Report { level, message });
    }

    /// Loads a performance document from disk. Missing files and malformed
    /// JSON cancel the operation; nothing else is touched.
    pub fn load_performance(&mut self, path: &Path) -> OpStatus {
        match PerformanceDocument::from_file(path) {
            Ok(doc) => {
                self.report(
                    ReportLevel::Info,
                    format!("loaded performance with {} tracks", doc.tracks.len()),
                );
                self.performance = Some(doc);
                OpStatus::Finished
            }
            Err(err) => {
                self.report(ReportLevel::Error, format!("load failed: {err}"));
                OpStatus::Cancelled
            }
        }
    }

    /// Direct in-memory load, same effect as [`load_performance`].
    ///
    /// [`load_performance`]: EngineContext::load_performance
    pub fn load_performance_str(&mut self, raw: &str) -> OpStatus {
        match PerformanceDocument::from_str(raw) {
            Ok(doc) => {
                self.performance = Some(doc);
                OpStatus::Finished
            }
            Err(err) => {
                self.report(ReportLevel::Error, format!("load failed: {err}"));
                OpStatus::Cancelled
            }
        }
    }

    /// Analyzes the loaded document, registers per-track sections and
    /// per-note toggles, and creates one collection instance per enabled
    /// `(track, pitch)` pair that does not already have one.
    ///
    /// Re-running never duplicates instances and never resets state the
    /// caller already adjusted on existing sections or toggles.
    pub fn process_document(&mut self) -> OpStatus {
        let Some(doc) = self.performance.as_ref() else {
            self.report(ReportLevel::Error, "no performance document loaded");
            return OpStatus::Cancelled;
        };
        let analysis = analysis::analyze_tracks(&doc.tracks);

        for track in 0..analysis.track_count {
            self.track_sections
                .entry(track)
                .or_insert_with(|| TrackSection::new(track));
            for &note in &analysis.unique_notes[track] {
                self.track_notes.entry((track, note)).or_insert(TrackNoteToggle {
                    track,
                    note,
                    enabled: true,
                });
            }
        }

        let mut created = 0usize;
        for track in 0..analysis.track_count {
            if !self.track_sections[&track].enabled {
                continue;
            }
            for &note in &analysis.unique_notes[track] {
                if self.scene.find_instance_with_tags(track as i64, note).is_some() {
                    continue;
                }
                let template = self.track_sections[&track]
                    .template
                    .clone()
                    .or_else(|| self.template_choice.clone());
                let Some(name) = template else {
                    self.report(
                        ReportLevel::Warning,
                        format!("no template collection for track {track}"),
                    );
                    continue;
                };
                let Some(collection) = self.scene.collection_by_name(&name) else {
                    self.report(
                        ReportLevel::Warning,
                        format!("template collection '{name}' not found"),
                    );
                    continue;
                };
                let instance = self
                    .scene
                    .create_collection_instance(collection, self.target_parent);
                if let Some(e) = self.scene.entity_mut(instance) {
                    e.bag.insert("track".to_string(), Value::Int(track as i64));
                    e.bag.insert("note".to_string(), Value::Int(note));
                }
                created += 1;
            }
        }

        self.analysis = Some(analysis);
        self.report(
            ReportLevel::Info,
            format!("document processed, {created} instances created"),
        );
        OpStatus::Finished
    }

    /// Places every enabled track's instances on its configured surface.
    /// Face sets are consumed round-robin, with one shared offset counter
    /// per set name for the whole run.
    pub fn distribute_instances(
        &mut self,
        face_sets: &BTreeMap<String, Vec<FacePlacement>>,
    ) -> OpStatus {
        let Some(analysis) = self.analysis.clone() else {
            self.report(ReportLevel::Error, "process the document before distributing");
            return OpStatus::Cancelled;
        };

        let mut placement_offsets: HashMap<String, usize> = HashMap::new();
        for track in 0..analysis.track_count {
            let Some(section) = self.track_sections.get(&track).cloned() else {
                continue;
            };
            if !section.enabled {
                continue;
            }
            let Some(surface) = section.surface.clone() else {
                debug!("track {track} has no placement surface");
                continue;
            };
            for &note in &analysis.unique_notes[track] {
                let toggled_on = self
                    .track_notes
                    .get(&(track, note))
                    .map_or(true, |t| t.enabled);
                if !toggled_on {
                    continue;
                }
                let Some(instance) = self.scene.find_instance_with_tags(track as i64, note)
                else {
                    debug!("no instance for track {track} note {note}");
                    continue;
                };
                match &surface {
                    PlacementSurface::Plane(plane) => {
                        distribute::distribute_on_plane(
                            &mut self.scene,
                            instance,
                            *plane,
                            section.bounds,
                            &mut self.rng,
                        );
                    }
                    PlacementSurface::FaceSet(name) => {
                        let Some(faces) = face_sets.get(name).filter(|f| !f.is_empty()) else {
                            self.report(
                                ReportLevel::Warning,
                                format!("face set '{name}' is empty or missing"),
                            );
                            continue;
                        };
                        let offset = placement_offsets.entry(name.clone()).or_insert(0);
                        let placement = faces[*offset % faces.len()];
                        distribute::distribute_to_face(&mut self.scene, instance, &placement);
                        *offset += 1;
                    }
                }
            }
        }

        self.report(ReportLevel::Info, "instances distributed");
        OpStatus::Finished
    }

    /// Realizes the global template choice plus every per-track override
    /// into standalone duplicates.
    pub fn realize_collections(&mut self) -> OpStatus {
        let mut names: BTreeSet<String> = BTreeSet::new();
        if let Some(name) = &self.template_choice {
            names.insert(name.clone());
        }
        for section in self.track_sections.values() {
            if let Some(name) = &section.template {
                names.insert(name.clone());
            }
        }
        if names.is_empty() {
            self.report(ReportLevel::Error, "no template collection selected");
            return OpStatus::Cancelled;
        }

        realize::realize_collections(&mut self.scene, &names, self.target_parent);
        self.report(
            ReportLevel::Info,
            format!("realized {} template collection(s)", names.len()),
        );
        OpStatus::Finished
    }

    /// The keyframe sweep: for every `MathBinding` node in every graph,
    /// walk the document's tracks and notes and write the four-key peak
    /// window onto every carrier of the node's target property.
    ///
    /// A binding with unbound sockets or an unresolvable function is
    /// logged and skipped. A dangling data path inside the sweep is a
    /// document/graph mismatch and aborts with an error.
    pub fn apply_music(&mut self) -> Result<OpStatus> {
        let Some(doc) = self.performance.as_ref() else {
            self.report(ReportLevel::Error, "no performance document loaded");
            return Ok(OpStatus::Cancelled);
        };
        let raw_text = doc.raw.clone();
        let root = doc.raw_value()?;
        self.analysis = Some(analysis::analyze_tracks(&doc.tracks));

        for graph_index in 0..self.graphs.len() {
            for id in self.graphs[graph_index].json_source_ids() {
                refresh_json_source(&mut self.graphs[graph_index], &id, &raw_text);
            }

            let jobs = snapshot_binding_jobs(&self.graphs[graph_index]);
            for job in jobs {
                self.apply_binding(&root, &job)?;
            }
        }

        self.report(ReportLevel::Info, "music applied");
        Ok(OpStatus::Finished)
    }

    fn apply_binding(&mut self, root: &serde_json::Value, job: &BindingJob) -> Result<()> {
        let Some(def) = functions::function(&job.call.function) else {
            warn!("unknown function '{}'", job.call.function);
            return Ok(());
        };
        let target = match KeyTarget::parse(&job.target_property) {
            Ok(target) => target,
            Err(err) => {
                warn!("skipping binding: {err}");
                return Ok(());
            }
        };

        let tracks_value = paths::extract(root, &job.paths.track)?;
        let Some(tracks) = tracks_value.as_array() else {
            return Err(EngineError::Path {
                path: job.paths.track.clone(),
                segment: "[]".to_string(),
            });
        };

        let note_path = paths::rebase(&job.paths.note, &job.paths.track);
        let midi_path = paths::rebase(&job.paths.midi, &job.paths.note);
        let duration_path = paths::rebase(&job.paths.duration, &job.paths.note);
        let time_path = paths::rebase(&job.paths.time, &job.paths.note);

        for (track_index, track) in tracks.iter().enumerate() {
            let enabled = self
                .track_sections
                .get(&track_index)
                .map_or(false, |s| s.enabled);
            if !enabled {
                continue;
            }

            let notes_value = paths::extract(track, &note_path)?;
            let Some(notes) = notes_value.as_array() else {
                return Err(EngineError::Path {
                    path: note_path.clone(),
                    segment: "[]".to_string(),
                });
            };

            for note in notes {
                let midi = paths::extract_f64(note, &midi_path)? as i64;
                let duration = paths::extract_f64(note, &duration_path)?;
                let time = paths::extract_f64(note, &time_path)?;

                let Some(collection) = self
                    .scene
                    .find_collection_with_tags(track_index as i64, midi)
                else {
                    debug!("no realized collection for track {track_index} note {midi}");
                    continue;
                };

                let mut args = Vec::with_capacity(def.params.len());
                for param in def.params {
                    let resolved = job
                        .call
                        .inputs
                        .iter()
                        .find(|(name, _)| name == param)
                        .map(|(_, r)| r.clone());
                    let value = match resolved {
                        Some(ResolvedInput::BoundPath(path)) => {
                            paths::extract_f64(note, &paths::rebase(&path, &job.paths.note))?
                        }
                        Some(ResolvedInput::Literal(v)) => v,
                        Some(ResolvedInput::Json(_)) | None => {
                            warn!("input '{param}' has no numeric value, using 0");
                            0.0
                        }
                    };
                    args.push(value);
                }
                let value = (def.eval)(&args);

                let Some(window) =
                    scheduler::schedule_note(self.scene.fps, time, duration, job.start, job.end)
                else {
                    continue;
                };

                let carriers =
                    find_property_carriers(&mut self.scene, collection, &job.target_property);
                let base_key = format!("{PIX_PREFIX}{}", job.target_property);
                for carrier in carriers {
                    let base = self
                        .scene
                        .entity(carrier)
                        .and_then(|e| e.bag.get(&base_key))
                        .and_then(|v| v.as_float())
                        .unwrap_or_else(|| {
                            warn!("non-numeric base for '{}', using 0", job.target_property);
                            0.0
                        });
                    scheduler::apply_window(
                        &mut self.scene,
                        carrier,
                        &target,
                        base,
                        value,
                        &window,
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn snapshot_binding_jobs(graph: &NodeGraph) -> Vec<BindingJob> {
    let mut jobs = Vec::new();
    for node_id in graph.math_binding_ids() {
        let Some(node) = graph.node(&node_id) else {
            continue;
        };
        let NodeKind::MathBinding {
            start,
            end,
            target_property,
        } = &node.kind
        else {
            continue;
        };
        let Some(paths) = bound_paths(graph, &node_id) else {
            debug!("binding '{node_id}' has unbound data sockets, skipped");
            continue;
        };
        let Some(call) = graph
            .upstream_node(&node_id, "Value")
            .and_then(|value_node| resolve_function(graph, &value_node.id))
        else {
            warn!("binding '{node_id}' has no resolvable value function, skipped");
            continue;
        };
        jobs.push(BindingJob {
            target_property: target_property.clone(),
            start: *start,
            end: *end,
            paths,
            call,
        });
    }
    jobs
}

/// Collects the realized duplicate's entities that carry the target
/// property. A shader node carrying it propagates its tracked value onto
/// the owning object first, so keyframes always land on entities.
fn find_property_carriers(
    scene: &mut Scene,
    collection: CollectionId,
    property_name: &str,
) -> Vec<EntityId> {
    let mut carriers = Vec::new();
    let is_realized = scene
        .collection(collection)
        .map_or(false, |c| c.bag.contains_key(PIX_ID_DUPS));
    if !is_realized {
        return carriers;
    }

    let pix_key = format!("{PIX_PREFIX}{property_name}");
    for obj in scene.all_objects(collection) {
        let owns = scene.entity(obj).map_or(false, |e| {
            e.bag.contains_key(PIX_PROPERTIES) && e.bag.contains_key(property_name)
        });
        if owns {
            carriers.push(obj);
        }

        let materials = match scene.entity(obj) {
            Some(e) => e.materials.clone(),
            None => continue,
        };
        for material in materials {
            let node_value = scene.material(material).and_then(|m| {
                m.nodes.iter().find_map(|n| {
                    let registry = n.bag.get(PIX_PROPERTIES)?.as_text()?;
                    if registry.split(',').any(|name| name == property_name) {
                        n.bag.get(&pix_key).cloned()
                    } else {
                        None
                    }
                })
            });
            if let Some(value) = node_value {
                if let Some(e) = scene.entity_mut(obj) {
                    e.bag.insert(pix_key.clone(), value);
                }
                if !carriers.contains(&obj) {
                    carriers.push(obj);
                }
            }
        }
    }
    carriers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_graph::Node;
    use crate::properties::declare_property;

    const DOC: &str = r#"[
        {
            "name": "lead",
            "notes": [
                {"midi": 60, "time": 0.0, "duration": 1.0, "velocity": 0.5},
                {"midi": 64, "time": 2.0, "duration": 1.0, "velocity": 0.9}
            ]
        }
    ]"#;

    fn context_with_template() -> EngineContext {
        let mut ctx = EngineContext::with_seed(24.0, 1);
        let template = ctx.scene.add_collection("Towers", None);
        let entity = ctx.scene.add_entity("tower", Some(template));
        if let Some(e) = ctx.scene.entity_mut(entity) {
            declare_property(&mut e.bag, "scale_x", Value::Float(1.0));
        }
        ctx.template_choice = Some("Towers".to_string());
        ctx
    }

    #[test]
    fn load_failure_cancels_with_a_report() {
        let mut ctx = EngineContext::with_seed(24.0, 1);
        let status = ctx.load_performance(Path::new("/nonexistent/performance.json"));
        assert_eq!(status, OpStatus::Cancelled);
        assert!(matches!(ctx.reports.last(), Some(r) if r.level == ReportLevel::Error));
        assert!(ctx.performance().is_none());
    }

    #[test]
    fn processing_registers_state_and_creates_instances_once() {
        let mut ctx = context_with_template();
        assert_eq!(ctx.load_performance_str(DOC), OpStatus::Finished);
        assert_eq!(ctx.process_document(), OpStatus::Finished);

        assert!(ctx.track_section(0).is_some());
        assert!(ctx.note_toggle(0, 60).is_some());
        assert!(ctx.note_toggle(0, 64).is_some());
        assert!(ctx.scene.find_instance_with_tags(0, 60).is_some());
        assert!(ctx.scene.find_instance_with_tags(0, 64).is_some());

        // Re-running neither duplicates instances nor resets adjustments.
        ctx.note_toggle_mut(0, 64).unwrap().enabled = false;
        assert_eq!(ctx.process_document(), OpStatus::Finished);
        assert_eq!(ctx.scene.instances().len(), 2);
        assert!(!ctx.note_toggle(0, 64).unwrap().enabled);
    }

    #[test]
    fn face_sets_are_consumed_round_robin() {
        let mut ctx = context_with_template();
        ctx.load_performance_str(DOC);
        ctx.process_document();
        ctx.track_section_mut(0).unwrap().surface =
            Some(PlacementSurface::FaceSet("grid".to_string()));

        let faces = vec![
            FacePlacement {
                position: [0.0, 0.0, 0.0],
                rotation: [0.0; 3],
            },
            FacePlacement {
                position: [5.0, 0.0, 0.0],
                rotation: [0.0; 3],
            },
        ];
        let face_sets: BTreeMap<String, Vec<FacePlacement>> =
            [("grid".to_string(), faces)].into();
        assert_eq!(ctx.distribute_instances(&face_sets), OpStatus::Finished);

        let a = ctx.scene.find_instance_with_tags(0, 60).unwrap();
        let b = ctx.scene.find_instance_with_tags(0, 64).unwrap();
        let xa = ctx.scene.entity(a).unwrap().transform.location[0];
        let xb = ctx.scene.entity(b).unwrap().transform.location[0];
        let mut xs = [xa, xb];
        xs.sort_by(f64::total_cmp);
        assert_eq!(xs, [0.0, 5.0]);
    }

    #[test]
    fn realize_without_a_template_choice_cancels() {
        let mut ctx = EngineContext::with_seed(24.0, 1);
        assert_eq!(ctx.realize_collections(), OpStatus::Cancelled);
    }

    #[test]
    fn binding_with_unbound_sockets_is_skipped_without_keys() {
        let mut ctx = context_with_template();
        ctx.load_performance_str(DOC);
        ctx.process_document();
        ctx.realize_collections();

        let mut graph = NodeGraph::new();
        graph.add_node(Node::math_binding("binding", "scale_x", 0.25, 0.75));
        ctx.graphs.push(graph);

        assert_eq!(ctx.apply_music().unwrap(), OpStatus::Finished);
        let collection = ctx.scene.find_collection_with_tags(0, 60).unwrap();
        let target = KeyTarget::parse("scale_x").unwrap();
        for id in ctx.scene.all_objects(collection) {
            assert!(ctx.scene.keyframes(id, &target).is_empty());
        }
    }
}
