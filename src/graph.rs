//! Declarative point graph.
//!
//! This is the "document" form of the synthesis topology: it is edited
//! by the project, serialized with it, and compiled into an
//! [`EvaluationPlan`](crate::compile::EvaluationPlan) that notes share.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::point::{PointId, PointKind, SoundPoint};

/// An edge `source -> target` feeding the target's input `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub source: PointId,
    pub target: PointId,
    pub slot: usize,
}

/// The synthesis topology of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointGraph {
    /// Points in insertion order.
    pub points: Vec<SoundPoint>,

    /// Point whose value is the note's signal. Defaults to the last point.
    #[serde(default)]
    pub output: Option<PointId>,

    #[serde(default)]
    next_id: PointId,
}

impl PointGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph with a single waveform point.
    pub fn single(variant: impl Into<String>) -> Self {
        let mut graph = Self::new();
        let id = graph.add_point(PointKind::waveform(variant));
        graph.output = Some(id);
        graph
    }

    /// Add a new point. Returns its id.
    pub fn add_point(&mut self, kind: PointKind) -> PointId {
        // Files written by hand may omit `next_id`
        let id = self
            .points
            .iter()
            .map(|p| p.id + 1)
            .max()
            .unwrap_or(0)
            .max(self.next_id);
        self.points.push(SoundPoint::new(id, kind));
        self.next_id = id + 1;
        id
    }

    /// Remove a point and every input that referenced it.
    pub fn remove_point(&mut self, id: PointId) {
        self.points.retain(|p| p.id != id);
        for point in &mut self.points {
            point.inputs.retain(|&i| i != id);
        }
        if self.output == Some(id) {
            self.output = None;
        }
    }

    pub fn get(&self, id: PointId) -> Option<&SoundPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PointId) -> Option<&mut SoundPoint> {
        self.points.iter_mut().find(|p| p.id == id)
    }

    pub fn set_param(&mut self, id: PointId, name: &str, value: f64) -> Result<(), GraphError> {
        let point = self.get_mut(id).ok_or(GraphError::UnknownPoint(id))?;
        point.parameters.insert(name.to_string(), value);
        Ok(())
    }

    pub fn set_output(&mut self, id: PointId) -> Result<(), GraphError> {
        if self.get(id).is_none() {
            return Err(GraphError::UnknownPoint(id));
        }
        self.output = Some(id);
        Ok(())
    }

    /// Connect `source` into `target`'s input `slot`.
    ///
    /// An existing slot is replaced; otherwise the slot must be the next
    /// free one so inputs stay contiguous.
    pub fn connect(&mut self, source: PointId, target: PointId, slot: usize) -> Result<(), GraphError> {
        if self.get(source).is_none() {
            return Err(GraphError::UnknownPoint(source));
        }
        if source == target {
            return Err(GraphError::Cycle { point: target });
        }

        let point = self.get_mut(target).ok_or(GraphError::UnknownPoint(target))?;
        let arity = point.kind.arity();
        if slot >= arity || slot > point.inputs.len() {
            return Err(GraphError::InvalidSlot {
                target,
                slot,
                arity,
            });
        }

        if slot == point.inputs.len() {
            point.inputs.push(source);
        } else {
            point.inputs[slot] = source;
        }
        Ok(())
    }

    /// Remove the input in `slot`; later slots shift down.
    pub fn disconnect(&mut self, target: PointId, slot: usize) {
        if let Some(point) = self.get_mut(target) {
            if slot < point.inputs.len() {
                point.inputs.remove(slot);
            }
        }
    }

    /// All edges, in point then slot order.
    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.points.iter().flat_map(|p| {
            p.inputs.iter().enumerate().map(move |(slot, &source)| Connection {
                source,
                target: p.id,
                slot,
            })
        })
    }

    /// Map point ids to their position in `points`.
    pub(crate) fn index_map(&self) -> HashMap<PointId, usize> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect()
    }

    /// Topological order of point indices, inputs before dependents
    /// (Kahn's algorithm).
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.points.len();
        let index = self.index_map();

        // Resolve and validate every edge first
        let mut inputs: Vec<Vec<usize>> = Vec::with_capacity(n);
        for point in &self.points {
            let arity = point.kind.arity();
            if point.inputs.len() > arity {
                return Err(GraphError::InvalidSlot {
                    target: point.id,
                    slot: point.inputs.len() - 1,
                    arity,
                });
            }
            let resolved = point
                .inputs
                .iter()
                .map(|id| index.get(id).copied().ok_or(GraphError::UnknownPoint(*id)))
                .collect::<Result<Vec<_>, _>>()?;
            inputs.push(resolved);
        }

        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, ins) in inputs.iter().enumerate() {
            for &input in ins {
                out_edges[input].push(idx);
            }
        }

        // Start with points that have no inputs (sources)
        let mut queue: Vec<usize> = (0..n).filter(|&i| inputs[i].is_empty()).collect();
        queue.reverse();

        let mut result = Vec::with_capacity(n);
        let mut processed = vec![false; n];

        while let Some(idx) = queue.pop() {
            if processed[idx] {
                continue;
            }
            processed[idx] = true;
            result.push(idx);

            for &dependent in &out_edges[idx] {
                let ready = inputs[dependent].iter().all(|&i| processed[i]);
                if ready && !processed[dependent] {
                    queue.push(dependent);
                }
            }
        }

        if let Some(stuck) = processed.iter().position(|&p| !p) {
            return Err(GraphError::Cycle {
                point: self.points[stuck].id,
            });
        }

        Ok(result)
    }
}
