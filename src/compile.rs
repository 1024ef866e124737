// src/compile.rs
//
// Compiles a PointGraph (declarative) into an EvaluationPlan (runtime).
//
// The plan is immutable and shared by every note of a project; each
// note carries its own mutable state sized from it.

use crate::error::GraphError;
use crate::graph::PointGraph;
use crate::point::{params, PointId, PointKind, SoundPoint};
use crate::waveform::WaveParams;

/// What one compiled point does, with parameters already resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOp {
    Waveform { variant: String, params: WaveParams },
    Mixer { gain: f64 },
    Gain { gain: f64, offset: f64 },
    Multiply,
}

/// One point of a compiled plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanPoint {
    pub id: PointId,
    pub op: PlanOp,
    /// Indices into `EvaluationPlan::points`, in slot order.
    pub inputs: Vec<usize>,
}

/// A fully resolved, immutable evaluation plan.
///
/// Invariants:
/// - `order` visits every input before its dependents
/// - `output` indexes into `points`
/// - no allocation is needed to evaluate it
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPlan {
    pub points: Vec<PlanPoint>,
    pub order: Vec<usize>,
    pub output: usize,
}

impl EvaluationPlan {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Names of the waveform variants, one per point (None for combinators).
    pub fn variants(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.points.iter().map(|p| match &p.op {
            PlanOp::Waveform { variant, .. } => Some(variant.as_str()),
            _ => None,
        })
    }
}

fn resolve_op(point: &SoundPoint) -> PlanOp {
    match &point.kind {
        PointKind::Waveform { variant } => {
            let defaults = WaveParams::default();
            PlanOp::Waveform {
                variant: variant.clone(),
                params: WaveParams {
                    amplitude: point.param_or(params::AMPLITUDE, defaults.amplitude),
                    frequency_ratio: point.param_or(params::FREQUENCY_RATIO, defaults.frequency_ratio),
                    phase_offset: point.param_or(params::PHASE_OFFSET, defaults.phase_offset),
                    mod_index: point.param_or(params::MOD_INDEX, defaults.mod_index),
                    duty: point.param_or(params::DUTY, defaults.duty),
                },
            }
        }
        PointKind::Mixer => PlanOp::Mixer {
            gain: point.param_or(params::GAIN, 1.0),
        },
        PointKind::Gain => PlanOp::Gain {
            gain: point.param_or(params::GAIN, 1.0),
            offset: point.param_or(params::OFFSET, 0.0),
        },
        PointKind::Multiply => PlanOp::Multiply,
    }
}

/// Compile a PointGraph into an EvaluationPlan.
///
/// This function:
/// 1. Validates every edge and computes the topological order
/// 2. Resolves parameters into dense per-point values
/// 3. Resolves the output point (declared, or the last point added)
///
/// Parameters are not range-checked here; a point that produces
/// non-finite output is silenced at render time instead.
pub fn compile(graph: &PointGraph) -> Result<EvaluationPlan, GraphError> {
    if graph.points.is_empty() {
        return Err(GraphError::Empty);
    }

    let order = graph.topological_order()?;
    let index = graph.index_map();

    let points = graph
        .points
        .iter()
        .map(|p| PlanPoint {
            id: p.id,
            op: resolve_op(p),
            // Already validated by topological_order
            inputs: p.inputs.iter().filter_map(|id| index.get(id).copied()).collect(),
        })
        .collect();

    let output = match graph.output {
        Some(id) => *index.get(&id).ok_or(GraphError::UnknownPoint(id))?,
        None => graph.points.len() - 1,
    };

    Ok(EvaluationPlan {
        points,
        order,
        output,
    })
}
