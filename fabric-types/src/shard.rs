//! Shards, pipelines, and placement artifacts (§3, §4.7).

use crate::device::DeviceId;
use std::collections::HashSet;
use std::time::Duration;

/// A contiguous range of model layers assigned as a unit (§3 `Shard`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    pub ordinal: usize,
    pub compute_flops: f64,
    pub memory_bytes: u64,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub supported_precisions: HashSet<String>,
}

/// An ordered sequence of shards; shard *i*'s output feeds shard *i+1*'s
/// input (§3 `Pipeline`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub instance_id: String,
    pub shards: Vec<Shard>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Adjacent shard pairs, `(shard_i, shard_i+1)`, used by binary
    /// constraints (§4.7 constraints 2 and 3).
    pub fn adjacent_pairs(&self) -> impl Iterator<Item = (&Shard, &Shard)> {
        self.shards.windows(2).map(|w| (&w[0], &w[1]))
    }
}

/// Why the solver fell back to (or the CSP itself produced) an incomplete
/// result — distinguished return shapes instead of exceptions (§9 redesign
/// note on replacing exception-based control flow in the solver).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementFailureReason {
    /// No device has enough free memory for this shard, independent of
    /// every other shard's placement.
    NoFeasibleDevice { shard_ordinal: usize },
    /// The CSP tree was exhausted without a complete assignment.
    Infeasible,
    /// The solver's wall-clock budget elapsed before a solution was found.
    TimedOut,
}

/// Which solver path produced a `Placement` (§4.7 Output).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPath {
    Csp,
    Greedy,
}

impl SolverPath {
    pub fn as_str(self) -> &'static str {
        match self {
            SolverPath::Csp => "csp",
            SolverPath::Greedy => "greedy",
        }
    }
}

/// Per-shard score recorded for the decision log (§4.7 Output).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ShardScore {
    pub shard_ordinal: usize,
    pub device_id: DeviceId,
    pub score: f64,
}

/// The solver path, timing, and per-shard scores behind a placement
/// decision (§3.1 `DecisionLog`, §4.7 Output).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionLog {
    pub solver_path: SolverPath,
    pub heterogeneous: bool,
    pub elapsed: Duration,
    pub scores: Vec<ShardScore>,
    pub violated_link_latency: Vec<usize>,
}

/// A mapping `shard -> device` satisfying the §4.7 constraints, plus the
/// diagnostic log the engine always produces (placement itself never
/// fails — see §7 propagation policy).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub instance_id: String,
    pub assignment: Vec<(usize, DeviceId)>,
    pub decision_log: DecisionLog,
}

impl Placement {
    pub fn device_for(&self, shard_ordinal: usize) -> Option<&DeviceId> {
        self.assignment
            .iter()
            .find(|(ord, _)| *ord == shard_ordinal)
            .map(|(_, d)| d)
    }
}

/// Result of a placement attempt: either a full `Placement`, or a reason no
/// placement could be produced at all (distinct from a `Placement` whose
/// decision log notes a softer violation, e.g. a greedy path breaching the
/// link-latency budget).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed(Placement),
    Failed {
        instance_id: String,
        reason: PlacementFailureReason,
    },
}
