//! Builds the `DecisionLog` that accompanies every placement (§4.7 Output).

use fabric_types::{DecisionLog, DeviceId, ShardScore, SolverPath};
use std::time::Duration;

pub fn build(
    solver_path: SolverPath,
    heterogeneous: bool,
    elapsed: Duration,
    scores: Vec<ShardScore>,
    violated_link_latency: Vec<usize>,
) -> DecisionLog {
    DecisionLog {
        solver_path,
        heterogeneous,
        elapsed,
        scores,
        violated_link_latency,
    }
}

pub fn score_entry(shard_ordinal: usize, device_id: DeviceId, score: f64) -> ShardScore {
    ShardScore {
        shard_ordinal,
        device_id,
        score,
    }
}
