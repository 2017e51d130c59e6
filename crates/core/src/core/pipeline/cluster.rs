//! Cluster selection: picks which functional-unit cluster a dispatching uop
//! should target, balancing legality against bypass-network cost (`§4.4`).

use crate::common::ids::ClusterId;
use crate::core::pipeline::uop::OpClass;

/// Static routing and timing tables describing a core's cluster topology.
pub struct ClusterTopology {
    /// `executable_on_cluster[op_class]` bitmap, one bit per cluster.
    executable: Vec<(OpClass, u32)>,
    cluster_count: u32,
    /// `intercluster_latency_map[from][to]`, cycles of bypass delay.
    intercluster_latency: Vec<Vec<u32>>,
}

impl ClusterTopology {
    #[must_use]
    pub fn new(cluster_count: u32, executable: Vec<(OpClass, u32)>, intercluster_latency: Vec<Vec<u32>>) -> Self {
        debug_assert_eq!(intercluster_latency.len(), cluster_count as usize);
        Self {
            executable,
            cluster_count,
            intercluster_latency,
        }
    }

    #[must_use]
    pub fn executable_mask(&self, class: OpClass) -> u32 {
        self.executable
            .iter()
            .find(|(c, _)| *c == class)
            .map_or(0, |(_, mask)| *mask)
    }

    #[must_use]
    pub fn latency(&self, from: ClusterId, to: ClusterId) -> u32 {
        self.intercluster_latency[from.0 as usize][to.0 as usize]
    }

    #[must_use]
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }
}

/// Picks a cluster for a dispatching uop (`§4.4`).
///
/// `legal_mask` is `executable_on_cluster ∩ clusters-with-a-free-IQ-slot`,
/// already computed by the caller (which owns per-cluster IQ occupancy);
/// `producer_clusters` lists the cluster that produced each already-ready
/// operand. Ties break toward the lowest set bit, matching a fixed
/// priority order over clusters rather than round-robin.
#[must_use]
pub fn select_cluster(legal_mask: u32, producer_clusters: &[ClusterId]) -> Option<ClusterId> {
    if legal_mask == 0 {
        return None;
    }
    let mut tally = [0u32; 32];
    for p in producer_clusters {
        if legal_mask & (1 << p.0) != 0 {
            tally[p.0 as usize] += 1;
        }
    }
    let mut best: Option<(u32, u8)> = None;
    for bit in 0..32u8 {
        if legal_mask & (1 << bit) == 0 {
            continue;
        }
        let score = tally[bit as usize];
        match best {
            Some((best_score, _)) if score <= best_score => {}
            _ => best = Some((score, bit)),
        }
    }
    best.map(|(_, bit)| ClusterId(bit))
}
