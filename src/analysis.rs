//! Worklist reachability over a [`Cfa`] with octagon states.
//!
//! One state is kept per location. New states are merged into it with
//! [`OctagonDomain::merge`] and dropped when [`OctagonDomain::stop`] says they are covered.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cfa::{Cfa, NodeId};
use crate::domain::OctagonDomain;
use crate::error::TransferError;
use crate::options::OctagonOptions;
use crate::precision::OctagonPrecision;
use crate::state::OctagonState;
use crate::transfer::OctagonTransferRelation;

/// Cooperative cancellation flag, checked between edge evaluations.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    flag: Arc<AtomicBool>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn should_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    Interrupted,
    IterationLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No error location is reachable.
    Safe,
    /// An error location is reachable with a non-empty state.
    Unsafe { location: NodeId },
    Unknown(UnknownReason),
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Unsafe { location } => write!(f, "UNSAFE (error location {})", location),
            Verdict::Unknown(UnknownReason::Interrupted) => write!(f, "UNKNOWN (interrupted)"),
            Verdict::Unknown(UnknownReason::IterationLimit) => write!(f, "UNKNOWN (iteration limit)"),
        }
    }
}

#[derive(Debug)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub reached: HashMap<NodeId, OctagonState>,
    pub iterations: usize,
}

impl AnalysisResult {
    pub fn state_at(&self, node: NodeId) -> Option<&OctagonState> {
        self.reached.get(&node)
    }
}

fn finish(
    verdict: Verdict,
    reached: HashMap<NodeId, OctagonState>,
    iterations: usize,
) -> Result<AnalysisResult, TransferError> {
    info!("Analysis finished after {} iteration(s): {}", iterations, verdict);
    Ok(AnalysisResult {
        verdict,
        reached,
        iterations,
    })
}

#[derive(Debug)]
pub struct Analysis {
    transfer: OctagonTransferRelation,
    domain: OctagonDomain,
    shutdown: ShutdownNotifier,
}

impl Analysis {
    pub fn new(options: OctagonOptions) -> Self {
        let domain = OctagonDomain::new(options.widen_at_loop_heads);
        Analysis {
            transfer: OctagonTransferRelation::new(options),
            domain,
            shutdown: ShutdownNotifier::new(),
        }
    }

    pub fn with_shutdown_notifier(mut self, shutdown: ShutdownNotifier) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_notifier(&self) -> &ShutdownNotifier {
        &self.shutdown
    }

    pub fn transfer_relation(&self) -> &OctagonTransferRelation {
        &self.transfer
    }

    pub fn domain(&self) -> &OctagonDomain {
        &self.domain
    }

    /// Explores `cfa` from its entry with `initial`, stopping at the first reachable error location.
    pub fn run(
        &self,
        cfa: &Cfa,
        initial: OctagonState,
        precision: &dyn OctagonPrecision,
    ) -> Result<AnalysisResult, TransferError> {
        self.transfer.reset_temporaries();
        let entry = cfa.entry();
        let max_iterations = self.transfer.options().max_iterations;
        info!("Starting octagon analysis at {} ({} locations)", entry, cfa.num_nodes());

        let mut reached: HashMap<NodeId, OctagonState> = HashMap::new();
        let mut waitlist: VecDeque<NodeId> = VecDeque::new();
        let mut iterations = 0;

        if initial.is_empty() {
            return finish(Verdict::Safe, reached, iterations);
        }
        if cfa.node(entry).is_error {
            reached.insert(entry, initial);
            return finish(Verdict::Unsafe { location: entry }, reached, iterations);
        }
        reached.insert(entry, initial);
        waitlist.push_back(entry);

        while let Some(node) = waitlist.pop_front() {
            if self.shutdown.should_shutdown() {
                return finish(Verdict::Unknown(UnknownReason::Interrupted), reached, iterations);
            }
            if iterations >= max_iterations {
                warn!("Iteration limit of {} reached, giving up", max_iterations);
                return finish(Verdict::Unknown(UnknownReason::IterationLimit), reached, iterations);
            }
            iterations += 1;

            let Some(state) = reached.get(&node).cloned() else {
                continue;
            };
            debug!("Processing {} with {}", node, state);
            for edge in cfa.leaving_edges(node) {
                let target = edge.successor.id;
                for successor in self.transfer.get_abstract_successors(&state, precision, edge)? {
                    if edge.successor.is_error {
                        info!("Error location {} is reachable via {}", target, edge);
                        reached.insert(target, successor);
                        return finish(Verdict::Unsafe { location: target }, reached, iterations);
                    }
                    let updated = match reached.get(&target) {
                        Some(old) if self.domain.stop(&successor, [old]) => continue,
                        Some(old) => self.domain.merge(&successor, old),
                        None => successor,
                    };
                    reached.insert(target, updated);
                    if !waitlist.contains(&target) {
                        waitlist.push_back(target);
                    }
                }
            }
        }

        finish(Verdict::Safe, reached, iterations)
    }
}
