//! Wave scheduling.
//!
//! Each round selects, in registration order, every service that is not done
//! and whose upstreams are all done. The caller settles the wave and reports
//! it back with [`WaveScheduler::complete`] before asking for the next one, so
//! waves are strictly breadth-first by dependency depth.
//!
//! When no remaining service is satisfiable the scheduler simply stops. This
//! covers cycles and upstream ids missing from the graph;
//! [`WaveScheduler::unscheduled`] reports what was left behind.

use super::graph::{project_inputs, take_service_number, DependencyGraph};
use crate::core::Payload;
use crate::errors::FlowError;
use crate::service::Service;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One service of a wave, ready to run.
#[derive(Debug, Clone)]
pub struct ScheduledService {
    /// The service id.
    pub service_id: String,
    /// Dispatch sequence number, counted from 1 across the run.
    pub number: usize,
    /// Projected inputs, without the sequence number.
    pub inputs: Payload,
}

/// A batch of services that run concurrently.
#[derive(Debug, Clone)]
pub struct Wave {
    /// Zero-based wave index.
    pub index: usize,
    /// Services in registration order.
    pub services: Vec<ScheduledService>,
}

impl Wave {
    /// Returns the ids of the wave's services.
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|scheduled| scheduled.service_id.as_str())
    }
}

/// Computes waves over a dependency graph.
#[derive(Debug)]
pub struct WaveScheduler {
    done: HashSet<String>,
    next_number: usize,
    waves: usize,
}

impl Default for WaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveScheduler {
    /// Creates a scheduler with nothing done.
    #[must_use]
    pub fn new() -> Self {
        Self {
            done: HashSet::new(),
            next_number: 1,
            waves: 0,
        }
    }

    /// Returns the ids runnable now, in registration order.
    #[must_use]
    pub fn ready(&self, graph: &DependencyGraph) -> Vec<String> {
        graph
            .order()
            .iter()
            .filter(|id| !self.done.contains(*id))
            .filter(|id| graph.upstream_ids(id).all(|upstream| self.done.contains(upstream)))
            .cloned()
            .collect()
    }

    /// Yields the next wave with projected inputs, or `None` when nothing is
    /// runnable.
    pub fn next_wave(
        &mut self,
        graph: &DependencyGraph,
        registry: &HashMap<String, Arc<Service>>,
    ) -> Result<Option<Wave>, FlowError> {
        let ready = self.ready(graph);
        if ready.is_empty() {
            return Ok(None);
        }

        let mut services = Vec::with_capacity(ready.len());
        for service_id in ready {
            let service = registry.get(&service_id).ok_or_else(|| {
                FlowError::Internal(format!("service '{service_id}' missing from registry"))
            })?;
            let number = self.next_number;
            self.next_number += 1;

            let mut inputs = project_inputs(service, graph.dependencies(&service_id), registry, number)?;
            let number = take_service_number(&mut inputs).unwrap_or(number);
            services.push(ScheduledService {
                service_id,
                number,
                inputs,
            });
        }

        let wave = Wave {
            index: self.waves,
            services,
        };
        self.waves += 1;
        Ok(Some(wave))
    }

    /// Marks every service of a settled wave as done.
    pub fn complete(&mut self, wave: &Wave) {
        self.mark_done(wave.service_ids().map(str::to_string));
    }

    /// Marks services as done.
    pub fn mark_done(&mut self, ids: impl IntoIterator<Item = String>) {
        self.done.extend(ids);
    }

    /// Returns true if `service_id` is done.
    #[must_use]
    pub fn is_done(&self, service_id: &str) -> bool {
        self.done.contains(service_id)
    }

    /// Returns the ids never scheduled, in registration order.
    #[must_use]
    pub fn unscheduled(&self, graph: &DependencyGraph) -> Vec<String> {
        graph
            .order()
            .iter()
            .filter(|id| !self.done.contains(*id))
            .cloned()
            .collect()
    }

    /// Returns how many waves were yielded.
    #[must_use]
    pub fn waves_yielded(&self) -> usize {
        self.waves
    }
}
