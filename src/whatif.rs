// What-if exploration: perturb the event inputs, re-simulate, report deltas
// against the baseline's best option.

use crate::models::EventPlan;
use crate::simulator::{OptionResult, SimulationResult, Simulator};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WhatIfError {
    #[error("Baseline simulation has no evaluated options")]
    EmptyBaseline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatIfConfig {
    pub max_proposals: usize,
    // Destination airport -> alternates, best alternate first
    pub nearby_airports: BTreeMap<String, Vec<String>>,
    pub hubs: Vec<String>,
}

impl Default for WhatIfConfig {
    fn default() -> Self {
        let nearby = [
            ("LIS", vec!["OPO", "FAO"]),
            ("MUC", vec!["FRA", "STR"]),
            ("LHR", vec!["LGW", "STN"]),
            ("CDG", vec!["ORY"]),
            ("JFK", vec!["LGA", "EWR"]),
            ("LAX", vec!["SNA", "BUR"]),
        ];
        Self {
            max_proposals: 5,
            nearby_airports: nearby
                .into_iter()
                .map(|(code, alternates)| {
                    (
                        code.to_string(),
                        alternates.into_iter().map(String::from).collect(),
                    )
                })
                .collect(),
            hubs: ["FRA", "LHR", "CDG", "JFK", "DXB"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhatIfVariation {
    DateShift {
        shift_days: i64,
        original_start: NaiveDate,
    },
    NearbyAirport {
        original: String,
        alternative: String,
    },
    // Suggestion only; there is no input mutation for it yet
    HubChange { hub: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfProposal {
    pub variation: WhatIfVariation,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResult {
    pub proposal: WhatIfProposal,
    // new_result.total_cost - baseline_result.total_cost
    pub delta_cost: f64,
    pub delta_score: f64,
    pub new_result: OptionResult,
    pub baseline_result: OptionResult,
}

// Resolves once the flag flips to true; never if the sender goes away first
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct WhatIfExplorer {
    simulator: Arc<Simulator>,
    config: WhatIfConfig,
}

impl WhatIfExplorer {
    pub fn new(simulator: Arc<Simulator>, config: WhatIfConfig) -> Self {
        Self { simulator, config }
    }

    pub fn config(&self) -> &WhatIfConfig {
        &self.config
    }

    /// Up to `max_proposals` variations, in this order: start date one day
    /// later and one day earlier, a nearby airport for each of the first two
    /// destinations that has one, then a hub-routing suggestion.
    pub fn generate(&self, event: &EventPlan) -> Vec<WhatIfProposal> {
        let mut proposals = Vec::new();

        if let Some(first) = event.date_windows.first() {
            for (shift_days, direction) in [(1, "forward"), (-1, "backward")] {
                proposals.push(WhatIfProposal {
                    variation: WhatIfVariation::DateShift {
                        shift_days,
                        original_start: first.start,
                    },
                    description: format!("Shift event start date {} by 1 day", direction),
                });
            }
        }

        for destination in event.candidate_destinations.iter().take(2) {
            let alternate = self
                .config
                .nearby_airports
                .get(&destination.to_uppercase())
                .and_then(|alternates| alternates.first());
            if let Some(alternative) = alternate {
                proposals.push(WhatIfProposal {
                    variation: WhatIfVariation::NearbyAirport {
                        original: destination.clone(),
                        alternative: alternative.clone(),
                    },
                    description: format!("Use {} instead of {}", alternative, destination),
                });
            }
        }

        if proposals.len() < self.config.max_proposals {
            if let Some(hub) = self.config.hubs.first() {
                proposals.push(WhatIfProposal {
                    variation: WhatIfVariation::HubChange { hub: hub.clone() },
                    description: format!("Route through {} hub", hub),
                });
            }
        }

        proposals.truncate(self.config.max_proposals);
        proposals
    }

    // The perturbed event, or None when the variation has no input mutation
    // or would shift a window off the calendar
    pub fn apply(&self, event: &EventPlan, proposal: &WhatIfProposal) -> Option<EventPlan> {
        match &proposal.variation {
            WhatIfVariation::DateShift { shift_days, .. } => Some(EventPlan {
                name: format!("{} (shifted {} days)", event.name, shift_days),
                date_windows: event
                    .date_windows
                    .iter()
                    .map(|w| w.shifted(*shift_days))
                    .collect::<Option<Vec<_>>>()?,
                ..event.clone()
            }),
            WhatIfVariation::NearbyAirport {
                original,
                alternative,
            } => Some(EventPlan {
                name: format!("{} ({} variant)", event.name, alternative),
                candidate_destinations: event
                    .candidate_destinations
                    .iter()
                    .map(|d| {
                        if d == original {
                            alternative.clone()
                        } else {
                            d.clone()
                        }
                    })
                    .collect(),
                ..event.clone()
            }),
            WhatIfVariation::HubChange { .. } => None,
        }
    }

    pub async fn evaluate(
        &self,
        proposals: &[WhatIfProposal],
        event: &EventPlan,
        baseline: &SimulationResult,
    ) -> Result<Vec<WhatIfResult>, WhatIfError> {
        let (_keep_open, cancel) = watch::channel(false);
        self.evaluate_until(proposals, event, baseline, cancel).await
    }

    /// Re-simulate each proposal and compare its best option with the
    /// baseline's best.
    ///
    /// Stops as soon as `cancel` reads true, including mid-simulation; the
    /// returned list holds only proposals that finished. Unsupported
    /// proposals and variants that produce no results are skipped.
    pub async fn evaluate_until(
        &self,
        proposals: &[WhatIfProposal],
        event: &EventPlan,
        baseline: &SimulationResult,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Vec<WhatIfResult>, WhatIfError> {
        let baseline_best = baseline.best().ok_or(WhatIfError::EmptyBaseline)?;
        let mut results = Vec::new();

        for proposal in proposals {
            if *cancel.borrow() {
                info!(completed = results.len(), "what-if evaluation cancelled");
                break;
            }
            let Some(variant) = self.apply(event, proposal) else {
                debug!(proposal = %proposal.description, "proposal has no applicable variant, skipped");
                continue;
            };

            let outcome = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => None,
                outcome = self.simulator.simulate_event(&variant) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                info!(completed = results.len(), "what-if evaluation cancelled");
                break;
            };

            let new_result = match outcome {
                Ok(simulation) => match simulation.best() {
                    Some(best) => best.clone(),
                    None => {
                        debug!(proposal = %proposal.description, "variant produced no options");
                        continue;
                    }
                },
                Err(error) => {
                    warn!(proposal = %proposal.description, %error, "variant simulation failed");
                    continue;
                }
            };

            results.push(WhatIfResult {
                proposal: proposal.clone(),
                delta_cost: new_result.total_cost - baseline_best.total_cost,
                delta_score: new_result.score - baseline_best.score,
                new_result,
                baseline_result: baseline_best.clone(),
            });
        }

        Ok(results)
    }

    pub async fn explore(
        &self,
        event: &EventPlan,
        baseline: &SimulationResult,
    ) -> Result<Vec<WhatIfResult>, WhatIfError> {
        let proposals = self.generate(event);
        self.evaluate(&proposals, event, baseline).await
    }
}
