// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-package navigation graphs: screens, learned transitions between
//! them, and a Dijkstra pathfinder weighted by observed reliability and
//! latency. One graph file per package, keyed by a truncated package hash
//! so unusual package names never leak into a file path.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::domain::action::ActionDescriptor;
use crate::domain::navigation::{Landmark, LearnedFrom, NavigationPath, Screen, Transition};
use crate::error::{EngineError, ErrorCode};
use crate::store::persist;
use crate::time::epoch_ms;
use crate::transport::UiElement;

/// Weight given to the newest observation in the success-rate and
/// transition-time exponential moving averages.
const EMA_ALPHA: f64 = 0.2;

fn package_hash(package: &str) -> String {
    let digest = Sha256::digest(package.as_bytes());
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        if out.len() >= chars {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(chars);
    out
}

/// Derive a screen's identity from its activity plus the sorted set of
/// landmark signatures visible on it, so two visits to the same screen
/// collapse onto one node even if minor on-screen values differ.
pub fn compute_screen_id(activity: &str, landmarks: &BTreeSet<Landmark>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(activity.as_bytes());
    for landmark in landmarks {
        hasher.update(b"|");
        hasher.update(landmark.resource_id.as_deref().unwrap_or("").as_bytes());
        hasher.update(b":");
        hasher.update(landmark.text.as_deref().unwrap_or("").as_bytes());
        hasher.update(b":");
        hasher.update(landmark.class.as_deref().unwrap_or("").as_bytes());
    }
    hex_prefix(&hasher.finalize(), 16)
}

/// Derive a transition's identity from its endpoints plus the action's
/// stable signature, so replaying the same gesture between the same two
/// screens always updates one edge rather than creating duplicates.
pub fn compute_transition_id(source_id: &str, target_id: &str, action: &ActionDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"->");
    hasher.update(target_id.as_bytes());
    hasher.update(b"|");
    hasher.update(action.signature().as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

/// Extract the stable landmark signature of a UI element tree: elements
/// that carry at least one of resource_id/text/class, deduplicated by
/// the sorted-set container so ordering of the source list never matters.
pub fn extract_landmarks(elements: &[UiElement]) -> BTreeSet<Landmark> {
    elements
        .iter()
        .filter(|e| e.resource_id.is_some() || e.text.is_some() || e.class.is_some())
        .map(|e| Landmark {
            resource_id: e.resource_id.clone(),
            text: e.text.clone(),
            class: e.class.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Graph {
    package: String,
    screens: HashMap<String, Screen>,
    transitions: Vec<Transition>,
    home_screen_id: Option<String>,
    created_at: u64,
    updated_at: u64,
}

impl Graph {
    fn new(package: &str) -> Self {
        let now = epoch_ms();
        Self {
            package: package.to_owned(),
            screens: HashMap::new(),
            transitions: Vec::new(),
            home_screen_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Manages the on-disk navigation graph for every package the engine has
/// seen, with an in-memory cache keyed by package name.
pub struct NavigationManager {
    navigation_dir: PathBuf,
    cache: RwLock<HashMap<String, Graph>>,
}

impl NavigationManager {
    pub fn new(navigation_dir: PathBuf) -> Self {
        Self { navigation_dir, cache: RwLock::new(HashMap::new()) }
    }

    fn graph_path(&self, package: &str) -> PathBuf {
        self.navigation_dir.join(format!("nav_{}.json", package_hash(package)))
    }

    async fn load_or_create(&self, package: &str) -> Graph {
        if let Some(graph) = self.cache.read().await.get(package).cloned() {
            return graph;
        }
        let path = self.graph_path(package);
        let graph = persist::load_json::<Graph>(&path)
            .ok()
            .flatten()
            .unwrap_or_else(|| Graph::new(package));
        self.cache.write().await.insert(package.to_owned(), graph.clone());
        graph
    }

    async fn save(&self, mut graph: Graph) -> Result<(), EngineError> {
        graph.updated_at = epoch_ms();
        let path = self.graph_path(&graph.package);
        persist::save_json(&path, &graph)
            .map_err(|e| EngineError::new(ErrorCode::Internal, format!("failed to save navigation graph: {e}")))?;
        self.cache.write().await.insert(graph.package.clone(), graph);
        Ok(())
    }

    /// Add or refresh a screen, returning its (possibly newly assigned)
    /// `screen_id`. Re-visiting a known screen only bumps its visit count
    /// and last-seen timestamp.
    pub async fn add_screen(
        &self,
        package: &str,
        activity: &str,
        ui_elements: &[UiElement],
        learned_from: LearnedFrom,
        is_home: bool,
    ) -> Result<String, EngineError> {
        let mut graph = self.load_or_create(package).await;
        let landmarks = extract_landmarks(ui_elements);
        let screen_id = compute_screen_id(activity, &landmarks);
        let now = epoch_ms();

        if is_home {
            for screen in graph.screens.values_mut() {
                screen.is_home = false;
            }
        }

        match graph.screens.get_mut(&screen_id) {
            Some(screen) => {
                screen.visit_count += 1;
                screen.last_seen = now;
                if is_home {
                    screen.is_home = true;
                }
            }
            None => {
                graph.screens.insert(
                    screen_id.clone(),
                    Screen {
                        screen_id: screen_id.clone(),
                        package: package.to_owned(),
                        activity: activity.to_owned(),
                        display_name: activity.rsplit('.').next().map(str::to_owned),
                        landmarks,
                        visit_count: 1,
                        is_home,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                let _ = learned_from; // recorded on the transition, not the screen
            }
        }

        if is_home {
            graph.home_screen_id = Some(screen_id.clone());
        }

        self.save(graph).await?;
        Ok(screen_id)
    }

    /// Find the known screen matching `activity`/`ui_elements`: first by
    /// exact screen id, falling back to any screen sharing the activity
    /// when landmarks have drifted.
    pub async fn identify_current_screen(
        &self,
        package: &str,
        activity: &str,
        ui_elements: &[UiElement],
    ) -> Option<Screen> {
        let graph = self.load_or_create(package).await;
        let landmarks = extract_landmarks(ui_elements);
        let screen_id = compute_screen_id(activity, &landmarks);
        if let Some(screen) = graph.screens.get(&screen_id) {
            return Some(screen.clone());
        }
        graph.screens.values().find(|s| s.activity == activity).cloned()
    }

    pub async fn set_home_screen(
        &self,
        package: &str,
        activity: &str,
        ui_elements: &[UiElement],
    ) -> Result<String, EngineError> {
        self.add_screen(package, activity, ui_elements, LearnedFrom::Teaching, true).await
    }

    /// Record a transition from `source_id` to `target_id`, bumping usage
    /// and EMA statistics if it already exists.
    pub async fn add_transition(
        &self,
        package: &str,
        source_id: &str,
        target_id: &str,
        action: ActionDescriptor,
        learned_from: LearnedFrom,
    ) -> Result<String, EngineError> {
        let mut graph = self.load_or_create(package).await;
        let transition_id = compute_transition_id(source_id, target_id, &action);
        let now = epoch_ms();

        match graph.transitions.iter_mut().find(|t| t.transition_id == transition_id) {
            Some(t) => {
                t.usage_count += 1;
                t.last_used = now;
            }
            None => graph.transitions.push(Transition {
                transition_id: transition_id.clone(),
                source_id: source_id.to_owned(),
                target_id: target_id.to_owned(),
                action,
                usage_count: 1,
                success_rate: 1.0,
                avg_transition_time_ms: 0.0,
                last_used: now,
                learned_from,
            }),
        }

        self.save(graph).await?;
        Ok(transition_id)
    }

    /// Update a transition's EMA success rate and, if supplied, its EMA
    /// average time, after an attempt to traverse it.
    pub async fn record_transition_result(
        &self,
        package: &str,
        transition_id: &str,
        success: bool,
        time_ms: Option<f64>,
    ) {
        let mut graph = self.load_or_create(package).await;
        let Some(t) = graph.transitions.iter_mut().find(|t| t.transition_id == transition_id) else {
            return;
        };
        t.usage_count += 1;
        t.last_used = epoch_ms();
        t.success_rate = EMA_ALPHA * (if success { 1.0 } else { 0.0 }) + (1.0 - EMA_ALPHA) * t.success_rate;
        if let Some(ms) = time_ms {
            t.avg_transition_time_ms = EMA_ALPHA * ms + (1.0 - EMA_ALPHA) * t.avg_transition_time_ms;
        }
        let _ = self.save(graph).await;
    }

    /// Learn from one observed before/after screen pair: adds both
    /// screens (if new) and the transition between them.
    pub async fn learn_transition(
        &self,
        package: &str,
        before_activity: &str,
        before_elements: &[UiElement],
        after_activity: &str,
        after_elements: &[UiElement],
        action: ActionDescriptor,
    ) -> Result<String, EngineError> {
        let source_id =
            self.add_screen(package, before_activity, before_elements, LearnedFrom::Recording, false).await?;
        let target_id =
            self.add_screen(package, after_activity, after_elements, LearnedFrom::Recording, false).await?;
        self.add_transition(package, &source_id, &target_id, action, LearnedFrom::Recording).await
    }

    /// Reconstruct transitions from a saved flow's consecutive steps: each
    /// `(screen_before, action, screen_after)` triple mined directly from
    /// recorded navigation state, without a live device.
    pub async fn mine_from_sequence(
        &self,
        package: &str,
        steps: &[(String, Vec<UiElement>, ActionDescriptor, String, Vec<UiElement>)],
    ) -> Result<usize, EngineError> {
        let mut learned = 0;
        for (before_activity, before_elements, action, after_activity, after_elements) in steps {
            self.learn_transition(package, before_activity, before_elements, after_activity, after_elements, action.clone())
                .await?;
            learned += 1;
        }
        Ok(learned)
    }

    /// Weighted-Dijkstra shortest path between two screens. Returns `None`
    /// (not an error) when the graph doesn't connect them, matching a
    /// navigation outcome the executor is expected to fall back on.
    pub async fn find_path(&self, package: &str, from_screen_id: &str, to_screen_id: &str) -> Option<NavigationPath> {
        let graph = self.load_or_create(package).await;
        if !graph.screens.contains_key(from_screen_id) || !graph.screens.contains_key(to_screen_id) {
            return None;
        }
        if from_screen_id == to_screen_id {
            return Some(NavigationPath { transitions: Vec::new(), total_cost: 0.0, estimated_time_ms: 0.0 });
        }

        let mut adjacency: HashMap<&str, Vec<&Transition>> = HashMap::new();
        for t in &graph.transitions {
            adjacency.entry(t.source_id.as_str()).or_default().push(t);
        }

        let mut distances: HashMap<&str, f64> = HashMap::new();
        let mut predecessors: HashMap<&str, (&str, &Transition)> = HashMap::new();
        distances.insert(from_screen_id, 0.0);

        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry { cost: 0.0, screen_id: from_screen_id });

        while let Some(HeapEntry { cost, screen_id }) = heap.pop() {
            if screen_id == to_screen_id {
                return Some(reconstruct_path(from_screen_id, to_screen_id, cost, &predecessors));
            }
            if cost > *distances.get(screen_id).unwrap_or(&f64::INFINITY) {
                continue;
            }
            let Some(edges) = adjacency.get(screen_id) else { continue };
            for t in edges {
                let edge_cost = transition_cost(t);
                let next_cost = cost + edge_cost;
                let better = next_cost < *distances.get(t.target_id.as_str()).unwrap_or(&f64::INFINITY);
                if better {
                    distances.insert(t.target_id.as_str(), next_cost);
                    predecessors.insert(t.target_id.as_str(), (screen_id, t));
                    heap.push(HeapEntry { cost: next_cost, screen_id: t.target_id.as_str() });
                }
            }
        }

        None
    }
}

fn reconstruct_path<'a>(
    from_screen_id: &str,
    to_screen_id: &'a str,
    total_cost: f64,
    predecessors: &HashMap<&'a str, (&'a str, &'a Transition)>,
) -> NavigationPath {
    let mut transitions = Vec::new();
    let mut node = to_screen_id;
    while node != from_screen_id {
        let Some((prev, transition)) = predecessors.get(node) else { break };
        transitions.push(transition.clone());
        node = prev;
    }
    transitions.reverse();
    let estimated_time_ms = transitions.iter().map(|t| t.avg_transition_time_ms).sum();
    NavigationPath { transitions, total_cost, estimated_time_ms }
}

/// `cost = 1.0 * (2.0 - success_rate) * clamp(0.5, 0.5 + avg_ms/2000, 1.5)
/// * 1/(1 + usage_count*0.1)` — lower is better; a transition that's
/// fast, reliable, and well-proven by repeated use is cheapest to route
/// through.
fn transition_cost(t: &Transition) -> f64 {
    let success_factor = 2.0 - t.success_rate;
    let time_factor = (0.5 + t.avg_transition_time_ms / 2000.0).clamp(0.5, 1.5);
    let usage_factor = 1.0 / (1.0 + t.usage_count as f64 * 0.1);
    success_factor * time_factor * usage_factor
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry<'a> {
    cost: f64,
    screen_id: &'a str,
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, Dijkstra needs the smallest cost out.
        other.cost.total_cmp(&self.cost)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
