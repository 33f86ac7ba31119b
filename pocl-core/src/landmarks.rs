//! Landmark graphs as dumped by an external landmark generator, and the
//! layering used to prioritize open conditions.
//!
//! ```text
//! Landmark graph:
//! LM 0 Atom at(truck, depot) (true_goal)
//!     <-_gn LM 1
//! LM 1 Atom at(truck, market)
//!     ->_gn LM 0
//! Landmark graph end.
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Atom, Formula, Literal, Problem, Term};

#[derive(Debug, Error)]
pub enum LandmarkError {
    #[error("failed to read landmark file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("missing `Landmark graph:` section")]
    MissingGraph,
    #[error("malformed landmark line {line_number}: {line}")]
    Malformed { line_number: usize, line: String },
    #[error("unknown predicate {0} in landmark")]
    UnknownPredicate(String),
    #[error("unknown object {0} in landmark")]
    UnknownObject(String),
    #[error("edge to undeclared landmark {0}")]
    UnknownLandmark(i64),
}

pub type LandmarkResult<T> = std::result::Result<T, LandmarkError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: i64,
    pub to: i64,
    /// Ordering kind after the underscore (`gn`, `nat`, `r`...), empty for
    /// plain `->` edges.
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct Landmark {
    pub id: i64,
    pub formula: Formula,
    /// No other landmark is ordered before this one.
    pub is_initial_state: bool,
    /// No landmark is ordered after this one.
    pub is_goal_state: bool,
    pub layer: Option<usize>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Default)]
pub struct LandmarkGraph {
    landmarks: BTreeMap<i64, Landmark>,
}

fn atom_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(NegatedAtom|Atom)\s+([^\s(]+)\(([^)]*)\)").expect("static regex is valid")
    })
}

pub fn read_landmarks_file<P: AsRef<Path>>(path: P, problem: &Problem) -> LandmarkResult<LandmarkGraph> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LandmarkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut graph = LandmarkGraph::parse(&text, problem)?;
    graph.compute_landmark_layers();
    info!(
        target: "landmarks",
        path = %path.display(),
        landmarks = graph.len(),
        layered = graph.iter().filter(|lm| lm.layer.is_some()).count(),
        "landmark graph loaded"
    );
    Ok(graph)
}

impl LandmarkGraph {
    /// Parses the landmark section of `text`. Layers are left unset; see
    /// [`compute_landmark_layers`](Self::compute_landmark_layers).
    pub fn parse(text: &str, problem: &Problem) -> LandmarkResult<LandmarkGraph> {
        let mut graph = LandmarkGraph::default();
        let mut in_graph = false;
        let mut current: Option<i64> = None;
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let malformed = || LandmarkError::Malformed {
                line_number: index + 1,
                line: line.to_string(),
            };
            if line.is_empty() {
                continue;
            }
            if line.contains("Landmark graph:") {
                in_graph = true;
                continue;
            }
            if line.contains("Landmark graph end.") {
                break;
            }
            if !in_graph {
                continue;
            }

            if let Some(rest) = line.strip_prefix("LM") {
                let rest = rest.trim_start();
                let (id, formula_text) = rest.split_once(char::is_whitespace).ok_or_else(malformed)?;
                let id: i64 = id.parse().map_err(|_| malformed())?;
                let formula = parse_formula(formula_text, problem, malformed)?;
                graph.landmarks.insert(
                    id,
                    Landmark {
                        id,
                        formula,
                        is_initial_state: true,
                        is_goal_state: true,
                        layer: None,
                        edges: Vec::new(),
                    },
                );
                current = Some(id);
                continue;
            }

            let owner = current.ok_or_else(malformed)?;
            let mut tokens = line.split_whitespace();
            let arrow = tokens.next().ok_or_else(malformed)?;
            let landmark = graph.landmarks.get_mut(&owner).ok_or_else(malformed)?;
            if arrow.starts_with("<-") {
                landmark.is_initial_state = false;
                continue;
            }
            if !arrow.starts_with("->") {
                return Err(malformed());
            }
            landmark.is_goal_state = false;
            let kind = arrow
                .split_once('_')
                .map(|(_, kind)| kind.to_string())
                .unwrap_or_default();
            if tokens.next() != Some("LM") {
                return Err(malformed());
            }
            let to: i64 = tokens
                .next()
                .and_then(|id| id.parse().ok())
                .ok_or_else(malformed)?;
            landmark.edges.push(Edge {
                from: owner,
                to,
                kind,
            });
        }
        if !in_graph {
            return Err(LandmarkError::MissingGraph);
        }
        for landmark in graph.landmarks.values() {
            if let Some(edge) = landmark
                .edges
                .iter()
                .find(|edge| !graph.landmarks.contains_key(&edge.to))
            {
                return Err(LandmarkError::UnknownLandmark(edge.to));
            }
        }
        Ok(graph)
    }

    /// Assigns layer 0 to initial-state landmarks without predecessors and
    /// `max(layer of predecessors) + 1` to every landmark whose predecessors
    /// all have a layer. Landmarks on a cycle keep no layer.
    pub fn compute_landmark_layers(&mut self) {
        let mut in_degree: HashMap<i64, usize> = self.landmarks.keys().map(|id| (*id, 0)).collect();
        let mut predecessors: HashMap<i64, Vec<i64>> = HashMap::new();
        for landmark in self.landmarks.values() {
            for edge in &landmark.edges {
                *in_degree.entry(edge.to).or_default() += 1;
                predecessors.entry(edge.to).or_default().push(edge.from);
            }
        }

        let mut queue: VecDeque<i64> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut sorted: Vec<i64> = queue.iter().copied().collect();
        sorted.sort_unstable();
        queue = sorted.into_iter().collect();

        let mut layers: HashMap<i64, Option<usize>> = HashMap::new();
        while let Some(id) = queue.pop_front() {
            let layer = match predecessors.get(&id) {
                None => self.landmarks[&id].is_initial_state.then_some(0),
                Some(preds) => preds
                    .iter()
                    .map(|p| layers.get(p).copied().flatten())
                    .collect::<Option<Vec<usize>>>()
                    .and_then(|ls| ls.into_iter().max())
                    .map(|max| max + 1),
            };
            layers.insert(id, layer);
            for edge in &self.landmarks[&id].edges {
                if let Some(degree) = in_degree.get_mut(&edge.to) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(edge.to);
                    }
                }
            }
        }

        let mut unlayered = 0usize;
        for landmark in self.landmarks.values_mut() {
            landmark.layer = layers.get(&landmark.id).copied().flatten();
            if landmark.layer.is_none() {
                unlayered += 1;
            }
        }
        debug!(target: "landmarks", unlayered, "landmark layers computed");
    }

    pub fn get(&self, id: i64) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.values()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn summaries(&self, problem: &Problem) -> Vec<LandmarkSummary> {
        self.landmarks
            .values()
            .map(|lm| LandmarkSummary {
                id: lm.id,
                formula: format_formula(&lm.formula, problem),
                layer: lm.layer,
                initial_state: lm.is_initial_state,
                goal_state: lm.is_goal_state,
                edges: lm.edges.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LandmarkSummary {
    pub id: i64,
    pub formula: String,
    pub layer: Option<usize>,
    pub initial_state: bool,
    pub goal_state: bool,
    pub edges: Vec<Edge>,
}

fn format_formula(formula: &Formula, problem: &Problem) -> String {
    let join = |keyword: &str, parts: &[Formula]| {
        let inner: Vec<String> = parts.iter().map(|p| format_formula(p, problem)).collect();
        format!("({keyword} {})", inner.join(" "))
    };
    match formula {
        Formula::True => "(and)".to_string(),
        Formula::False => "(or)".to_string(),
        Formula::Atom(_) | Formula::Negation(_) => formula
            .as_literal()
            .map(|literal| problem.format_literal(&literal))
            .unwrap_or_default(),
        Formula::Conjunction(parts) => join("and", parts),
        Formula::Disjunction(parts) => join("or", parts),
    }
}

fn parse_formula(
    text: &str,
    problem: &Problem,
    malformed: impl Fn() -> LandmarkError,
) -> LandmarkResult<Formula> {
    let mut literals = Vec::new();
    for captures in atom_pattern().captures_iter(text) {
        let name = captures[2].to_lowercase();
        let predicate = problem
            .domain
            .predicates
            .find(&name)
            .ok_or_else(|| LandmarkError::UnknownPredicate(name.clone()))?;
        let mut terms = Vec::new();
        for object in captures[3].split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let object = object.to_lowercase();
            let id = problem
                .objects
                .find(&object)
                .ok_or(LandmarkError::UnknownObject(object))?;
            terms.push(Term::Object(id));
        }
        let atom = Atom::new(predicate, terms);
        literals.push(if &captures[1] == "NegatedAtom" {
            Formula::Negation(atom)
        } else {
            Formula::Atom(atom)
        });
    }
    let head = text.trim_start();
    if head.starts_with("conj {") {
        Ok(Formula::and(literals))
    } else if head.starts_with("disj {") {
        Ok(Formula::or(literals))
    } else if literals.len() == 1 {
        Ok(literals.remove(0))
    } else {
        Err(malformed())
    }
}

/// Lowest landmark layer of every ground literal mentioned by a layered
/// landmark.
#[derive(Debug, Clone, Default)]
pub struct LandmarkIndex {
    layers: HashMap<Literal, usize>,
}

impl LandmarkIndex {
    pub fn new(graph: &LandmarkGraph) -> Self {
        let mut layers: HashMap<Literal, usize> = HashMap::new();
        for landmark in graph.iter() {
            let Some(layer) = landmark.layer else {
                continue;
            };
            for literal in landmark.formula.literals() {
                layers
                    .entry(literal)
                    .and_modify(|current| *current = (*current).min(layer))
                    .or_insert(layer);
            }
        }
        Self { layers }
    }

    pub fn layer(&self, literal: &Literal) -> Option<usize> {
        self.layers.get(literal).copied()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
