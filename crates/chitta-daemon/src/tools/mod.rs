//! Tool taxonomy and dispatch
//!
//! A fixed set of tool names, each with typed parameters (name, kind,
//! required flag, default). The handler validates arguments against the
//! spec, dispatches to the engine, and returns both a human-readable
//! rendering and a structured object. The CLI derives its `--help` output
//! from the same taxonomy, so the two surfaces cannot drift.

use serde_json::{json, Map, Value};
use std::sync::OnceLock;

use chitta_core::{
    ChittaError, ForgetOptions, Mind, NodeId, NodeType, RecallFilters, RecallQuery,
    RememberOptions, SearchMode, ROOT_REALM,
};

// ============================================================================
// TAXONOMY
// ============================================================================

/// Parameter value kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Bool,
    StringList,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::StringList => "string list",
        }
    }
}

/// One typed tool parameter
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, default: None, description }
    }

    fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, default: None, description }
    }

    fn with_default(
        name: &'static str,
        kind: ParamKind,
        default: Value,
        description: &'static str,
    ) -> Self {
        Self { name, kind, required: false, default: Some(default), description }
    }
}

/// One tool in the fixed taxonomy
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

/// The complete tool taxonomy, shared by the handler and the CLI
pub fn taxonomy() -> &'static [ToolSpec] {
    static TOOLS: OnceLock<Vec<ToolSpec>> = OnceLock::new();
    TOOLS.get_or_init(|| {
        vec![
            ToolSpec {
                name: "remember",
                description: "Store a text memory. Durable to the write-ahead log before returning.",
                params: vec![
                    ParamSpec::required("text", ParamKind::String, "Content to remember"),
                    ParamSpec::with_default("type", ParamKind::String, json!("wisdom"),
                        "Node type: wisdom, belief, failure, episode, aspiration, dream, term, question, invariant, gap"),
                    ParamSpec::optional("confidence", ParamKind::Float, "Initial confidence mean (0-1, default 0.5)"),
                    ParamSpec::optional("tags", ParamKind::StringList, "Tags, comma-separated on the CLI"),
                    ParamSpec::optional("epsilon", ParamKind::Float, "Reconstructability bias (0-1, default 1.0)"),
                    ParamSpec::optional("decay_rate", ParamKind::Float, "Override the type's default decay rate"),
                    ParamSpec::optional("realm", ParamKind::String, "Realm the node belongs to"),
                ],
            },
            ToolSpec {
                name: "get",
                description: "Fetch a node snapshot by id.",
                params: vec![ParamSpec::required("id", ParamKind::String, "Node identifier")],
            },
            ToolSpec {
                name: "recall",
                description: "Semantic recall ranked by soul-aware relevance.",
                params: vec![
                    ParamSpec::required("query", ParamKind::String, "Search query"),
                    ParamSpec::with_default("k", ParamKind::Integer, json!(10), "Maximum results"),
                    ParamSpec::optional("threshold", ParamKind::Float, "Minimum base similarity"),
                    ParamSpec::with_default("mode", ParamKind::String, json!("hybrid"),
                        "Search mode: dense, sparse, or hybrid"),
                    ParamSpec::optional("require_tags", ParamKind::StringList, "Every tag must be present"),
                    ParamSpec::optional("exclude_tags", ParamKind::StringList, "No tag may be present"),
                    ParamSpec::optional("realm", ParamKind::String, "Realm scope (plus ancestors)"),
                    ParamSpec::optional("min_confidence", ParamKind::Float, "Minimum effective confidence"),
                    ParamSpec::optional("min_epsilon", ParamKind::Float, "Minimum epsilon"),
                ],
            },
            ToolSpec {
                name: "resonate",
                description: "Recall plus spreading activation and Hebbian strengthening of the activated set.",
                params: vec![
                    ParamSpec::required("query", ParamKind::String, "Search query"),
                    ParamSpec::with_default("k", ParamKind::Integer, json!(5), "Recall seeds"),
                    ParamSpec::with_default("spread", ParamKind::Integer, json!(2), "Activation depth"),
                    ParamSpec::with_default("hebbian_strength", ParamKind::Float, json!(0.1),
                        "Edge strengthening per co-activation (0 disables)"),
                    ParamSpec::optional("exclude_tags", ParamKind::StringList, "Tags excluded from recall"),
                ],
            },
            ToolSpec {
                name: "connect",
                description: "Record a subject/predicate/object triplet. Idempotent by (s, p, o).",
                params: vec![
                    ParamSpec::required("subject", ParamKind::String, "Subject entity"),
                    ParamSpec::required("predicate", ParamKind::String, "Predicate"),
                    ParamSpec::required("object", ParamKind::String, "Object entity"),
                    ParamSpec::with_default("weight", ParamKind::Float, json!(1.0), "Weight in [0, 1]"),
                ],
            },
            ToolSpec {
                name: "query_graph",
                description: "Match triplets; unbound positions are wildcards.",
                params: vec![
                    ParamSpec::optional("subject", ParamKind::String, "Subject filter"),
                    ParamSpec::optional("predicate", ParamKind::String, "Predicate filter"),
                    ParamSpec::optional("object", ParamKind::String, "Object filter"),
                ],
            },
            ToolSpec {
                name: "strengthen",
                description: "Observe a node's confidence upward.",
                params: vec![
                    ParamSpec::required("id", ParamKind::String, "Node identifier"),
                    ParamSpec::with_default("delta", ParamKind::Float, json!(0.1), "Observation offset"),
                ],
            },
            ToolSpec {
                name: "weaken",
                description: "Observe a node's confidence downward.",
                params: vec![
                    ParamSpec::required("id", ParamKind::String, "Node identifier"),
                    ParamSpec::with_default("delta", ParamKind::Float, json!(0.1), "Observation offset"),
                ],
            },
            ToolSpec {
                name: "feedback",
                description: "Queue helpful/unhelpful feedback; applied at the next tick.",
                params: vec![
                    ParamSpec::required("id", ParamKind::String, "Node identifier"),
                    ParamSpec::required("helpful", ParamKind::Bool, "Whether the memory helped"),
                    ParamSpec::optional("context", ParamKind::String, "What the feedback refers to"),
                ],
            },
            ToolSpec {
                name: "forget",
                description: "Remove a node. Protected types are refused.",
                params: vec![
                    ParamSpec::required("id", ParamKind::String, "Node identifier"),
                    ParamSpec::with_default("cascade", ParamKind::Bool, json!(false),
                        "Weaken the removed node's neighbors"),
                    ParamSpec::with_default("rewire", ParamKind::Bool, json!(false),
                        "Bridge in-neighbors to out-neighbors"),
                ],
            },
            ToolSpec {
                name: "tag",
                description: "Add or remove a tag on a node.",
                params: vec![
                    ParamSpec::required("id", ParamKind::String, "Node identifier"),
                    ParamSpec::required("tag", ParamKind::String, "Tag text"),
                    ParamSpec::with_default("remove", ParamKind::Bool, json!(false), "Remove instead of add"),
                ],
            },
            ToolSpec {
                name: "define_realm",
                description: "Define a realm under an existing parent.",
                params: vec![
                    ParamSpec::required("name", ParamKind::String, "Realm name"),
                    ParamSpec::with_default("parent", ParamKind::String, json!(ROOT_REALM), "Parent realm"),
                ],
            },
            ToolSpec {
                name: "apply_feedback",
                description: "Drain the feedback queue immediately.",
                params: vec![],
            },
            ToolSpec {
                name: "tick",
                description: "Run one dynamics cycle: decay, prune, feedback, migration, settle.",
                params: vec![],
            },
            ToolSpec {
                name: "snapshot",
                description: "Write a consistent on-disk image and truncate the write-ahead log.",
                params: vec![],
            },
            ToolSpec {
                name: "stats",
                description: "Aggregate statistics: counts, WAL bytes, coherence, vitality.",
                params: vec![],
            },
        ]
    })
}

/// Look up a tool by name
pub fn find(name: &str) -> Option<&'static ToolSpec> {
    taxonomy().iter().find(|t| t.name == name)
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Validate arguments against a spec: fill defaults, reject missing
/// required, wrong kinds, and unknown names.
pub fn validate(spec: &ToolSpec, args: &Map<String, Value>) -> Result<Map<String, Value>, ChittaError> {
    for key in args.keys() {
        if !spec.params.iter().any(|p| p.name == key) {
            return Err(ChittaError::InvalidParams(format!(
                "unknown parameter '{key}' for tool '{}'",
                spec.name
            )));
        }
    }

    let mut validated = Map::new();
    for param in &spec.params {
        let value = match args.get(param.name) {
            Some(Value::Null) | None => match (&param.default, param.required) {
                (Some(default), _) => default.clone(),
                (None, true) => {
                    return Err(ChittaError::MissingRequired(param.name.to_string()));
                }
                (None, false) => continue,
            },
            Some(value) => value.clone(),
        };

        let ok = match param.kind {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.as_i64().is_some(),
            ParamKind::Float => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
            ParamKind::StringList => value
                .as_array()
                .is_some_and(|a| a.iter().all(Value::is_string)),
        };
        if !ok {
            return Err(ChittaError::InvalidParams(format!(
                "parameter '{}' must be a {}",
                param.name,
                param.kind.as_str()
            )));
        }
        validated.insert(param.name.to_string(), value);
    }
    Ok(validated)
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Tool result: user-facing strings plus the machine-readable object
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Vec<String>,
    pub structured: Value,
}

fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn f32_arg(args: &Map<String, Value>, name: &str) -> Option<f32> {
    args.get(name).and_then(Value::as_f64).map(|v| v as f32)
}

fn usize_arg(args: &Map<String, Value>, name: &str) -> Option<usize> {
    args.get(name).and_then(Value::as_i64).map(|v| v.max(0) as usize)
}

fn bool_arg(args: &Map<String, Value>, name: &str) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn list_arg(args: &Map<String, Value>, name: &str) -> Vec<String> {
    args.get(name)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn id_arg(args: &Map<String, Value>, name: &str) -> Result<NodeId, ChittaError> {
    let raw = str_arg(args, name)
        .ok_or_else(|| ChittaError::MissingRequired(name.to_string()))?;
    raw.parse()
        .map_err(|_| ChittaError::InvalidParams(format!("'{raw}' is not a node id")))
}

fn node_type_arg(args: &Map<String, Value>) -> Result<NodeType, ChittaError> {
    let raw = str_arg(args, "type").unwrap_or("wisdom");
    NodeType::parse_name(raw)
        .ok_or_else(|| ChittaError::InvalidParams(format!("unknown node type '{raw}'")))
}

/// Validate and run one tool call. Unknown tool names are the caller's
/// `MethodNotFound`.
pub fn execute(mind: &mut Mind, name: &str, args: &Map<String, Value>) -> Result<ToolOutput, ChittaError> {
    let spec = find(name)
        .ok_or_else(|| ChittaError::InvalidParams(format!("unknown tool '{name}'")))?;
    let args = validate(spec, args)?;

    match name {
        "remember" => {
            let text = str_arg(&args, "text").unwrap_or_default();
            let id = mind.remember(
                text,
                node_type_arg(&args)?,
                RememberOptions {
                    confidence: f32_arg(&args, "confidence"),
                    tags: list_arg(&args, "tags"),
                    epsilon: f32_arg(&args, "epsilon"),
                    decay_rate: f32_arg(&args, "decay_rate"),
                    realm: str_arg(&args, "realm").map(str::to_string),
                },
            )?;
            Ok(ToolOutput {
                content: vec![format!("Remembered as {id}")],
                structured: json!({ "id": id.to_string() }),
            })
        }
        "get" => {
            let id = id_arg(&args, "id")?;
            match mind.get(id)? {
                Some(node) => Ok(ToolOutput {
                    content: vec![format!(
                        "{} [{}] confidence {:.2}: {}",
                        node.id,
                        node.node_type,
                        node.effective_confidence(),
                        node.payload_text()
                    )],
                    structured: serde_json::to_value(&node)
                        .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
                }),
                None => Ok(ToolOutput {
                    content: vec![format!("No node with id {id}")],
                    structured: Value::Null,
                }),
            }
        }
        "recall" => {
            let query = str_arg(&args, "query").unwrap_or_default();
            let mode_raw = str_arg(&args, "mode").unwrap_or("hybrid");
            let mode = SearchMode::parse_name(mode_raw)
                .ok_or_else(|| ChittaError::InvalidParams(format!("unknown mode '{mode_raw}'")))?;
            let filters = RecallFilters {
                require_tags: list_arg(&args, "require_tags"),
                exclude_tags: list_arg(&args, "exclude_tags"),
                realm: str_arg(&args, "realm").map(str::to_string),
                min_confidence: f32_arg(&args, "min_confidence"),
                min_epsilon: f32_arg(&args, "min_epsilon"),
            };
            let hits = mind.recall(
                RecallQuery::Text(query.to_string()),
                usize_arg(&args, "k").unwrap_or(10),
                f32_arg(&args, "threshold"),
                mode,
                &filters,
            )?;
            let mut content = vec![format!("{} results for '{query}'", hits.len())];
            content.extend(hits.iter().map(|h| {
                format!(
                    "  {:.3} [{}] {}",
                    h.relevance,
                    h.node_type,
                    h.payload.chars().take(96).collect::<String>()
                )
            }));
            Ok(ToolOutput {
                content,
                structured: json!({
                    "total": hits.len(),
                    "results": serde_json::to_value(&hits)
                        .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
                }),
            })
        }
        "resonate" => {
            let query = str_arg(&args, "query").unwrap_or_default();
            let result = mind.resonate(
                query,
                usize_arg(&args, "k").unwrap_or(5),
                usize_arg(&args, "spread").unwrap_or(2),
                f32_arg(&args, "hebbian_strength").unwrap_or(0.1),
                list_arg(&args, "exclude_tags"),
            )?;
            Ok(ToolOutput {
                content: vec![format!(
                    "{} hits, {} activated, {} edges strengthened",
                    result.hits.len(),
                    result.activated.len(),
                    result.hebbian_updates
                )],
                structured: serde_json::to_value(&result)
                    .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
            })
        }
        "connect" => {
            let result = mind.connect(
                str_arg(&args, "subject").unwrap_or_default(),
                str_arg(&args, "predicate").unwrap_or_default(),
                str_arg(&args, "object").unwrap_or_default(),
                f32_arg(&args, "weight").unwrap_or(1.0),
            )?;
            let mut content = vec![format!(
                "{} --{}--> {} ({:.2})",
                result.triplet.subject,
                result.triplet.predicate,
                result.triplet.object,
                result.triplet.weight
            )];
            if result.conflict {
                content.push("Note: an opposing fact is also on record".to_string());
            }
            Ok(ToolOutput {
                content,
                structured: serde_json::to_value(&result)
                    .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
            })
        }
        "query_graph" => {
            let triplets = mind.query_graph(
                str_arg(&args, "subject"),
                str_arg(&args, "predicate"),
                str_arg(&args, "object"),
            );
            let mut content = vec![format!("{} triplets", triplets.len())];
            content.extend(triplets.iter().map(|t| {
                format!("  {} --{}--> {} ({:.2})", t.subject, t.predicate, t.object, t.weight)
            }));
            Ok(ToolOutput {
                content,
                structured: json!({
                    "total": triplets.len(),
                    "triplets": serde_json::to_value(&triplets)
                        .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
                }),
            })
        }
        "strengthen" | "weaken" => {
            let id = id_arg(&args, "id")?;
            let delta = f32_arg(&args, "delta").unwrap_or(0.1);
            let confidence = if name == "strengthen" {
                mind.strengthen(id, delta)?
            } else {
                mind.weaken(id, delta)?
            };
            Ok(ToolOutput {
                content: vec![format!(
                    "{id}: mu {:.3}, effective {:.3}",
                    confidence.mu,
                    confidence.effective()
                )],
                structured: serde_json::to_value(confidence)
                    .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
            })
        }
        "feedback" => {
            let id = id_arg(&args, "id")?;
            let helpful = bool_arg(&args, "helpful");
            mind.feedback(id, helpful, str_arg(&args, "context").map(str::to_string))?;
            Ok(ToolOutput {
                content: vec![format!(
                    "Feedback queued ({} pending)",
                    mind.feedback_pending()
                )],
                structured: json!({ "pending": mind.feedback_pending() }),
            })
        }
        "forget" => {
            let id = id_arg(&args, "id")?;
            mind.forget(
                id,
                ForgetOptions {
                    cascade: bool_arg(&args, "cascade"),
                    rewire: bool_arg(&args, "rewire"),
                },
            )?;
            Ok(ToolOutput {
                content: vec![format!("Forgot {id}")],
                structured: json!({ "forgotten": id.to_string() }),
            })
        }
        "tag" => {
            let id = id_arg(&args, "id")?;
            let tag = str_arg(&args, "tag").unwrap_or_default();
            let remove = bool_arg(&args, "remove");
            mind.set_tag(id, tag, !remove)?;
            Ok(ToolOutput {
                content: vec![format!(
                    "{} tag '{tag}' on {id}",
                    if remove { "Removed" } else { "Added" }
                )],
                structured: json!({ "id": id.to_string(), "tag": tag, "removed": remove }),
            })
        }
        "define_realm" => {
            let realm = str_arg(&args, "name").unwrap_or_default();
            let parent = str_arg(&args, "parent").unwrap_or(ROOT_REALM);
            mind.define_realm(realm, parent)?;
            Ok(ToolOutput {
                content: vec![format!("Realm '{realm}' defined under '{parent}'")],
                structured: json!({ "name": realm, "parent": parent }),
            })
        }
        "apply_feedback" => {
            let applied = mind.apply_feedback()?;
            Ok(ToolOutput {
                content: vec![format!("Applied {applied} feedback events")],
                structured: json!({ "applied": applied }),
            })
        }
        "tick" => {
            let report = mind.tick()?;
            Ok(ToolOutput {
                content: vec![format!(
                    "Tick: {} decayed, {} pruned, {} feedback, coherence {:.2}, vitality {:.2}",
                    report.decayed,
                    report.pruned,
                    report.feedback_applied,
                    report.coherence,
                    report.vitality
                )],
                structured: serde_json::to_value(&report)
                    .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
            })
        }
        "snapshot" => {
            let counter = mind.snapshot()?;
            Ok(ToolOutput {
                content: vec![format!("Snapshot {counter} written")],
                structured: json!({ "counter": counter }),
            })
        }
        "stats" => {
            let stats = mind.stats();
            Ok(ToolOutput {
                content: vec![format!(
                    "{} nodes, {} WAL bytes, coherence {:.2}, vitality {:.2} ({})",
                    stats.total_nodes,
                    stats.wal_bytes,
                    stats.coherence,
                    stats.vitality,
                    stats.status
                )],
                structured: serde_json::to_value(&stats)
                    .map_err(|e| ChittaError::InvalidParams(e.to_string()))?,
            })
        }
        _ => unreachable!("find() covers the taxonomy"),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chitta_core::{HashEmbedder, MindConfig};
    use tempfile::TempDir;

    fn test_mind(dir: &TempDir) -> Mind {
        let config = MindConfig {
            base_path: Some(dir.path().join("db")),
            dimensions: 32,
            ..Default::default()
        };
        Mind::open(config, Some(Box::new(HashEmbedder::new(32)))).unwrap()
    }

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_taxonomy_names_are_unique() {
        let mut names: Vec<_> = taxonomy().iter().map(|t| t.name).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn test_validate_missing_required() {
        let spec = find("remember").unwrap();
        match validate(spec, &Map::new()) {
            Err(ChittaError::MissingRequired(name)) => assert_eq!(name, "text"),
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_unknown_param_rejected() {
        let spec = find("stats").unwrap();
        let result = validate(spec, &args(&[("bogus", json!(1))]));
        assert!(matches!(result, Err(ChittaError::InvalidParams(_))));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let spec = find("recall").unwrap();
        let validated = validate(spec, &args(&[("query", json!("hello"))])).unwrap();
        assert_eq!(validated.get("k"), Some(&json!(10)));
        assert_eq!(validated.get("mode"), Some(&json!("hybrid")));
    }

    #[test]
    fn test_validate_wrong_kind() {
        let spec = find("recall").unwrap();
        let result = validate(spec, &args(&[("query", json!("x")), ("k", json!("ten"))]));
        assert!(matches!(result, Err(ChittaError::InvalidParams(_))));
    }

    #[test]
    fn test_remember_then_recall_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut mind = test_mind(&dir);

        let out = execute(
            &mut mind,
            "remember",
            &args(&[
                ("text", json!("the cache invalidation trick")),
                ("tags", json!(["perf"])),
            ]),
        )
        .unwrap();
        let id = out.structured["id"].as_str().unwrap().to_string();

        let out = execute(
            &mut mind,
            "recall",
            &args(&[("query", json!("cache invalidation"))]),
        )
        .unwrap();
        assert_eq!(out.structured["total"], json!(1));

        let out = execute(&mut mind, "get", &args(&[("id", json!(id))])).unwrap();
        assert_eq!(out.structured["tags"], json!(["perf"]));
    }

    #[test]
    fn test_stats_and_tick_tools() {
        let dir = TempDir::new().unwrap();
        let mut mind = test_mind(&dir);
        execute(&mut mind, "remember", &args(&[("text", json!("a memory"))])).unwrap();

        let out = execute(&mut mind, "stats", &args(&[])).unwrap();
        assert_eq!(out.structured["totalNodes"], json!(1));

        let out = execute(&mut mind, "tick", &args(&[])).unwrap();
        assert!(out.structured["coherence"].is_number());
    }

    #[test]
    fn test_bad_id_is_invalid_params() {
        let dir = TempDir::new().unwrap();
        let mut mind = test_mind(&dir);
        let result = execute(&mut mind, "get", &args(&[("id", json!("not-a-uuid"))]));
        assert!(matches!(result, Err(ChittaError::InvalidParams(_))));
    }
}
