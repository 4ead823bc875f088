//! In-process stand-in for the transactional endpoint.
//!
//! `MemoryGraph` recognizes the statement shapes the service emits and
//! answers in the store's columnar format, including the metadata pool.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use depgraph::store::{
    GraphStore, Row, StatementResult, StoreError, TransactionRequest, TransactionResponse,
};
use depgraph::Statement;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

#[derive(Clone, Debug)]
struct StoredNode {
    key: u64,
    props: Map<String, Value>,
}

#[derive(Clone, Debug)]
struct StoredEdge {
    key: u64,
    from: String,
    to: String,
    props: Map<String, Value>,
}

#[derive(Default)]
struct GraphState {
    next_key: u64,
    nodes: Vec<StoredNode>,
    edges: Vec<StoredEdge>,
}

/// Scripted graph store that records every statement it receives.
#[derive(Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
    log: Mutex<Vec<Statement>>,
    fail_transport: Mutex<bool>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph holding the path `A -> B -> C` (ids `a`, `b`, `c`).
    pub fn chain() -> Self {
        let graph = Self::new();
        graph.add_node("a", "A");
        graph.add_node("b", "B");
        graph.add_node("c", "C");
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph
    }

    pub fn add_node(&self, id: &str, name: &str) {
        let mut state = self.state.lock();
        let key = state.bump();
        let mut props = Map::new();
        props.insert("id".into(), json!(id));
        props.insert("name".into(), json!(name));
        state.nodes.push(StoredNode { key, props });
    }

    pub fn add_edge(&self, from: &str, to: &str) {
        let mut state = self.state.lock();
        let key = state.bump();
        let mut props = Map::new();
        props.insert("from".into(), json!(from));
        props.insert("to".into(), json!(to));
        state.edges.push(StoredEdge {
            key,
            from: from.into(),
            to: to.into(),
            props,
        });
    }

    /// Makes every following call fail at the transport level.
    pub fn go_offline(&self) {
        *self.fail_transport.lock() = true;
    }

    pub fn calls(&self) -> usize {
        self.log.lock().len()
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().clone()
    }

    pub fn node(&self, id: &str) -> Option<Map<String, Value>> {
        let state = self.state.lock();
        state.node(id).map(|n| n.props.clone())
    }

    pub fn edge_count(&self) -> usize {
        self.state.lock().edges.len()
    }

    fn answer(&self, statement: &Statement) -> TransactionResponse {
        let text = statement.text.as_str();
        let params = &statement.parameters;
        let mut state = self.state.lock();

        if text.starts_with("MATCH p=") {
            return state.traverse(text, param_str(params, "id"));
        }
        if text.starts_with("CREATE (n1:node $data)") {
            let data = params["data"].as_object().cloned().unwrap_or_default();
            let key = state.bump();
            state.nodes.push(StoredNode {
                key,
                props: data.clone(),
            });
            return single(Value::Object(data), node_meta(key, false));
        }
        if text.contains("CREATE (n1)-[r:dependency $data]->(n2)") {
            let data = params["data"].as_object().cloned().unwrap_or_default();
            let from = data["from"].as_str().unwrap_or_default().to_owned();
            let to = data["to"].as_str().unwrap_or_default().to_owned();
            if state.node(&from).is_none() || state.node(&to).is_none() {
                return empty(&["r"]);
            }
            let key = state.bump();
            state.edges.push(StoredEdge {
                key,
                from,
                to,
                props: data.clone(),
            });
            return single(Value::Object(data), edge_meta(key, false));
        }
        if text.starts_with("MATCH (n1)-[r]-(n2)") {
            let (a, b) = (param_str(params, "id"), param_str(params, "to"));
            return match state.edges.iter().find(|e| {
                (Some(e.from.as_str()), Some(e.to.as_str())) == (a, b)
                    || (Some(e.to.as_str()), Some(e.from.as_str())) == (a, b)
            }) {
                Some(edge) => single(Value::Object(edge.props.clone()), edge_meta(edge.key, false)),
                None => empty(&["r"]),
            };
        }
        if text.starts_with("MATCH (n1) WHERE n1.id = $id") {
            let Some(node) = param_str(params, "id").and_then(|id| state.node(id)) else {
                return empty(&["n1"]);
            };
            if text.contains("RETURN {label: n1.name, id: n1.id}") {
                let projection = json!({ "label": node.props.get("name"), "id": node.props.get("id") });
                return single(projection, Value::Null);
            }
            return single(Value::Object(node.props.clone()), node_meta(node.key, false));
        }
        if text.starts_with("MATCH (n1:node) WHERE n1.id = $data.id SET n1") {
            let data = params["data"].as_object().cloned().unwrap_or_default();
            let id = data["id"].as_str().unwrap_or_default().to_owned();
            let merge = text.contains("+=");
            let Some(node) = state.node_mut(&id) else {
                return empty(&["n1"]);
            };
            if merge {
                node.props.extend(data);
            } else {
                node.props = data;
            }
            let (props, key) = (node.props.clone(), node.key);
            return single(Value::Object(props), node_meta(key, false));
        }
        if text.starts_with("MATCH (n1:node)-[r:dependency]->(n2:node) WHERE n1.id = $data.from") {
            let data = params["data"].as_object().cloned().unwrap_or_default();
            let merge = text.contains("+=");
            let from = data["from"].as_str().unwrap_or_default().to_owned();
            let to = data["to"].as_str().unwrap_or_default().to_owned();
            let Some(edge) = state
                .edges
                .iter_mut()
                .find(|e| e.from == from && e.to == to)
            else {
                return empty(&["r"]);
            };
            if merge {
                edge.props.extend(data);
            } else {
                edge.props = data;
            }
            return single(Value::Object(edge.props.clone()), edge_meta(edge.key, false));
        }
        if text.starts_with("MATCH (n1:node)-[r:dependency]->(n2:node) WHERE n1.id = $id") {
            let (from, to) = (param_str(params, "id"), param_str(params, "to"));
            let Some(pos) = state
                .edges
                .iter()
                .position(|e| Some(e.from.as_str()) == from && Some(e.to.as_str()) == to)
            else {
                return empty(&["r"]);
            };
            let edge = state.edges.remove(pos);
            return single(json!({}), edge_meta(edge.key, true));
        }
        if text.starts_with("MATCH (n1:node) WHERE n1.id = $id") {
            let id = param_str(params, "id").unwrap_or_default().to_owned();
            let Some(pos) = state.nodes.iter().position(|n| n.props.get("id") == Some(&json!(id))) else {
                return empty(&["n1"]);
            };
            let attached = state.edges.iter().any(|e| e.from == id || e.to == id);
            if attached && !text.contains("DETACH DELETE") {
                return TransactionResponse {
                    results: Vec::new(),
                    errors: vec![json!({
                        "code": "Neo.ClientError.Schema.ConstraintValidationFailed",
                        "message": format!("Cannot delete node<{id}>, because it still has relationships."),
                    })],
                };
            }
            state.edges.retain(|e| e.from != id && e.to != id);
            let node = state.nodes.remove(pos);
            return single(json!({}), node_meta(node.key, true));
        }

        TransactionResponse {
            results: Vec::new(),
            errors: vec![json!({
                "code": "Neo.ClientError.Statement.SyntaxError",
                "message": format!("unsupported statement: {text}"),
            })],
        }
    }
}

impl GraphState {
    fn bump(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    fn node(&self, id: &str) -> Option<&StoredNode> {
        self.nodes.iter().find(|n| n.props.get("id") == Some(&json!(id)))
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut StoredNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.props.get("id") == Some(&json!(id)))
    }

    fn traverse(&self, text: &str, start: Option<&str>) -> TransactionResponse {
        let names_only = text.contains("RETURN names, ids");
        let upward = text.starts_with("MATCH p=(n2)-[*]->(n1)");
        let (nodes, edges) = match start {
            Some(start) => self.reachable(start, upward),
            None if names_only => (self.nodes.iter().collect(), Vec::new()),
            None => {
                let mut seen = Vec::new();
                for edge in &self.edges {
                    for id in [&edge.from, &edge.to] {
                        if let Some(node) = self.node(id) {
                            if !seen.iter().any(|n: &&StoredNode| n.key == node.key) {
                                seen.push(node);
                            }
                        }
                    }
                }
                (seen, self.edges.iter().collect())
            }
        };

        if names_only {
            let names: Vec<Value> = nodes.iter().map(|n| field(&n.props, "name")).collect();
            let ids: Vec<Value> = nodes.iter().map(|n| field(&n.props, "id")).collect();
            let meta = vec![Value::Null; names.len() + ids.len()];
            return columnar(&["names", "ids"], vec![Value::Array(names), Value::Array(ids)], meta);
        }

        let mut meta = Vec::new();
        let node_values = nodes
            .iter()
            .map(|n| {
                meta.push(node_meta(n.key, false));
                Value::Object(n.props.clone())
            })
            .collect();
        let edge_values = edges
            .iter()
            .map(|e| {
                meta.push(edge_meta(e.key, false));
                Value::Object(e.props.clone())
            })
            .collect();
        columnar(
            &["nodes", "edges"],
            vec![Value::Array(node_values), Value::Array(edge_values)],
            meta,
        )
    }

    fn reachable(&self, start: &str, upward: bool) -> (Vec<&StoredNode>, Vec<&StoredEdge>) {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_owned()]);
        while let Some(current) = queue.pop_front() {
            for edge in &self.edges {
                let (near, far) = if upward {
                    (&edge.to, &edge.from)
                } else {
                    (&edge.from, &edge.to)
                };
                if *near != current {
                    continue;
                }
                if edges.iter().all(|e: &&StoredEdge| e.key != edge.key) {
                    edges.push(edge);
                }
                if seen.insert(far.clone()) {
                    queue.push_back(far.clone());
                }
            }
        }
        if !edges.is_empty() {
            if let Some(node) = self.node(start) {
                nodes.push(node);
            }
            let mut ordered: Vec<&String> = Vec::new();
            for edge in &edges {
                let far = if upward { &edge.from } else { &edge.to };
                if far != start && !ordered.contains(&far) {
                    ordered.push(far);
                }
            }
            nodes.extend(ordered.into_iter().filter_map(|id| self.node(id)));
        }
        (nodes, edges)
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn execute(&self, request: TransactionRequest) -> Result<TransactionResponse, StoreError> {
        if *self.fail_transport.lock() {
            return Err(StoreError::Status {
                status: 503,
                body: "store offline".into(),
            });
        }
        let statement = request
            .statements
            .into_iter()
            .next()
            .expect("service sends exactly one statement");
        let response = self.answer(&statement);
        self.log.lock().push(statement);
        Ok(response)
    }
}

fn field(props: &Map<String, Value>, key: &str) -> Value {
    props.get(key).cloned().unwrap_or(Value::Null)
}

fn param_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn node_meta(key: u64, deleted: bool) -> Value {
    json!({ "id": key, "type": "node", "deleted": deleted })
}

fn edge_meta(key: u64, deleted: bool) -> Value {
    json!({ "id": key, "type": "relationship", "deleted": deleted })
}

fn single(cell: Value, meta: Value) -> TransactionResponse {
    columnar(&["n1"], vec![cell], vec![meta])
}

fn empty(columns: &[&str]) -> TransactionResponse {
    TransactionResponse {
        results: vec![StatementResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            data: Vec::new(),
        }],
        errors: Vec::new(),
    }
}

fn columnar(columns: &[&str], row: Vec<Value>, meta: Vec<Value>) -> TransactionResponse {
    TransactionResponse {
        results: vec![StatementResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            data: vec![Row { row, meta }],
        }],
        errors: Vec::new(),
    }
}
