//! Statement assembly for the transactional endpoint.
//!
//! Every statement is the concatenation of four fragments in a fixed order:
//! `match`, `where`, the write clause (`CREATE`, `SET` or `DELETE`) and the
//! return clause. Each operation only picks which text fills each slot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::model::{Entity, FROM_FIELD, ID_FIELD, TO_FIELD};
use crate::params::{DeleteParams, Direction, GetParams, ListParams, WriteParams};

const RETURN_NODES_AND_EDGES: &str = "UNWIND nodes(p) AS n \
UNWIND relationships(p) AS r \
WITH collect(distinct n) AS nodes, collect(distinct r) AS edges \
RETURN nodes, edges";

const RETURN_NAMES_AND_IDS: &str = "UNWIND nodes(p) AS nodes \
WITH collect(distinct nodes.name) AS names, collect(distinct nodes.id) AS ids \
RETURN names, ids";

const MATCH_DEPENDENCY: &str = "MATCH (n1:node)-[r:dependency]->(n2:node) ";

/// A parameterized statement ready to be sent to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Query text.
    #[serde(rename = "statement")]
    pub text: String,
    /// Values bound to the `$name` placeholders in `text`.
    pub parameters: Map<String, Value>,
}

/// A CRUD request with its normalized parameters.
#[derive(Clone, Debug)]
pub enum Operation {
    /// List or traverse the graph.
    List(ListParams),
    /// Fetch one node, or the edge between two nodes.
    Get {
        /// Node id (edge source when `to` is set).
        id: String,
        /// Normalized query parameters.
        params: GetParams,
    },
    /// Create a node, or an edge when both endpoints are given.
    Create {
        /// Fields of the new entity, already renamed to store names.
        entity: Entity,
        /// Normalized query parameters.
        params: WriteParams,
    },
    /// Overwrite every field of a node or edge.
    Update {
        /// Node id (edge source when `to` is set).
        id: String,
        /// Replacement fields.
        entity: Entity,
        /// Normalized query parameters.
        params: WriteParams,
    },
    /// Merge fields into a node or edge.
    Patch {
        /// Node id (edge source when `to` is set).
        id: String,
        /// Fields to merge.
        entity: Entity,
        /// Normalized query parameters.
        params: WriteParams,
    },
    /// Delete a node or an edge.
    Delete {
        /// Node id (edge source when `to` is set).
        id: String,
        /// Normalized query parameters.
        params: DeleteParams,
    },
}

impl Operation {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::List(_) => "find",
            Operation::Get { .. } => "get",
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Patch { .. } => "patch",
            Operation::Delete { .. } => "remove",
        }
    }
}

#[derive(Default)]
struct Fragments {
    matching: &'static str,
    filter: &'static str,
    write: &'static str,
    returning: &'static str,
}

impl Fragments {
    fn assemble(self, parameters: Map<String, Value>) -> Statement {
        let mut text = String::with_capacity(
            self.matching.len() + self.filter.len() + self.write.len() + self.returning.len(),
        );
        text.push_str(self.matching);
        text.push_str(self.filter);
        text.push_str(self.write);
        text.push_str(self.returning);
        Statement { text, parameters }
    }
}

/// Builds the statement for `operation`.
///
/// Apart from the identifier minted for a new node this is a pure function
/// of its input.
pub fn build(operation: Operation) -> Statement {
    match operation {
        Operation::List(params) => build_list(&params),
        Operation::Get { id, params } => build_get(id, &params),
        Operation::Create { entity, params } => build_create(entity, &params),
        Operation::Update { id, entity, params } => {
            build_update(id, entity, &params, WriteMode::Replace)
        }
        Operation::Patch { id, entity, params } => {
            build_update(id, entity, &params, WriteMode::Merge)
        }
        Operation::Delete { id, params } => build_delete(id, &params),
    }
}

fn build_list(params: &ListParams) -> Statement {
    let mut fragments = Fragments {
        matching: "MATCH p=(n1)-[*]->(n2) ",
        ..Fragments::default()
    };
    let mut parameters = Map::new();

    if let Some(start) = &params.start {
        fragments.filter = "WHERE n1.id = $id ";
        if params.direction == Direction::Up {
            fragments.matching = "MATCH p=(n2)-[*]->(n1) ";
        }
        parameters.insert(ID_FIELD.into(), Value::String(start.clone()));
    }

    if params.full {
        fragments.returning = RETURN_NODES_AND_EDGES;
    } else {
        if params.start.is_none() {
            fragments.matching = "MATCH p=(n1) ";
        }
        fragments.returning = RETURN_NAMES_AND_IDS;
    }
    fragments.assemble(parameters)
}

fn build_get(id: String, params: &GetParams) -> Statement {
    let mut parameters = Map::new();
    parameters.insert(ID_FIELD.into(), Value::String(id));

    let fragments = match &params.to {
        Some(to) => {
            parameters.insert(TO_FIELD.into(), Value::String(to.clone()));
            Fragments {
                matching: "MATCH (n1)-[r]-(n2) ",
                filter: "WHERE n1.id = $id AND n2.id = $to ",
                write: "",
                returning: "RETURN r ",
            }
        }
        None => Fragments {
            matching: "MATCH (n1) ",
            filter: "WHERE n1.id = $id ",
            write: "",
            returning: if params.full {
                "RETURN n1 "
            } else {
                "RETURN {label: n1.name, id: n1.id} "
            },
        },
    };
    fragments.assemble(parameters)
}

fn build_create(mut entity: Entity, params: &WriteParams) -> Statement {
    let fragments = match (&params.from, &params.to) {
        (Some(from), Some(to)) => {
            entity.set_str(FROM_FIELD, from.clone());
            entity.set_str(TO_FIELD, to.clone());
            Fragments {
                matching: "MATCH (n1:node), (n2:node) ",
                filter: "WHERE n1.id = $data.from AND n2.id = $data.to ",
                write: "CREATE (n1)-[r:dependency $data]->(n2) ",
                returning: "RETURN r ",
            }
        }
        _ => {
            if entity.id().map_or(true, str::is_empty) {
                entity.set_str(ID_FIELD, Uuid::new_v4().to_string());
            }
            Fragments {
                write: "CREATE (n1:node $data) ",
                returning: "RETURN n1 ",
                ..Fragments::default()
            }
        }
    };
    fragments.assemble(data_parameters(entity))
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum WriteMode {
    Replace,
    Merge,
}

fn build_update(id: String, mut entity: Entity, params: &WriteParams, mode: WriteMode) -> Statement {
    let fragments = match &params.to {
        Some(to) => {
            entity.set_str(FROM_FIELD, id);
            entity.set_str(TO_FIELD, to.clone());
            Fragments {
                matching: MATCH_DEPENDENCY,
                filter: "WHERE n1.id = $data.from AND n2.id = $data.to ",
                write: match mode {
                    WriteMode::Replace => "SET r = $data ",
                    WriteMode::Merge => "SET r += $data ",
                },
                returning: "RETURN r ",
            }
        }
        None => {
            entity.set_str(ID_FIELD, id);
            Fragments {
                matching: "MATCH (n1:node) ",
                filter: "WHERE n1.id = $data.id ",
                write: match mode {
                    WriteMode::Replace => "SET n1 = $data ",
                    WriteMode::Merge => "SET n1 += $data ",
                },
                returning: "RETURN n1 ",
            }
        }
    };
    fragments.assemble(data_parameters(entity))
}

fn build_delete(id: String, params: &DeleteParams) -> Statement {
    let mut parameters = Map::new();
    parameters.insert(ID_FIELD.into(), Value::String(id));

    let fragments = match &params.to {
        Some(to) => {
            parameters.insert(TO_FIELD.into(), Value::String(to.clone()));
            Fragments {
                matching: MATCH_DEPENDENCY,
                filter: "WHERE n1.id = $id AND n2.id = $to ",
                write: "DELETE r ",
                returning: "RETURN r ",
            }
        }
        None => Fragments {
            matching: "MATCH (n1:node) ",
            filter: "WHERE n1.id = $id ",
            write: if params.detach {
                "DETACH DELETE n1 "
            } else {
                "DELETE n1 "
            },
            returning: "RETURN n1 ",
        },
    };
    fragments.assemble(parameters)
}

fn data_parameters(entity: Entity) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("data".into(), entity.into_value());
    parameters
}
