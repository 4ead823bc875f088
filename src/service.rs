//! CRUD entry points for the `/db` resource.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};
use crate::model::Entity;
use crate::params::{Caller, DeleteParams, GetParams, ListParams, QueryParams, WriteParams};
use crate::reshape::{self, Collections, Receipt};
use crate::statement::{self, Operation, Statement};
use crate::store::{GraphStore, TransactionRequest, TransactionResponse};

/// Result of `POST /db`: one entity, or one per element of an array body.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Created {
    /// Object body.
    One(Entity),
    /// Array body, in input order.
    Batch(Vec<Entity>),
}

/// Translates REST calls into store statements and back.
#[derive(Clone, Debug)]
pub struct DbService<S> {
    store: S,
}

impl<S: GraphStore> DbService<S> {
    /// Wraps a store client.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Store client in use.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// `GET /db`: lists or traverses the graph.
    pub async fn find(&self, query: &QueryParams) -> Result<Collections> {
        let operation = Operation::List(ListParams::from_query(query));
        let response = self.run(operation).await?;
        reshape::reshape_collections(response, query)
    }

    /// `GET /db/{id}`: fetches a node, or the edge between `id` and `to`.
    pub async fn get(&self, id: &str, query: &QueryParams) -> Result<Entity> {
        let operation = Operation::Get {
            id: id.to_owned(),
            params: GetParams::from_query(query),
        };
        let response = self.run(operation).await?;
        reshape::reshape_entity(response, query)
    }

    /// `POST /db`: creates a node, an edge, or one of either per array element.
    ///
    /// Array elements are created concurrently; the batch resolves once every
    /// element has settled and fails with the first failing element.
    pub async fn create(&self, caller: &Caller, body: Value, query: &QueryParams) -> Result<Created> {
        authorize(caller)?;
        match body {
            Value::Array(items) => {
                let calls = items.into_iter().map(|item| self.create_one(item, query));
                let settled = join_all(calls).await;
                let entities = settled.into_iter().collect::<Result<Vec<_>>>()?;
                Ok(Created::Batch(entities))
            }
            other => Ok(Created::One(self.create_one(other, query).await?)),
        }
    }

    async fn create_one(&self, body: Value, query: &QueryParams) -> Result<Entity> {
        let mut entity = Entity::from_value(body)?;
        entity.label_to_name();
        let operation = Operation::Create {
            entity,
            params: WriteParams::from_query(query),
        };
        let response = self.run(operation).await?;
        reshape::reshape_entity(response, query)
    }

    /// `PUT /db/{id}`: overwrites every field of a node or edge.
    pub async fn update(
        &self,
        caller: &Caller,
        id: &str,
        body: Value,
        query: &QueryParams,
    ) -> Result<Entity> {
        authorize(caller)?;
        let mut entity = Entity::from_value(body)?;
        entity.label_to_name();
        let operation = Operation::Update {
            id: id.to_owned(),
            entity,
            params: WriteParams::from_query(query),
        };
        let response = self.run(operation).await?;
        reshape::reshape_entity(response, query)
    }

    /// `PATCH /db/{id}`: merges fields into a node or edge.
    pub async fn patch(
        &self,
        caller: &Caller,
        id: &str,
        body: Value,
        query: &QueryParams,
    ) -> Result<Entity> {
        authorize(caller)?;
        let mut entity = Entity::from_value(body)?;
        entity.label_to_name();
        let operation = Operation::Patch {
            id: id.to_owned(),
            entity,
            params: WriteParams::from_query(query),
        };
        let response = self.run(operation).await?;
        reshape::reshape_entity(response, query)
    }

    /// `DELETE /db/{id}`: deletes a node, or the edge between `id` and `to`.
    ///
    /// A node that still has edges is only removed with `detach=true`.
    pub async fn remove(&self, caller: &Caller, id: &str, query: &QueryParams) -> Result<Receipt> {
        authorize(caller)?;
        let operation = Operation::Delete {
            id: id.to_owned(),
            params: DeleteParams::from_query(query),
        };
        let response = self.run(operation).await?;
        reshape::reshape_receipt(response, query)
    }

    async fn run(&self, operation: Operation) -> Result<TransactionResponse> {
        let name = operation.name();
        let statement = statement::build(operation);
        trace_statement(name, &statement);
        let response = self
            .store
            .execute(TransactionRequest::single(statement))
            .await?;
        Ok(response)
    }
}

/// Fails with [`ServiceError::Forbidden`] unless `caller` may mutate the graph.
pub fn authorize(caller: &Caller) -> Result<()> {
    if caller.is_admin() {
        return Ok(());
    }
    warn!(
        role = %caller.role,
        identity = caller.identity.as_deref().unwrap_or("-"),
        "mutation refused"
    );
    Err(ServiceError::Forbidden {
        role: caller.role.clone(),
    })
}

fn trace_statement(operation: &'static str, statement: &Statement) {
    debug!(
        operation,
        statement = %statement.text,
        parameters = ?statement.parameters.keys().collect::<Vec<_>>(),
        "sending statement"
    );
}
