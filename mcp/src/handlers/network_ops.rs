//! Container network handlers

use super::{bind, OperationFamily};
use crate::backend::{BackendError, NetworkBackend};
use crate::confirmation::ConfirmationTracker;
use crate::gate::{ActionOutput, Operation, Params};
use serde_json::json;
use std::sync::Arc;

type Backend = Arc<dyn NetworkBackend>;
type Result = std::result::Result<ActionOutput, BackendError>;

/// Build the network family
pub fn family<I, S>(backend: Backend, destructive: I) -> OperationFamily
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    OperationFamily::new(
        "networks",
        ConfirmationTracker::new(destructive),
        operations(backend),
    )
}

/// Network operation descriptors
pub fn operations(backend: Backend) -> Vec<Operation> {
    let attach_schema = json!({
        "network_id": {
            "type": "string",
            "description": "Network name or ID"
        },
        "container_id": {
            "type": "string",
            "description": "Container name or ID"
        }
    });

    vec![
        Operation::new(
            "docker_network_list",
            "List Docker networks.",
            bind(&backend, list),
        )
        .success("Networks:"),
        Operation::new(
            "docker_network_inspect",
            "Show the configuration and attached containers of a network.",
            bind(&backend, inspect),
        )
        .resource("network_id")
        .schema(
            json!({
                "network_id": {
                    "type": "string",
                    "description": "Network name or ID"
                }
            }),
            &["network_id"],
        )
        .success("Network '{resource}':"),
        Operation::new(
            "docker_network_create",
            "Create a Docker network.",
            bind(&backend, create),
        )
        .resource("name")
        .schema(
            json!({
                "name": {
                    "type": "string",
                    "description": "Network name"
                },
                "driver": {
                    "type": "string",
                    "description": "Network driver (default: bridge)"
                }
            }),
            &["name"],
        )
        .consequences(
            "A new network will be created. It may change how containers can reach each other.",
        )
        .success("Created network {id} as '{resource}'."),
        Operation::new(
            "docker_network_remove",
            "Remove a Docker network.",
            bind(&backend, remove),
        )
        .resource("network_id")
        .schema(
            json!({
                "network_id": {
                    "type": "string",
                    "description": "Network name or ID"
                }
            }),
            &["network_id"],
        )
        .consequences(
            "The network will be deleted. Containers relying on it lose that connectivity.",
        )
        .success("Network '{resource}' removed."),
        Operation::new(
            "docker_network_connect",
            "Attach a container to a network.",
            bind(&backend, connect),
        )
        .resource("network_id")
        .also_filter(&["container_id"])
        .schema(attach_schema.clone(), &["network_id", "container_id"])
        .consequences("The container will gain an interface on this network.")
        .success("Container connected to network '{resource}'."),
        Operation::new(
            "docker_network_disconnect",
            "Detach a container from a network.",
            bind(&backend, disconnect),
        )
        .resource("network_id")
        .also_filter(&["container_id"])
        .schema(
            {
                let mut schema = attach_schema;
                schema["force"] = json!({
                    "type": "boolean",
                    "description": "Force the disconnect"
                });
                schema
            },
            &["network_id", "container_id"],
        )
        .consequences(
            "The container will lose its interface on this network and any traffic over it.",
        )
        .success("Container disconnected from network '{resource}'."),
    ]
}

async fn list(backend: Backend, _params: Params) -> Result {
    Ok(ActionOutput::data(backend.list_networks().await?))
}

async fn inspect(backend: Backend, params: Params) -> Result {
    let id = params.require_str("network_id")?;
    Ok(ActionOutput::data(backend.inspect_network(id).await?))
}

async fn create(backend: Backend, params: Params) -> Result {
    let name = params.require_str("name")?;
    let id = backend.create_network(name, params.str("driver")).await?;
    Ok(ActionOutput::created(id))
}

async fn remove(backend: Backend, params: Params) -> Result {
    backend
        .remove_network(params.require_str("network_id")?)
        .await?;
    Ok(ActionOutput::done())
}

async fn connect(backend: Backend, params: Params) -> Result {
    let network = params.require_str("network_id")?;
    let container = params.require_str("container_id")?;
    backend.connect_network(network, container).await?;
    Ok(ActionOutput::done())
}

async fn disconnect(backend: Backend, params: Params) -> Result {
    let network = params.require_str("network_id")?;
    let container = params.require_str("container_id")?;
    let force = params.bool("force").unwrap_or(false);
    backend.disconnect_network(network, container, force).await?;
    Ok(ActionOutput::done())
}
