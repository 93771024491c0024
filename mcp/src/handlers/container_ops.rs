//! Container operation handlers

use super::{bind, OperationFamily};
use crate::backend::{BackendError, ContainerBackend, CreateContainer};
use crate::confirmation::ConfirmationTracker;
use crate::gate::{ActionOutput, Operation, Params};
use serde_json::json;
use std::sync::Arc;

type Backend = Arc<dyn ContainerBackend>;
type Result = std::result::Result<ActionOutput, BackendError>;

/// Default number of log lines returned by `docker_logs`
const DEFAULT_LOG_TAIL: u64 = 100;

/// Build the container family
pub fn family<I, S>(backend: Backend, destructive: I) -> OperationFamily
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    OperationFamily::new(
        "containers",
        ConfirmationTracker::new(destructive),
        operations(backend),
    )
}

fn container_id_schema() -> serde_json::Value {
    json!({
        "container_id": {
            "type": "string",
            "description": "Container name or ID"
        }
    })
}

/// Container operation descriptors
pub fn operations(backend: Backend) -> Vec<Operation> {
    vec![
        Operation::new(
            "docker_list",
            "List Docker containers with their state and image.",
            bind(&backend, list),
        )
        .schema(
            json!({
                "all": {
                    "type": "boolean",
                    "description": "Include stopped containers (default: true)"
                }
            }),
            &[],
        )
        .success("Containers:"),
        Operation::new(
            "docker_inspect",
            "Show the full configuration and state of a container.",
            bind(&backend, inspect),
        )
        .resource("container_id")
        .schema(container_id_schema(), &["container_id"])
        .success("Container '{resource}':"),
        Operation::new(
            "docker_logs",
            "Fetch recent stdout/stderr output of a container.",
            bind(&backend, logs),
        )
        .resource("container_id")
        .schema(
            json!({
                "container_id": {
                    "type": "string",
                    "description": "Container name or ID"
                },
                "tail": {
                    "type": "integer",
                    "description": "Number of lines from the end (default: 100)",
                    "minimum": 1
                }
            }),
            &["container_id"],
        )
        .success("Logs for container '{resource}':"),
        Operation::new(
            "docker_start",
            "Start a stopped container.",
            bind(&backend, start),
        )
        .resource("container_id")
        .schema(container_id_schema(), &["container_id"])
        .success("Container '{resource}' started."),
        Operation::new(
            "docker_stop",
            "Stop a running container.",
            bind(&backend, stop),
        )
        .resource("container_id")
        .schema(
            json!({
                "container_id": {
                    "type": "string",
                    "description": "Container name or ID"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Seconds to wait before killing the container",
                    "minimum": 0
                }
            }),
            &["container_id"],
        )
        .consequences(
            "The container will be stopped. Services it provides become unavailable \
             and in-flight work is interrupted.",
        )
        .success("Container '{resource}' stopped."),
        Operation::new(
            "docker_restart",
            "Restart a container.",
            bind(&backend, restart),
        )
        .resource("container_id")
        .schema(container_id_schema(), &["container_id"])
        .consequences(
            "The container will be stopped and started again. Active connections \
             are dropped during the restart.",
        )
        .success("Container '{resource}' restarted."),
        Operation::new(
            "docker_remove",
            "Remove a container.",
            bind(&backend, remove),
        )
        .resource("container_id")
        .schema(
            json!({
                "container_id": {
                    "type": "string",
                    "description": "Container name or ID"
                },
                "force": {
                    "type": "boolean",
                    "description": "Kill the container first if it is running"
                }
            }),
            &["container_id"],
        )
        .consequences(
            "The container and its writable layer will be permanently deleted. \
             Data not stored in volumes is lost. This cannot be undone.",
        )
        .success("Container '{resource}' removed."),
        Operation::new(
            "docker_create",
            "Create a new container from an image.",
            bind(&backend, create),
        )
        .resource("image")
        .also_filter(&["name"])
        .schema(
            json!({
                "image": {
                    "type": "string",
                    "description": "Image reference, e.g. 'nginx:latest'"
                },
                "name": {
                    "type": "string",
                    "description": "Container name"
                },
                "command": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Command to run"
                },
                "env": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Environment entries as KEY=VALUE"
                }
            }),
            &["image"],
        )
        .consequences(
            "A new container will be created on the host from this image. It is \
             not started automatically.",
        )
        .success("Created container {id} from image '{resource}'."),
    ]
}

async fn list(backend: Backend, params: Params) -> Result {
    let all = params.bool("all").unwrap_or(true);
    Ok(ActionOutput::data(backend.list_containers(all).await?))
}

async fn inspect(backend: Backend, params: Params) -> Result {
    let id = params.require_str("container_id")?;
    Ok(ActionOutput::data(backend.inspect_container(id).await?))
}

async fn logs(backend: Backend, params: Params) -> Result {
    let id = params.require_str("container_id")?;
    let tail = params.u64("tail").unwrap_or(DEFAULT_LOG_TAIL);
    Ok(ActionOutput::text(backend.container_logs(id, tail).await?))
}

async fn start(backend: Backend, params: Params) -> Result {
    backend
        .start_container(params.require_str("container_id")?)
        .await?;
    Ok(ActionOutput::done())
}

async fn stop(backend: Backend, params: Params) -> Result {
    let id = params.require_str("container_id")?;
    backend.stop_container(id, params.u64("timeout")).await?;
    Ok(ActionOutput::done())
}

async fn restart(backend: Backend, params: Params) -> Result {
    backend
        .restart_container(params.require_str("container_id")?)
        .await?;
    Ok(ActionOutput::done())
}

async fn remove(backend: Backend, params: Params) -> Result {
    let id = params.require_str("container_id")?;
    let force = params.bool("force").unwrap_or(false);
    backend.remove_container(id, force).await?;
    Ok(ActionOutput::done())
}

async fn create(backend: Backend, params: Params) -> Result {
    let options = CreateContainer {
        image: params.require_str("image")?.to_string(),
        name: params.str("name").map(str::to_string),
        command: params.str_list("command"),
        env: params.str_list("env"),
    };
    let id = backend.create_container(&options).await?;
    Ok(ActionOutput::created(id))
}
