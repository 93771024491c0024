//! Virtual machine handlers

use super::{bind, OperationFamily};
use crate::backend::{BackendError, VmBackend};
use crate::confirmation::ConfirmationTracker;
use crate::gate::{ActionOutput, Operation, Params};
use serde_json::{json, Value};
use std::sync::Arc;

type Backend = Arc<dyn VmBackend>;
type Result = std::result::Result<ActionOutput, BackendError>;

/// Build the VM family
pub fn family<I, S>(backend: Backend, destructive: I) -> OperationFamily
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    OperationFamily::new("vms", ConfirmationTracker::new(destructive), operations(backend))
}

fn name_schema() -> Value {
    json!({
        "name": {
            "type": "string",
            "description": "Domain name"
        }
    })
}

/// A single-domain operation keyed on `name`
fn domain_op<F, Fut>(name: &'static str, description: &'static str, action: F) -> Operation
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result> + Send + 'static,
{
    Operation::new(name, description, action)
        .resource("name")
        .schema(name_schema(), &["name"])
}

/// VM operation descriptors
pub fn operations(backend: Backend) -> Vec<Operation> {
    vec![
        Operation::new(
            "vm_list",
            "List all virtual machines and their state.",
            bind(&backend, list),
        )
        .success("Virtual machines:"),
        domain_op(
            "vm_info",
            "Show state, memory and CPU details of a virtual machine.",
            bind(&backend, info),
        )
        .success("Virtual machine '{resource}':"),
        domain_op("vm_start", "Boot a virtual machine.", bind(&backend, start))
            .success("Virtual machine '{resource}' started."),
        domain_op(
            "vm_pause",
            "Suspend a running virtual machine.",
            bind(&backend, pause),
        )
        .success("Virtual machine '{resource}' paused."),
        domain_op(
            "vm_resume",
            "Resume a paused virtual machine.",
            bind(&backend, resume),
        )
        .success("Virtual machine '{resource}' resumed."),
        domain_op(
            "vm_stop",
            "Gracefully shut down a virtual machine.",
            bind(&backend, stop),
        )
        .consequences(
            "The guest will be asked to shut down. Services running in it become unavailable.",
        )
        .success("Shutdown requested for virtual machine '{resource}'."),
        domain_op(
            "vm_force_stop",
            "Immediately power off a virtual machine.",
            bind(&backend, force_stop),
        )
        .consequences(
            "The guest will be powered off without a clean shutdown. Unsaved data \
             may be lost and guest filesystems may need repair.",
        )
        .success("Virtual machine '{resource}' powered off."),
        domain_op(
            "vm_restart",
            "Reboot a virtual machine.",
            bind(&backend, restart),
        )
        .consequences("The guest will reboot. Its services are interrupted until it is back up.")
        .success("Reboot requested for virtual machine '{resource}'."),
        Operation::new(
            "vm_create",
            "Define a virtual machine from a libvirt XML file and start it.",
            bind(&backend, create),
        )
        .resource("name")
        .schema(
            json!({
                "name": {
                    "type": "string",
                    "description": "Domain name as declared in the XML"
                },
                "xml_path": {
                    "type": "string",
                    "description": "Path to the domain XML on the host"
                }
            }),
            &["name", "xml_path"],
        )
        .consequences(
            "A new domain will be defined on the host and booted. It consumes the \
             memory and CPU its XML requests.",
        )
        .success("Virtual machine '{resource}' created and started."),
        domain_op(
            "vm_delete",
            "Remove a virtual machine definition.",
            bind(&backend, delete),
        )
        .consequences(
            "The domain definition will be removed from libvirt. Disk images are \
             kept but the machine can no longer be started by name.",
        )
        .success("Virtual machine '{resource}' deleted."),
    ]
}

async fn list(backend: Backend, _params: Params) -> Result {
    Ok(ActionOutput::data(backend.list_domains().await?))
}

async fn info(backend: Backend, params: Params) -> Result {
    let name = params.require_str("name")?;
    Ok(ActionOutput::data(backend.domain_info(name).await?))
}

async fn start(backend: Backend, params: Params) -> Result {
    backend.start_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}

async fn pause(backend: Backend, params: Params) -> Result {
    backend.pause_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}

async fn resume(backend: Backend, params: Params) -> Result {
    backend.resume_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}

async fn stop(backend: Backend, params: Params) -> Result {
    backend.shutdown_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}

async fn force_stop(backend: Backend, params: Params) -> Result {
    backend.destroy_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}

async fn restart(backend: Backend, params: Params) -> Result {
    backend.reboot_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}

async fn create(backend: Backend, params: Params) -> Result {
    let name = params.require_str("name")?;
    let xml_path = params.require_str("xml_path")?;
    backend.create_domain(name, xml_path).await?;
    Ok(ActionOutput::done())
}

async fn delete(backend: Backend, params: Params) -> Result {
    backend.undefine_domain(params.require_str("name")?).await?;
    Ok(ActionOutput::done())
}
