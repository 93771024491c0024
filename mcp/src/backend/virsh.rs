//! libvirt backend driven through the `virsh` command
//!
//! Arguments are passed as separate argv entries, never through a shell.

use super::{BackendError, Result, VmBackend};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// `virsh` client
#[derive(Debug, Clone)]
pub struct VirshClient {
    program: PathBuf,
    connect_uri: Option<String>,
}

impl VirshClient {
    pub fn new(program: impl Into<PathBuf>, connect_uri: Option<String>) -> Self {
        Self {
            program: program.into(),
            connect_uri,
        }
    }

    /// Build a client from the `[vm]` configuration section
    pub fn from_config(vm: &warden_config::VmSection) -> Self {
        Self::new(&vm.virsh_path, vm.connect_uri.clone())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        self.run_with_input(args, None).await
    }

    /// Run virsh, feeding `input` on stdin when given
    async fn run_with_input(&self, args: &[&str], input: Option<&[u8]>) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        if let Some(uri) = &self.connect_uri {
            cmd.arg("--connect").arg(uri);
        }
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program.display(), ?args, "Running virsh");

        let spawn_failed = |e: std::io::Error| {
            BackendError::Command(format!("failed to run {}: {}", self.program.display(), e))
        };
        let mut child = cmd.spawn().map_err(spawn_failed)?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await.map_err(spawn_failed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a single-domain subcommand
    async fn domain_command(&self, subcommand: &str, name: &str) -> Result<()> {
        check_domain_name(name)?;
        self.run(&[subcommand, name]).await?;
        Ok(())
    }
}

fn classify_failure(stderr: &str) -> BackendError {
    let message = stderr
        .trim_start_matches("error:")
        .trim()
        .replace('\n', " ");
    if message.contains("failed to get domain") || message.contains("Domain not found") {
        BackendError::NotFound(message)
    } else {
        BackendError::Command(message)
    }
}

/// Reject names virsh would parse as options
fn check_domain_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(BackendError::InvalidParam {
            name: "name".to_string(),
            reason: "domain names may not start with '-'".to_string(),
        });
    }
    Ok(())
}

/// Name declared by the top-level `<name>` of a `<domain>` document
pub fn declared_domain_name(xml: &str) -> Option<&str> {
    let body = &xml[xml.find("<domain")?..];
    let start = body.find("<name>")? + "<name>".len();
    let len = body[start..].find("</name>")?;
    let name = body[start..start + len].trim();
    (!name.is_empty()).then_some(name)
}

/// Parse the table printed by `virsh list --all`
pub fn parse_domain_list(output: &str) -> Value {
    let domains = output
        .lines()
        .skip_while(|l| !l.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            let name = fields.next()?;
            let state = fields.collect::<Vec<_>>().join(" ");
            Some(json!({
                "id": if id == "-" { Value::Null } else { Value::from(id) },
                "name": name,
                "state": state,
            }))
        })
        .collect();
    Value::Array(domains)
}

/// Parse `Key: value` lines printed by `virsh dominfo`
pub fn parse_dominfo(output: &str) -> Value {
    let mut info = Map::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase().replace(' ', "_");
            if !key.is_empty() {
                info.insert(key, Value::from(value.trim()));
            }
        }
    }
    Value::Object(info)
}

#[async_trait]
impl VmBackend for VirshClient {
    async fn list_domains(&self) -> Result<Value> {
        let output = self.run(&["list", "--all"]).await?;
        Ok(parse_domain_list(&output))
    }

    async fn domain_info(&self, name: &str) -> Result<Value> {
        check_domain_name(name)?;
        let output = self.run(&["dominfo", name]).await?;
        Ok(parse_dominfo(&output))
    }

    async fn start_domain(&self, name: &str) -> Result<()> {
        self.domain_command("start", name).await
    }

    async fn pause_domain(&self, name: &str) -> Result<()> {
        self.domain_command("suspend", name).await
    }

    async fn resume_domain(&self, name: &str) -> Result<()> {
        self.domain_command("resume", name).await
    }

    async fn shutdown_domain(&self, name: &str) -> Result<()> {
        self.domain_command("shutdown", name).await
    }

    async fn destroy_domain(&self, name: &str) -> Result<()> {
        self.domain_command("destroy", name).await
    }

    async fn reboot_domain(&self, name: &str) -> Result<()> {
        self.domain_command("reboot", name).await
    }

    async fn create_domain(&self, name: &str, xml_path: &str) -> Result<()> {
        check_domain_name(name)?;

        // Define from the bytes that were checked, not from the path again.
        let xml = tokio::fs::read_to_string(xml_path).await.map_err(|e| {
            BackendError::InvalidParam {
                name: "xml_path".to_string(),
                reason: format!("cannot read '{}': {}", xml_path, e),
            }
        })?;
        match declared_domain_name(&xml) {
            Some(declared) if declared == name => {}
            Some(declared) => {
                warn!(domain = %name, %declared, "Domain XML names a different domain");
                return Err(BackendError::InvalidParam {
                    name: "xml_path".to_string(),
                    reason: format!("domain XML declares '{}' but name is '{}'", declared, name),
                });
            }
            None => {
                return Err(BackendError::InvalidParam {
                    name: "xml_path".to_string(),
                    reason: "domain XML has no <name> element".to_string(),
                });
            }
        }

        self.run_with_input(&["define", "/dev/stdin"], Some(xml.as_bytes()))
            .await?;
        self.run(&["start", name]).await?;
        Ok(())
    }

    async fn undefine_domain(&self, name: &str) -> Result<()> {
        self.domain_command("undefine", name).await
    }
}
