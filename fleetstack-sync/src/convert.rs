//! Compose → Kubernetes manifest conversion.
//!
//! [`ComposeConverter`] maps each compose service to an `apps/v1` Deployment,
//! plus a `v1` Service when the compose service publishes ports. Only the
//! fields below are carried over; everything else in the compose file is
//! ignored.
//!
//! | Compose              | Kubernetes                         |
//! |----------------------|------------------------------------|
//! | `image`              | container `image`                  |
//! | `command`            | container `args`                   |
//! | `environment`        | container `env`                    |
//! | `ports`              | container `ports` + Service ports  |
//! | `deploy.replicas`    | Deployment `replicas` (default 1)  |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// Turns compose content into an equivalent Kubernetes manifest.
pub trait ManifestConverter {
    fn convert(&self, compose: &[u8]) -> Result<Vec<u8>, ConvertError>;
}

/// Built-in converter for the common compose subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeConverter;

const NAME_LABEL: &str = "app.kubernetes.io/name";

impl ManifestConverter for ComposeConverter {
    fn convert(&self, compose: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let text = std::str::from_utf8(compose)?;
        let file: ComposeFile = serde_yaml::from_str(text).map_err(ConvertError::Parse)?;
        if file.services.is_empty() {
            return Err(ConvertError::NoServices);
        }

        let mut docs = Vec::new();
        for (service_name, service) in &file.services {
            let image = service
                .image
                .clone()
                .ok_or_else(|| ConvertError::MissingImage {
                    service: service_name.clone(),
                })?;
            let name = resource_name(service_name)?;
            let ports = service
                .ports
                .iter()
                .map(|p| p.parse(service_name))
                .collect::<Result<Vec<_>, _>>()?;
            let args = match &service.command {
                Some(command) => command.args(service_name)?,
                None => Vec::new(),
            };

            let deployment = deployment(&name, image, args, service, &ports);
            docs.push(serde_yaml::to_string(&deployment).map_err(ConvertError::Serialize)?);
            if !ports.is_empty() {
                let svc = k8s_service(&name, &ports);
                docs.push(serde_yaml::to_string(&svc).map_err(ConvertError::Serialize)?);
            }
        }
        Ok(docs.join("---\n").into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Compose input
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Deserialize)]
struct ComposeService {
    image: Option<String>,
    command: Option<CommandSpec>,
    #[serde(default)]
    environment: Environment,
    #[serde(default)]
    ports: Vec<PortSpec>,
    deploy: Option<Deploy>,
}

#[derive(Debug, Deserialize)]
struct Deploy {
    replicas: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Shell(String),
    Exec(Vec<String>),
}

impl CommandSpec {
    /// Container args; the string form is split with shell quoting rules.
    fn args(&self, service: &str) -> Result<Vec<String>, ConvertError> {
        match self {
            CommandSpec::Shell(s) => {
                shell_words::split(s).map_err(|source| ConvertError::InvalidCommand {
                    service: service.to_string(),
                    source,
                })
            }
            CommandSpec::Exec(v) => Ok(v.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Environment {
    Map(BTreeMap<String, Option<serde_yaml::Value>>),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::List(vec![])
    }
}

impl Environment {
    fn vars(&self) -> Vec<EnvVar> {
        match self {
            Environment::Map(map) => map
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.clone(),
                    value: value.as_ref().map(scalar_to_string).unwrap_or_default(),
                })
                .collect(),
            Environment::List(list) => list
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((name, value)) => EnvVar {
                        name: name.to_string(),
                        value: value.to_string(),
                    },
                    None => EnvVar {
                        name: entry.clone(),
                        value: String::new(),
                    },
                })
                .collect(),
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortSpec {
    Number(u16),
    Short(String),
    Long {
        target: u16,
        published: Option<serde_yaml::Value>,
        protocol: Option<String>,
    },
}

/// A port after parsing: what the Service exposes and what the container listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PortMapping {
    published: u16,
    target: u16,
    protocol: String,
}

impl PortSpec {
    fn parse(&self, service: &str) -> Result<PortMapping, ConvertError> {
        let invalid = |spec: String| ConvertError::InvalidPort {
            service: service.to_string(),
            spec,
        };
        match self {
            PortSpec::Number(p) => Ok(PortMapping {
                published: *p,
                target: *p,
                protocol: "TCP".into(),
            }),
            PortSpec::Short(spec) => {
                let (ports, protocol) = match spec.rsplit_once('/') {
                    Some((ports, proto)) => (ports, proto.to_ascii_uppercase()),
                    None => (spec.as_str(), "TCP".to_string()),
                };
                let parts: Vec<&str> = ports.split(':').collect();
                let target = parts
                    .last()
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(|| invalid(spec.clone()))?;
                let published = match parts.len() {
                    1 => target,
                    _ => parts[parts.len() - 2]
                        .parse::<u16>()
                        .map_err(|_| invalid(spec.clone()))?,
                };
                Ok(PortMapping {
                    published,
                    target,
                    protocol,
                })
            }
            PortSpec::Long {
                target,
                published,
                protocol,
            } => {
                let published = match published {
                    None => *target,
                    Some(value) => scalar_to_string(value)
                        .parse::<u16>()
                        .map_err(|_| invalid(format!("{target}")))?,
                };
                Ok(PortMapping {
                    published,
                    target: *target,
                    protocol: protocol
                        .as_deref()
                        .unwrap_or("tcp")
                        .to_ascii_uppercase(),
                })
            }
        }
    }
}

/// Kubernetes object names must be lowercase DNS labels.
fn resource_name(service: &str) -> Result<String, ConvertError> {
    let name = service
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '-',
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string();
    if name.is_empty() {
        return Err(ConvertError::InvalidServiceName {
            service: service.to_string(),
        });
    }
    Ok(name)
}

// ---------------------------------------------------------------------------
// Kubernetes output
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    spec: DeploymentSpec,
}

#[derive(Debug, Serialize)]
struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentSpec {
    replicas: u32,
    selector: Selector,
    template: PodTemplate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Selector {
    match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct PodTemplate {
    metadata: Metadata,
    spec: PodSpec,
}

#[derive(Debug, Serialize)]
struct PodSpec {
    containers: Vec<Container>,
}

#[derive(Debug, Serialize)]
struct Container {
    name: String,
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<ContainerPort>,
}

#[derive(Debug, Serialize)]
struct EnvVar {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPort {
    container_port: u16,
    protocol: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Service {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    spec: ServiceSpec,
}

#[derive(Debug, Serialize)]
struct ServiceSpec {
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServicePort {
    name: String,
    port: u16,
    target_port: u16,
    protocol: String,
}

fn labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAME_LABEL.to_string(), name.to_string())])
}

fn deployment(
    name: &str,
    image: String,
    args: Vec<String>,
    service: &ComposeService,
    ports: &[PortMapping],
) -> Deployment {
    Deployment {
        api_version: "apps/v1",
        kind: "Deployment",
        metadata: Metadata {
            name: Some(name.to_string()),
            labels: labels(name),
        },
        spec: DeploymentSpec {
            replicas: service.deploy.as_ref().and_then(|d| d.replicas).unwrap_or(1),
            selector: Selector {
                match_labels: labels(name),
            },
            template: PodTemplate {
                metadata: Metadata {
                    name: None,
                    labels: labels(name),
                },
                spec: PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image,
                        args,
                        env: service.environment.vars(),
                        ports: ports
                            .iter()
                            .map(|p| ContainerPort {
                                container_port: p.target,
                                protocol: p.protocol.clone(),
                            })
                            .collect(),
                    }],
                },
            },
        },
    }
}

fn k8s_service(name: &str, ports: &[PortMapping]) -> Service {
    Service {
        api_version: "v1",
        kind: "Service",
        metadata: Metadata {
            name: Some(name.to_string()),
            labels: labels(name),
        },
        spec: ServiceSpec {
            selector: labels(name),
            ports: ports
                .iter()
                .map(|p| ServicePort {
                    name: format!("{}-{}", p.published, p.protocol.to_ascii_lowercase()),
                    port: p.published,
                    target_port: p.target,
                    protocol: p.protocol.clone(),
                })
                .collect(),
        },
    }
}
