//! Element tree
//!
//! Immutable, validated process graphs. The engine only consumes them through
//! [`ElementTreeProvider`]; [`ProcessRepository`] is the in-memory provider
//! fed from YAML authoring documents.

pub mod dto;
pub mod transform;
pub mod validate;
pub mod yaml;

use crate::error::ModelError;
use crate::types::{BpmnElementType, Key};
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

// ─── Event definitions ────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventDefinition {
    Timer {
        duration_ms: u64,
        repetitions: Option<u32>,
    },
    Message {
        name: String,
        correlation_key: String,
    },
}

// ─── Elements ─────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    Process,
    StartEvent {
        trigger: Option<EventDefinition>,
        interrupting: bool,
    },
    EndEvent {
        terminate: bool,
    },
    ServiceTask {
        job_type: String,
    },
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,
    IntermediateCatchEvent {
        trigger: EventDefinition,
    },
    BoundaryEvent {
        attached_to: String,
        trigger: EventDefinition,
        interrupting: bool,
    },
    SubProcess,
    EventSubProcess,
}

impl ElementKind {
    pub fn element_type(&self) -> BpmnElementType {
        match self {
            ElementKind::Process => BpmnElementType::Process,
            ElementKind::StartEvent { .. } => BpmnElementType::StartEvent,
            ElementKind::EndEvent { .. } => BpmnElementType::EndEvent,
            ElementKind::ServiceTask { .. } => BpmnElementType::ServiceTask,
            ElementKind::ExclusiveGateway => BpmnElementType::ExclusiveGateway,
            ElementKind::ParallelGateway => BpmnElementType::ParallelGateway,
            ElementKind::InclusiveGateway => BpmnElementType::InclusiveGateway,
            ElementKind::EventBasedGateway => BpmnElementType::EventBasedGateway,
            ElementKind::IntermediateCatchEvent { .. } => BpmnElementType::IntermediateCatchEvent,
            ElementKind::BoundaryEvent { .. } => BpmnElementType::BoundaryEvent,
            ElementKind::SubProcess => BpmnElementType::SubProcess,
            ElementKind::EventSubProcess => BpmnElementType::EventSubProcess,
        }
    }
}

/// One node of the element tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutableElement {
    pub id: String,
    pub kind: ElementKind,
    /// Enclosing container element, `None` for the process element.
    pub flow_scope: Option<String>,
    /// Incoming sequence flow ids.
    pub incoming: Vec<String>,
    /// Outgoing sequence flow ids in declaration order.
    pub outgoing: Vec<String>,
    pub default_flow: Option<String>,
    /// Boundary events attached to this activity.
    pub boundary_events: Vec<String>,
    /// Event sub-processes nested directly in this container.
    pub event_sub_processes: Vec<String>,
    /// Start event of a container: the none start event of a process or
    /// sub-process, the triggered start event of an event sub-process.
    pub start_event: Option<String>,
}

impl ExecutableElement {
    pub fn element_type(&self) -> BpmnElementType {
        self.kind.element_type()
    }

    /// The event definition a subscription for this element waits on.
    pub fn trigger(&self) -> Option<&EventDefinition> {
        match &self.kind {
            ElementKind::StartEvent { trigger, .. } => trigger.as_ref(),
            ElementKind::IntermediateCatchEvent { trigger }
            | ElementKind::BoundaryEvent { trigger, .. } => Some(trigger),
            _ => None,
        }
    }

    pub fn is_interrupting(&self) -> bool {
        match &self.kind {
            ElementKind::StartEvent { interrupting, .. }
            | ElementKind::BoundaryEvent { interrupting, .. } => *interrupting,
            _ => true,
        }
    }

    pub fn is_parallel_gateway(&self) -> bool {
        matches!(self.kind, ElementKind::ParallelGateway)
    }

    /// An inclusive gateway merging more than one incoming flow.
    pub fn is_inclusive_join(&self) -> bool {
        matches!(self.kind, ElementKind::InclusiveGateway) && self.incoming.len() > 1
    }

    /// Tokens arriving at a join wait in their flow scope until it activates.
    pub fn is_join(&self) -> bool {
        self.is_parallel_gateway() || self.is_inclusive_join()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub condition: Option<String>,
}

// ─── Process ──────────────────────────────────────────────────

/// A deployed, immutable process definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutableProcess {
    pub key: Key,
    pub bpmn_process_id: String,
    pub version: u32,
    pub elements: BTreeMap<String, ExecutableElement>,
    pub flows: BTreeMap<String, SequenceFlow>,
}

impl ExecutableProcess {
    pub fn element(&self, id: &str) -> Option<&ExecutableElement> {
        self.elements.get(id)
    }

    pub fn flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.flows.get(id)
    }

    /// The process element itself.
    pub fn root(&self) -> Option<&ExecutableElement> {
        self.elements.get(&self.bpmn_process_id)
    }

    /// True if a token at `from` can still arrive at `to`, following sequence
    /// flows and the boundary events of activities on the way.
    pub fn can_reach(&self, from: &str, to: &str) -> bool {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for flow in self.flows.values() {
            graph.add_edge(flow.source.as_str(), flow.target.as_str(), ());
        }
        for element in self.elements.values() {
            for boundary in &element.boundary_events {
                graph.add_edge(element.id.as_str(), boundary.as_str(), ());
            }
        }
        graph.contains_node(from)
            && graph.contains_node(to)
            && has_path_connecting(&graph, from, to, None)
    }

    /// True if `element_id` is only ever reached from an event-based gateway,
    /// in which case its event already happened when it gets activated.
    pub fn follows_event_based_gateway(&self, element_id: &str) -> bool {
        let Some(element) = self.element(element_id) else {
            return false;
        };
        !element.incoming.is_empty()
            && element.incoming.iter().all(|flow_id| {
                self.flow(flow_id)
                    .and_then(|flow| self.element(&flow.source))
                    .map(|source| matches!(source.kind, ElementKind::EventBasedGateway))
                    .unwrap_or(false)
            })
    }
}

// ─── Provider ─────────────────────────────────────────────────

/// Read access to deployed element trees.
pub trait ElementTreeProvider: Send + Sync {
    fn process(&self, process_definition_key: Key) -> Option<Arc<ExecutableProcess>>;
    fn latest_by_id(&self, bpmn_process_id: &str) -> Option<Arc<ExecutableProcess>>;
    fn by_id_and_version(&self, bpmn_process_id: &str, version: u32)
        -> Option<Arc<ExecutableProcess>>;

    fn element(&self, process_definition_key: Key, element_id: &str) -> Option<ExecutableElement> {
        self.process(process_definition_key)
            .and_then(|process| process.element(element_id).cloned())
    }
}

#[derive(Default)]
struct RepositoryInner {
    by_key: BTreeMap<Key, Arc<ExecutableProcess>>,
    /// bpmn process id → definition keys ordered by version.
    versions: BTreeMap<String, Vec<Key>>,
    next_key: Key,
}

/// In-memory process repository. Definition keys and versions are assigned in
/// deployment order, so deploying the same models in the same order always
/// yields the same keys.
#[derive(Default)]
pub struct ProcessRepository {
    inner: RwLock<RepositoryInner>,
}

impl ProcessRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and deploy a process model. Returns the deployed definition.
    pub fn deploy(&self, dto: &dto::ProcessDto) -> Result<Arc<ExecutableProcess>, ModelError> {
        let errors = validate::validate_process(dto);
        if !errors.is_empty() {
            return Err(ModelError::Invalid {
                process_id: dto.id.clone(),
                errors,
            });
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.next_key += 1;
        let key = inner.next_key;
        let version = inner.versions.get(&dto.id).map(|v| v.len() as u32).unwrap_or(0) + 1;

        let process = Arc::new(transform::to_executable(dto, key, version));
        inner.by_key.insert(key, process.clone());
        inner.versions.entry(dto.id.clone()).or_default().push(key);

        tracing::info!(
            bpmn_process_id = %dto.id,
            version,
            process_definition_key = key,
            "process deployed"
        );
        Ok(process)
    }

    pub fn deploy_yaml(&self, yaml_str: &str) -> Result<Arc<ExecutableProcess>, ModelError> {
        let dto = yaml::parse_process_yaml(yaml_str)?;
        self.deploy(&dto)
    }
}

impl ElementTreeProvider for ProcessRepository {
    fn process(&self, process_definition_key: Key) -> Option<Arc<ExecutableProcess>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_key.get(&process_definition_key).cloned()
    }

    fn latest_by_id(&self, bpmn_process_id: &str) -> Option<Arc<ExecutableProcess>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .versions
            .get(bpmn_process_id)
            .and_then(|keys| keys.last())
            .and_then(|key| inner.by_key.get(key))
            .cloned()
    }

    fn by_id_and_version(
        &self,
        bpmn_process_id: &str,
        version: u32,
    ) -> Option<Arc<ExecutableProcess>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .versions
            .get(bpmn_process_id)
            .and_then(|keys| keys.get(version.checked_sub(1)? as usize))
            .and_then(|key| inner.by_key.get(key))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINEAR: &str = r#"
id: linear
elements:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: task
    job_type: work
  - kind: EndEvent
    id: end
flows:
  - from: start
    to: task
  - from: task
    to: end
"#;

    #[test]
    fn test_deploy_assigns_versions_per_process_id() {
        let repo = ProcessRepository::new();
        let v1 = repo.deploy_yaml(LINEAR).unwrap();
        let v2 = repo.deploy_yaml(LINEAR).unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_ne!(v1.key, v2.key);
        assert_eq!(repo.latest_by_id("linear").unwrap().key, v2.key);
        assert_eq!(repo.by_id_and_version("linear", 1).unwrap().key, v1.key);
        assert!(repo.by_id_and_version("linear", 0).is_none());
        assert!(repo.by_id_and_version("linear", 3).is_none());
    }

    #[test]
    fn test_element_lookup() {
        let repo = ProcessRepository::new();
        let process = repo.deploy_yaml(LINEAR).unwrap();

        let task = repo.element(process.key, "task").unwrap();
        assert_eq!(task.element_type(), BpmnElementType::ServiceTask);
        assert_eq!(task.flow_scope.as_deref(), Some("linear"));
        assert_eq!(task.incoming, vec!["start_to_task".to_string()]);
        assert_eq!(task.outgoing, vec!["task_to_end".to_string()]);
        assert!(repo.element(process.key, "missing").is_none());
    }

    #[test]
    fn test_invalid_model_is_not_deployed() {
        let repo = ProcessRepository::new();
        let yaml = r#"
id: broken
elements:
  - kind: ServiceTask
    id: task
    job_type: work
"#;
        let err = repo.deploy_yaml(yaml).unwrap_err();
        assert!(matches!(err, ModelError::Invalid { .. }));
        assert!(repo.latest_by_id("broken").is_none());
    }
}
