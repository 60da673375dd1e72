use super::dto::*;
use super::*;

/// Convert a validated `ProcessDto` into the flat, immutable element tree the
/// engine executes. Element and flow ids are unique across the process, so
/// nested scopes are flattened into one map with `flow_scope` back links.
pub fn to_executable(dto: &ProcessDto, key: Key, version: u32) -> ExecutableProcess {
    let mut process = ExecutableProcess {
        key,
        bpmn_process_id: dto.id.clone(),
        version,
        elements: BTreeMap::new(),
        flows: BTreeMap::new(),
    };

    let root = ExecutableElement {
        id: dto.id.clone(),
        kind: ElementKind::Process,
        flow_scope: None,
        incoming: Vec::new(),
        outgoing: Vec::new(),
        default_flow: None,
        boundary_events: Vec::new(),
        event_sub_processes: event_sub_processes_of(&dto.elements),
        start_event: start_event_of(&dto.elements),
    };
    process.elements.insert(root.id.clone(), root);

    add_scope(&mut process, &dto.id, &dto.elements, &dto.flows);
    process
}

fn add_scope(process: &mut ExecutableProcess, scope_id: &str, elements: &[ElementDto], flows: &[FlowDto]) {
    for flow in flows {
        let flow_id = flow.flow_id();
        process.flows.insert(
            flow_id.clone(),
            SequenceFlow {
                id: flow_id,
                source: flow.from.clone(),
                target: flow.to.clone(),
                condition: flow.condition.clone(),
            },
        );
    }

    for element in elements {
        let id = element.id();
        let outgoing: Vec<String> = flows
            .iter()
            .filter(|f| f.from == id)
            .map(FlowDto::flow_id)
            .collect();
        let incoming: Vec<String> = flows
            .iter()
            .filter(|f| f.to == id)
            .map(FlowDto::flow_id)
            .collect();
        let default_flow = flows
            .iter()
            .find(|f| f.from == id && f.default)
            .map(FlowDto::flow_id);
        let boundary_events: Vec<String> = elements
            .iter()
            .filter(|e| matches!(e, ElementDto::BoundaryEvent { attached_to, .. } if attached_to == id))
            .map(|e| e.id().to_string())
            .collect();

        let (event_sub_processes, start_event) = match element.scope() {
            Some((nested, _)) => (event_sub_processes_of(nested), start_event_of(nested)),
            None => (Vec::new(), None),
        };

        process.elements.insert(
            id.to_string(),
            ExecutableElement {
                id: id.to_string(),
                kind: kind_of(element),
                flow_scope: Some(scope_id.to_string()),
                incoming,
                outgoing,
                default_flow,
                boundary_events,
                event_sub_processes,
                start_event,
            },
        );

        if let Some((nested_elements, nested_flows)) = element.scope() {
            add_scope(process, id, nested_elements, nested_flows);
        }
    }
}

fn kind_of(element: &ElementDto) -> ElementKind {
    match element {
        ElementDto::StartEvent {
            event,
            interrupting,
            ..
        } => ElementKind::StartEvent {
            trigger: event.as_ref().map(event_definition),
            interrupting: *interrupting,
        },
        ElementDto::EndEvent { terminate, .. } => ElementKind::EndEvent {
            terminate: *terminate,
        },
        ElementDto::ServiceTask { job_type, .. } => ElementKind::ServiceTask {
            job_type: job_type.clone(),
        },
        ElementDto::ExclusiveGateway { .. } => ElementKind::ExclusiveGateway,
        ElementDto::ParallelGateway { .. } => ElementKind::ParallelGateway,
        ElementDto::InclusiveGateway { .. } => ElementKind::InclusiveGateway,
        ElementDto::EventBasedGateway { .. } => ElementKind::EventBasedGateway,
        ElementDto::IntermediateCatchEvent { event, .. } => ElementKind::IntermediateCatchEvent {
            trigger: event_definition(event),
        },
        ElementDto::BoundaryEvent {
            attached_to,
            event,
            interrupting,
            ..
        } => ElementKind::BoundaryEvent {
            attached_to: attached_to.clone(),
            trigger: event_definition(event),
            interrupting: *interrupting,
        },
        ElementDto::SubProcess { .. } => ElementKind::SubProcess,
        ElementDto::EventSubProcess { .. } => ElementKind::EventSubProcess,
    }
}

fn event_definition(event: &EventDto) -> EventDefinition {
    match event {
        EventDto::Timer {
            duration_ms,
            repetitions,
        } => EventDefinition::Timer {
            duration_ms: *duration_ms,
            repetitions: *repetitions,
        },
        EventDto::Message {
            name,
            correlation_key,
        } => EventDefinition::Message {
            name: name.clone(),
            correlation_key: correlation_key.clone(),
        },
    }
}

fn event_sub_processes_of(elements: &[ElementDto]) -> Vec<String> {
    elements
        .iter()
        .filter(|e| matches!(e, ElementDto::EventSubProcess { .. }))
        .map(|e| e.id().to_string())
        .collect()
}

/// A scope has exactly one start event after validation: the none start event
/// of a process or sub-process, the triggered start of an event sub-process.
fn start_event_of(elements: &[ElementDto]) -> Option<String> {
    elements
        .iter()
        .find(|e| matches!(e, ElementDto::StartEvent { .. }))
        .map(|e| e.id().to_string())
}
