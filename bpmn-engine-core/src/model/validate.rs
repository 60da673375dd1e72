use super::dto::*;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

impl ValidationError {
    fn new(rule: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ScopeKind {
    Process,
    SubProcess,
    EventSubProcess,
}

/// Validate a process model before it is transformed. Returns all errors found.
pub fn validate_process(dto: &ProcessDto) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    seen_ids.insert(dto.id.clone());

    validate_scope(
        ScopeKind::Process,
        &dto.id,
        &dto.elements,
        &dto.flows,
        &mut seen_ids,
        &mut errors,
    );
    errors.sort_by(|a, b| a.rule.cmp(&b.rule).then_with(|| a.message.cmp(&b.message)));
    errors
}

fn validate_scope(
    kind: ScopeKind,
    scope_id: &str,
    elements: &[ElementDto],
    flows: &[FlowDto],
    seen_ids: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    // V1: Element and flow ids unique across the whole process
    let mut element_map: HashMap<&str, &ElementDto> = HashMap::new();
    for element in elements {
        let id = element.id();
        if !seen_ids.insert(id.to_string()) {
            errors.push(ValidationError::new("V1", format!("Duplicate id: {}", id)));
        }
        element_map.insert(id, element);
    }
    for flow in flows {
        let flow_id = flow.flow_id();
        if !seen_ids.insert(flow_id.clone()) {
            errors.push(ValidationError::new(
                "V1",
                format!("Duplicate id: {} (sequence flow)", flow_id),
            ));
        }
    }

    // V2: Flows connect elements of this scope, never event sub-processes
    let mut outgoing: HashMap<&str, Vec<&FlowDto>> = HashMap::new();
    let mut incoming: HashMap<&str, Vec<&FlowDto>> = HashMap::new();
    for flow in flows {
        for (end, field) in [(&flow.from, "from"), (&flow.to, "to")] {
            match element_map.get(end.as_str()) {
                None => errors.push(ValidationError::new(
                    "V2",
                    format!(
                        "Flow {} references unknown element in scope '{}': {} ({})",
                        flow.flow_id(),
                        scope_id,
                        end,
                        field
                    ),
                )),
                Some(ElementDto::EventSubProcess { .. }) => errors.push(ValidationError::new(
                    "V2",
                    format!(
                        "Flow {}: event sub-process '{}' cannot have sequence flows",
                        flow.flow_id(),
                        end
                    ),
                )),
                Some(_) => {}
            }
        }
        outgoing.entry(flow.from.as_str()).or_default().push(flow);
        incoming.entry(flow.to.as_str()).or_default().push(flow);
    }

    // V3 / V4: Start events per scope kind
    let none_starts = elements
        .iter()
        .filter(|e| matches!(e, ElementDto::StartEvent { event: None, .. }))
        .count();
    let triggered_starts = elements
        .iter()
        .filter(|e| matches!(e, ElementDto::StartEvent { event: Some(_), .. }))
        .count();
    match kind {
        ScopeKind::Process | ScopeKind::SubProcess => {
            if none_starts != 1 {
                errors.push(ValidationError::new(
                    "V3",
                    format!(
                        "Scope '{}': expected exactly one none start event, found {}",
                        scope_id, none_starts
                    ),
                ));
            }
            if triggered_starts > 0 {
                errors.push(ValidationError::new(
                    "V4",
                    format!(
                        "Scope '{}': start events with a trigger are only allowed in event sub-processes",
                        scope_id
                    ),
                ));
            }
        }
        ScopeKind::EventSubProcess => {
            if triggered_starts != 1 || none_starts != 0 {
                errors.push(ValidationError::new(
                    "V4",
                    format!(
                        "Event sub-process '{}': expected exactly one start event with a trigger",
                        scope_id
                    ),
                ));
            }
        }
    }

    // V5: Default flows only on exclusive and inclusive gateways, at most one.
    // The default flow of an exclusive gateway has no condition; the one of an
    // inclusive gateway may carry one, which is never evaluated.
    for flow in flows.iter().filter(|f| f.default) {
        let source = element_map.get(flow.from.as_str());
        let source_is_xor = matches!(source, Some(ElementDto::ExclusiveGateway { .. }));
        let source_is_or = matches!(source, Some(ElementDto::InclusiveGateway { .. }));
        if !source_is_xor && !source_is_or {
            errors.push(ValidationError::new(
                "V5",
                format!(
                    "Flow {}: default flows are only allowed on exclusive and inclusive gateways",
                    flow.flow_id()
                ),
            ));
        }
        if flow.condition.is_some() && !source_is_or {
            errors.push(ValidationError::new(
                "V5",
                format!(
                    "Flow {}: condition and default are mutually exclusive",
                    flow.flow_id()
                ),
            ));
        }
    }
    for element in elements {
        let defaults = outgoing
            .get(element.id())
            .map(|out| out.iter().filter(|f| f.default).count())
            .unwrap_or(0);
        if defaults > 1 {
            errors.push(ValidationError::new(
                "V5",
                format!(
                    "{}: at most one default flow allowed, found {}",
                    element.id(),
                    defaults
                ),
            ));
        }
    }

    // V6: Conditions only on flows leaving exclusive or inclusive gateways
    for flow in flows.iter().filter(|f| f.condition.is_some()) {
        if !matches!(
            element_map.get(flow.from.as_str()),
            Some(ElementDto::ExclusiveGateway { .. } | ElementDto::InclusiveGateway { .. }) | None
        ) {
            errors.push(ValidationError::new(
                "V6",
                format!(
                    "Flow {}: conditions are only allowed on flows leaving exclusive or inclusive gateways",
                    flow.flow_id()
                ),
            ));
        }
    }

    // V12: An inclusive gateway that forks needs a condition on every
    // non-default outgoing flow
    for element in elements {
        if let ElementDto::InclusiveGateway { id } = element {
            let out = outgoing.get(id.as_str()).cloned().unwrap_or_default();
            if out.len() < 2 {
                continue;
            }
            for flow in out.iter().filter(|f| !f.default && f.condition.is_none()) {
                errors.push(ValidationError::new(
                    "V12",
                    format!(
                        "InclusiveGateway {}: flow {} needs a condition or must be the default flow",
                        id,
                        flow.flow_id()
                    ),
                ));
            }
        }
    }

    // V7: Event-based gateway races at least two intermediate catch events
    for element in elements {
        if let ElementDto::EventBasedGateway { id } = element {
            let out = outgoing.get(id.as_str()).cloned().unwrap_or_default();
            if out.len() < 2 {
                errors.push(ValidationError::new(
                    "V7",
                    format!(
                        "EventBasedGateway {}: expected at least two outgoing flows, found {}",
                        id,
                        out.len()
                    ),
                ));
            }
            for flow in out {
                let target_ok = matches!(
                    element_map.get(flow.to.as_str()),
                    Some(ElementDto::IntermediateCatchEvent { .. })
                );
                let single_incoming = incoming.get(flow.to.as_str()).map(|f| f.len()) == Some(1);
                if !target_ok || !single_incoming {
                    errors.push(ValidationError::new(
                        "V7",
                        format!(
                            "EventBasedGateway {}: target '{}' must be an intermediate catch event reached only from the gateway",
                            id, flow.to
                        ),
                    ));
                }
            }
        }
    }

    // V8: Boundary events attach to a task or sub-process of the same scope
    for element in elements {
        if let ElementDto::BoundaryEvent {
            id, attached_to, ..
        } = element
        {
            let valid = element_map.get(attached_to.as_str()).is_some_and(|e| {
                matches!(e, ElementDto::ServiceTask { .. } | ElementDto::SubProcess { .. })
            });
            if !valid {
                errors.push(ValidationError::new(
                    "V8",
                    format!(
                        "BoundaryEvent {}: '{}' is not a service task or sub-process",
                        id, attached_to
                    ),
                ));
            }
        }
    }

    // V9: Flow direction constraints on events
    for element in elements {
        let id = element.id();
        let has_incoming = incoming.contains_key(id);
        let has_outgoing = outgoing.contains_key(id);
        match element {
            ElementDto::StartEvent { .. } | ElementDto::BoundaryEvent { .. } if has_incoming => {
                errors.push(ValidationError::new(
                    "V9",
                    format!("{}: start and boundary events cannot have incoming flows", id),
                ));
            }
            ElementDto::EndEvent { .. } if has_outgoing => {
                errors.push(ValidationError::new(
                    "V9",
                    format!("{}: end events cannot have outgoing flows", id),
                ));
            }
            _ => {}
        }
    }

    // V10: Timer repetitions only on non-interrupting boundary events
    for element in elements {
        let repetitions = match element {
            ElementDto::StartEvent {
                event: Some(EventDto::Timer { repetitions, .. }),
                ..
            }
            | ElementDto::IntermediateCatchEvent {
                event: EventDto::Timer { repetitions, .. },
                ..
            } => repetitions.is_some(),
            ElementDto::BoundaryEvent {
                event: EventDto::Timer { repetitions, .. },
                interrupting,
                ..
            } => repetitions.is_some() && *interrupting,
            _ => false,
        };
        if repetitions {
            errors.push(ValidationError::new(
                "V10",
                format!(
                    "{}: timer repetitions are only allowed on non-interrupting boundary events",
                    element.id()
                ),
            ));
        }
    }

    // V11: Every flow node is reachable from a start or boundary event
    validate_reachability(elements, flows, &element_map, errors);

    for element in elements {
        if let Some((nested_elements, nested_flows)) = element.scope() {
            let nested_kind = match element {
                ElementDto::EventSubProcess { .. } => ScopeKind::EventSubProcess,
                _ => ScopeKind::SubProcess,
            };
            validate_scope(
                nested_kind,
                element.id(),
                nested_elements,
                nested_flows,
                seen_ids,
                errors,
            );
        }
    }
}

fn validate_reachability(
    elements: &[ElementDto],
    flows: &[FlowDto],
    element_map: &HashMap<&str, &ElementDto>,
    errors: &mut Vec<ValidationError>,
) {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for element in elements {
        if !matches!(element, ElementDto::EventSubProcess { .. }) {
            index.insert(element.id(), graph.add_node(element.id()));
        }
    }
    for flow in flows {
        if let (Some(&from), Some(&to)) = (index.get(flow.from.as_str()), index.get(flow.to.as_str())) {
            graph.add_edge(from, to, ());
        }
    }

    let mut reached: HashSet<NodeIndex> = HashSet::new();
    let roots = elements.iter().filter(|e| {
        matches!(
            e,
            ElementDto::StartEvent { .. } | ElementDto::BoundaryEvent { .. }
        )
    });
    for root in roots {
        let Some(&start) = index.get(root.id()) else {
            continue;
        };
        let mut dfs = Dfs::new(&graph, start);
        while let Some(node) = dfs.next(&graph) {
            reached.insert(node);
        }
    }

    for (id, node) in &index {
        if !reached.contains(node) && element_map.contains_key(id) {
            errors.push(ValidationError::new(
                "V11",
                format!("{}: not reachable from a start or boundary event", id),
            ));
        }
    }
}
