use npp_simulator_lib::loader;
use npp_simulator_lib::plant::{Command, PlantVariable};
use npp_simulator_lib::procedure::{
    resolve, EdgeLabel, NodeId, NodeKind, ProcedureEdge, ProcedureGraph, ProcedureNode, ResolveDiagnostic,
    StepAction, StepChoice, StepKind,
};
use npp_simulator_lib::{Scenario, SimConfig, Simulator};

fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

fn simulator() -> Simulator {
    let mut config = SimConfig::default();
    config.noise.enabled = false;
    Simulator::new(config, loader::builtin_graph().unwrap(), loader::builtin_rules().unwrap())
}

/// Two steps whose chains run through the same indicator, told apart by group.
fn shared_indicator_graph() -> ProcedureGraph {
    let nodes = [
        ("s1", NodeKind::Step),
        ("s2", NodeKind::Step),
        ("x", NodeKind::Indicator),
        ("c1", NodeKind::Condition),
        ("c2", NodeKind::Condition),
        ("a1", NodeKind::Step),
        ("b1", NodeKind::Step),
        ("a2", NodeKind::Step),
        ("b2", NodeKind::Step),
    ];
    let edges = vec![
        ProcedureEdge::new("s1", "x", EdgeLabel::CheckIf).grouped("g1"),
        ProcedureEdge::new("s2", "x", EdgeLabel::CheckIf).grouped("g2"),
        // g2 first so that first-match would pick the wrong chain for s1
        ProcedureEdge::new("x", "c2", EdgeLabel::parse("is")).grouped("g2"),
        ProcedureEdge::new("x", "c1", EdgeLabel::parse("is")).grouped("g1"),
        ProcedureEdge::new("c1", "a1", EdgeLabel::parse("TRUE")).grouped("g1"),
        ProcedureEdge::new("c1", "b1", EdgeLabel::parse("FALSE")).grouped("g1"),
        ProcedureEdge::new("c2", "a2", EdgeLabel::parse("TRUE")).grouped("g2"),
        ProcedureEdge::new("c2", "b2", EdgeLabel::parse("FALSE")).grouped("g2"),
    ];
    ProcedureGraph::from_parts(
        nodes.iter().map(|(n, k)| ProcedureNode::new(*n, *k, n.to_uppercase())).collect(),
        edges,
    )
}

#[test]
fn decision_follows_the_steps_own_group() {
    let graph = shared_indicator_graph();

    let first = resolve(&graph, Some(&id("s1")));
    assert_eq!(first.action, StepAction::Decision { true_node: Some(id("a1")), false_node: Some(id("b1")) });
    assert!(first.diagnostics.is_empty());

    let second = resolve(&graph, Some(&id("s2")));
    assert_eq!(second.action, StepAction::Decision { true_node: Some(id("a2")), false_node: Some(id("b2")) });
}

#[test]
fn shared_condition_branches_are_split_by_group() {
    let nodes = [
        ("s1", NodeKind::Step),
        ("s2", NodeKind::Step),
        ("x", NodeKind::Indicator),
        ("c", NodeKind::Condition),
        ("a1", NodeKind::Step),
        ("a2", NodeKind::Step),
        ("b", NodeKind::Step),
    ];
    let edges = vec![
        ProcedureEdge::new("s1", "x", EdgeLabel::CheckIf).grouped("g1"),
        ProcedureEdge::new("s2", "x", EdgeLabel::CheckIf).grouped("g2"),
        ProcedureEdge::new("x", "c", EdgeLabel::parse("is_below")).grouped("g1"),
        ProcedureEdge::new("x", "c", EdgeLabel::parse("is_below")).grouped("g2"),
        ProcedureEdge::new("c", "a2", EdgeLabel::parse("TRUE")).grouped("g2"),
        ProcedureEdge::new("c", "a1", EdgeLabel::parse("TRUE")).grouped("g1"),
        // Ungrouped branch shared by both chains
        ProcedureEdge::new("c", "b", EdgeLabel::parse("FALSE")),
    ];
    let graph = ProcedureGraph::from_parts(
        nodes.iter().map(|(n, k)| ProcedureNode::new(*n, *k, *n)).collect(),
        edges,
    );

    assert_eq!(
        resolve(&graph, Some(&id("s1"))).action,
        StepAction::Decision { true_node: Some(id("a1")), false_node: Some(id("b")) }
    );
    assert_eq!(
        resolve(&graph, Some(&id("s2"))).action,
        StepAction::Decision { true_node: Some(id("a2")), false_node: Some(id("b")) }
    );
}

#[test]
fn resolve_is_idempotent_for_every_node() {
    let graph = loader::builtin_graph().unwrap();
    for node in graph.nodes() {
        let first = resolve(&graph, Some(&node.id));
        let second = resolve(&graph, Some(&node.id));
        assert_eq!(first, second, "{}", node.id);
    }
    assert_eq!(resolve(&graph, None).kind(), StepKind::None);
}

#[test]
fn broken_chain_is_reported_not_hidden() {
    let graph = ProcedureGraph::from_parts(
        vec![
            ProcedureNode::new("s", NodeKind::Step, "S"),
            ProcedureNode::new("x", NodeKind::Indicator, "X"),
            ProcedureNode::new("c", NodeKind::Condition, "C"),
        ],
        vec![
            ProcedureEdge::new("s", "x", EdgeLabel::CheckIf).grouped("g1"),
            ProcedureEdge::new("x", "c", EdgeLabel::parse("is")).grouped("g9"),
        ],
    );
    let options = resolve(&graph, Some(&id("s")));
    assert_eq!(options.kind(), StepKind::End);
    assert!(matches!(
        options.diagnostics.as_slice(),
        [ResolveDiagnostic::NoMatchingComparison { .. }]
    ));
}

#[test]
fn several_successors_take_the_first_with_a_diagnostic() {
    let graph = ProcedureGraph::from_parts(
        vec![
            ProcedureNode::new("s", NodeKind::Step, "S"),
            ProcedureNode::new("ct1", NodeKind::Controller, "Pump"),
            ProcedureNode::new("ct2", NodeKind::Controller, "Valve"),
        ],
        vec![
            ProcedureEdge::new("s", "ct1", EdgeLabel::parse("press")),
            ProcedureEdge::new("s", "ct2", EdgeLabel::parse("turn")),
        ],
    );
    let options = resolve(&graph, Some(&id("s")));
    assert_eq!(options.action, StepAction::Step { next: id("ct1") });
    assert!(matches!(
        options.diagnostics.as_slice(),
        [ResolveDiagnostic::AmbiguousSuccessor { count: 2, .. }]
    ));
}

#[test]
fn history_returns_to_the_start() {
    let sim = simulator();
    let start = sim.begin_procedure();
    assert_eq!(start, Some(id("pc_st_01_01")));

    let path = ["pc_st_02_01", "pc_st_03_02", "pc_st_04_01", "pc_st_02_01"];
    for step in path {
        assert!(sim.set_active_step(id(step)));
    }
    assert_eq!(sim.snapshot().history.len(), path.len());

    for _ in path {
        assert!(sim.go_to_previous_step());
    }
    let snapshot = sim.snapshot();
    assert_eq!(snapshot.active_step, start);
    assert!(snapshot.history.is_empty());
    assert!(!sim.go_to_previous_step());
}

#[test]
fn builtin_procedure_walks_to_completion() {
    let sim = simulator();
    sim.set_scenario(Scenario::FeedwaterLoss);
    assert_eq!(sim.snapshot().active_step, Some(id("pc_st_01_01")));

    assert_eq!(
        sim.step_options().action,
        StepAction::Verify { subject: id("ic_000001"), next: Some(id("pc_st_02_01")) }
    );
    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_02_01")));

    assert_eq!(
        sim.step_options().action,
        StepAction::Decision { true_node: Some(id("pc_st_03_01")), false_node: Some(id("pc_st_03_02")) }
    );
    // Decisions ignore a plain acknowledgement
    assert_eq!(sim.choose(StepChoice::Proceed), None);
    assert_eq!(sim.choose(StepChoice::Answer(false)), Some(id("pc_st_03_02")));

    // Same level meter, different chain
    assert_eq!(
        sim.step_options().action,
        StepAction::Decision { true_node: Some(id("pc_st_05_01")), false_node: Some(id("pc_st_04_01")) }
    );
    assert_eq!(sim.choose(StepChoice::Answer(false)), Some(id("pc_st_04_01")));

    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_04_02")));
    let snapshot = sim.snapshot();
    assert!(snapshot.transitions.iter().any(|t| t.variable == PlantVariable::TurbineBypassCv));

    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_04_03")));
    assert!(sim.plant_state().controls.trip_turbine);
    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_04_04")));
    assert!(sim.plant_state().controls.trip_reactor);
    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_04_05")));
    let snapshot = sim.snapshot();
    assert!(snapshot.controls.safety_injection);
    let cooling = snapshot
        .transitions
        .iter()
        .find(|t| t.variable == PlantVariable::CoreTemp)
        .cloned();
    assert_eq!(cooling.map(|t| (t.target_value, t.duration)), Some((250.0, 5.0)));

    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_04_06")));
    assert_eq!(
        sim.step_options().action,
        StepAction::Decision { true_node: Some(id("pc_st_04_07")), false_node: Some(id("pc_st_05_01")) }
    );
    assert_eq!(sim.choose(StepChoice::Answer(true)), Some(id("pc_st_04_07")));
    assert!(!sim.plant_state().controls.rcp);
    assert!(!sim.session_ended());

    assert_eq!(sim.choose(StepChoice::Proceed), Some(id("pc_st_05_01")));
    assert_eq!(sim.step_options().kind(), StepKind::End);
    assert!(sim.session_ended());
}

#[test]
fn re_entering_a_step_fires_its_rules_again() {
    let sim = simulator();
    sim.set_active_step(id("pc_st_04_03"));
    assert!(sim.plant_state().controls.trip_turbine);

    sim.set_command(Command::TripTurbine, false);
    sim.set_active_step(id("pc_st_04_04"));
    assert!(sim.go_to_previous_step());
    // Going back does not fire rules
    assert!(!sim.plant_state().controls.trip_turbine);

    sim.set_active_step(id("pc_st_04_03"));
    assert!(sim.plant_state().controls.trip_turbine);
}

#[test]
fn transitions_reach_their_target_and_retire() {
    let sim = simulator();
    sim.set_active_step(id("pc_st_04_02"));
    for _ in 0..31 {
        sim.step();
    }
    let snapshot = sim.snapshot();
    assert_eq!(snapshot.controls.turbine_bypass_cv, 0.5);
    assert!(snapshot.transitions.is_empty());
    assert!(snapshot.alarms.atmos_dump_active);
}

#[test]
fn unknown_rows_are_dropped_at_load() {
    let entities = "entity_id,entity_name,entity_type\n\
                    s1,STEP1,PC_ST\n\
                    s2,STEP2,PC_ST\n\
                    q1,Mystery,QQ\n";
    let relationships = "src_id,dst_id,edge_name,edge_type,class_num\n\
                         s1,s2,next,others,\n\
                         s1,q1,next,others,\n\
                         s2,ghost,next,others,\n";
    let graph = loader::parse_graph(entities, relationships).unwrap();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(resolve(&graph, Some(&id("s1"))).action, StepAction::Step { next: id("s2") });
    assert_eq!(resolve(&graph, Some(&id("s2"))).kind(), StepKind::End);
}
