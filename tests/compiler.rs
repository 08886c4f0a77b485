//! Tests for compiling flow definitions into step graphs.
mod common;
use common::*;
use proptest::prelude::*;
use taiwa::compiler::{Guard, StepKind, Target};
use taiwa::prelude::*;

fn compile(flow: &FlowDefinition) -> StepGraph {
    Compiler::default().compile(flow).expect("flow compiles")
}

fn config_error(result: std::result::Result<StepGraph, CompileError>) -> ConfigError {
    match result {
        Err(CompileError::Config(error)) => error,
        other => panic!("expected a configuration error, got {:?}", other),
    }
}

#[cfg(test)]
mod structure_tests {
    use super::*;

    #[test]
    fn linear_flow_is_a_single_path() {
        let flow = FlowDefinition::new("linear", "")
            .with_step(StepDefinition::collect("a", "x"))
            .with_step(StepDefinition::action("b", "do_it"))
            .with_step(StepDefinition::say("c", "bye"));
        let graph = compile(&flow);

        assert_eq!(graph.entry().target, Target::Step(0));
        assert_eq!(graph.linear_path(), Some(vec!["a", "b", "c"]));
        assert_eq!(
            graph.edges_from("c"),
            Some(&[taiwa::compiler::Edge::always(Target::End)][..])
        );
    }

    #[test]
    fn definitions_deserialize_from_json() {
        let flow: FlowDefinition = serde_json::from_str(
            r#"{
                "id": "greet",
                "steps": [
                    { "name": "ask_name", "type": "collect", "slot": "name" },
                    { "name": "hello", "type": "say", "message": "greeting" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            flow,
            FlowDefinition::new("greet", "")
                .with_step(StepDefinition::collect("ask_name", "name"))
                .with_step(StepDefinition::say("hello", "greeting"))
        );
        assert_eq!(compile(&flow).linear_path(), Some(vec!["ask_name", "hello"]));
    }

    #[test]
    fn empty_flow_goes_straight_to_the_end() {
        let graph = compile(&FlowDefinition::new("empty", "nothing to do"));
        assert!(graph.is_empty());
        assert_eq!(graph.entry().target, Target::End);
        assert_eq!(graph.linear_path(), Some(vec![]));
    }

    #[test]
    fn jump_to_replaces_the_sequential_edge() {
        let flow = FlowDefinition::new("jumpy", "")
            .with_step(StepDefinition::say("a", "m").with_jump_to("c"))
            .with_step(StepDefinition::say("b", "m"))
            .with_step(StepDefinition::say("c", "m"));
        let graph = compile(&flow);

        let edges = graph.edges_from("a").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(graph.target_name(edges[0].target), "c");
        assert_eq!(graph.linear_path(), Some(vec!["a", "c"]));
    }

    #[test]
    fn jump_to_end_terminates() {
        let flow = FlowDefinition::new("early", "")
            .with_step(StepDefinition::say("a", "m").with_jump_to("END"))
            .with_step(StepDefinition::say("b", "m"));
        let graph = compile(&flow);
        assert_eq!(graph.edges_from("a").unwrap()[0].target, Target::End);
    }

    #[test]
    fn collect_steps_get_default_templates() {
        let graph = compile(&transfer_flow());
        match graph.step("ask_amount").unwrap().kind() {
            StepKind::Collect {
                slot,
                prompt,
                rejection,
                validation,
                ask_before_filling,
            } => {
                assert_eq!(slot, "amount");
                assert_eq!(prompt, "ask_amount");
                assert_eq!(rejection, "invalid_amount");
                assert_eq!(validation.as_ref().map(|p| p.source()), Some("amount > 0"));
                assert!(!ask_before_filling);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn confirm_steps_wire_both_answers() {
        let graph = compile(&transfer_flow());
        assert_eq!(
            graph.confirm_target("confirm_transfer", true),
            graph.index_of("send").map(Target::Step)
        );
        assert_eq!(
            graph.confirm_target("confirm_transfer", false),
            graph.index_of("aborted").map(Target::Step)
        );
        // Confirmation edges are never taken by plain advancement.
        assert_eq!(
            graph.next_target("confirm_transfer", &SlotMap::new()),
            Ok(None)
        );
    }

    #[test]
    fn confirm_without_a_no_case_ends_on_deny() {
        let flow = FlowDefinition::new("ask", "")
            .with_step(StepDefinition::confirm("sure"))
            .with_step(StepDefinition::say("next", "m"));
        let graph = compile(&flow);
        assert_eq!(graph.confirm_target("sure", true), Some(Target::Step(1)));
        assert_eq!(graph.confirm_target("sure", false), Some(Target::End));
        match graph.step("sure").unwrap().kind() {
            StepKind::Confirm { prompt, slot } => {
                assert_eq!(prompt, "confirm_sure");
                assert_eq!(slot, &None);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn branch_cases_are_tried_in_order_with_a_fallback() {
        let flow = FlowDefinition::new("route", "")
            .with_step(
                StepDefinition::branch("pick")
                    .with_case("amount > 1000", "big")
                    .with_case("amount > 100", "medium")
                    .with_case("else", "small"),
            )
            .with_step(StepDefinition::say("big", "m").with_jump_to("END"))
            .with_step(StepDefinition::say("medium", "m").with_jump_to("END"))
            .with_step(StepDefinition::say("small", "m"));
        let graph = compile(&flow);

        let next = |amount: i64| {
            let target = graph
                .next_target("pick", &slots(&[("amount", Value::Int(amount))]))
                .unwrap()
                .unwrap();
            graph.target_name(target).to_string()
        };
        assert_eq!(next(5000), "big");
        assert_eq!(next(500), "medium");
        assert_eq!(next(5), "small");

        let missing = graph.next_target("pick", &SlotMap::new()).unwrap();
        assert_eq!(missing.map(|t| graph.target_name(t)), Some("small"));
    }

    #[test]
    fn branch_condition_with_true_and_false_cases() {
        let flow = FlowDefinition::new("flag", "")
            .with_step(
                StepDefinition::branch("check")
                    .with_condition("vip")
                    .with_case("true", "vip")
                    .with_case("false", "regular"),
            )
            .with_step(StepDefinition::say("vip", "m").with_jump_to("END"))
            .with_step(StepDefinition::say("regular", "m"));
        let graph = compile(&flow);

        let edges = graph.edges_from("check").unwrap();
        assert!(matches!(edges[0].guard, Guard::When(_)));
        assert!(matches!(edges[1].guard, Guard::Unless(_)));
        assert_eq!(edges[2].guard, Guard::Otherwise);

        let vip = graph
            .next_target("check", &slots(&[("vip", Value::Bool(true))]))
            .unwrap();
        assert_eq!(vip.map(|t| graph.target_name(t)), Some("vip"));
        let regular = graph.next_target("check", &SlotMap::new()).unwrap();
        assert_eq!(regular.map(|t| graph.target_name(t)), Some("regular"));
    }

    #[test]
    fn while_loops_get_a_back_edge_and_an_exit() {
        let graph = compile(&counter_flow());
        let loop_edges = graph.edges_from("loop").unwrap();
        assert_eq!(graph.target_name(loop_edges[0].target), "bump");
        assert_eq!(loop_edges[1].guard, Guard::Otherwise);
        assert_eq!(graph.target_name(loop_edges[1].target), "finished");
        // The last body step returns to the loop head.
        assert_eq!(
            graph.target_name(graph.edges_from("bump").unwrap()[0].target),
            "loop"
        );
        assert_eq!(graph.linear_path(), None);
    }

    #[test]
    fn graphs_render_readably() {
        let rendered = compile(&transfer_flow()).to_string();
        assert!(rendered.starts_with("flow transfer: Send money to someone\n"));
        assert!(rendered.contains("  START -> ask_recipient\n"));
        assert!(rendered.contains("  ask_amount [collect amount] -> confirm_transfer\n"));
        assert!(rendered.contains("  confirm_transfer [confirm confirmed]\n    affirmed -> send\n    denied -> aborted\n"));
        assert!(rendered.contains("  send [action send_money] -> done\n"));
        assert!(rendered.contains("  aborted [say transfer_aborted] -> END\n"));
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    fn dangling_jump() -> FlowDefinition {
        FlowDefinition::new("dangling", "")
            .with_step(StepDefinition::say("a", "m").with_jump_to("nowhere"))
            .with_step(StepDefinition::say("b", "m"))
    }

    #[test]
    fn lenient_policy_ends_the_flow_on_unknown_jumps() {
        let graph = compile(&dangling_jump());
        assert_eq!(graph.edges_from("a").unwrap()[0].target, Target::End);
    }

    #[test]
    fn strict_policy_rejects_unknown_jumps() {
        let compiler = Compiler::builder()
            .with_jump_policy(JumpPolicy::Strict)
            .build();
        let error = config_error(compiler.compile(&dangling_jump()));
        assert_eq!(
            error,
            ConfigError::UnresolvedJump {
                flow_id: "dangling".to_string(),
                step: "a".to_string(),
                target: "nowhere".to_string(),
            }
        );
    }

    #[test]
    fn type_aliases_resolve_custom_tags() {
        let compiler = Compiler::builder().with_type_alias("ask", "collect").build();
        let flow = FlowDefinition::new("aliased", "")
            .with_step(StepDefinition::new("q", "ask").with_slot("answer"))
            .with_step(StepDefinition::new("done", "SAY").with_message("m"));
        let graph = compiler.compile(&flow).unwrap();
        assert!(matches!(graph.step("q").unwrap().kind(), StepKind::Collect { .. }));
        assert!(matches!(graph.step("done").unwrap().kind(), StepKind::Say { .. }));
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn unknown_step_types_are_reported() {
        let flow = FlowDefinition::new("f", "").with_step(StepDefinition::new("x", "teleport"));
        match Compiler::default().compile(&flow) {
            Err(CompileError::UnknownStepType(error)) => {
                assert_eq!(error.type_name, "teleport");
                assert_eq!(error.step, "x");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn required_fields_are_checked() {
        let flow = FlowDefinition::new("f", "").with_step(StepDefinition::new("x", "collect"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::MissingField { field: "slot", .. }
        ));

        let flow = FlowDefinition::new("f", "").with_step(StepDefinition::branch("b"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::MissingField { field: "cases", .. }
        ));
    }

    #[test]
    fn duplicate_and_reserved_step_names() {
        let flow = FlowDefinition::new("f", "")
            .with_step(StepDefinition::say("a", "m"))
            .with_step(StepDefinition::say("a", "m"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::DuplicateStep { .. }
        ));

        let flow = FlowDefinition::new("f", "").with_step(StepDefinition::say("END", "m"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::ReservedStepName { .. }
        ));
    }

    #[test]
    fn unknown_case_targets_are_rejected_regardless_of_policy() {
        let flow = FlowDefinition::new("f", "")
            .with_step(StepDefinition::branch("b").with_case("x > 1", "missing"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::UnresolvedTarget { .. }
        ));
    }

    #[test]
    fn malformed_conditions_fail_at_compile_time() {
        let flow = FlowDefinition::new("f", "")
            .with_step(StepDefinition::branch("b").with_case("x >", "END"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::InvalidCondition { .. }
        ));
    }

    #[test]
    fn invalid_case_labels() {
        let flow = FlowDefinition::new("f", "").with_step(
            StepDefinition::branch("b")
                .with_condition("x")
                .with_case("sometimes", "END"),
        );
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::InvalidCaseLabel { .. }
        ));

        let flow = FlowDefinition::new("f", "")
            .with_step(StepDefinition::confirm("c").with_case("perhaps", "END"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::InvalidCaseLabel { .. }
        ));
    }

    #[test]
    fn loop_bodies_are_validated() {
        let flow = FlowDefinition::new("f", "")
            .with_step(StepDefinition::while_loop("w", "x", &["ghost"]));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::InvalidLoopBody { .. }
        ));

        let flow = FlowDefinition::new("f", "").with_step(StepDefinition::while_loop("w", "x", &[]));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::InvalidLoopBody { .. }
        ));

        let flow = FlowDefinition::new("f", "")
            .with_step(StepDefinition::while_loop("w1", "x", &["body"]))
            .with_step(StepDefinition::while_loop("w2", "y", &["body"]))
            .with_step(StepDefinition::say("body", "m"));
        assert!(matches!(
            config_error(Compiler::default().compile(&flow)),
            ConfigError::SharedLoopTail { .. }
        ));
    }

    #[test]
    fn flow_sets_check_ids_and_references() {
        let compiler = Compiler::default();
        let graphs = compiler.compile_all(&banking_flows()).unwrap();
        assert_eq!(graphs.len(), banking_flows().len());

        let duplicate = vec![transfer_flow(), transfer_flow()];
        assert!(matches!(
            compiler.compile_all(&duplicate),
            Err(CompileError::Config(ConfigError::DuplicateFlow(id))) if id == "transfer"
        ));

        // pay_bill calls verify_identity, which is missing here.
        let dangling = vec![pay_bill_flow()];
        assert!(matches!(
            compiler.compile_all(&dangling),
            Err(CompileError::Config(ConfigError::UnknownFlow { target, .. })) if target == "verify_identity"
        ));
    }
}

proptest! {
    #[test]
    fn any_linear_flow_compiles_to_its_own_order(count in 0usize..12) {
        let mut flow = FlowDefinition::new("generated", "");
        for i in 0..count {
            let name = format!("step_{}", i);
            let step = if i % 2 == 0 {
                StepDefinition::collect(&name, &format!("slot_{}", i))
            } else {
                StepDefinition::say(&name, "message")
            };
            flow = flow.with_step(step);
        }

        let graph = compile(&flow);
        let expected: Vec<String> = (0..count).map(|i| format!("step_{}", i)).collect();
        let path = graph.linear_path().expect("linear flow");
        prop_assert_eq!(path, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
