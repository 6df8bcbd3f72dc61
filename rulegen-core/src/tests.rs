#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use anyhow::Result;

    /// Appends its own name to the `visited` list.
    struct Visit(&'static str);

    #[async_trait]
    impl Node for Visit {
        type Prep = Vec<String>;
        type Exec = ();

        fn prep(&self, ctx: &SharedContext) -> Result<Self::Prep> {
            Ok(ctx.get_opt("visited")?.unwrap_or_default())
        }

        async fn exec(&self, _prep: &Self::Prep) -> Result<()> {
            Ok(())
        }

        fn post(&self, ctx: &mut SharedContext, mut visited: Vec<String>, _: ()) -> Result<Action> {
            visited.push(self.0.to_string());
            ctx.insert("visited", &visited)?;
            Ok(Action::default())
        }
    }

    fn visit(name: &'static str) -> NodeStep<Visit> {
        NodeStep::new(name, Visit(name))
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Parity {
        Even,
        Odd,
    }

    impl From<Parity> for Action {
        fn from(parity: Parity) -> Self {
            match parity {
                Parity::Even => Action::from_static("even"),
                Parity::Odd => Action::from_static("odd"),
            }
        }
    }

    struct Classify;

    #[async_trait]
    impl Node for Classify {
        type Prep = i64;
        type Exec = Parity;

        fn prep(&self, ctx: &SharedContext) -> Result<i64> {
            Ok(ctx.get("number")?)
        }

        async fn exec(&self, number: &i64) -> Result<Parity> {
            Ok(if number % 2 == 0 { Parity::Even } else { Parity::Odd })
        }

        fn post(&self, _ctx: &mut SharedContext, _: i64, parity: Parity) -> Result<Action> {
            Ok(parity.into())
        }
    }

    #[test]
    fn test_action_defaults() {
        assert_eq!(Action::default().as_str(), "default");
        assert!(Action::from("default").is_default());
        assert_eq!(Action::from("error".to_string()).to_string(), "error");
    }

    #[test]
    fn test_build_rejects_empty_flow() {
        let err = FlowBuilder::new("empty").build().err().unwrap();
        assert_eq!(err, BuildError::MissingStart("empty".to_string()));
    }

    #[test]
    fn test_build_rejects_unknown_edge_target() {
        let err = FlowBuilder::new("broken")
            .step(visit("a"))
            .then("a", "b")
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            BuildError::UnknownStep {
                flow: "broken".to_string(),
                step: "b".to_string()
            }
        );
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = FlowBuilder::new("dup")
            .step(visit("a"))
            .step(visit("a"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::DuplicateStep { .. }));

        let err = FlowBuilder::new("dup")
            .step(visit("a"))
            .step(visit("b"))
            .step(visit("c"))
            .then("a", "b")
            .then("a", "c")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::DuplicateEdge { ref action, .. } if action == "default"));
    }

    #[test]
    fn test_explicit_start_step() {
        let flow = FlowBuilder::new("f")
            .step(visit("a"))
            .step(visit("b"))
            .start("b")
            .build()
            .unwrap();
        assert_eq!(flow.start(), "b");
        assert_eq!(flow.successor("b", &Action::DEFAULT), None);
    }

    #[tokio::test]
    async fn test_linear_flow_visits_in_order() {
        let flow = FlowBuilder::new("linear")
            .step(visit("a"))
            .step(visit("b"))
            .step(visit("c"))
            .then("a", "b")
            .then("b", "c")
            .build()
            .unwrap();

        let mut ctx = SharedContext::default();
        let action = flow.run(&mut ctx).await.unwrap();

        assert!(action.is_default());
        let visited: Vec<String> = ctx.get("visited").unwrap();
        assert_eq!(visited, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_branch_on_enum_outcome() {
        let flow = FlowBuilder::new("branch")
            .step(NodeStep::new("classify", Classify))
            .step(visit("even"))
            .step(visit("odd"))
            .edge("classify", Parity::Even, "even")
            .edge("classify", Parity::Odd, "odd")
            .build()
            .unwrap();

        let mut ctx = SharedContext::default();
        ctx.insert("number", &7).unwrap();
        flow.run(&mut ctx).await.unwrap();

        let visited: Vec<String> = ctx.get("visited").unwrap();
        assert_eq!(visited, vec!["odd"]);
        assert_eq!(
            ctx.action_trace(),
            vec![
                ("classify".to_string(), "odd".to_string()),
                ("odd".to_string(), "default".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_nested_flow_runs_as_a_step() {
        let inner = FlowBuilder::new("inner")
            .step(visit("inner_a"))
            .step(visit("inner_b"))
            .then("inner_a", "inner_b")
            .build()
            .unwrap();

        let outer = FlowBuilder::new("outer")
            .step(visit("first"))
            .step(inner)
            .step(visit("last"))
            .then("first", "inner")
            .then("inner", "last")
            .build()
            .unwrap();

        let mut ctx = SharedContext::default();
        outer.run(&mut ctx).await.unwrap();

        let visited: Vec<String> = ctx.get("visited").unwrap();
        assert_eq!(visited, vec!["first", "inner_a", "inner_b", "last"]);
        let steps: Vec<String> = ctx.action_trace().into_iter().map(|(step, _)| step).collect();
        assert_eq!(steps, vec!["first", "inner", "inner_a", "inner_b", "last"]);
    }

    #[tokio::test]
    async fn test_nested_flow_action_is_traced() {
        let inner = FlowBuilder::new("inner")
            .step(NodeStep::new("classify", Classify))
            .step(visit("even"))
            .edge("classify", Parity::Even, "even")
            .build()
            .unwrap();
        let outer = FlowBuilder::new("outer")
            .step(inner)
            .step(visit("after"))
            .then("inner", "after")
            .build()
            .unwrap();

        let mut ctx = SharedContext::default();
        ctx.insert("number", &3).unwrap();
        outer.run(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.action_trace(),
            vec![
                ("inner".to_string(), "odd".to_string()),
                ("classify".to_string(), "odd".to_string()),
            ]
        );
        assert!(!ctx.contains("visited"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_in_prepare() {
        let flow = FlowBuilder::new("needs_number")
            .step(NodeStep::new("classify", Classify))
            .build()
            .unwrap();

        let mut ctx = SharedContext::default();
        let err = flow.run(&mut ctx).await.unwrap_err();

        assert!(matches!(err, FlowError::Prepare { .. }));
        assert_eq!(err.step(), "classify");
        assert!(err.to_string().contains("missing context key 'number'"));
    }
}
