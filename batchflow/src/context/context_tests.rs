//! Cross-type tests for the context module.

#[cfg(test)]
mod tests {
    use crate::config::RunnerKind;
    use crate::context::{ExecutionContext, PipelineContext, RunIdentity, StageContext, StageInputs};
    use crate::events::CollectingEventSink;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn identity() -> RunIdentity {
        RunIdentity::new("tornadoes")
            .with_runner(RunnerKind::Direct)
            .with_project(Some("my-proj".to_string()))
            .with_region(Some("europe-west1".to_string()))
    }

    #[test]
    fn test_stage_events_carry_run_fields() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Arc::new(PipelineContext::new(identity()).with_event_sink(sink.clone()));
        let stage = StageContext::new(ctx.clone(), "extract", StageInputs::default());

        stage.try_emit_event("extract.rows", Some(json!({"rows": 4})));

        let (event_type, payload) = sink.events().remove(0);
        let payload = payload.unwrap();
        assert_eq!(event_type, "extract.rows");
        assert_eq!(payload["rows"], 4);
        assert_eq!(payload["stage"], "extract");
        assert_eq!(payload["runner"], "direct");
        assert_eq!(payload["region"], "europe-west1");
        assert_eq!(payload["run_id"], ctx.identity().run_id.to_string());
    }

    #[test]
    fn test_stage_reads_only_its_dependencies() {
        let ctx = Arc::new(PipelineContext::new(identity()));
        let outputs = HashMap::from([
            ("extract".to_string(), HashMap::from([("rows".to_string(), json!(3))])),
            ("load".to_string(), HashMap::from([("rows_written".to_string(), json!(1))])),
        ]);
        let inputs = StageInputs::new(outputs, HashSet::from(["extract".to_string()]), "filter", true);
        let stage = StageContext::new(ctx, "filter", inputs);

        assert_eq!(stage.inputs().require::<i64>("extract", "rows").unwrap(), 3);
        assert!(stage.inputs().get("load").is_err());
        assert_eq!(stage.job(), "tornadoes");
    }
}
