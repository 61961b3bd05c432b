//! Integration tests for the market sizing pipeline.
//!
//! These tests drive the full workflow through the mock adapters:
//! 1. Generate formulas from a description
//! 2. Decompose a formula into components
//! 3. Resolve components concurrently
//! 4. Synthesize an estimate

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use market_sizing::{
    testing::{document, extraction_json, MockLanguageModel, MockWebSearcher},
    ClarificationAnswer, Component, ComponentResolution, Confidence, DataPoint, EstimateOutcome,
    Formula, GenerationError, LmError, MarketDescription, Pipeline, PipelineConfig,
    PipelineError, PromptTemplate, ResolutionSet, SynthesisError,
};

const SCHOOLS_QUERY: &str = "number of K-12 schools in the US";
const SPEND_QUERY: &str = "annual software spend per school";

fn description() -> MarketDescription {
    MarketDescription::new("classroom software for US K-12 schools").unwrap()
}

/// A model that proposes one formula and resolves it to 65M.
fn k12_model() -> MockLanguageModel {
    MockLanguageModel::new()
        .with_response(
            PromptTemplate::FormulaBrainstorm,
            json!({
                "steps": "Count schools, then multiply by spend per school.",
                "formulas": [
                    {"expression": "schools * spend_per_school", "rationale": "bottom-up"}
                ],
                "clarifications": ["Public schools only?"]
            }),
        )
        .with_response(
            PromptTemplate::DecomposeFormula,
            json!({
                "components": [
                    {"name": "schools", "description": SCHOOLS_QUERY, "unit": "schools"},
                    {"name": "spend_per_school", "description": SPEND_QUERY, "unit": "USD"}
                ]
            }),
        )
        .with_rule(
            PromptTemplate::ExtractDataPoint,
            "https://nces.example/schools",
            extraction_json("130,000", "schools", "high"),
        )
        .with_rule(
            PromptTemplate::ExtractDataPoint,
            "https://survey.example/high",
            extraction_json("500", "USD", "high"),
        )
        .with_rule(
            PromptTemplate::ExtractDataPoint,
            "https://survey.example/low",
            extraction_json("300", "USD", "medium"),
        )
}

fn k12_searcher() -> MockWebSearcher {
    MockWebSearcher::new()
        .with_documents(
            SCHOOLS_QUERY,
            vec![document("https://nces.example/schools", "NCES", "There are about 130,000 schools.")],
        )
        .with_documents(
            SPEND_QUERY,
            vec![
                document("https://survey.example/low", "Survey 2021", "Schools spend $300 a year."),
                document("https://survey.example/high", "Survey 2023", "Schools spend $500 a year."),
            ],
        )
}

fn resolved(name: &str, values: &[f64]) -> ComponentResolution {
    let points = values
        .iter()
        .enumerate()
        .map(|(rank, value)| {
            DataPoint::new(*value, "units", format!("https://example.com/{}/{}", name, rank))
                .with_confidence(Confidence::High)
                .with_rank(rank)
        })
        .collect();
    ComponentResolution::new(Component::from_variable(name), points)
}

#[tokio::test]
async fn test_k12_software_estimate_end_to_end() {
    let pipeline = Pipeline::new(k12_model(), k12_searcher());

    let formulas = assert_ok!(pipeline.generate_formulas(&description(), &[]).await);
    assert_eq!(formulas.len(), 1);
    assert_eq!(formulas[0].variables(), ["schools", "spend_per_school"]);

    let components = assert_ok!(pipeline.decompose(&formulas[0]).await);
    assert_eq!(components.len(), 2);
    assert_eq!(components[1].unit.as_deref(), Some("USD"));

    let resolutions = pipeline
        .resolve_components(&components, &CancellationToken::new())
        .await;
    assert!(resolutions.is_complete());

    let estimate = assert_ok!(pipeline.synthesize(&formulas[0], &resolutions));
    assert_eq!(estimate.point_value, 65_000_000.0);
    assert_eq!(estimate.low_bound, 39_000_000.0);
    assert_eq!(estimate.high_bound, 65_000_000.0);
    assert_eq!(
        estimate.inputs_used["spend_per_school"].source_url,
        "https://survey.example/high"
    );
    assert!(!estimate.has_flags());
}

#[tokio::test]
async fn test_prose_reply_is_malformed_and_not_retried() {
    let lm = MockLanguageModel::new().with_raw_response(
        PromptTemplate::FormulaBrainstorm,
        "Sure! The market size is roughly schools times spend per school.",
    );
    let pipeline = Pipeline::new(lm, MockWebSearcher::new());

    let err = assert_err!(pipeline.generate_formulas(&description(), &[]).await);
    assert!(matches!(err, GenerationError::MalformedOutput(_)));
    assert_eq!(pipeline.language_model().call_count(), 1);
}

#[tokio::test]
async fn test_clarification_answers_reach_the_prompt() {
    let pipeline = Pipeline::new(k12_model(), MockWebSearcher::new());
    let answers = [ClarificationAnswer::new("Public schools only?", "Yes, public only")];

    assert_ok!(pipeline.generate_formulas(&description(), &answers).await);

    let calls = pipeline.language_model().calls();
    assert!(calls[0].prompt.contains("Yes, public only"));
}

#[tokio::test(start_paused = true)]
async fn test_resolution_respects_concurrency_limit() {
    let searcher = MockWebSearcher::new().with_latency(Duration::from_millis(100));
    let pipeline = Pipeline::new(MockLanguageModel::new(), searcher)
        .with_config(PipelineConfig::default().with_concurrency(4));

    let components: Vec<Component> = (0..8)
        .map(|i| Component::from_variable(format!("component_{}", i)))
        .collect();

    let started = Instant::now();
    let resolutions = pipeline
        .resolve_components(&components, &CancellationToken::new())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(resolutions.len(), 8);
    assert_eq!(pipeline.searcher().max_in_flight(), 4);
    // Two waves of four, not eight sequential searches.
    assert!(elapsed >= Duration::from_millis(200), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_resolution_keeps_submission_order() {
    let pipeline = Pipeline::new(k12_model(), k12_searcher());
    let components = vec![
        Component::new("spend_per_school", SPEND_QUERY),
        Component::new("schools", SCHOOLS_QUERY),
    ];

    let resolutions = pipeline
        .resolve_components(&components, &CancellationToken::new())
        .await;

    let names: Vec<&str> = resolutions.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["spend_per_school", "schools"]);
}

#[tokio::test]
async fn test_zero_documents_yield_empty_resolution() {
    let pipeline = Pipeline::new(MockLanguageModel::new(), MockWebSearcher::new());
    let components = vec![Component::new("schools", SCHOOLS_QUERY)];

    let resolutions = pipeline
        .resolve_components(&components, &CancellationToken::new())
        .await;

    let resolution = resolutions.get("schools").unwrap();
    assert!(resolution.is_empty());
    assert_eq!(resolution.documents_retrieved, 0);
    assert_eq!(resolutions.empty_components(), ["schools"]);
    assert_eq!(pipeline.language_model().call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_keeps_completed_resolutions() {
    let searcher = MockWebSearcher::new().with_latency(Duration::from_millis(100));
    let pipeline = Pipeline::new(MockLanguageModel::new(), searcher)
        .with_config(PipelineConfig::default().with_concurrency(1));
    let components = vec![
        Component::from_variable("a"),
        Component::from_variable("b"),
        Component::from_variable("c"),
    ];
    let cancel = CancellationToken::new();

    let (resolutions, _) = tokio::join!(pipeline.resolve_components(&components, &cancel), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    assert_eq!(resolutions.len(), 1);
    assert!(resolutions.get("a").is_some());
    assert_eq!(resolutions.cancelled(), ["b", "c"]);
    assert!(!resolutions.is_complete());
}

#[test]
fn test_synthesis_is_idempotent() {
    let pipeline = Pipeline::new(MockLanguageModel::new(), MockWebSearcher::new());
    let formula = Formula::new("households * adoption_rate * price").unwrap();
    let resolutions = ResolutionSet::new()
        .with(resolved("households", &[120_000_000.0, 128_000_000.0]))
        .with(resolved("adoption_rate", &[0.05, 0.08]))
        .with(resolved("price", &[99.0]));

    let first = pipeline.synthesize(&formula, &resolutions).unwrap();
    let second = pipeline.synthesize(&formula, &resolutions).unwrap();
    assert_eq!(first, second);
    assert!(first.low_bound <= first.point_value);
    assert!(first.point_value <= first.high_bound);
}

#[test]
fn test_deserialized_resolutions_use_highest_confidence_value() {
    let pipeline = Pipeline::new(MockLanguageModel::new(), MockWebSearcher::new());
    let formula = Formula::new("schools * spend_per_school").unwrap();

    // Points listed low-confidence first, as an edited payload might send them.
    let point = |value: f64, confidence: &str, rank: usize| {
        json!({
            "value": value,
            "unit": "USD",
            "source_url": format!("https://survey.example/{}", rank),
            "source_snippet": "",
            "extraction_confidence": confidence,
            "rank": rank
        })
    };
    let payload = json!({
        "resolutions": {
            "schools": {
                "component": {"name": "schools", "description": SCHOOLS_QUERY, "unit": null},
                "data_points": [{
                    "value": 130000.0,
                    "unit": "schools",
                    "source_url": "https://nces.example/schools",
                    "source_snippet": "",
                    "extraction_confidence": "high",
                    "rank": 0
                }],
                "documents_retrieved": 1,
                "documents_discarded": 0
            },
            "spend_per_school": {
                "component": {"name": "spend_per_school", "description": SPEND_QUERY, "unit": null},
                "data_points": [point(300.0, "low", 0), point(500.0, "high", 1)],
                "documents_retrieved": 2,
                "documents_discarded": 0
            }
        }
    });

    let resolutions: ResolutionSet = serde_json::from_value(payload).unwrap();
    let estimate = pipeline.synthesize(&formula, &resolutions).unwrap();

    assert_eq!(estimate.point_value, 65_000_000.0);
    assert_eq!(estimate.low_bound, 39_000_000.0);
    assert_eq!(estimate.high_bound, 65_000_000.0);
}

#[test]
fn test_unresolved_component_fails_synthesis() {
    let pipeline = Pipeline::new(MockLanguageModel::new(), MockWebSearcher::new());
    let formula = Formula::new("schools * spend_per_school").unwrap();
    let resolutions = ResolutionSet::new()
        .with(resolved("schools", &[130_000.0]))
        .with(ComponentResolution::empty(Component::from_variable("spend_per_school")));

    let err = pipeline.synthesize(&formula, &resolutions).unwrap_err();
    assert_eq!(
        err,
        SynthesisError::UnresolvedComponent {
            components: vec!["spend_per_school".to_string()]
        }
    );
}

#[test]
fn test_four_of_six_components_is_partial() {
    let pipeline = Pipeline::new(MockLanguageModel::new(), MockWebSearcher::new());
    let formula = Formula::new("a * b * c * d * e * f").unwrap();
    let resolutions = ResolutionSet::new()
        .with(resolved("a", &[1.0]))
        .with(resolved("b", &[2.0]))
        .with(resolved("c", &[3.0]))
        .with(resolved("d", &[4.0]))
        .with(ComponentResolution::empty(Component::from_variable("e")));

    let outcome = pipeline.synthesize_or_partial(&formula, &resolutions).unwrap();
    assert!(!outcome.is_complete());
    let EstimateOutcome::Partial(partial) = outcome else {
        panic!("expected a partial outcome");
    };
    assert_eq!(partial.inputs_used.len(), 4);
    assert_eq!(partial.unresolved, ["e", "f"]);
}

#[tokio::test]
async fn test_decomposition_is_stable() {
    let pipeline = Pipeline::new(k12_model(), MockWebSearcher::new());
    let formula = Formula::new("schools * spend_per_school").unwrap();

    let first = pipeline.decompose(&formula).await.unwrap();
    let second = pipeline.decompose(&formula).await.unwrap();

    assert_eq!(first, second);
    let names: Vec<&str> = first.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, formula.variables());
}

#[tokio::test]
async fn test_run_reports_every_formula() {
    let lm = k12_model()
        .with_response(
            PromptTemplate::FormulaBrainstorm,
            json!({
                "formulas": [
                    {"expression": "schools * spend_per_school"},
                    {"expression": "districts * spend_per_district"}
                ]
            }),
        )
        .with_rule_failure(
            PromptTemplate::DecomposeFormula,
            "districts * spend_per_district",
            LmError::Api {
                status: 400,
                message: "bad request".into(),
            },
        );
    let pipeline = Pipeline::new(lm, k12_searcher());

    let report = assert_ok!(pipeline.run(&description(), &[], &CancellationToken::new()).await);

    assert!(!report.cancelled);
    assert_eq!(report.formulas.len(), 2);

    let first = &report.formulas[0];
    assert!(first.error.is_none());
    let estimate = first.outcome.as_ref().and_then(EstimateOutcome::estimate).unwrap();
    assert_eq!(estimate.point_value, 65_000_000.0);

    let second = &report.formulas[1];
    assert!(second.outcome.is_none());
    assert!(second.error.as_deref().unwrap().contains("bad request"));

    assert_eq!(report.complete_estimates().count(), 1);
}

#[tokio::test]
async fn test_run_with_cancelled_token_fails() {
    let pipeline = Pipeline::new(k12_model(), k12_searcher());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(pipeline.run(&description(), &[], &cancel).await);
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(pipeline.language_model().call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_cancelled_during_resolution_reports_partial() {
    let searcher = k12_searcher().with_latency(Duration::from_millis(100));
    let pipeline = Pipeline::new(k12_model(), searcher);
    let cancel = CancellationToken::new();

    let desc = description();
    let (report, _) = tokio::join!(pipeline.run(&desc, &[], &cancel), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = assert_ok!(report);

    assert!(report.cancelled);
    assert_eq!(report.formulas.len(), 1);
    let formula = &report.formulas[0];
    assert_eq!(formula.resolutions.cancelled(), ["schools", "spend_per_school"]);
    assert!(matches!(formula.outcome, Some(EstimateOutcome::Partial(_))));
}

#[tokio::test]
async fn test_generation_errors_surface_from_run() {
    let lm = MockLanguageModel::new()
        .with_response(PromptTemplate::FormulaBrainstorm, json!({"formulas": []}));
    let pipeline = Pipeline::new(lm, MockWebSearcher::new());

    let err = assert_err!(pipeline.run(&description(), &[], &CancellationToken::new()).await);
    assert!(matches!(err, PipelineError::Generation(GenerationError::NoFormulas)));
}
