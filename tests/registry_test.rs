use asahi::registry::{
    Availability, ModelProfile, ModelRegistry, calculate_cost, estimate_tokens,
};

fn profile(name: &str, quality: f64, latency: u64, availability: Availability) -> ModelProfile {
    ModelProfile {
        name: name.to_string(),
        provider: "openai".to_string(),
        cost_per_1k_input_tokens: 0.01,
        cost_per_1k_output_tokens: 0.03,
        avg_latency_ms: latency,
        quality_score: quality,
        max_input_tokens: 8_000,
        max_output_tokens: 1_000,
        description: String::new(),
        availability,
    }
}

#[test]
fn get_returns_registered_profile() {
    let registry = ModelRegistry::from_profiles(vec![profile(
        "sonnet",
        4.1,
        150,
        Availability::Available,
    )])
    .unwrap();
    assert_eq!(registry.get("sonnet").unwrap().quality_score, 4.1);
    assert!(registry.contains("sonnet"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn get_unknown_model_is_not_found() {
    let registry = ModelRegistry::with_defaults();
    let err = registry.get("nonexistent").unwrap_err();
    assert_eq!(err.kind(), "model_not_found");
}

#[test]
fn filter_excludes_unavailable_models() {
    let registry = ModelRegistry::from_profiles(vec![
        profile("up", 4.0, 100, Availability::Available),
        profile("degraded", 4.0, 100, Availability::Degraded),
        profile("down", 4.0, 100, Availability::Unavailable),
    ])
    .unwrap();

    let names: Vec<_> = registry
        .filter(0.0, 10_000)
        .into_iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"up"));
    assert!(names.contains(&"degraded"));
}

#[test]
fn raising_quality_floor_never_grows_candidate_set() {
    let registry = ModelRegistry::with_defaults();
    let loose = registry.filter(3.0, 10_000).len();
    let tight = registry.filter(4.5, 10_000).len();
    assert!(tight <= loose);
}

#[test]
fn lowering_latency_budget_never_grows_candidate_set() {
    let registry = ModelRegistry::with_defaults();
    let loose = registry.filter(0.0, 10_000).len();
    let tight = registry.filter(0.0, 160).len();
    assert!(tight <= loose);
}

#[test]
fn loads_catalog_from_toml() {
    let raw = r#"
        [models.fast-cheap]
        provider = "anthropic"
        cost_per_1k_input_tokens = 0.001
        cost_per_1k_output_tokens = 0.002
        avg_latency_ms = 90
        quality_score = 3.2
        max_input_tokens = 100000
        max_output_tokens = 4096

        [models.slow-good]
        cost_per_1k_input_tokens = 0.02
        cost_per_1k_output_tokens = 0.06
        avg_latency_ms = 800
        quality_score = 4.8
        max_input_tokens = 200000
        max_output_tokens = 8192
        availability = "degraded"
    "#;
    let registry = ModelRegistry::from_toml_str(raw).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("fast-cheap").unwrap().provider, "anthropic");
    assert_eq!(
        registry.get("slow-good").unwrap().availability,
        Availability::Degraded
    );
}

#[test]
fn invalid_catalog_is_configuration_error() {
    let err = ModelRegistry::from_toml_str("models = 3").unwrap_err();
    assert_eq!(err.kind(), "configuration");
}

#[test]
fn cost_scales_with_tokens_and_rates() {
    let p = profile("m", 4.0, 100, Availability::Available);
    assert_eq!(calculate_cost(&p, 1000, 1000), 0.04);
    assert_eq!(calculate_cost(&p, 0, 0), 0.0);
}

#[test]
fn token_estimate_is_deterministic() {
    let text = "the quick brown fox jumps over the lazy dog";
    assert_eq!(estimate_tokens(text), estimate_tokens(text));
    assert!(estimate_tokens(text) >= 9);
}
