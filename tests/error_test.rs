use asahi::AsahiError;

#[test]
fn kinds_are_stable_wire_codes() {
    let cases: Vec<(AsahiError, &str)> = vec![
        (AsahiError::validation("prompt", "empty"), "validation"),
        (AsahiError::ModelNotFound("x".into()), "model_not_found"),
        (AsahiError::NoModelsAvailable, "no_models_available"),
        (AsahiError::Provider("down".into()), "provider"),
        (AsahiError::Embedding("down".into()), "embedding"),
        (AsahiError::SimilarityStore("down".into()), "similarity_store"),
        (AsahiError::Batching("dup".into()), "batching"),
        (AsahiError::Configuration("bad".into()), "configuration"),
        (AsahiError::Observability("bad".into()), "observability"),
    ];
    for (err, kind) in cases {
        assert_eq!(err.kind(), kind);
    }
}

#[test]
fn only_upstream_io_errors_are_transient() {
    assert!(AsahiError::Provider("timeout".into()).is_transient());
    assert!(AsahiError::Embedding("reset".into()).is_transient());
    assert!(AsahiError::SimilarityStore("reset".into()).is_transient());

    assert!(!AsahiError::validation("f", "bad").is_transient());
    assert!(!AsahiError::ModelNotFound("x".into()).is_transient());
    assert!(!AsahiError::NoModelsAvailable.is_transient());
    assert!(!AsahiError::Batching("dup".into()).is_transient());
    assert!(!AsahiError::Configuration("bad".into()).is_transient());
}

#[test]
fn validation_errors_name_the_field() {
    let err = AsahiError::validation("latency_budget_ms", "out of range");
    assert!(err.to_string().contains("latency_budget_ms"));
}
