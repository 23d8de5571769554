use serde_json::{json, Value as JsonValue};

use apicase::document::{RequestBody, Rule, SearchSpec};
use apicase::{expand_document, load_and_expand, load_document, CaseError};

const SAMPLE: &str = r#"
api:
  type: http
  define:
    base_url: https://api.example.com
    page_size: 50
  tests:
    list testplans page ${params.page}:
      parametrize:
        params:
          - page: 1
          - page: 2
      request:
        path: /testplans
        params:
          page: "${params.page}"
          size: "${page_size}"
      assertions:
        status_code: 200
        json:
          search:
            $.meta.page: "${params.page}"
"#;

#[test]
fn expansion_leaves_no_placeholders_anywhere() {
    let cases = load_and_expand(SAMPLE).unwrap();
    assert_eq!(cases.len(), 2);
    for case in &cases {
        let rendered = format!("{:?}", case);
        assert!(
            !rendered.contains("${"),
            "unresolved placeholder in {rendered}"
        );
    }
}

#[test]
fn expansion_is_reproducible_and_ordered() {
    let document = load_document(SAMPLE).unwrap();
    let first = expand_document(&document).unwrap();
    let second = expand_document(&document).unwrap();
    let names = |cases: &[apicase::ResolvedCase]| {
        cases.iter().map(|c| c.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&first), vec!["list testplans page 1", "list testplans page 2"]);
    assert_eq!(names(&first), names(&second));
}

#[test]
fn bindings_stay_isolated_per_expansion() {
    let cases = load_and_expand(SAMPLE).unwrap();
    assert_eq!(cases[0].request.params.get("page"), Some(&json!(1)));
    assert_eq!(cases[1].request.params.get("page"), Some(&json!(2)));
    // the global binding resolves identically in both
    assert_eq!(cases[0].request.params.get("size"), Some(&json!(50)));
    assert_eq!(cases[1].request.params.get("size"), Some(&json!(50)));

    for (case, expected) in cases.iter().zip([json!(1), json!(2)]) {
        let json_checks = case.assertions.json.as_ref().unwrap();
        let Some(SearchSpec::Table(rows)) = &json_checks.search else {
            panic!("table search expected");
        };
        match &rows[0].1 {
            Rule::Literal(value) => assert_eq!(value, &expected),
            other => panic!("literal expected, got {other:?}"),
        }
    }
}

#[test]
fn whole_object_interpolation_preserves_structure() {
    let doc = r#"
api:
  type: http
  define:
    credentials:
      user: qa-bot
      token: t-123
  tests:
    login:
      request:
        method: post
        url: https://api.example.com/login
        body:
          auth: "${credentials}"
"#;
    let cases = load_and_expand(doc).unwrap();
    match &cases[0].request.body {
        Some(RequestBody::Json(body)) => {
            assert_eq!(
                body,
                &json!({"auth": {"user": "qa-bot", "token": "t-123"}})
            );
        }
        other => panic!("json body expected, got {other:?}"),
    }
}

#[test]
fn empty_parametrize_list_expands_to_nothing() {
    let doc = r#"
api:
  type: http
  tests:
    nothing ${params.id}:
      parametrize:
        params: []
      request:
        url: https://api.example.com/x
"#;
    let cases = load_and_expand(doc).unwrap();
    assert!(cases.is_empty());
}

#[test]
fn unbound_variable_fails_the_expansion() {
    let doc = r#"
api:
  type: http
  tests:
    broken:
      request:
        url: "${nowhere}/x"
"#;
    let err = load_and_expand(doc).unwrap_err();
    assert!(matches!(err, CaseError::UnboundVariable(_)));
    assert!(err.to_string().contains("nowhere"));
}

#[test]
fn multi_param_product_varies_rightmost_fastest() {
    let doc = r#"
api:
  type: http
  tests:
    m ${region}-${tier}:
      parametrize:
        region: [eu, us]
        tier: [free, pro]
      request:
        url: https://api.example.com/x
"#;
    let cases = load_and_expand(doc).unwrap();
    let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["m eu-free", "m eu-pro", "m us-free", "m us-pro"]);
}

#[test]
fn skip_reason_templates_resolve_per_binding() {
    let doc = r#"
api:
  type: http
  tests:
    s ${flag}:
      skip: "${flag}"
      parametrize:
        flag: ["false", "broken upstream"]
      request:
        url: https://api.example.com/x
"#;
    let cases = load_and_expand(doc).unwrap();
    assert_eq!(cases[0].skip, None);
    assert_eq!(cases[1].skip, Some("broken upstream".to_string()));
}

#[test]
fn expanded_case_describes_as_plain_json() {
    let cases = load_and_expand(SAMPLE).unwrap();
    let described = cases[0].describe();
    assert_eq!(described["name"], json!("list testplans page 1"));
    assert_eq!(described["request"]["method"], json!("GET"));
    assert!(described["assertions"]["json"]["search"].is_object());
    let JsonValue::Object(_) = described else {
        panic!("object expected");
    };
}
