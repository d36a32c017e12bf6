//! Properties of the response normalizer over many generated inputs.

use serde_json::{json, Value};

use warcast::forecast::Source;
use warcast::normalize::{dedup_sources, normalize, strip_citations, strip_fence, ValidationError};

fn payload(a: f64, b: f64, c: f64) -> Value {
    json!({
        "timelineCategory": "NOT_SOON",
        "timelineJustification": "Positions are entrenched [1].",
        "keyFactors": [
            {"title": "Aid", "impact": "Flows continue.", "trend": "POSITIVE_FOR_UKRAINE"},
            {"title": "Manpower", "impact": "Recruitment strain.", "trend": "NEGATIVE_FOR_UKRAINE"},
            {"title": "Economy", "impact": "Budget pressure [2, 3].", "trend": "POSITIVE_FOR_UKRAINE"},
            {"title": "Talks", "impact": "None planned.", "trend": "NEUTRAL"}
        ],
        "outcomeProbabilities": {"ukraineWin": a, "frozenConflict": b, "russiaWin": c}
    })
}

#[test]
fn triples_summing_to_hundred_are_accepted() {
    for a in (0..=100).step_by(5) {
        for b in (0..=(100 - a)).step_by(5) {
            let c = 100 - a - b;
            let text = payload(a as f64, b as f64, c as f64).to_string();
            let f = normalize(&text).unwrap_or_else(|e| panic!("({},{},{}) rejected: {}", a, b, c, e));
            assert_eq!(f.outcome_probabilities.values(), [a as f64, b as f64, c as f64]);
        }
    }
}

#[test]
fn triples_off_by_any_amount_are_rejected() {
    for (a, b, c) in [(30, 55, 16), (30, 55, 14), (0, 0, 0), (50, 50, 50), (100, 1, 0), (33, 33, 33)] {
        let text = payload(a as f64, b as f64, c as f64).to_string();
        match normalize(&text) {
            Err(ValidationError::ProbabilitySum { .. }) => {}
            other => panic!("({},{},{}) should fail the sum check, got {:?}", a, b, c, other),
        }
    }
    assert!(normalize(&payload(30.0, 55.0, 15.0).to_string()).is_ok());
}

#[test]
fn sum_check_rounds_only_the_total() {
    assert!(normalize(&payload(33.4, 33.3, 33.3).to_string()).is_ok());
    assert!(normalize(&payload(30.2, 55.2, 15.0).to_string()).is_ok());
    assert!(normalize(&payload(30.3, 55.3, 15.0).to_string()).is_err());
}

#[test]
fn fence_with_any_language_tag_matches_unwrapped() {
    let body = serde_json::to_string_pretty(&payload(20.0, 60.0, 20.0)).unwrap();
    let plain = normalize(&body).unwrap();
    for tag in ["", "json", "JSON", "json5", "javascript", "text"] {
        let fenced = format!("```{}\n{}\n```", tag, body);
        assert_eq!(strip_fence(&fenced), body.trim());
        assert_eq!(normalize(&fenced).unwrap(), plain, "tag {:?}", tag);
        let padded = format!("\n\n  {}  \n", fenced);
        assert_eq!(normalize(&padded).unwrap(), plain, "padded tag {:?}", tag);
        let spaced = format!("```{} {}```", tag, body);
        assert_eq!(normalize(&spaced).unwrap(), plain, "tag then space {:?}", tag);
        let glued = format!("```{}{}```", tag, body);
        assert_eq!(normalize(&glued).unwrap(), plain, "glued tag {:?}", tag);
    }
}

#[test]
fn citation_stripping_is_idempotent() {
    let samples = [
        "Plain sentence.",
        "One marker [1].",
        "Many [1, 2, 3] markers [4][5].",
        "Tight[12,13]packing",
        "Nested [[1]2] marker",
        "Brackets [a] [1b] stay",
        "",
    ];
    for s in samples {
        let once = strip_citations(s);
        assert_eq!(strip_citations(&once), once, "not idempotent for {:?}", s);
        assert!(!once.contains("[1]"));
    }
    assert_eq!(strip_citations("Plain sentence."), "Plain sentence.");
    assert_eq!(strip_citations("Brackets [a] [1b] stay"), "Brackets [a] [1b] stay");
}

#[test]
fn dedup_keeps_first_occurrence_in_order() {
    let input = vec![
        Source::new("https://c.example", "C1"),
        Source::new("https://a.example", "A1"),
        Source::new("https://c.example", "C2"),
        Source::new("https://b.example", "B1"),
        Source::new("https://a.example", "A2"),
    ];
    let out = dedup_sources(input);
    let got: Vec<(&str, &str)> = out.iter().map(|s| (s.uri.as_str(), s.title.as_str())).collect();
    assert_eq!(
        got,
        vec![
            ("https://c.example", "C1"),
            ("https://a.example", "A1"),
            ("https://b.example", "B1"),
        ]
    );
}

#[test]
fn any_single_violation_rejects_the_whole_reply() {
    let base = payload(20.0, 60.0, 20.0);
    let mutations: Vec<Box<dyn Fn(&mut Value)>> = vec![
        Box::new(|v: &mut Value| v["timelineCategory"] = json!("Likely Soon")),
        Box::new(|v: &mut Value| v["timelineCategory"] = json!(2)),
        Box::new(|v: &mut Value| v["timelineJustification"] = json!("")),
        Box::new(|v: &mut Value| v["keyFactors"] = json!("none")),
        Box::new(|v: &mut Value| v["keyFactors"][0]["title"] = json!(null)),
        Box::new(|v: &mut Value| v["keyFactors"][1]["impact"] = json!(["x"])),
        Box::new(|v: &mut Value| v["outcomeProbabilities"]["frozenConflict"] = json!(null)),
        Box::new(|v: &mut Value| v["outcomeProbabilities"] = json!([20, 60, 20])),
    ];
    for (i, mutate) in mutations.iter().enumerate() {
        let mut v = base.clone();
        mutate(&mut v);
        assert!(normalize(&v.to_string()).is_err(), "mutation {} accepted", i);
    }
}
