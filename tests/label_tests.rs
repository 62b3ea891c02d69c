//! Label expression parsing and evaluation through the public API

use capability_gateway::labels::{
    LabelExpression, Labels, MAX_EXPRESSION_LENGTH, filter_by_expression,
};
use capability_gateway::types::{ServiceTarget, ServiceType};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_and_binds_tighter_than_or() {
    let expr = LabelExpression::parse("a=1 | b=2 & c=3").unwrap();
    assert!(expr.evaluate(&labels(&[("a", "1")])));
    assert!(!expr.evaluate(&labels(&[("b", "2")])));
    assert!(expr.evaluate(&labels(&[("b", "2"), ("c", "3")])));

    let grouped = LabelExpression::parse("(a=1 | b=2) & c=3").unwrap();
    assert!(!grouped.evaluate(&labels(&[("a", "1")])));
    assert!(grouped.evaluate(&labels(&[("a", "1"), ("c", "3")])));
}

#[test]
fn test_not_equal_matches_absent_key() {
    let expr = LabelExpression::parse("tier!=free").unwrap();
    assert!(expr.evaluate(&Labels::new()));
    assert!(expr.evaluate(&labels(&[("tier", "paid")])));
    assert!(!expr.evaluate(&labels(&[("tier", "free")])));
}

#[test]
fn test_negation_and_whitespace() {
    let expr = LabelExpression::parse("  ! ( env = prod )  &  region=eu-west/1 ").unwrap();
    assert!(expr.evaluate(&labels(&[("env", "dev"), ("region", "eu-west/1")])));
    assert!(!expr.evaluate(&labels(&[("env", "prod"), ("region", "eu-west/1")])));
    assert!(LabelExpression::parse("!!a=b").unwrap().evaluate(&labels(&[("a", "b")])));
}

#[test]
fn test_malformed_expressions_are_rejected() {
    for input in [
        "",
        "a",
        "a=",
        "=b",
        "a=b &",
        "| a=b",
        "(a=b",
        "a=b)",
        "a=b c=d",
        "a==b",
        "a=b; rm -rf",
        "a=\"b\"",
    ] {
        let err = LabelExpression::parse(input).unwrap_err();
        assert!(!err.message().is_empty(), "{input}");
    }
}

#[test]
fn test_length_limit() {
    let value = "x".repeat(MAX_EXPRESSION_LENGTH);
    assert!(LabelExpression::parse(&format!("k={value}")).is_err());
    assert!(LabelExpression::parse(&format!("k={}", "x".repeat(100))).is_ok());
}

#[test]
fn test_parsed_predicate_is_reusable() {
    let expr: LabelExpression = "env=prod & !tier=free".parse().unwrap();
    let targets = vec![
        ServiceTarget::new("a", "h", 1, ServiceType::ToolInvoker).with_label("env", "prod"),
        ServiceTarget::new("b", "h", 2, ServiceType::ToolInvoker)
            .with_label("env", "prod")
            .with_label("tier", "free"),
        ServiceTarget::new("c", "h", 3, ServiceType::ToolInvoker).with_label("env", "dev"),
    ];

    let first = expr.filter(targets.iter());
    let second = expr.filter(targets.iter());
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].service_name, "a");
    assert_eq!(second.len(), 1);

    let reparsed = LabelExpression::parse(&expr.to_string()).unwrap();
    assert_eq!(reparsed.filter(targets.iter()).len(), 1);
}

#[test]
fn test_blank_filter_keeps_everything() {
    let targets = vec![
        ServiceTarget::new("a", "h", 1, ServiceType::ToolInvoker),
        ServiceTarget::new("b", "h", 2, ServiceType::ToolInvoker),
    ];
    assert_eq!(filter_by_expression(targets.clone(), None).unwrap().len(), 2);
    assert_eq!(filter_by_expression(targets.clone(), Some("  ")).unwrap().len(), 2);
    assert!(filter_by_expression(targets, Some("a=")).is_err());
}
