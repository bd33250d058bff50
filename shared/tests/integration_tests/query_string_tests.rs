//! Integration tests for the query-string mini-language.

use shared::query::{
    parse_query_string, FilterOperator, Literal, LogicalOperator, Predicate, QueryStringResult,
};

use super::common::test_ctx;

#[test]
fn test_grouping_precedence() {
    let result = parse_query_string("(col1:abc AND col2:abcd) OR col3:eee", &test_ctx());
    let QueryStringResult::Tree(node) = result else {
        panic!("Expected a tree");
    };
    assert_eq!(
        node.and_group.unwrap().predicates,
        vec![
            Predicate::equals("col1", Literal::from("abc")),
            Predicate::equals("col2", Literal::from("abcd")),
        ]
    );
    assert_eq!(
        node.or_group.unwrap().predicates,
        vec![Predicate::equals("col3", Literal::from("eee"))]
    );
    assert!(node.time_range.is_none());
}

#[test]
fn test_flat_results() {
    assert_eq!(
        parse_query_string("level:error", &test_ctx()),
        QueryStringResult::Flat(vec![Predicate::equals("level", Literal::from("error"))])
    );
    assert_eq!(
        parse_query_string("timeout", &test_ctx()),
        QueryStringResult::Flat(vec![Predicate::words("*", "timeout", LogicalOperator::Or)])
    );
}

#[test]
fn test_numeric_values_are_typed() {
    let QueryStringResult::Flat(predicates) = parse_query_string("status:503", &test_ctx()) else {
        panic!("Expected flat predicates");
    };
    match &predicates[..] {
        [Predicate::Expression(e)] => {
            assert_eq!(e.operator, FilterOperator::Equals);
            assert_eq!(e.literal, Some(Literal::Integer(503)));
        }
        other => panic!("Unexpected predicates {other:?}"),
    }
}

#[test]
fn test_into_condition_nests_trees() {
    let condition = parse_query_string("a:1 OR b:2", &test_ctx()).into_condition();
    assert!(condition.predicates.is_empty());
    assert_eq!(condition.nested_nodes.len(), 1);

    let condition = parse_query_string("a:1", &test_ctx()).into_condition();
    assert_eq!(condition.predicates.len(), 1);
    assert!(condition.nested_nodes.is_empty());
}
