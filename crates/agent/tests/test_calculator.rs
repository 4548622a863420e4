//! Tests for the calculator tool

use serde_json::json;
use synthia_agent::tools::calculator::DIVIDE_BY_ZERO;
use synthia_agent::tools::CalculatorTool;
use synthia_agent::ToolTrait;

#[tokio::test]
async fn test_basic_operations() {
    let cases = [
        ("add", 12.0, 30.0, "42"),
        ("subtract", 5.0, 8.0, "-3"),
        ("multiply", 1.5, 4.0, "6"),
        ("divide", 7.0, 2.0, "3.5"),
    ];

    for (operation, x, y, expected) in cases {
        let out = CalculatorTool
            .execute(json!({"operation": operation, "x": x, "y": y}))
            .await
            .unwrap();
        assert_eq!(out, expected, "{} {} {}", x, operation, y);
    }
}

#[tokio::test]
async fn test_divide_by_zero_is_text() {
    let out = CalculatorTool
        .execute(json!({"operation": "divide", "x": 12, "y": 0}))
        .await
        .unwrap();
    assert_eq!(out, DIVIDE_BY_ZERO);
    assert_eq!(out, "ERROR: You can't divide by zero!");
}

#[tokio::test]
async fn test_missing_operands() {
    let out = CalculatorTool.execute(json!({})).await.unwrap();
    assert!(out.starts_with("Error:"));

    let out = CalculatorTool
        .execute(json!({"operation": "add", "x": 1}))
        .await
        .unwrap();
    assert!(out.starts_with("Error:"));
}

#[tokio::test]
async fn test_unknown_operation() {
    let out = CalculatorTool
        .execute(json!({"operation": "modulo", "x": 5, "y": 2}))
        .await
        .unwrap();
    assert_eq!(out, "Error: unknown operation 'modulo'");
}

#[tokio::test]
async fn test_non_finite_operands_are_rejected() {
    for raw in ["inf", "-infinity", "NaN"] {
        let out = CalculatorTool
            .execute(json!({"operation": "add", "x": raw, "y": 1}))
            .await
            .unwrap();
        assert!(out.starts_with("Error:"), "{}: {}", raw, out);
    }
}

#[tokio::test]
async fn test_overflow_is_reported() {
    let out = CalculatorTool
        .execute(json!({"operation": "multiply", "x": 1e308, "y": 10}))
        .await
        .unwrap();
    assert_eq!(out, "Error: the result of multiply is out of range");

    let out = CalculatorTool
        .execute(json!({"operation": "divide", "x": 1e308, "y": 1e-10}))
        .await
        .unwrap();
    assert!(out.starts_with("Error:"));
}
