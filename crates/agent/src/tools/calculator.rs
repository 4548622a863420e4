//! Arithmetic tool

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{ToolError, ToolTrait};

pub const DIVIDE_BY_ZERO: &str = "ERROR: You can't divide by zero!";

/// Four basic operations on two numbers
pub struct CalculatorTool;

fn number(args: &Value, key: &str) -> Option<f64> {
    match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[async_trait]
impl ToolTrait for CalculatorTool {
    fn name(&self) -> &str {
        "Calculator"
    }

    fn description(&self) -> &str {
        "A tool for simple mathematical operations."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "The type of mathematical operation to perform."
                },
                "x": { "type": "number", "description": "First number." },
                "y": { "type": "number", "description": "Second number." }
            },
            "required": ["operation", "x", "y"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let operation = args.get("operation").and_then(Value::as_str).unwrap_or("");
        let (x, y) = match (number(&args, "x"), number(&args, "y")) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok("Error: 'x' and 'y' must both be numbers".to_string()),
        };
        debug!("Calculator: {} {} {}", x, operation, y);

        // f64 Display drops the fractional part of integral values
        let result = match operation {
            "add" => x + y,
            "subtract" => x - y,
            "multiply" => x * y,
            "divide" if y == 0.0 => return Ok(DIVIDE_BY_ZERO.to_string()),
            "divide" => x / y,
            other => return Ok(format!("Error: unknown operation '{}'", other)),
        };
        if !result.is_finite() {
            return Ok(format!("Error: the result of {} is out of range", operation));
        }
        Ok(result.to_string())
    }
}
