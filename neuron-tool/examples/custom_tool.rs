//! Example: define a tool by implementing `Tool` directly, register it, and execute it.
//!
//! Run with: `cargo run --example custom_tool -p neuron-tool`

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use neuron_tool::ToolRegistry;
use neuron_types::{Tool, ToolContext, ToolDefinition};
use tokio_util::sync::CancellationToken;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct CalculateArgs {
    /// The left-hand operand
    left: f64,
    /// The right-hand operand
    right: f64,
    /// The operator: add, sub, mul, or div
    operator: String,
}

#[derive(Debug, serde::Serialize)]
struct CalcOutput {
    result: f64,
}

#[derive(Debug, thiserror::Error)]
enum CalcError {
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
}

struct CalculateTool;

impl Tool for CalculateTool {
    const NAME: &'static str = "calculate";
    type Args = CalculateArgs;
    type Output = CalcOutput;
    type Error = CalcError;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            title: None,
            description: "Perform basic arithmetic on two numbers".into(),
            input_schema: serde_json::to_value(schemars::schema_for!(CalculateArgs)).unwrap(),
            output_schema: None,
            annotations: None,
            cache_control: None,
        }
    }

    fn call(
        &self,
        args: Self::Args,
        _ctx: &ToolContext,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send {
        async move {
            let result = match args.operator.as_str() {
                "add" => args.left + args.right,
                "sub" => args.left - args.right,
                "mul" => args.left * args.right,
                "div" => args.left / args.right,
                other => return Err(CalcError::UnsupportedOperator(other.to_string())),
            };
            Ok(CalcOutput { result })
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Create a ToolRegistry and register the tool
    let mut registry = ToolRegistry::new();
    registry.register(CalculateTool).expect("fresh registry");

    // 2. List all tool definitions
    let definitions = registry.definitions();
    println!("Registered tools:");
    for def in &definitions {
        println!("  - {} : {}", def.name, def.description);
    }

    // 3. Build a ToolContext (required by the execution pipeline)
    let ctx = ToolContext {
        cwd: PathBuf::from("/tmp"),
        session_id: "example-session".into(),
        environment: HashMap::new(),
        cancellation_token: CancellationToken::new(),
        progress_reporter: None,
    };

    // 4. Execute the tool via the registry with JSON input
    let input = serde_json::json!({
        "left": 12.0,
        "right": 5.0,
        "operator": "mul"
    });

    let output = registry
        .execute("calculate", input, &ctx)
        .await
        .expect("tool execution should succeed");

    println!("\nTool output:");
    println!("  is_error: {}", output.is_error);
    for item in &output.content {
        if let neuron_types::ContentItem::Text(text) = item {
            println!("  content: {text}");
        }
    }
    if let Some(structured) = &output.structured_content {
        println!("  structured: {structured}");
    }

    // 5. Demonstrate direct typed call (bypassing registry)
    let typed_result = CalculateTool
        .call(
            CalculateArgs {
                left: 100.0,
                right: 7.0,
                operator: "div".into(),
            },
            &ctx,
        )
        .await
        .expect("typed call should succeed");

    println!("\nDirect typed call: 100 / 7 = {}", typed_result.result);
}
