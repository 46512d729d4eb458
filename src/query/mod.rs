//! Ad-hoc tool interaction over the same session code path the runner uses.
//!
//! With no tool name, lists the server's tools; with one, calls it and
//! prints the result. JSON mode emits the raw result for piping.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::session::Session;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub tool: Option<String>,
    pub args: Value,
    pub json: bool,
    pub quiet: bool,
}

/// Run a query. Returns the process exit code.
pub async fn run_query(config: ServerConfig, options: QueryOptions) -> Result<i32> {
    let session = Session::new(config);
    session.connect().await?;

    let result = match &options.tool {
        None => list_tools(&session, &options).await,
        Some(tool) => call_tool(&session, tool, &options).await,
    };

    let _ = session.disconnect().await;
    result
}

async fn list_tools(session: &Session, options: &QueryOptions) -> Result<i32> {
    let tools = session.list_tools().await?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(0);
    }
    if !options.quiet {
        println!("{} tool(s) available:", tools.len());
    }
    for tool in &tools {
        match &tool.description {
            Some(description) => println!("  {} - {}", tool.name, description),
            None => println!("  {}", tool.name),
        }
    }
    Ok(0)
}

async fn call_tool(session: &Session, tool: &str, options: &QueryOptions) -> Result<i32> {
    match session.call_tool(tool, options.args.clone()).await {
        Ok(result) => {
            if options.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                if !options.quiet {
                    println!("Tool '{}' returned:", tool);
                }
                print_result(&result);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("Tool call failed: {}", e);
            Ok(1)
        }
    }
}

/// Render a tools/call result: text content blocks as plain lines, anything
/// else as pretty JSON.
fn print_result(result: &Value) {
    if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
        for block in content {
            match block.get("text").and_then(|t| t.as_str()) {
                Some(text) => println!("{}", text),
                None => println!("{}", block),
            }
        }
        return;
    }
    match serde_json::to_string_pretty(result) {
        Ok(rendered) => println!("{}", rendered),
        Err(_) => println!("{}", result),
    }
}
