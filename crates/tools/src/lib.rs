//! Built-in tool implementations for hintloop.
//!
//! Tools give the agent the ability to interact with the world: read and
//! write files, run shell commands and Python snippets, keep a TODO list,
//! query a retrieval service, and proxy tools hosted by MCP servers.

pub mod code_interpreter;
pub mod file_read;
pub mod file_write;
pub mod knowledge_base;
pub mod mcp;
pub mod shell;
pub mod todo;

use std::sync::Arc;
use std::time::Duration;

use hintloop_config::AppConfig;
use hintloop_core::tool::ToolRegistry;
use tracing::warn;

/// A registry plus the names of the tools that came from MCP servers.
pub struct ToolSet {
    pub registry: ToolRegistry,
    pub mcp_tools: Vec<String>,
}

/// Registry with the local tools only, in declaration order: file, code,
/// shell, TODO, then the retrieval tools when a knowledge base URL is set.
pub fn builtin_registry(config: &AppConfig) -> hintloop_core::Result<ToolRegistry> {
    let tools = &config.tools;
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(file_read::FileReadTool))?;
    registry.register(Box::new(file_write::FileWriteTool))?;
    registry.register(Box::new(code_interpreter::CodeInterpreterTool::new(
        tools.python.clone(),
        Duration::from_secs(tools.code_timeout_secs),
    )))?;
    registry.register(Box::new(shell::ShellTool::new(Duration::from_secs(
        tools.command_timeout_secs,
    ))))?;

    if config.hints.todo_list {
        registry.register(Box::new(todo::RewriteTodoTool))?;
        registry.register(Box::new(todo::UpdateTodoTool))?;
    }

    if let Some(url) = &tools.knowledge_base_url {
        let client = Arc::new(knowledge_base::KnowledgeBaseClient::new(
            url.clone(),
            tools.knowledge_base_top_k,
        )?);
        registry.register(Box::new(knowledge_base::KnowledgeBaseSearchTool::new(
            Arc::clone(&client),
        )))?;
        registry.register(Box::new(knowledge_base::GetDocumentTool::new(client)))?;
    }

    Ok(registry)
}

/// Built-in tools plus, when enabled, every tool discovered on the
/// configured MCP servers.
pub async fn build_toolset(config: &AppConfig) -> hintloop_core::Result<ToolSet> {
    let mut registry = builtin_registry(config)?;
    let mut mcp_tools = Vec::new();

    if config.mcp.enabled {
        for tool in mcp::discover(&config.mcp.servers, config.mcp.timeout_secs).await {
            let name = hintloop_core::Tool::name(&tool).to_string();
            let server = tool.server_name().to_string();
            match registry.register(Box::new(tool)) {
                Ok(()) => mcp_tools.push(name),
                Err(e) => warn!(server = %server, error = %e, "Skipping MCP tool"),
            }
        }
    }

    Ok(ToolSet {
        registry,
        mcp_tools,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hintloop_core::tool::Tool;

    #[test]
    fn default_registry_order() {
        let registry = builtin_registry(&AppConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "read_file",
                "write_file",
                "code_interpreter",
                "execute_command",
                "rewrite_todo_list",
                "update_todo_status",
            ]
        );
    }

    #[test]
    fn knowledge_base_tools_when_configured() {
        let mut config = AppConfig::default();
        config.tools.knowledge_base_url = Some("http://localhost:4242".into());
        config.hints.todo_list = false;
        let registry = builtin_registry(&config).unwrap();
        assert!(registry.get("knowledge_base_search").is_some());
        assert!(registry.get("get_document").is_some());
        assert!(registry.get("rewrite_todo_list").is_none());
    }

    #[tokio::test]
    async fn mcp_disabled_adds_nothing() {
        let set = build_toolset(&AppConfig::default()).await.unwrap();
        assert!(set.mcp_tools.is_empty());
        assert_eq!(set.registry.len(), 6);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn colliding_mcp_tools_are_skipped() {
        // "read" + "file" collides with the built-in read_file; "lookup" repeats
        let server_script = r#"
while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*)
      echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}' ;;
    *'"method":"tools/list"'*)
      echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"file"},{"name":"lookup"},{"name":"lookup"}]}}' ;;
  esac
done
"#;
        let mut config = AppConfig::default();
        config.mcp.enabled = true;
        config.mcp.servers = vec![hintloop_config::McpServerConfig {
            name: "read".into(),
            command: "sh".into(),
            args: vec!["-c".into(), server_script.into()],
            env: Default::default(),
        }];

        let set = build_toolset(&config).await.unwrap();
        assert_eq!(set.mcp_tools, vec!["read_lookup"]);
        assert_eq!(set.registry.len(), 7);
        assert_eq!(set.registry.get("read_file").unwrap().description(), file_read::FileReadTool.description());
    }
}
