//! `hintloop query`: Ask the knowledge base a question.
//!
//! By default the question goes through the full agent loop, which decides
//! when and how often to search. `--non-agentic` does one search and one
//! provider call with the hits pasted into the prompt.

use std::fmt::Write as _;

use anyhow::Context;
use hintloop_config::AppConfig;
use hintloop_core::message::Message;
use hintloop_core::provider::{Provider, ProviderRequest};
use hintloop_core::trigger::EventType;
use hintloop_tools::knowledge_base::{KnowledgeBaseClient, SearchHit};

const SINGLE_SHOT_PROMPT: &str = r#"You are an assistant that answers questions based on provided context from a knowledge base.

IMPORTANT RULES:
1. Only answer based on the provided context
2. Include citations in format [Doc: document_id]
3. If the context doesn't contain the answer, say so clearly
4. Be accurate and don't make up information"#;

const NO_CONTEXT: &str = "No relevant information found in the knowledge base.";

pub async fn run(question: String, non_agentic: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let url = config
        .tools
        .knowledge_base_url
        .clone()
        .context("No knowledge base configured: set [tools].knowledge_base_url")?;

    if !non_agentic {
        return super::run::run(Some(question), EventType::WebMessage).await;
    }

    let provider = hintloop_providers::build_from_config(&config)?;
    let kb = KnowledgeBaseClient::new(url, config.tools.knowledge_base_top_k)?;
    let answer = answer_once(provider.as_ref(), &kb, &config, &question).await?;
    println!("{answer}");
    Ok(())
}

/// One retrieval, one completion. No tools are offered to the model.
async fn answer_once(
    provider: &dyn Provider,
    kb: &KnowledgeBaseClient,
    config: &AppConfig,
    question: &str,
) -> anyhow::Result<String> {
    let hits = kb.search(question).await?;
    tracing::debug!(hits = hits.len(), "Single-shot retrieval");

    let request = ProviderRequest {
        model: config.provider_model(),
        messages: vec![
            Message::system(SINGLE_SHOT_PROMPT),
            Message::user(context_prompt(question, &hits)),
        ],
        temperature: config.temperature,
        max_tokens: Some(config.max_tokens),
        tools: Vec::new(),
        stream: false,
    };
    let response = provider.complete(request).await?;
    Ok(response.message.text().trim().to_string())
}

fn context_prompt(question: &str, hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(
            context,
            "[Document {}] (ID: {}, Chunk: {})\n{}",
            i + 1,
            hit.doc_id,
            hit.chunk_id,
            hit.text
        );
    }
    if context.is_empty() {
        context.push_str(NO_CONTEXT);
    }

    format!(
        "Context from knowledge base:\n{context}\n\nUser Question: {question}\n\nPlease answer the question based only on the provided context. Include citations."
    )
}
