//! Analysis prompts and result formatting
//!
//! Turns a job's type and payload into the chat messages sent to the LLM,
//! and the LLM's answer into the result document clients fetch.

use serde_json::{json, Value};

use crate::queue::JobPayload;
use crate::types::{LLMMessage, LLMResponse};

/// Task instructions for the analysis kinds the frontend offers. Unknown
/// kinds still get a generic analysis.
pub fn instructions_for(job_type: &str) -> &'static str {
    match job_type.to_ascii_lowercase().as_str() {
        "summary" | "summarize" => {
            "Summarize the content in a few short paragraphs, keeping the key facts and conclusions."
        }
        "sentiment" => {
            "Determine the overall sentiment (positive, negative, neutral or mixed), \
             explain the main signals behind it and quote the most telling passages."
        }
        "keywords" => "Extract the most important keywords and key phrases, ordered by relevance.",
        "entities" => {
            "List the named entities (people, organizations, places, products, dates) with their role in the content."
        }
        "readability" => {
            "Assess readability: audience level, sentence complexity, jargon, and concrete suggestions to simplify."
        }
        "seo" => {
            "Review the content for search optimization: suggested title, meta description, \
             target keywords and structural improvements."
        }
        "tone" => "Describe the tone and voice of the content and how consistent it is.",
        _ => "Analyze the content and report the most relevant findings.",
    }
}

/// System/user prompt pair for a job.
pub fn build_messages(job_type: &str, payload: &JobPayload) -> Vec<LLMMessage> {
    let system = format!(
        "You are an expert content analyst performing a \"{}\" analysis. {} \
         Answer in concise Markdown.",
        job_type,
        instructions_for(job_type)
    );

    let user = match (payload.text.as_deref(), payload.file_url.as_deref()) {
        (Some(text), _) if !text.is_empty() => text.to_string(),
        (_, Some(url)) => format!(
            "Analyze the document available at the following URL: {}\n\
             If you cannot access it, say so instead of guessing its content.",
            url
        ),
        _ => "No content was provided.".to_string(),
    };

    vec![LLMMessage::system(system), LLMMessage::user(user)]
}

/// Result document stored and cached for a finished job.
pub fn format_result(job_type: &str, response: &LLMResponse) -> Value {
    json!({
        "success": true,
        "data": {
            "content": response.content,
            "type": job_type,
        },
        "metadata": {
            "model": response.model,
            "created": response.created,
        }
    })
}
