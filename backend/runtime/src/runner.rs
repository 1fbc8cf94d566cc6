//! A deterministic in-tree model runner.
//!
//! Stands in for an external inference backend during local development and
//! tests: it echoes the input back, one whitespace token at a time when
//! streaming.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use serde_json::json;

use agora_core::{
    IncrementalUnit, ModelCall, ModelRunner, RunnerOutput, TraceEntry, UnitStream, Usage,
};

pub struct EchoRunner;

impl EchoRunner {
    fn render(call: &ModelCall) -> String {
        format!("{}: {}", call.agent_name, call.input)
    }

    fn usage(call: &ModelCall, text: &str) -> Usage {
        Usage {
            input_tokens: call.input.split_whitespace().count() as u64,
            output_tokens: text.split_whitespace().count() as u64,
            latency_ms: 0,
        }
    }
}

#[async_trait]
impl ModelRunner for EchoRunner {
    async fn run(&self, call: ModelCall) -> Result<RunnerOutput> {
        let text = Self::render(&call);
        let usage = Self::usage(&call, &text);
        let trace = vec![TraceEntry::new(
            1,
            "respond",
            json!({ "input": call.input, "capabilities": call.capabilities.len() }),
        )];
        Ok(RunnerOutput { text, trace, usage })
    }

    async fn run_streamed(&self, call: ModelCall) -> Result<UnitStream> {
        let text = Self::render(&call);
        let usage = Self::usage(&call, &text);

        let mut units: Vec<Result<IncrementalUnit>> = text
            .split_whitespace()
            .map(|word| Ok(IncrementalUnit::Token(format!("{word} "))))
            .collect();
        units.push(Ok(IncrementalUnit::Usage(usage)));

        Ok(stream::iter(units).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn call(input: &str) -> ModelCall {
        ModelCall {
            agent_id: "echo".into(),
            agent_name: "Echo".into(),
            instructions: String::new(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 64,
            input: input.into(),
            context: None,
            step_budget: 4,
            capabilities: Vec::new(),
            memory: None,
        }
    }

    #[tokio::test]
    async fn test_run_has_single_trace_entry() {
        let out = EchoRunner.run(call("hi there")).await.unwrap();
        assert_eq!(out.text, "Echo: hi there");
        assert_eq!(out.trace.len(), 1);
        assert_eq!(out.usage.input_tokens, 2);
    }

    #[tokio::test]
    async fn test_streamed_tokens_reassemble() {
        let runner = Arc::new(EchoRunner);
        let mut stream = runner.run_streamed(call("one two three")).await.unwrap();
        let mut text = String::new();
        let mut saw_usage = false;
        while let Some(unit) = stream.next().await {
            match unit.unwrap() {
                IncrementalUnit::Token(t) => text.push_str(&t),
                IncrementalUnit::Usage(_) => saw_usage = true,
                IncrementalUnit::Step(_) => {}
            }
        }
        assert_eq!(text.trim_end(), "Echo: one two three");
        assert!(saw_usage);
    }
}
