//! Terminal clarification handler for `compile --interactive`

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stderr};
use tokio::sync::Mutex;

use super::parse_value;
use crate::domain::resolver::ParameterQuestion;
use crate::domain::{ClarificationHandler, DomainError};

/// Asks on one stream and reads answers line by line from another.
///
/// An empty line or end of input declines the question.
#[derive(Debug)]
pub struct PromptClarificationHandler<R, W> {
    io: Mutex<(R, W)>,
}

impl PromptClarificationHandler<BufReader<Stdin>, Stderr> {
    /// Questions on stderr so stdout carries only the JSON result
    pub fn terminal() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> PromptClarificationHandler<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

fn render(workflow: &str, question: &ParameterQuestion) -> String {
    let mut text = format!("[{}] {}", workflow, question.parameter);
    if !question.description.is_empty() {
        text.push_str(&format!(": {}", question.description));
    }
    text.push_str(&format!(" ({}", question.param_type));
    if let Some((min, max)) = question.range {
        text.push_str(&format!(", {} to {}", min, max));
    }
    if let Some(allowed) = &question.allowed {
        let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
        text.push_str(&format!(", one of {}", options.join(" | ")));
    }
    text.push_str(&format!(", default {})\n", question.default));

    if question.members.len() > 1 {
        text.push_str(&format!("  applies to: {}\n", question.members.join(", ")));
    }
    text.push_str(&format!("  context: \"{}\"\n", question.context));
    if let Some(reason) = &question.rejected {
        text.push_str(&format!("  previous answer rejected: {}\n", reason));
    }
    text.push_str("> ");
    text
}

#[async_trait]
impl<R, W> ClarificationHandler for PromptClarificationHandler<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask(
        &self,
        workflow: &str,
        question: &ParameterQuestion,
        _attempt: u32,
    ) -> Result<Option<Value>, DomainError> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let io_error = |e: std::io::Error| DomainError::internal(format!("Clarification prompt failed: {}", e));
        writer.write_all(render(workflow, question).as_bytes()).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;

        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(io_error)?;

        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| parse_value(answer)))
    }
}
