//! Human-in-the-loop seam used in interactive mode.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stderr, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

/// Operator verdict on a proposed final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Review {
    Approve,
    Reject { feedback: String },
}

/// Operator choice after a tool call could not be rescued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureChoice {
    Continue,
    Feedback(String),
}

/// Reviews answers and unrecoverable tool failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Operator: Send + Sync {
    async fn review_answer(&self, answer: &str) -> Review;

    async fn review_failure(&self, tool: &str, error: &str) -> FailureChoice;
}

/// Line-oriented operator reading replies from `reader`.
pub struct ConsoleOperator<R, W> {
    io: Mutex<(R, W)>,
}

impl ConsoleOperator<BufReader<Stdin>, Stderr> {
    /// Operator on the process's stdin, prompting on stderr.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    async fn ask(&self, prompt: &str) -> String {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        if let Err(e) = writer.write_all(prompt.as_bytes()).await {
            warn!(error = %e, "Failed to write operator prompt");
        }
        let _ = writer.flush().await;

        let mut line = String::new();
        if let Err(e) = reader.read_line(&mut line).await {
            warn!(error = %e, "Failed to read operator reply");
        }
        line.trim().to_string()
    }
}

#[async_trait]
impl<R, W> Operator for ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn review_answer(&self, answer: &str) -> Review {
        let reply = self
            .ask(&format!("\nProposed answer: {answer}\nApprove? [y/N] "))
            .await;
        if reply.to_lowercase().starts_with('y') {
            return Review::Approve;
        }
        let feedback = self.ask("Feedback for the agent: ").await;
        Review::Reject { feedback }
    }

    async fn review_failure(&self, tool: &str, error: &str) -> FailureChoice {
        let reply = self
            .ask(&format!(
                "\nTool {tool} failed: {error}\nPress enter to continue, or type feedback: "
            ))
            .await;
        if reply.is_empty() {
            FailureChoice::Continue
        } else {
            FailureChoice::Feedback(reply)
        }
    }
}
