//! Interactive chat over a remembered, streamed conversation.
//!
//! Every line is sent with streaming and persistence turned on. Tokens are
//! rendered as they are published on the conversation topic, so the loop
//! shows exactly what any other subscriber of that topic sees.

use std::io::{self, Write};

use parley::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Settings of a chat session.
#[derive(Debug, Clone, Default)]
pub struct ChatSessionConfig {
    /// Conversation key; reusing a key resumes its history.
    pub key: String,
    /// Model override.
    pub model: Option<String>,
    /// System context sent with every turn.
    pub system: Option<String>,
}

/// A REPL bound to one conversation key.
#[derive(Debug)]
pub struct ChatSession {
    orchestrator: Orchestrator,
    topics: BroadcastTopicPublisher,
    config: ChatSessionConfig,
}

impl ChatSession {
    /// Create a session.
    #[must_use]
    pub const fn new(
        orchestrator: Orchestrator,
        topics: BroadcastTopicPublisher,
        config: ChatSessionConfig,
    ) -> Self {
        Self {
            orchestrator,
            topics,
            config,
        }
    }

    fn request(&self, line: &str) -> RequestSpec {
        let mut spec = RequestSpec::new(line)
            .with_conversation_key(self.config.key.clone())
            .with_stream(true)
            .with_remember(true);
        spec.model.clone_from(&self.config.model);
        spec.system_context.clone_from(&self.config.system);
        spec
    }

    fn render(&self, event: &TopicEvent) {
        if event.topic == self.config.key {
            print!("{}", event.text);
            io::stdout().flush().ok();
        }
    }

    /// Send one line, printing tokens as they arrive.
    ///
    /// # Errors
    ///
    /// Returns the orchestrator's error; tokens printed before it stay printed.
    pub async fn send(&self, line: &str) -> parley::Result<Response> {
        let mut rx = self.topics.subscribe();
        let handle = self.orchestrator.handle(self.request(line));
        tokio::pin!(handle);

        let result = loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Ok(event) => self.render(&event),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "token display lagged"),
                    Err(RecvError::Closed) => {}
                },
                result = &mut handle => break result,
            }
        };

        // Fragments published right before completion.
        while let Ok(event) = rx.try_recv() {
            self.render(&event);
        }
        result
    }

    /// Run the read-eval-print loop until `exit`, `quit` or end of input.
    ///
    /// # Errors
    ///
    /// Fails only when stdin cannot be read; request errors are reported and
    /// the loop continues.
    pub async fn run(&self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        println!(
            "parley chat on '{}' (type 'exit' or Ctrl+D to quit)",
            self.config.key
        );
        println!();

        loop {
            print!("> ");
            stdout.flush()?;

            let mut input = String::new();
            if stdin.read_line(&mut input)? == 0 {
                break;
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }
            if matches!(input, "exit" | "quit") {
                break;
            }

            println!();
            match self.send(input).await {
                Ok(_) => println!(),
                Err(e) if e.is_retryable() => {
                    eprintln!("\nrate limited, try again shortly: {e}");
                }
                Err(e) => eprintln!("\nerror: {e}"),
            }
            println!();
        }

        Ok(())
    }
}
