use std::sync::Arc;

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub output: String,
    /// Sent back as the exit status of `exec` requests. Zero means
    /// success.
    pub status: u32,
}

impl CommandOutput {
    pub fn new<S: Into<String>>(output: S, status: u32) -> Self {
        CommandOutput {
            output: output.into(),
            status,
        }
    }

    pub fn success<S: Into<String>>(output: S) -> Self {
        Self::new(output, 0)
    }

    pub fn failure<S: Into<String>>(output: S) -> Self {
        Self::new(output, 1)
    }
}

/// Interprets command text. This is where the business logic of a
/// server lives.
///
/// A processor may be called concurrently from several channels, so
/// any state it keeps must be synchronized. State shared between
/// processors (a chat room, say) should be handed to each of them at
/// construction.
pub trait CommandProcessor: Send + Sync {
    /// Runs one command.
    fn execute(&self, command: &str) -> CommandOutput;

    /// Printed before every line of an interactive shell.
    fn prompt(&self) -> String;

    /// Printed once when an interactive shell starts.
    fn welcome_message(&self) -> String;
}

/// Picks the processor serving an authenticated user. Called once per
/// connection.
pub trait ProcessorFactory: Send + Sync {
    fn processor(&self, user: &str) -> Arc<dyn CommandProcessor>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(&str) -> Arc<dyn CommandProcessor> + Send + Sync,
{
    fn processor(&self, user: &str) -> Arc<dyn CommandProcessor> {
        self(user)
    }
}
