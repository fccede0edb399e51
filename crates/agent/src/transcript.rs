//! The message transcript of one generation run.

use unillm_core::message::Message;

/// Ordered, append-only log of the messages exchanged during a run.
///
/// There is no way to remove or edit a message once it has been pushed, so
/// the length only ever grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a transcript with caller-supplied history.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// An owned copy of the current contents, for recording in a step.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
