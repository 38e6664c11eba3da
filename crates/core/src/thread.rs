//! Conversation thread and message domain types.
//!
//! A `Thread` is the append-only log every other component reads and
//! extends: the caller seeds it with a prompt, the generation client
//! appends assistant replies, tool-call records and tool results, and
//! the agent loop inspects what each call appended. Past messages are
//! never edited or removed.

use serde::{Deserialize, Serialize};

/// The role of a message author in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules)
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A model-issued request to invoke a registered tool by name.
///
/// Arguments stay as the raw JSON string the provider produced; decoding
/// into the tool's input shape happens at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID assigned by the provider
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// One piece of message content.
///
/// Modeled as a tagged union so every translation site matches
/// exhaustively; adding a new content kind is a compile-time-checked
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text. The only kind that participates in cache keys.
    Text { text: String },

    /// A reference to an image, carried through untouched.
    Image { url: String },

    /// The raw tool-call set recorded from an assistant reply.
    ToolCalls { calls: Vec<ToolCall> },

    /// The encoded output of one dispatched tool call.
    ToolResult {
        call_id: String,
        name: String,
        result: String,
    },
}

/// A single message: a role plus an ordered list of content items.
/// Created once, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub contents: Vec<Content>,
}

impl Message {
    /// Create a system message with one text content.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            contents: vec![Content::Text { text: text.into() }],
        }
    }

    /// Create a user message with one text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            contents: vec![Content::Text { text: text.into() }],
        }
    }

    /// Create an assistant message with one text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            contents: vec![Content::Text { text: text.into() }],
        }
    }

    /// Create an assistant message recording a raw tool-call set.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            contents: vec![Content::ToolCalls { calls }],
        }
    }

    /// Create a tool-role message carrying one call's encoded result.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            contents: vec![Content::ToolResult {
                call_id: call_id.into(),
                name: name.into(),
                result: result.into(),
            }],
        }
    }

    /// Append a content item, builder-style.
    pub fn add_content(mut self, content: Content) -> Self {
        self.contents.push(content);
        self
    }

    /// Concatenation of all text contents, newline-separated.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .contents
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        parts.join("\n")
    }

    /// The tool calls recorded in this message, if any.
    pub fn tool_call_set(&self) -> &[ToolCall] {
        for content in &self.contents {
            if let Content::ToolCalls { calls } = content {
                return calls;
            }
        }
        &[]
    }

    /// Whether this message records at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_call_set().is_empty()
    }

    /// Whether every content item is plain text.
    pub fn is_text_only(&self) -> bool {
        self.contents
            .iter()
            .all(|c| matches!(c, Content::Text { .. }))
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.role)?;
        for content in &self.contents {
            match content {
                Content::Text { text } => write!(f, " {text}")?,
                Content::Image { url } => write!(f, " [image: {url}]")?,
                Content::ToolCalls { calls } => {
                    for call in calls {
                        write!(f, " [call {}({})]", call.name, call.arguments)?;
                    }
                }
                Content::ToolResult { name, result, .. } => {
                    write!(f, " [{name} -> {result}]")?;
                }
            }
        }
        Ok(())
    }
}

/// An ordered, append-only conversation log.
///
/// The message list is private: the only mutations are appends, which is
/// what makes a thread safe to hand to observation hooks without letting
/// them corrupt already-recorded generations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    messages: Vec<Message>,
}

impl Thread {
    /// Create a new empty thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn add_message(&mut self, message: Message) -> &mut Self {
        self.messages.push(message);
        self
    }

    /// Append several messages in order, as one batch.
    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) -> &mut Self {
        self.messages.extend(messages);
        self
    }

    /// All messages, in append order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recently appended message.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The concatenation of all user-authored text content,
    /// newline-separated. Used as the cache key and as a minimal
    /// context summary.
    pub fn user_query(&self) -> String {
        let parts: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(Message::text)
            .filter(|t| !t.is_empty())
            .collect();
        parts.join("\n")
    }
}

impl std::fmt::Display for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, model!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, model!");
        assert!(!msg.has_tool_calls());
        assert!(msg.is_text_only());
    }

    #[test]
    fn thread_appends_in_order() {
        let mut thread = Thread::new();
        thread.add_message(Message::user("first"));
        thread.add_messages([Message::assistant("second"), Message::user("third")]);

        assert_eq!(thread.len(), 3);
        assert_eq!(thread.messages()[0].text(), "first");
        assert_eq!(thread.messages()[1].text(), "second");
        assert_eq!(thread.last_message().unwrap().text(), "third");
    }

    #[test]
    fn empty_thread_has_no_last_message() {
        let thread = Thread::new();
        assert!(thread.is_empty());
        assert!(thread.last_message().is_none());
    }

    #[test]
    fn user_query_concatenates_user_text_only() {
        let mut thread = Thread::new();
        thread.add_message(Message::system("rules"));
        thread.add_message(Message::user("what is"));
        thread.add_message(Message::assistant("hmm"));
        thread.add_message(Message::user("the answer"));

        assert_eq!(thread.user_query(), "what is\nthe answer");
    }

    #[test]
    fn user_query_skips_non_text_content() {
        let mut thread = Thread::new();
        thread.add_message(Message::user("look at this").add_content(Content::Image {
            url: "https://example.com/cat.png".into(),
        }));

        assert_eq!(thread.user_query(), "look at this");
    }

    #[test]
    fn tool_call_message_helpers() {
        let msg = Message::tool_calls(vec![ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: r#"{"expr":"2+2"}"#.into(),
        }]);

        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.has_tool_calls());
        assert!(!msg.is_text_only());
        assert_eq!(msg.tool_call_set()[0].name, "calculator");
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn tool_result_message_shape() {
        let msg = Message::tool_result("call_1", "calculator", "4");
        assert_eq!(msg.role, Role::Tool);
        match &msg.contents[0] {
            Content::ToolResult {
                call_id,
                name,
                result,
            } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "calculator");
                assert_eq!(result, "4");
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn content_serialization_is_tagged() {
        let content = Content::Text {
            text: "hello".into(),
        };
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains(r#""type":"text""#));

        let back: Content = serde_json::from_str(&json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::tool_calls(vec![ToolCall {
            id: "t1".into(),
            name: "search".into(),
            arguments: "{}".into(),
        }]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn thread_display_lists_messages() {
        let mut thread = Thread::new();
        thread.add_message(Message::user("hi"));
        thread.add_message(Message::assistant("hello"));
        let rendered = thread.to_string();
        assert!(rendered.contains("user: hi"));
        assert!(rendered.contains("assistant: hello"));
    }
}
