//! Command parsing and the command registry.
//!
//! A message is a command iff its body starts with one of the configured
//! prefixes. The registry maps command names and aliases to handlers; it is
//! built once at startup and read-only afterwards.

use std::collections::{BTreeSet, HashMap};

use crate::error::RegistryError;

/// When a registered handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Invoked by name or alias after a prefix
    Command,
    /// Invoked for every message with a non-empty body
    OnBody,
    /// Invoked for every message with non-empty typed text
    OnText,
}

/// Static description of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Canonical name, unique within a registry
    pub pattern: String,
    /// Alternative names
    pub aliases: BTreeSet<String>,
    /// When the handler runs
    pub kind: EventKind,
    /// One-line help text
    pub description: String,
}

impl CommandDescriptor {
    /// Descriptor for a prefix command.
    pub fn command(pattern: impl Into<String>) -> Self {
        Self::with_kind(pattern, EventKind::Command)
    }

    /// Descriptor with an explicit event kind.
    pub fn with_kind(pattern: impl Into<String>, kind: EventKind) -> Self {
        Self { pattern: pattern.into(), aliases: BTreeSet::new(), kind, description: String::new() }
    }

    /// Add an alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Set the help text.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Parsed view of a message body, handed to every handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Body started with a command prefix
    pub is_cmd: bool,
    /// Lowercased command name. Empty when not a command.
    pub name: String,
    /// Argument string: text after the command name, or the whole body
    pub text: String,
    /// `text` split on whitespace
    pub args: Vec<String>,
    /// Full message body
    pub body: String,
}

impl Invocation {
    /// Parse a message body against the configured prefixes.
    ///
    /// The first prefix the body starts with wins.
    pub fn parse(body: &str, prefixes: &[String]) -> Self {
        let matched = prefixes.iter().find(|p| !p.is_empty() && body.starts_with(p.as_str()));

        let Some(prefix) = matched else {
            let text = body.trim().to_string();
            let args = split_args(&text);
            return Self { is_cmd: false, name: String::new(), text, args, body: body.to_string() };
        };

        let rest = body[prefix.len()..].trim_start();
        let (name, remainder) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let text = remainder.trim().to_string();
        let args = split_args(&text);

        Self { is_cmd: true, name: name.to_lowercase(), text, args, body: body.to_string() }
    }
}

fn split_args(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Index of a handler within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub usize);

/// Registered descriptor with its handler.
#[derive(Debug, Clone)]
pub struct Entry<H> {
    /// Handler ID (registry slot)
    pub id: HandlerId,
    /// Descriptor as registered (pattern and aliases lowercased)
    pub descriptor: CommandDescriptor,
    /// Handler invoked on dispatch
    pub handler: H,
}

/// Outcome of [`CommandRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New pattern
    Added(HandlerId),
    /// Pattern already registered. The new descriptor replaced the old one
    /// in the same slot.
    Replaced(HandlerId),
}

impl Registration {
    /// Slot the descriptor landed in.
    pub fn id(self) -> HandlerId {
        match self {
            Self::Added(id) | Self::Replaced(id) => id,
        }
    }
}

/// Mapping from command names and aliases to handlers.
///
/// Lookup is by equality. Alias collisions resolve to the lowest slot, which
/// is the registration order, so resolution is deterministic.
#[derive(Debug, Clone)]
pub struct CommandRegistry<H> {
    /// Registered entries, slot = `HandlerId`
    entries: Vec<Entry<H>>,
    /// Pattern → slot
    by_pattern: HashMap<String, usize>,
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self { entries: Vec::new(), by_pattern: HashMap::new() }
    }
}

impl<H> CommandRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// A pattern that is already registered is replaced: the last
    /// registration wins and keeps the earlier slot.
    ///
    /// # Errors
    ///
    /// - `RegistryError::InvalidPattern` if the pattern is empty or contains
    ///   whitespace
    pub fn register(
        &mut self,
        mut descriptor: CommandDescriptor,
        handler: H,
    ) -> Result<Registration, RegistryError> {
        let pattern = descriptor.pattern.trim().to_lowercase();
        if pattern.is_empty() || pattern.contains(char::is_whitespace) {
            return Err(RegistryError::InvalidPattern(descriptor.pattern));
        }
        descriptor.pattern = pattern;
        descriptor.aliases = descriptor
            .aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();

        if let Some(&slot) = self.by_pattern.get(&descriptor.pattern) {
            tracing::warn!(
                pattern = %descriptor.pattern,
                "duplicate command pattern, replacing earlier registration"
            );
            let id = HandlerId(slot);
            self.entries[slot] = Entry { id, descriptor, handler };
            return Ok(Registration::Replaced(id));
        }

        let slot = self.entries.len();
        let id = HandlerId(slot);
        self.by_pattern.insert(descriptor.pattern.clone(), slot);
        self.entries.push(Entry { id, descriptor, handler });
        Ok(Registration::Added(id))
    }

    /// Entry whose pattern equals `name`.
    pub fn find_by_pattern(&self, name: &str) -> Option<&Entry<H>> {
        self.by_pattern.get(name).map(|&slot| &self.entries[slot])
    }

    /// First entry (by slot) whose aliases contain `name`.
    pub fn find_by_alias(&self, name: &str) -> Option<&Entry<H>> {
        self.entries.iter().find(|e| e.descriptor.aliases.contains(name))
    }

    /// Resolve a command name: exact pattern first, then alias. Only
    /// [`EventKind::Command`] entries are considered.
    pub fn resolve_command(&self, name: &str) -> Option<&Entry<H>> {
        let is_command = |e: &&Entry<H>| e.descriptor.kind == EventKind::Command;

        self.find_by_pattern(name).filter(is_command).or_else(|| {
            self.entries
                .iter()
                .filter(is_command)
                .find(|e| e.descriptor.aliases.contains(name))
        })
    }

    /// Entries of the given kind, in slot order.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Entry<H>> {
        self.entries.iter().filter(move |e| e.descriptor.kind == kind)
    }

    /// Entry by ID.
    pub fn get(&self, id: HandlerId) -> Option<&Entry<H>> {
        self.entries.get(id.0)
    }

    /// All entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<H>> {
        self.entries.iter()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
