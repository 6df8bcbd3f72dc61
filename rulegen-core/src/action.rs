use std::borrow::Cow;
use std::fmt;

/// Label returned by a step's finalize phase; selects the outgoing edge.
///
/// Steps with a fixed set of outcomes usually define their own enum and
/// convert it with `impl From<MyOutcome> for Action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Action(Cow<'static, str>);

impl Action {
    pub const DEFAULT: Action = Action(Cow::Borrowed("default"));

    pub const fn from_static(label: &'static str) -> Self {
        Action(Cow::Borrowed(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<&'static str> for Action {
    fn from(label: &'static str) -> Self {
        Action(Cow::Borrowed(label))
    }
}

impl From<String> for Action {
    fn from(label: String) -> Self {
        Action(Cow::Owned(label))
    }
}

impl AsRef<str> for Action {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
