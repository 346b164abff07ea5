// Hyperlayer Conditions
//
// Guard predicates attached to rule units: persisted-variable checks and
// foreground-application matchers. Every condition is evaluated through the
// single `Predicate` interface.

use std::fmt;

use regex::Regex;
use smallvec::SmallVec;

use crate::state::VariableStore;

/// What a predicate can observe at dispatch time
pub struct EvalContext<'a> {
    /// Persisted variables
    pub store: &'a dyn VariableStore,
    /// Bundle identifier of the current foreground application
    pub frontmost: Option<&'a str>,
}

/// Anything that can gate a rule unit
pub trait Predicate {
    fn holds(&self, ctx: &EvalContext<'_>) -> bool;
}

/// Matcher on the foreground application's bundle identifier
#[derive(Debug, Clone)]
pub enum AppMatcher {
    /// Exact bundle identifier, e.g. `com.apple.Terminal`
    BundleId(String),
    /// Regular expression over the bundle identifier
    Pattern(Regex),
    /// Inverts the inner matcher
    Negated(Box<AppMatcher>),
}

impl AppMatcher {
    pub fn bundle_id(id: impl Into<String>) -> Self {
        AppMatcher::BundleId(id.into())
    }

    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Ok(AppMatcher::Pattern(Regex::new(source)?))
    }

    /// Invert this matcher, collapsing double negation
    pub fn negate(self) -> Self {
        match self {
            AppMatcher::Negated(inner) => *inner,
            other => AppMatcher::Negated(Box::new(other)),
        }
    }

    /// Innermost positive matcher and whether it is inverted overall
    pub fn normalized(&self) -> (&AppMatcher, bool) {
        let mut current = self;
        let mut negated = false;
        while let AppMatcher::Negated(inner) = current {
            negated = !negated;
            current = inner;
        }
        (current, negated)
    }

    /// Regular expression the remapping engine matches against
    ///
    /// Negation is not part of the expression; see [`AppMatcher::normalized`].
    pub fn regex_source(&self) -> String {
        match self {
            AppMatcher::BundleId(id) => format!("^{}$", regex::escape(id)),
            AppMatcher::Pattern(re) => re.as_str().to_string(),
            AppMatcher::Negated(inner) => inner.regex_source(),
        }
    }

    /// Parse a condition string into an AppMatcher
    ///
    /// Supported formats:
    /// - `bundle_id == "value"` - exact match
    /// - `bundle_id != "value"` - exact mismatch
    /// - `bundle_id =~ "pattern"` - regex match
    /// - `bundle_id !~ "pattern"` - regex mismatch
    ///
    /// # Examples
    /// ```
    /// use hyperlayer_core::condition::AppMatcher;
    ///
    /// let matcher = AppMatcher::parse("bundle_id =~ '^com\\.jetbrains\\.'").unwrap();
    /// assert!(matcher.matches(Some("com.jetbrains.intellij")));
    /// ```
    pub fn parse(condition: &str) -> Result<Self, ConditionParseError> {
        let trimmed = condition.trim();

        if trimmed.is_empty() {
            return Err(ConditionParseError::Empty);
        }

        // Leftmost operator wins so patterns may contain operator text
        let (pos, op) = ["==", "!=", "=~", "!~"]
            .iter()
            .filter_map(|op| trimmed.find(op).map(|pos| (pos, *op)))
            .min_by_key(|(pos, _)| *pos)
            .ok_or(ConditionParseError::MissingOperator)?;
        let field = trimmed[..pos].trim();
        let value = trimmed[pos + 2..].trim();

        if field != "bundle_id" {
            return Err(ConditionParseError::InvalidField(field.to_string()));
        }

        // Strip quotes from value (both single and double quotes)
        let value = if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            &value[1..value.len() - 1]
        } else {
            return Err(ConditionParseError::UnquotedValue(value.to_string()));
        };

        let matcher = match op {
            "==" | "!=" => AppMatcher::bundle_id(value),
            _ => AppMatcher::pattern(value)
                .map_err(|e| ConditionParseError::InvalidPattern(e.to_string()))?,
        };

        Ok(if op.starts_with('!') {
            matcher.negate()
        } else {
            matcher
        })
    }

    /// Check the matcher against a foreground bundle identifier
    pub fn matches(&self, frontmost: Option<&str>) -> bool {
        match self {
            AppMatcher::BundleId(id) => frontmost == Some(id.as_str()),
            AppMatcher::Pattern(re) => frontmost.is_some_and(|app| re.is_match(app)),
            AppMatcher::Negated(inner) => !inner.matches(frontmost),
        }
    }
}

impl PartialEq for AppMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AppMatcher::BundleId(a), AppMatcher::BundleId(b)) => a == b,
            (AppMatcher::Pattern(a), AppMatcher::Pattern(b)) => a.as_str() == b.as_str(),
            (AppMatcher::Negated(a), AppMatcher::Negated(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AppMatcher {}

impl Predicate for AppMatcher {
    fn holds(&self, ctx: &EvalContext<'_>) -> bool {
        self.matches(ctx.frontmost)
    }
}

impl fmt::Display for AppMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMatcher::BundleId(id) => write!(f, "bundle_id == '{}'", id),
            AppMatcher::Pattern(re) => write!(f, "bundle_id =~ '{}'", re.as_str()),
            AppMatcher::Negated(inner) => write!(f, "not ({})", inner),
        }
    }
}

/// Error parsing an application condition string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionParseError {
    /// Empty condition string
    Empty,
    /// Missing operator (==, !=, =~ or !~)
    MissingOperator,
    /// Invalid field name
    InvalidField(String),
    /// Unquoted value
    UnquotedValue(String),
    /// Regex did not compile
    InvalidPattern(String),
}

impl fmt::Display for ConditionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionParseError::Empty => write!(f, "Empty condition string"),
            ConditionParseError::MissingOperator => {
                write!(f, "Missing operator (==, !=, =~ or !~)")
            }
            ConditionParseError::InvalidField(field) => write!(f, "Invalid field: {}", field),
            ConditionParseError::UnquotedValue(val) => write!(f, "Value must be quoted: {}", val),
            ConditionParseError::InvalidPattern(msg) => write!(f, "Invalid pattern: {}", msg),
        }
    }
}

impl std::error::Error for ConditionParseError {}

/// A single guard condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Variable must currently equal `value`
    Variable { name: String, value: i64 },
    /// Foreground application must match
    Frontmost(AppMatcher),
}

impl Condition {
    pub fn variable(name: impl Into<String>, value: i64) -> Self {
        Condition::Variable {
            name: name.into(),
            value,
        }
    }

    /// Variable name this condition reads, if any
    pub fn reads(&self) -> Option<&str> {
        match self {
            Condition::Variable { name, .. } => Some(name),
            Condition::Frontmost(_) => None,
        }
    }
}

impl Predicate for Condition {
    fn holds(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Condition::Variable { name, value } => ctx.store.get(name) == *value,
            Condition::Frontmost(matcher) => matcher.holds(ctx),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Variable { name, value } => write!(f, "{} == {}", name, value),
            Condition::Frontmost(matcher) => write!(f, "{}", matcher),
        }
    }
}

/// Conjunctive list of conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet(SmallVec<[Condition; 4]>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition unless an identical one is already present
    pub fn push(&mut self, condition: Condition) {
        if !self.0.contains(&condition) {
            self.0.push(condition);
        }
    }

    pub fn extend(&mut self, other: &ConditionSet) {
        for condition in other.iter() {
            self.push(condition.clone());
        }
    }

    pub fn contains(&self, condition: &Condition) -> bool {
        self.0.contains(condition)
    }

    /// Check that every condition of `other` is present here
    pub fn includes(&self, other: &ConditionSet) -> bool {
        other.iter().all(|c| self.contains(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut set = ConditionSet::new();
        for condition in iter {
            set.push(condition);
        }
        set
    }
}

impl Predicate for ConditionSet {
    fn holds(&self, ctx: &EvalContext<'_>) -> bool {
        self.0.iter().all(|c| c.holds(ctx))
    }
}
