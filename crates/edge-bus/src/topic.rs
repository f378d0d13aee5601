//! # Topics and Topic Filters
//!
//! Hierarchical topic strings and the wildcard filters used to match them.
//!
//! A [`Topic`] is a concrete destination such as `edge/gnss/rollcall`.
//! A [`TopicFilter`] may additionally contain `+` (exactly one segment)
//! and a trailing `#` (any remaining segments, including none).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::TOPIC_SEPARATOR;

/// Errors from parsing topics or filters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// The topic string was empty.
    #[error("Topic must not be empty")]
    Empty,

    /// A topic segment was empty (`a//b`).
    #[error("Topic {topic} contains an empty segment")]
    EmptySegment { topic: String },

    /// A wildcard appeared in a concrete topic.
    #[error("Wildcard {wildcard} not allowed in concrete topic {topic}")]
    WildcardInTopic { topic: String, wildcard: String },

    /// `#` must be the final segment of a filter.
    #[error("Multi-level wildcard must terminate filter {filter}")]
    MisplacedMultiWildcard { filter: String },
}

/// A concrete, validated topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    raw: String,
}

impl Topic {
    /// Parse and validate a topic string.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError`] if the string is empty, contains empty
    /// segments, or contains wildcard characters.
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }
        for segment in raw.split(TOPIC_SEPARATOR) {
            if segment.is_empty() {
                return Err(TopicError::EmptySegment {
                    topic: raw.to_string(),
                });
            }
            if segment == "+" || segment == "#" {
                return Err(TopicError::WildcardInTopic {
                    topic: raw.to_string(),
                    wildcard: segment.to_string(),
                });
            }
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// The topic as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Iterate the topic segments in order.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.raw.split(TOPIC_SEPARATOR)
    }

    /// The number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The segment at `index`, if present.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments().nth(index)
    }

    /// True if the final segment equals `suffix`.
    #[must_use]
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.segments().next_back() == Some(suffix)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One segment of a parsed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterSegment {
    /// Must match the segment exactly.
    Literal(String),
    /// `+` matches exactly one segment of any value.
    Single,
    /// `#` matches all remaining segments, including none.
    Rest,
}

/// A subscription filter with optional wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    segments: Vec<FilterSegment>,
}

impl TopicFilter {
    /// Parse and validate a filter string.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError`] if the string is empty, contains empty
    /// segments, or places `#` anywhere but last.
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }
        let parts: Vec<&str> = raw.split(TOPIC_SEPARATOR).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            match *part {
                "" => {
                    return Err(TopicError::EmptySegment {
                        topic: raw.to_string(),
                    })
                }
                "+" => segments.push(FilterSegment::Single),
                "#" => {
                    if i != parts.len() - 1 {
                        return Err(TopicError::MisplacedMultiWildcard {
                            filter: raw.to_string(),
                        });
                    }
                    segments.push(FilterSegment::Rest);
                }
                literal => segments.push(FilterSegment::Literal(literal.to_string())),
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The filter as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a concrete topic matches this filter.
    #[must_use]
    pub fn matches(&self, topic: &Topic) -> bool {
        let mut topic_segments = topic.segments();
        for filter_segment in &self.segments {
            match filter_segment {
                FilterSegment::Rest => return true,
                FilterSegment::Single => {
                    if topic_segments.next().is_none() {
                        return false;
                    }
                }
                FilterSegment::Literal(literal) => {
                    if topic_segments.next() != Some(literal.as_str()) {
                        return false;
                    }
                }
            }
        }
        topic_segments.next().is_none()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TopicFilter {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
