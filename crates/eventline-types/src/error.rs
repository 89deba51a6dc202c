//! Validation errors raised at the boundary where requests become domain values.

/// A request value that cannot be turned into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// `group_by` is not one of `none`, `channel`, `hour`, `day`.
    #[error("unsupported group_by: {0}. Expected one of: none, channel, hour, day")]
    UnsupportedGroupBy(String),

    /// `channel` is not one of the known delivery channels.
    #[error("unsupported channel: {0}. Expected one of: web, mobile, api, email, push")]
    UnsupportedChannel(String),
}
