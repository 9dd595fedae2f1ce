//! Opaque continuation tokens.
//!
//! A token captures where a page ended: the resume key tuple of the last
//! record returned, stamped with the model, index, and plan shape it was
//! issued for. Resuming re-coerces every tuple value against the model's
//! declared types, so the round trip through JSON (where dates and
//! decimals travel as strings) loses nothing.
//!
//! Tokens are deliberately opaque to callers. The encoding is URL-safe
//! base64 over a JSON payload, a shape callers must not rely on.

use garnet_types::Record;
use serde::{Deserialize, Serialize};

use crate::coerce;
use crate::error::{QueryError, Result};
use crate::plan::QueryPlan;
use crate::schema::Capability;

const TOKEN_VERSION: u8 = 1;

/// An opaque continuation token, safe to embed in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(String);

impl PageToken {
    /// Wraps a token string received from a caller.
    pub fn new(token: impl Into<String>) -> Self {
        PageToken(token.into())
    }

    /// The token's wire form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token into its wire form.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PageToken {
    fn from(token: String) -> Self {
        PageToken(token)
    }
}

impl From<&str> for PageToken {
    fn from(token: &str) -> Self {
        PageToken(token.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    v: u8,
    model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<String>,
    scan: bool,
    last: Record,
}

/// Issues a token that resumes strictly after `last`.
///
/// Only the plan's resume tuple is captured, not the whole record.
///
/// # Errors
///
/// [`QueryError::InvalidToken`] when `last` is missing a resume field,
/// which means the backend returned a record without its keys.
///
/// [`QueryError::InvalidToken`]: crate::QueryError::InvalidToken
pub fn encode(capability: &Capability, plan: &QueryPlan, last: &Record) -> Result<PageToken> {
    let index = plan
        .chosen_index
        .as_deref()
        .map(|name| capability.index_or_err(name))
        .transpose()?;

    let mut resume = Record::new();
    for field in capability.resume_fields(index) {
        let value = last.get(&field).ok_or_else(|| {
            QueryError::token(format!("cannot issue token: record missing key field `{field}`"))
        })?;
        resume.set(field, value.clone());
    }

    let payload = TokenPayload {
        v: TOKEN_VERSION,
        model: capability.model().to_string(),
        index: plan.chosen_index.clone(),
        scan: plan.is_scan,
        last: resume,
    };
    let json = serde_json::to_vec(&payload)
        .map_err(|e| QueryError::token(format!("cannot issue token: {e}")))?;

    use base64::Engine;
    Ok(PageToken(
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json),
    ))
}

/// Decodes a token back into the resume tuple for the same plan.
///
/// The token must have been issued by [`encode`] for the same model,
/// index, and plan shape; every mismatch is detected from the payload
/// stamp and rejected. Tuple values are re-coerced against the model's
/// declared types, so the returned record carries canonical variants
/// ready for key comparison.
///
/// # Errors
///
/// [`QueryError::InvalidToken`] naming what failed: undecodable input, a
/// version from a different release, a model/index/shape mismatch, or a
/// tuple value that no longer fits its field.
///
/// [`QueryError::InvalidToken`]: crate::QueryError::InvalidToken
pub fn resume(capability: &Capability, plan: &QueryPlan, token: &PageToken) -> Result<Record> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_str())
        .map_err(|_| QueryError::token("not base64"))?;
    let payload: TokenPayload =
        serde_json::from_slice(&bytes).map_err(|_| QueryError::token("malformed payload"))?;

    if payload.v != TOKEN_VERSION {
        return Err(QueryError::token(format!(
            "unsupported token version {}",
            payload.v
        )));
    }
    if payload.model != capability.model() {
        return Err(QueryError::token(format!(
            "token was issued for model `{}`",
            payload.model
        )));
    }
    if payload.index != plan.chosen_index {
        return Err(QueryError::token(match &payload.index {
            Some(index) => format!("token was issued for index `{index}`"),
            None => "token was issued for the base table".to_string(),
        }));
    }
    if payload.scan != plan.is_scan {
        return Err(QueryError::token("token was issued for a different plan shape"));
    }

    let index = plan
        .chosen_index
        .as_deref()
        .map(|name| capability.index_or_err(name))
        .transpose()?;

    let mut resume = Record::new();
    for field in capability.resume_fields(index) {
        let raw = payload
            .last
            .get(&field)
            .ok_or_else(|| QueryError::token(format!("missing resume field `{field}`")))?;
        let semantic = capability.field_type_or_err(&field)?;
        let value = coerce::stored(semantic, raw).ok_or_else(|| {
            QueryError::token(format!("resume field `{field}` does not fit its type"))
        })?;
        resume.set(field, value);
    }
    Ok(resume)
}
