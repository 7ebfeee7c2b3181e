//! JSON array envelopes exchanged over the session's text channel.
//!
//! Every envelope is a JSON array whose first element is an integer tag:
//!
//! | Tag | Shape |
//! |---|---|
//! | 1 | `[1, prefix, uri]` |
//! | 2 | `[2, call_id, procedure, arg...]` |
//! | 3 | `[3, call_id, result]` |
//! | 4 | `[4, call_id, error_uri, error_desc]` |
//! | 5 | `[5, topic]` |
//! | 6 | `[6, topic]` |
//! | 7 | `[7, topic, event]` |
//! | 8 | `[8, topic, event]` |

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

/// Envelope tags.
pub mod tag {
    /// `[1, prefix, uri]`
    pub const PREFIX: u64 = 1;
    /// `[2, call_id, procedure, args...]`
    pub const CALL: u64 = 2;
    /// `[3, call_id, result]`
    pub const CALL_RESULT: u64 = 3;
    /// `[4, call_id, error_uri, error_desc]`
    pub const CALL_ERROR: u64 = 4;
    /// `[5, topic]`
    pub const SUBSCRIBE: u64 = 5;
    /// `[6, topic]`
    pub const UNSUBSCRIBE: u64 = 6;
    /// `[7, topic, event]`
    pub const PUBLISH: u64 = 7;
    /// `[8, topic, event]`
    pub const EVENT: u64 = 8;
}

/// Errors raised while decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope is not a JSON array")]
    NotAnArray,

    #[error("envelope has no integer tag")]
    MissingTag,

    #[error("unknown envelope tag {tag}")]
    UnknownTag { tag: u64 },

    #[error("envelope is missing field `{field}`")]
    MissingField { field: &'static str },

    #[error("envelope field `{field}` must be a {expected}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
    },
}

/// A decoded session envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum WampEnvelope {
    /// Binds a CURIE prefix to a URI.
    Prefix { prefix: String, uri: String },
    /// Invokes `procedure` with positional arguments.
    Call {
        call_id: String,
        procedure: String,
        args: Vec<Value>,
    },
    /// Successful outcome of the call identified by `call_id`.
    CallResult { call_id: String, result: Value },
    /// Failed outcome of the call identified by `call_id`.
    CallError {
        call_id: String,
        error_uri: String,
        error_desc: String,
    },
    /// Asks the peer to forward events published to `topic`.
    Subscribe { topic: String },
    /// Stops forwarding of `topic`.
    Unsubscribe { topic: String },
    /// Publishes `event` to every subscriber of `topic`.
    Publish { topic: String, event: Value },
    /// An event published to a subscribed topic.
    Event { topic: String, event: Value },
}

impl WampEnvelope {
    /// Leading integer tag of the encoded array.
    #[must_use]
    pub const fn tag(&self) -> u64 {
        match self {
            Self::Prefix { .. } => tag::PREFIX,
            Self::Call { .. } => tag::CALL,
            Self::CallResult { .. } => tag::CALL_RESULT,
            Self::CallError { .. } => tag::CALL_ERROR,
            Self::Subscribe { .. } => tag::SUBSCRIBE,
            Self::Unsubscribe { .. } => tag::UNSUBSCRIBE,
            Self::Publish { .. } => tag::PUBLISH,
            Self::Event { .. } => tag::EVENT,
        }
    }

    /// Encode as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if an argument or event value cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> { serde_json::to_string(self) }

    /// Decode an envelope from UTF-8 JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when the input is not JSON or does not have
    /// the shape its tag requires.
    ///
    /// # Examples
    ///
    /// ```
    /// use wampframe::wamp::WampEnvelope;
    ///
    /// let envelope = WampEnvelope::from_slice(br#"[3, "abc", 42]"#).expect("valid envelope");
    /// assert_eq!(
    ///     envelope,
    ///     WampEnvelope::CallResult {
    ///         call_id: "abc".into(),
    ///         result: 42.into(),
    ///     }
    /// );
    /// ```
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Decode an envelope from an already parsed JSON value.
    ///
    /// Trailing elements beyond the shape of the tag are ignored.
    ///
    /// # Errors
    ///
    /// See [`from_slice`](Self::from_slice).
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Array(items) = value else {
            return Err(EnvelopeError::NotAnArray);
        };
        let tag = items
            .first()
            .and_then(Value::as_u64)
            .ok_or(EnvelopeError::MissingTag)?;
        let fields = Fields(&items);
        let envelope = match tag {
            tag::PREFIX => Self::Prefix {
                prefix: fields.string(1, "prefix")?,
                uri: fields.string(2, "uri")?,
            },
            tag::CALL => Self::Call {
                call_id: fields.string(1, "call_id")?,
                procedure: fields.string(2, "procedure")?,
                args: items.get(3..).map(<[Value]>::to_vec).unwrap_or_default(),
            },
            tag::CALL_RESULT => Self::CallResult {
                call_id: fields.string(1, "call_id")?,
                result: fields.value(2, "result")?,
            },
            tag::CALL_ERROR => Self::CallError {
                call_id: fields.string(1, "call_id")?,
                error_uri: fields.string(2, "error_uri")?,
                error_desc: fields.string(3, "error_desc")?,
            },
            tag::SUBSCRIBE => Self::Subscribe {
                topic: fields.string(1, "topic")?,
            },
            tag::UNSUBSCRIBE => Self::Unsubscribe {
                topic: fields.string(1, "topic")?,
            },
            tag::PUBLISH => Self::Publish {
                topic: fields.string(1, "topic")?,
                event: fields.value(2, "event")?,
            },
            tag::EVENT => Self::Event {
                topic: fields.string(1, "topic")?,
                event: fields.value(2, "event")?,
            },
            other => return Err(EnvelopeError::UnknownTag { tag: other }),
        };
        Ok(envelope)
    }
}

struct Fields<'a>(&'a [Value]);

impl Fields<'_> {
    fn value(&self, index: usize, field: &'static str) -> Result<Value, EnvelopeError> {
        self.0
            .get(index)
            .cloned()
            .ok_or(EnvelopeError::MissingField { field })
    }

    fn string(&self, index: usize, field: &'static str) -> Result<String, EnvelopeError> {
        match self.0.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(EnvelopeError::FieldType {
                field,
                expected: "string",
            }),
            None => Err(EnvelopeError::MissingField { field }),
        }
    }
}

impl Serialize for WampEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = match self {
            Self::Call { args, .. } => 3 + args.len(),
            Self::CallError { .. } => 4,
            Self::Subscribe { .. } | Self::Unsubscribe { .. } => 2,
            _ => 3,
        };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.tag())?;
        match self {
            Self::Prefix { prefix, uri } => {
                seq.serialize_element(prefix)?;
                seq.serialize_element(uri)?;
            }
            Self::Call {
                call_id,
                procedure,
                args,
            } => {
                seq.serialize_element(call_id)?;
                seq.serialize_element(procedure)?;
                for arg in args {
                    seq.serialize_element(arg)?;
                }
            }
            Self::CallResult { call_id, result } => {
                seq.serialize_element(call_id)?;
                seq.serialize_element(result)?;
            }
            Self::CallError {
                call_id,
                error_uri,
                error_desc,
            } => {
                seq.serialize_element(call_id)?;
                seq.serialize_element(error_uri)?;
                seq.serialize_element(error_desc)?;
            }
            Self::Subscribe { topic } | Self::Unsubscribe { topic } => {
                seq.serialize_element(topic)?;
            }
            Self::Publish { topic, event } | Self::Event { topic, event } => {
                seq.serialize_element(topic)?;
                seq.serialize_element(event)?;
            }
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn call_arguments_follow_procedure() {
        let envelope = WampEnvelope::Call {
            call_id: "Ab3_-xYz".into(),
            procedure: "http://example.com/calc#add".into(),
            args: vec![json!(23), json!({"x": [1, 2]})],
        };
        assert_eq!(
            envelope.to_json().expect("serialize"),
            r#"[2,"Ab3_-xYz","http://example.com/calc#add",23,{"x":[1,2]}]"#
        );
    }

    #[test]
    fn call_without_arguments_has_three_elements() {
        let envelope = WampEnvelope::Call {
            call_id: "id".into(),
            procedure: "p".into(),
            args: Vec::new(),
        };
        assert_eq!(envelope.to_json().expect("serialize"), r#"[2,"id","p"]"#);
    }

    #[rstest]
    #[case(json!([1, "calc", "http://example.com/calc#"]), WampEnvelope::Prefix { prefix: "calc".into(), uri: "http://example.com/calc#".into() })]
    #[case(json!([3, "c1", null]), WampEnvelope::CallResult { call_id: "c1".into(), result: Value::Null })]
    #[case(json!([4, "c1", "http://err#bad", "bad input", {"ignored": true}]), WampEnvelope::CallError { call_id: "c1".into(), error_uri: "http://err#bad".into(), error_desc: "bad input".into() })]
    #[case(json!([5, "t"]), WampEnvelope::Subscribe { topic: "t".into() })]
    #[case(json!([6, "t"]), WampEnvelope::Unsubscribe { topic: "t".into() })]
    #[case(json!([7, "t", [1]]), WampEnvelope::Publish { topic: "t".into(), event: json!([1]) })]
    #[case(json!([8, "t", {"a": 1}]), WampEnvelope::Event { topic: "t".into(), event: json!({"a": 1}) })]
    fn decodes_each_tag(#[case] value: Value, #[case] expected: WampEnvelope) {
        assert_eq!(WampEnvelope::from_value(value).expect("decode"), expected);
    }

    #[test]
    fn decodes_call_arguments() {
        let decoded = WampEnvelope::from_slice(br#"[2, "id", "proc", 1, "two"]"#).expect("decode");
        assert_eq!(
            decoded,
            WampEnvelope::Call {
                call_id: "id".into(),
                procedure: "proc".into(),
                args: vec![json!(1), json!("two")],
            }
        );
    }

    #[rstest]
    #[case(b"{\"tag\": 3}".as_slice(), "not a JSON array")]
    #[case(b"[]".as_slice(), "no integer tag")]
    #[case(b"[\"3\", \"id\", 1]".as_slice(), "no integer tag")]
    #[case(b"[99, \"id\"]".as_slice(), "unknown envelope tag 99")]
    #[case(b"[3, \"id\"]".as_slice(), "missing field `result`")]
    #[case(b"[4, \"id\", 5, \"desc\"]".as_slice(), "`error_uri` must be a string")]
    #[case(b"[3, ".as_slice(), "not valid JSON")]
    fn rejects_malformed_envelopes(#[case] input: &[u8], #[case] fragment: &str) {
        let err = WampEnvelope::from_slice(input).expect_err("must fail");
        assert!(err.to_string().contains(fragment), "{err}");
    }
}
