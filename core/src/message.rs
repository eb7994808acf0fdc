//! Retrieved messages and JSON payload rendering.

use std::borrow::Cow;

use fe2o3_amqp::types::messaging::{AmqpValue, Body};
use fe2o3_amqp::types::primitives::Value;
use fe2o3_amqp::Delivery;

use crate::error::FormatError;

/// A message pulled from the queue, together with the delivery handle needed
/// to later accept or release it.
pub struct RetrievedMessage {
    pub(crate) delivery: Delivery<Body<Value>>,
}

impl RetrievedMessage {
    pub(crate) fn new(delivery: Delivery<Body<Value>>) -> Self {
        Self { delivery }
    }

    /// Raw payload bytes of the first body section.
    pub fn payload(&self) -> Result<Cow<'_, [u8]>, FormatError> {
        body_bytes(self.delivery.body())
    }

    /// The payload re-serialized as indented JSON.
    pub fn format_json(&self) -> Result<String, FormatError> {
        format_message(&self.payload()?)
    }

    /// Lossy text rendering for display when the payload is not JSON.
    pub fn display_lossy(&self) -> String {
        match self.payload() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => "<no displayable payload>".to_string(),
        }
    }
}

/// Parses `payload` as JSON and re-serializes it indented, preserving key
/// order.
pub fn format_message(payload: &[u8]) -> Result<String, FormatError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

fn body_bytes(body: &Body<Value>) -> Result<Cow<'_, [u8]>, FormatError> {
    match body {
        Body::Data(batch) => batch
            .iter()
            .next()
            .map(|data| Cow::Borrowed(data.0.as_ref()))
            .ok_or(FormatError::EmptyBody),
        Body::Value(AmqpValue(Value::String(text))) => Ok(Cow::Borrowed(text.as_bytes())),
        Body::Value(AmqpValue(Value::Binary(bytes))) => Ok(Cow::Borrowed(bytes.as_ref())),
        Body::Empty => Err(FormatError::EmptyBody),
        _ => Err(FormatError::UnsupportedBody),
    }
}

#[cfg(test)]
mod tests {
    use fe2o3_amqp::types::messaging::{AmqpValue, Batch, Body, Data};
    use fe2o3_amqp::types::primitives::{Binary, Value};

    use super::{body_bytes, format_message};
    use crate::error::FormatError;

    #[test]
    fn formats_json_indented() {
        let out = format_message(br#"{"a":1}"#).unwrap();
        assert_eq!(out, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn preserves_key_order() {
        let out = format_message(br#"{"b":1,"a":2}"#).unwrap();
        assert_eq!(out, "{\n  \"b\": 1,\n  \"a\": 2\n}");
    }

    #[test]
    fn rejects_non_json_payload() {
        assert!(matches!(
            format_message(b"definitely not json"),
            Err(FormatError::Json(_))
        ));
    }

    #[test]
    fn extracts_data_section_bytes() {
        let body: Body<Value> = Body::Data(Batch::new(vec![Data(Binary::from(
            br#"{"a":1}"#.to_vec(),
        ))]));
        assert_eq!(body_bytes(&body).unwrap().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn extracts_string_value_body() {
        let body: Body<Value> = Body::Value(AmqpValue(Value::String("{}".to_string())));
        assert_eq!(body_bytes(&body).unwrap().as_ref(), b"{}");
    }

    #[test]
    fn empty_body_is_an_error() {
        let body: Body<Value> = Body::Empty;
        assert!(matches!(body_bytes(&body), Err(FormatError::EmptyBody)));
    }

    #[test]
    fn non_text_value_body_is_unsupported() {
        let body: Body<Value> = Body::Value(AmqpValue(Value::Bool(true)));
        assert!(matches!(
            body_bytes(&body),
            Err(FormatError::UnsupportedBody)
        ));
    }
}
