// Copyright (c) 2018 Nuclear Furnace
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
use std::collections::HashMap;

pub type HeaderMap = HashMap<String, String>;

/// Broker-supplied properties carried alongside a delivery's body.
///
/// Decoupled from `lapin`'s own types so this stays unit-testable without a
/// broker connection; `ConnectionSupervisor`/`QueueConsumer` build one of
/// these from each `lapin::message::Delivery` it receives.
#[derive(Debug, Clone, Default)]
pub struct DeliveryProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

/// An inbound message as surfaced by the broker library.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    pub consumer_tag: String,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: DeliveryProperties,
    pub headers: HeaderMap,
}

/// Stringifies a delivery into the fixed key set the `Processor` sees, per
/// the header projection rule. The original `Delivery` is never exposed to
/// the processor; only this mapping is.
pub fn project_headers(delivery: &Delivery) -> HeaderMap {
    let mut out = HeaderMap::new();

    if let Some(v) = &delivery.properties.content_type {
        out.insert("CONTENT_TYPE".to_string(), v.clone());
    }
    if let Some(v) = &delivery.properties.content_encoding {
        out.insert("CONTENT_ENCODING".to_string(), v.clone());
    }
    if let Some(v) = delivery.properties.delivery_mode {
        out.insert("DELIVERY_MODE".to_string(), v.to_string());
    }
    if let Some(v) = delivery.properties.priority {
        out.insert("PRIORITY".to_string(), v.to_string());
    }
    if let Some(v) = &delivery.properties.correlation_id {
        out.insert("CORRELATION_ID".to_string(), v.clone());
    }
    if let Some(v) = &delivery.properties.reply_to {
        out.insert("REPLY_TO".to_string(), v.clone());
    }
    if let Some(v) = &delivery.properties.expiration {
        out.insert("EXPIRATION".to_string(), v.clone());
    }
    if let Some(v) = &delivery.properties.message_id {
        out.insert("MESSAGE_ID".to_string(), v.clone());
    }
    if let Some(v) = delivery.properties.timestamp {
        out.insert("TIMESTAMP".to_string(), v.to_string());
    }
    if let Some(v) = &delivery.properties.kind {
        out.insert("TYPE".to_string(), v.clone());
    }
    if let Some(v) = &delivery.properties.user_id {
        out.insert("USER_ID".to_string(), v.clone());
    }
    if let Some(v) = &delivery.properties.app_id {
        out.insert("APP_ID".to_string(), v.clone());
    }

    out.insert("CONSUMER_TAG".to_string(), delivery.consumer_tag.clone());
    out.insert("DELIVERY_TAG".to_string(), delivery.delivery_tag.to_string());
    out.insert("REDELIVERED".to_string(), delivery.redelivered.to_string());
    out.insert("EXCHANGE".to_string(), delivery.exchange.clone());
    out.insert("ROUTING_KEY".to_string(), delivery.routing_key.clone());

    for (k, v) in &delivery.headers {
        out.insert(format!("AMQP_{}", k.to_uppercase()), v.clone());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Delivery {
        Delivery {
            body: b"hello".to_vec(),
            delivery_tag: 42,
            consumer_tag: "ctag-1".to_string(),
            exchange: "".to_string(),
            routing_key: "jobs".to_string(),
            redelivered: false,
            properties: DeliveryProperties {
                message_id: Some("msg-1".to_string()),
                ..Default::default()
            },
            headers: HeaderMap::from([("x-trace".to_string(), "abc".to_string())]),
        }
    }

    #[test]
    fn projects_fixed_fields() {
        let headers = project_headers(&sample());
        assert_eq!(headers.get("DELIVERY_TAG").map(String::as_str), Some("42"));
        assert_eq!(headers.get("MESSAGE_ID").map(String::as_str), Some("msg-1"));
        assert_eq!(headers.get("ROUTING_KEY").map(String::as_str), Some("jobs"));
        assert_eq!(headers.get("REDELIVERED").map(String::as_str), Some("false"));
    }

    #[test]
    fn projects_user_headers_uppercased_and_prefixed() {
        let headers = project_headers(&sample());
        assert_eq!(headers.get("AMQP_X-TRACE").map(String::as_str), Some("abc"));
    }
}
