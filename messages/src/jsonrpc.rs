//! JSON-RPC 2.0 frames exchanged with servers.
//!
//! Queries carry a numeric `id` except `broadcast`, which servers push
//! without expecting an answer. Answers are either `result` (`0` for
//! acknowledgments, an array of messages for `catchup`) or `error`.

use lao_types::Channel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MessageError, MessageGeneral};

const VERSION: &str = "2.0";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Publish {
        channel: Channel,
        message: MessageGeneral,
    },
    Subscribe {
        channel: Channel,
    },
    Unsubscribe {
        channel: Channel,
    },
    Catchup {
        channel: Channel,
    },
    Broadcast {
        channel: Channel,
        message: MessageGeneral,
    },
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::Publish { .. } => "publish",
            Call::Subscribe { .. } => "subscribe",
            Call::Unsubscribe { .. } => "unsubscribe",
            Call::Catchup { .. } => "catchup",
            Call::Broadcast { .. } => "broadcast",
        }
    }

    pub fn channel(&self) -> &Channel {
        match self {
            Call::Publish { channel, .. }
            | Call::Subscribe { channel }
            | Call::Unsubscribe { channel }
            | Call::Catchup { channel }
            | Call::Broadcast { channel, .. } => channel,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub id: Option<u64>,
    pub call: Call,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerResult {
    Ack,
    Messages(Vec<MessageGeneral>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Answer {
    pub id: Option<u64>,
    pub outcome: Result<AnswerResult, ErrorBody>,
}

/// Anything that can arrive on a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Query(Query),
    Answer(Answer),
}

#[derive(Serialize, Deserialize)]
struct ChannelParams {
    channel: Channel,
}

#[derive(Serialize, Deserialize)]
struct MessageParams {
    channel: Channel,
    message: MessageGeneral,
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Query {
    pub fn new(id: u64, call: Call) -> Self {
        Self { id: Some(id), call }
    }

    pub fn broadcast(channel: Channel, message: MessageGeneral) -> Self {
        Self {
            id: None,
            call: Call::Broadcast { channel, message },
        }
    }
}

impl Answer {
    pub fn ack(id: u64) -> Self {
        Self {
            id: Some(id),
            outcome: Ok(AnswerResult::Ack),
        }
    }

    pub fn messages(id: u64, messages: Vec<MessageGeneral>) -> Self {
        Self {
            id: Some(id),
            outcome: Ok(AnswerResult::Messages(messages)),
        }
    }

    pub fn error(id: Option<u64>, code: i64, description: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Err(ErrorBody {
                code,
                description: description.into(),
            }),
        }
    }
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        if raw.jsonrpc != VERSION {
            return Err(MessageError::Json(format!(
                "unsupported jsonrpc version {:?}",
                raw.jsonrpc
            )));
        }
        if let Some(method) = raw.method {
            let params = raw
                .params
                .ok_or_else(|| MessageError::Json(format!("`{method}` without params")))?;
            let call = match method.as_str() {
                "publish" | "broadcast" => {
                    let p: MessageParams = serde_json::from_value(params)?;
                    if method == "publish" {
                        Call::Publish { channel: p.channel, message: p.message }
                    } else {
                        Call::Broadcast { channel: p.channel, message: p.message }
                    }
                }
                "subscribe" | "unsubscribe" | "catchup" => {
                    let channel = serde_json::from_value::<ChannelParams>(params)?.channel;
                    match method.as_str() {
                        "subscribe" => Call::Subscribe { channel },
                        "unsubscribe" => Call::Unsubscribe { channel },
                        _ => Call::Catchup { channel },
                    }
                }
                other => return Err(MessageError::Json(format!("unknown method {other:?}"))),
            };
            return Ok(Frame::Query(Query { id: raw.id, call }));
        }

        let outcome = match (raw.result, raw.error) {
            (_, Some(error)) => Err(error),
            (Some(Value::Array(items)), None) => {
                let messages = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<MessageGeneral>, _>>()?;
                Ok(AnswerResult::Messages(messages))
            }
            (Some(Value::Number(n)), None) if n.as_u64() == Some(0) => Ok(AnswerResult::Ack),
            (Some(other), None) => {
                return Err(MessageError::Json(format!("unexpected result {other}")))
            }
            (None, None) => {
                return Err(MessageError::Json("frame has neither method nor result".into()))
            }
        };
        Ok(Frame::Answer(Answer { id: raw.id, outcome }))
    }

    pub fn to_text(&self) -> Result<String, MessageError> {
        let mut raw = RawFrame {
            jsonrpc: VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        };
        match self {
            Frame::Query(query) => {
                raw.id = query.id;
                raw.method = Some(query.call.method().to_string());
                raw.params = Some(match &query.call {
                    Call::Publish { channel, message } | Call::Broadcast { channel, message } => {
                        serde_json::to_value(MessageParams {
                            channel: channel.clone(),
                            message: message.clone(),
                        })?
                    }
                    Call::Subscribe { channel }
                    | Call::Unsubscribe { channel }
                    | Call::Catchup { channel } => serde_json::to_value(ChannelParams {
                        channel: channel.clone(),
                    })?,
                });
            }
            Frame::Answer(answer) => {
                raw.id = answer.id;
                match &answer.outcome {
                    Ok(AnswerResult::Ack) => raw.result = Some(Value::from(0)),
                    Ok(AnswerResult::Messages(messages)) => {
                        raw.result = Some(serde_json::to_value(messages)?)
                    }
                    Err(error) => raw.error = Some(error.clone()),
                }
            }
        }
        Ok(serde_json::to_string(&raw)?)
    }
}

impl From<Query> for Frame {
    fn from(q: Query) -> Self {
        Frame::Query(q)
    }
}

impl From<Answer> for Frame {
    fn from(a: Answer) -> Self {
        Frame::Answer(a)
    }
}
