//! Audio WebSocket handler
//!
//! One connection is one session. The first message is a JSON handshake;
//! everything after is binary PCM. The handler pumps bytes through the
//! frame assembler and VAD gate, fans sealed utterances out to the audio
//! logger and the dispatcher, and delivers recognition results back in
//! utterance order through a dedicated writer task.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use streamscribe_core::{
    ErrorKind, FrameAssembler, RecognitionError, RecognitionOutcome, RecognitionPayload,
};
use streamscribe_pipeline::{
    GateEvent, PipelineError, TranscribeRequest, TranscriptionDispatcher, VadGate,
};

use crate::state::AppState;

/// An end-mark is a single binary frame of at least 3 seconds of zero
/// samples: 3 s * 16000 Hz * 2 bytes.
const END_MARK_BYTES: usize = 96_000;

/// Client handshake: first message on the socket.
#[derive(Debug, Deserialize)]
struct Hello {
    lang: String,
    prompt: String,
}

/// Server → client messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    VadResult {
        session_id: u64,
        utterance_id: String,
        speech_detected: bool,
        speech_ended: bool,
        timestamp: f64,
    },
    RecognitionResult {
        session_id: u64,
        utterance_id: String,
        timestamp: f64,
        result: RecognitionPayload,
    },
}

/// Work for the in-order delivery task.
enum Delivery {
    /// Await this job's outcome, then send it.
    Job {
        utterance_id: Uuid,
        rx: oneshot::Receiver<RecognitionOutcome>,
    },
    /// A failure known at submit time (for example `Overloaded`).
    Immediate {
        utterance_id: Uuid,
        error: RecognitionError,
    },
}

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket upgrade endpoint.
pub async fn audio_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let session = match state.sessions.register() {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: "session limit reached".into(),
                })))
                .await;
            return;
        }
    };
    let session_id = session.id;

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    // Handshake: a JSON text message with language and prompt.
    let hello = match read_handshake(&mut receiver).await {
        Ok(Some(hello)) => hello,
        Ok(None) => {
            // Closed before the handshake; nothing to report.
            state.sessions.remove(session_id);
            return;
        }
        Err(reason) => {
            tracing::warn!(session_id, %reason, "bad handshake");
            let _ = sender
                .lock()
                .await
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: format!("{}: {reason}", ErrorKind::BadHandshake).into(),
                })))
                .await;
            state.sessions.remove(session_id);
            return;
        }
    };

    let language = non_empty(hello.lang);
    let prompt = non_empty(hello.prompt);
    tracing::info!(
        session_id,
        language = language.as_deref().unwrap_or("auto"),
        has_prompt = prompt.is_some(),
        "session configured"
    );

    let mut assembler = FrameAssembler::new(state.settings.vad.frame_size);
    let mut gate = VadGate::new(state.vad_factory.create(), state.vad_config());

    // Results are delivered strictly in seal order: a single writer task
    // consumes this queue front to back.
    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel::<Delivery>();
    let delivery_task = tokio::spawn(deliver_results(
        session_id,
        sender.clone(),
        delivery_rx,
        state.dispatcher.job_timeout(),
    ));

    let mut end_mark = false;
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                if is_end_mark(&data) {
                    tracing::info!(session_id, "end-mark received, draining");
                    end_mark = true;
                    break;
                }
                for frame in assembler.push(&data) {
                    let events = match gate.process(&frame) {
                        Ok(events) => events,
                        Err(err) => {
                            tracing::error!(session_id, error = %err, "VAD processing error");
                            continue;
                        }
                    };
                    for event in events {
                        handle_gate_event(&state, session_id, &sender, &delivery_tx, event, &language, &prompt)
                            .await;
                    }
                }
            }
            Ok(Message::Text(_)) => {
                tracing::warn!(session_id, "unexpected text message mid-stream, ignoring");
            }
            Ok(Message::Ping(data)) => {
                let _ = sender.lock().await.send(Message::Pong(data)).await;
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::warn!(session_id, error = %err, "WebSocket error");
                break;
            }
        }
    }

    // A trailing odd byte violates the wire contract; report and drop it.
    if assembler.finish().is_err() {
        tracing::warn!(session_id, kind = %ErrorKind::OddByteCount, "dropping trailing odd byte");
    }

    // Close the queue; the writer task exits once it has drained.
    drop(delivery_tx);

    if end_mark {
        // Bounded drain: flush in-flight recognition, then close from our
        // side.
        let mut delivery_task = delivery_task;
        let drain = Duration::from_secs(state.settings.recognition.drain_timeout_secs);
        if tokio::time::timeout(drain, &mut delivery_task).await.is_err() {
            tracing::warn!(session_id, "drain timeout expired, abandoning in-flight results");
            delivery_task.abort();
        }
        let _ = sender
            .lock()
            .await
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "drained".into(),
            })))
            .await;
    } else {
        // Abrupt close: dispatched work keeps running, its results are
        // discarded with the receivers.
        delivery_task.abort();
    }

    state.sessions.remove(session_id);
}

/// First message must be the JSON handshake.
///
/// `Ok(None)` means the peer went away before saying hello.
async fn read_handshake(
    receiver: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
) -> Result<Option<Hello>, String> {
    loop {
        return match receiver.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Hello>(&text)
                .map(Some)
                .map_err(|err| err.to_string()),
            Some(Ok(Message::Binary(_))) => Err("expected JSON handshake before audio".to_string()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => Ok(None),
            Some(Err(err)) => Err(err.to_string()),
        };
    }
}

async fn handle_gate_event(
    state: &AppState,
    session_id: u64,
    sender: &WsSender,
    delivery_tx: &mpsc::UnboundedSender<Delivery>,
    event: GateEvent,
    language: &Option<String>,
    prompt: &Option<String>,
) {
    match event {
        GateEvent::SpeechStart { utterance_id } => {
            tracing::info!(session_id, %utterance_id, "speech started");
            send_message(
                sender,
                &ServerMessage::VadResult {
                    session_id,
                    utterance_id: utterance_id.to_string(),
                    speech_detected: true,
                    speech_ended: false,
                    timestamp: now_timestamp(),
                },
            )
            .await;
        }
        GateEvent::SpeechEnd {
            utterance_id,
            utterance,
        } => {
            tracing::info!(session_id, %utterance_id, "speech ended");
            send_message(
                sender,
                &ServerMessage::VadResult {
                    session_id,
                    utterance_id: utterance_id.to_string(),
                    speech_detected: false,
                    speech_ended: true,
                    timestamp: now_timestamp(),
                },
            )
            .await;

            let Some(utterance) = utterance else {
                // Too short; no recognition, no log entry.
                return;
            };

            let samples = utterance.into_samples();
            // The audit copy is a side channel; recognition owns the
            // original samples.
            state
                .audio_log
                .log(session_id, Arc::from(&samples[..]));

            let request = TranscribeRequest {
                samples,
                language: language.clone(),
                prompt: prompt.clone(),
            };
            let delivery = match state.dispatcher.submit(request) {
                Ok(rx) => Delivery::Job { utterance_id, rx },
                Err(PipelineError::QueueFull) => Delivery::Immediate {
                    utterance_id,
                    error: RecognitionError::new(
                        ErrorKind::Overloaded,
                        "transcription queue is full",
                    ),
                },
                Err(err) => Delivery::Immediate {
                    utterance_id,
                    error: RecognitionError::new(ErrorKind::ModelFailure, err.to_string()),
                },
            };
            let _ = delivery_tx.send(delivery);
        }
    }
}

/// Writer task: one result at a time, in seal order.
async fn deliver_results(
    session_id: u64,
    sender: WsSender,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    job_timeout: Duration,
) {
    while let Some(delivery) = rx.recv().await {
        let (utterance_id, outcome) = match delivery {
            Delivery::Job { utterance_id, rx } => (
                utterance_id,
                TranscriptionDispatcher::await_outcome(rx, job_timeout).await,
            ),
            Delivery::Immediate {
                utterance_id,
                error,
            } => (utterance_id, Err(error)),
        };

        match &outcome {
            Ok(result) => {
                tracing::info!(session_id, %utterance_id, text = %result.text, "recognition result")
            }
            Err(err) => {
                tracing::warn!(session_id, %utterance_id, kind = %err.kind, "recognition failed")
            }
        }

        send_message(
            &sender,
            &ServerMessage::RecognitionResult {
                session_id,
                utterance_id: utterance_id.to_string(),
                timestamp: now_timestamp(),
                result: RecognitionPayload::from(outcome),
            },
        )
        .await;
    }
}

async fn send_message(sender: &WsSender, message: &ServerMessage) {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize server message");
            return;
        }
    };
    if let Err(err) = sender.lock().await.send(Message::Text(json)).await {
        tracing::debug!(error = %err, "failed to send message, client likely gone");
    }
}

/// A single binary frame of >= 3 s of zero samples means "flush and close".
fn is_end_mark(data: &[u8]) -> bool {
    data.len() >= END_MARK_BYTES && data.iter().all(|&b| b == 0)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Wall-clock seconds with sub-millisecond precision.
fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_mark_detection() {
        assert!(is_end_mark(&vec![0u8; END_MARK_BYTES]));
        assert!(is_end_mark(&vec![0u8; END_MARK_BYTES + 2]));
        // One byte short is audio, not an end-mark.
        assert!(!is_end_mark(&vec![0u8; END_MARK_BYTES - 1]));
        // A non-zero byte anywhere disqualifies the frame.
        let mut almost = vec![0u8; END_MARK_BYTES];
        almost[END_MARK_BYTES / 2] = 1;
        assert!(!is_end_mark(&almost));
    }

    #[test]
    fn test_hello_parsing() {
        let hello: Hello = serde_json::from_str(r#"{"lang":"en","prompt":"meeting notes"}"#).unwrap();
        assert_eq!(hello.lang, "en");
        assert_eq!(hello.prompt, "meeting notes");

        assert!(serde_json::from_str::<Hello>(r#"{"lang":"en"}"#).is_err());
        assert!(serde_json::from_str::<Hello>("not json").is_err());
    }

    #[test]
    fn test_empty_handshake_fields_mean_auto() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("ja".to_string()), Some("ja".to_string()));
    }

    #[test]
    fn test_vad_result_wire_shape() {
        let message = ServerMessage::VadResult {
            session_id: 7,
            utterance_id: "u-1".to_string(),
            speech_detected: true,
            speech_ended: false,
            timestamp: 12.5,
        };
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "vad_result");
        assert_eq!(json["session_id"], 7);
        assert_eq!(json["speech_detected"], true);
        assert_eq!(json["speech_ended"], false);
        assert_eq!(json["timestamp"], 12.5);
    }

    #[test]
    fn test_recognition_result_wire_shape() {
        use streamscribe_core::{RecognitionResult, Segment};

        let result = RecognitionResult::new("hello")
            .with_language("en")
            .with_segments(vec![Segment::new(0.0, 1.0, "hello")]);
        let message = ServerMessage::RecognitionResult {
            session_id: 3,
            utterance_id: "u-2".to_string(),
            timestamp: 99.0,
            result: RecognitionPayload::from(Ok(result)),
        };
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "recognition_result");
        assert_eq!(json["result"]["text"], "hello");
        assert_eq!(json["result"]["segments"][0]["text"], "hello");
        assert_eq!(json["result"]["language"], "en");
    }

    #[test]
    fn test_recognition_error_wire_shape() {
        let message = ServerMessage::RecognitionResult {
            session_id: 3,
            utterance_id: "u-3".to_string(),
            timestamp: 99.0,
            result: RecognitionPayload::from(Err(RecognitionError::new(
                ErrorKind::Overloaded,
                "queue full",
            ))),
        };
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["result"]["error"]["kind"], "Overloaded");
        assert_eq!(json["result"]["error"]["message"], "queue full");
    }
}
