//! Newline-delimited JSON transport.
//!
//! Each line is an envelope `{"topic": "...", "message": {...}}`. Used for
//! standalone runs fed from stdin and for replaying captured streams.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

use super::{BusError, RawMessage, Result, Transport};

#[derive(Deserialize)]
struct Envelope {
    topic: String,
    message: Value,
}

pub struct LinesTransport<R> {
    lines: Lines<R>,
    line_number: i64,
}

impl<R> LinesTransport<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl LinesTransport<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> Transport for LinesTransport<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<RawMessage>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| BusError::Receive(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Envelope>(trimmed) {
                Ok(envelope) => {
                    let payload = serde_json::to_vec(&envelope.message)
                        .map_err(|e| BusError::Receive(e.to_string()))?;
                    return Ok(Some(RawMessage::new(
                        envelope.topic,
                        payload,
                        self.line_number,
                    )));
                }
                Err(e) => {
                    warn!(line = self.line_number, error = %e, "Skipping malformed envelope");
                }
            }
        }
    }

    async fn ack(&mut self, message: &RawMessage) -> Result<()> {
        debug!(line = message.offset, "Line handled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_envelopes_and_skips_noise() {
        let input = concat!(
            "{\"topic\":\"gobmp.parsed.ls_node\",\"message\":{\"action\":\"add\"}}\n",
            "\n",
            "not json\n",
            "{\"topic\":\"peer\",\"message\":{\"action\":\"del\"}}\n",
        );
        let mut transport = LinesTransport::new(input.as_bytes());

        let first = transport.receive().await.unwrap().unwrap();
        assert_eq!(first.topic, "gobmp.parsed.ls_node");
        assert_eq!(first.offset, 1);
        let payload: Value = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(payload["action"], "add");

        let second = transport.receive().await.unwrap().unwrap();
        assert_eq!(second.topic, "peer");
        assert_eq!(second.offset, 4);

        assert!(transport.receive().await.unwrap().is_none());
    }
}
