// src/protocol/message.rs
//! Orchestrator wire messages
//!
//! Every frame starts with a version byte and a type tag:
//!
//! | tag | message                   | payload                          | size |
//! |-----|---------------------------|----------------------------------|------|
//! | 0   | `StartMining`             | opr hash (32 bytes)              | 34   |
//! | 1   | `SubmissionWindowClosing` | deadline seconds (u32 BE)        | 6    |
//! | 2   | `SetTarget`               | target (u64 BE)                  | 10   |
//! | 3   | `MinerSubmission`         | JSON object                      | var  |
//!
//! Decoding never panics: short, unknown or malformed frames come back as
//! a [`CodecError`].

use crate::types::Nonce;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol version written by this client
pub const PROTOCOL_VERSION: u8 = 1;

const HEADER_LEN: usize = 2;

const TAG_START_MINING: u8 = 0;
const TAG_SUBMISSION_WINDOW_CLOSING: u8 = 1;
const TAG_SET_TARGET: u8 = 2;
const TAG_MINER_SUBMISSION: u8 = 3;

/// Message encoding/decoding errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Frame shorter than the version/tag header
    #[error("Message too short ({0} bytes)")]
    TooShort(usize),

    /// Type tag not known to this client
    #[error("Unknown message type {0}")]
    UnknownType(u8),

    /// Fixed-size message with the wrong length
    #[error("Wrong message size for {kind}: expected {expected} bytes, got {actual}")]
    WrongSize {
        /// Message kind
        kind: &'static str,
        /// Expected frame length
        expected: usize,
        /// Received frame length
        actual: usize,
    },

    /// Structured payload that does not parse or violates the message rules
    #[error("Malformed {kind} payload: {reason}")]
    Malformed {
        /// Message kind
        kind: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Payload serialization failure
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Report sent to the orchestrator with found nonces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerSubmission {
    /// Record the nonces were mined against
    #[serde(with = "hex::serde")]
    pub opr_hash: [u8; 32],
    /// Nonces, best first
    pub nonces: Vec<Nonce>,
    /// Hashes computed in the session, 0 for interim batches
    pub op_count: u64,
    /// Session duration in nanoseconds, 0 for interim batches
    pub duration_ns: u64,
}

/// Messages exchanged with the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Start a mining session on this record
    StartMining {
        /// Record to mine
        opr_hash: [u8; 32],
    },
    /// Stop mining and submit within `deadline` seconds
    SubmissionWindowClosing {
        /// Submission window in seconds
        deadline: u32,
    },
    /// New minimum share difficulty
    SetTarget {
        /// Target difficulty
        target: u64,
    },
    /// Client report
    MinerSubmission(MinerSubmission),
}

impl Message {
    /// Short human-readable name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            Message::StartMining { .. } => "StartMining",
            Message::SubmissionWindowClosing { .. } => "SubmissionWindowClosing",
            Message::SetTarget { .. } => "SetTarget",
            Message::MinerSubmission(_) => "MinerSubmission",
        }
    }

    /// Serializes the message into a binary frame
    ///
    /// # Errors
    /// Returns `CodecError::Encode` if the submission body cannot be serialized
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut frame = Vec::with_capacity(34);
        frame.push(PROTOCOL_VERSION);

        match self {
            Message::StartMining { opr_hash } => {
                frame.push(TAG_START_MINING);
                frame.extend_from_slice(opr_hash);
            }
            Message::SubmissionWindowClosing { deadline } => {
                frame.push(TAG_SUBMISSION_WINDOW_CLOSING);
                frame.extend_from_slice(&deadline.to_be_bytes());
            }
            Message::SetTarget { target } => {
                frame.push(TAG_SET_TARGET);
                frame.extend_from_slice(&target.to_be_bytes());
            }
            Message::MinerSubmission(submission) => {
                frame.push(TAG_MINER_SUBMISSION);
                serde_json::to_writer(&mut frame, submission)?;
            }
        }

        Ok(frame)
    }

    /// Parses a binary frame
    ///
    /// Any version byte is accepted so that newer orchestrators can add
    /// fields to messages this client does not read.
    pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::TooShort(bytes.len()));
        }

        let version = bytes[0];
        if version > PROTOCOL_VERSION {
            log::debug!("Decoding message from newer protocol version {}", version);
        }

        let payload = &bytes[HEADER_LEN..];
        match bytes[1] {
            TAG_START_MINING => {
                let opr_hash = fixed::<32>("StartMining", bytes)?;
                Ok(Message::StartMining { opr_hash })
            }
            TAG_SUBMISSION_WINDOW_CLOSING => {
                let deadline = u32::from_be_bytes(fixed::<4>("SubmissionWindowClosing", bytes)?);
                Ok(Message::SubmissionWindowClosing { deadline })
            }
            TAG_SET_TARGET => {
                let target = u64::from_be_bytes(fixed::<8>("SetTarget", bytes)?);
                Ok(Message::SetTarget { target })
            }
            TAG_MINER_SUBMISSION => {
                let submission: MinerSubmission =
                    serde_json::from_slice(payload).map_err(|e| CodecError::Malformed {
                        kind: "MinerSubmission",
                        reason: e.to_string(),
                    })?;
                if submission.nonces.is_empty() {
                    return Err(CodecError::Malformed {
                        kind: "MinerSubmission",
                        reason: "no nonce".into(),
                    });
                }
                Ok(Message::MinerSubmission(submission))
            }
            tag => Err(CodecError::UnknownType(tag)),
        }
    }
}

/// Checks the frame length of a fixed-size message and returns its payload
fn fixed<const N: usize>(kind: &'static str, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    let wrong_size = || CodecError::WrongSize {
        kind,
        expected: HEADER_LEN + N,
        actual: bytes.len(),
    };
    if bytes.len() != HEADER_LEN + N {
        return Err(wrong_size());
    }
    bytes[HEADER_LEN..].try_into().map_err(|_| wrong_size())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rand::Rng;

    fn submission() -> MinerSubmission {
        MinerSubmission {
            opr_hash: hex!("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"),
            nonces: vec![
                Nonce::new(vec![0x13, 0x59, 0x00, 0x02, 0xff, 0x01], u64::MAX),
                Nonce::new(vec![0x13, 0x59, 0x00, 0x00, 0x00], 1),
            ],
            op_count: 123_456_789,
            duration_ns: 60_000_000_000,
        }
    }

    #[test]
    fn every_message_kind_round_trips() {
        let messages = [
            Message::StartMining { opr_hash: [0xab; 32] },
            Message::SubmissionWindowClosing { deadline: 0 },
            Message::SubmissionWindowClosing { deadline: u32::MAX },
            Message::SetTarget { target: 0 },
            Message::SetTarget {
                target: 0xfffe_0000_0000_0000,
            },
            Message::MinerSubmission(submission()),
        ];

        for message in messages {
            let frame = message.encode().unwrap();
            assert_eq!(frame[0], PROTOCOL_VERSION);
            assert_eq!(Message::decode(&frame).unwrap(), message);
        }
    }

    #[test]
    fn fixed_layouts_are_big_endian() {
        let frame = Message::SetTarget { target: 0x0102 }.encode().unwrap();
        assert_eq!(frame, vec![1, 2, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);

        let frame = Message::SubmissionWindowClosing { deadline: 30 }.encode().unwrap();
        assert_eq!(frame, vec![1, 1, 0, 0, 0, 30]);
    }

    #[test]
    fn one_byte_message_is_too_short() {
        assert!(matches!(Message::decode(&[1]), Err(CodecError::TooShort(1))));
        assert!(matches!(Message::decode(&[]), Err(CodecError::TooShort(0))));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            Message::decode(&[1, 42, 0, 0]),
            Err(CodecError::UnknownType(42))
        ));
    }

    #[test]
    fn truncated_fixed_messages_have_wrong_size() {
        let frame = Message::StartMining { opr_hash: [1; 32] }.encode().unwrap();
        for len in HEADER_LEN..frame.len() {
            assert!(matches!(
                Message::decode(&frame[..len]),
                Err(CodecError::WrongSize { expected: 34, .. })
            ));
        }
        let mut longer = frame.clone();
        longer.push(0);
        assert!(Message::decode(&longer).is_err());
    }

    #[test]
    fn malformed_submission_is_rejected() {
        let frame = Message::MinerSubmission(submission()).encode().unwrap();
        assert!(matches!(
            Message::decode(&frame[..frame.len() - 1]),
            Err(CodecError::Malformed { .. })
        ));

        let mut empty = submission();
        empty.nonces.clear();
        let frame = Message::MinerSubmission(empty).encode().unwrap();
        assert!(matches!(
            Message::decode(&frame),
            Err(CodecError::Malformed { .. })
        ));

        let bad_hex = br#"{"opr_hash":"zz","nonces":[],"op_count":0,"duration_ns":0}"#;
        let mut frame = vec![PROTOCOL_VERSION, TAG_MINER_SUBMISSION];
        frame.extend_from_slice(bad_hex);
        assert!(Message::decode(&frame).is_err());
    }

    #[test]
    fn newer_versions_are_still_decoded() {
        let mut frame = Message::SetTarget { target: 7 }.encode().unwrap();
        frame[0] = PROTOCOL_VERSION + 1;
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::SetTarget { target: 7 }
        );
    }

    #[test]
    fn random_bytes_never_panic() {
        let mut rng = rand::thread_rng();
        for _ in 0..2_000 {
            let len = rng.gen_range(0..96);
            let mut bytes = vec![0u8; len];
            rng.fill(&mut bytes[..]);
            let _ = Message::decode(&bytes);
        }
    }
}
