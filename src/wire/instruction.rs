use crate::domain::{Operation, Payload, PayloadKey, PayloadValue, SeedList};

use super::codec::{WireError, WireReader, WireWriter};

/// Instruction discriminators. Values are part of the external contract
/// and must never be renumbered.
pub const COMMIT: u8 = 0;
pub const VALIDATE: u8 = 1;
pub const WRITE_TO_BUFFER: u8 = 2;

/// Payload value wire tags.
const TAG_ADDRESS: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_BYTES: u8 = 2;
const TAG_MAP: u8 = 3;
const TAG_SEEDS: u8 = 4;

/// Maximum nesting of `Map` payload values accepted on decode.
pub const MAX_PAYLOAD_DEPTH: u32 = 8;

/// Arguments for committing a serialized rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitArgs {
    pub serialized_rule_set: Vec<u8>,
}

/// Arguments for a chunked buffer write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteToBufferArgs {
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Arguments for a validation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    pub name: String,
    pub operation: Operation,
    pub payload: Payload,
}

/// A decoded wire instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Commit(CommitArgs),
    Validate(ValidateArgs),
    WriteToBuffer(WriteToBufferArgs),
}

impl Instruction {
    pub fn discriminator(&self) -> u8 {
        match self {
            Instruction::Commit(_) => COMMIT,
            Instruction::Validate(_) => VALIDATE,
            Instruction::WriteToBuffer(_) => WRITE_TO_BUFFER,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        writer.put_u8(self.discriminator());
        match self {
            Instruction::Commit(args) => {
                writer.put_bytes(&args.serialized_rule_set);
            }
            Instruction::Validate(args) => {
                writer.put_str(&args.name);
                writer.put_u8(args.operation.as_u8());
                encode_payload(&mut writer, &args.payload);
            }
            Instruction::WriteToBuffer(args) => {
                writer.put_u64(args.offset);
                writer.put_bytes(&args.data);
            }
        }
        writer.into_inner()
    }

    /// Decode a full instruction; trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = WireReader::new(bytes);
        let instruction = match reader.u8()? {
            COMMIT => Instruction::Commit(CommitArgs {
                serialized_rule_set: reader.bytes()?,
            }),
            VALIDATE => {
                let name = reader.str()?;
                let tag = reader.u8()?;
                let operation =
                    Operation::from_u8(tag).ok_or(WireError::UnknownOperation(tag))?;
                let payload = decode_payload(&mut reader, 0)?;
                Instruction::Validate(ValidateArgs {
                    name,
                    operation,
                    payload,
                })
            }
            WRITE_TO_BUFFER => Instruction::WriteToBuffer(WriteToBufferArgs {
                offset: reader.u64()?,
                data: reader.bytes()?,
            }),
            other => return Err(WireError::UnknownDiscriminator(other)),
        };
        reader.expect_end()?;
        Ok(instruction)
    }
}

/// Count-prefixed key/value pairs, keys in ascending order.
fn encode_payload(writer: &mut WireWriter, payload: &Payload) {
    writer.put_u32(payload.len() as u32);
    for (key, value) in payload.iter() {
        writer.put_u8(key.0);
        encode_value(writer, value);
    }
}

fn encode_value(writer: &mut WireWriter, value: &PayloadValue) {
    match value {
        PayloadValue::Address(id) => {
            writer.put_u8(TAG_ADDRESS);
            writer.put_raw(id.as_bytes());
        }
        PayloadValue::Number(n) => {
            writer.put_u8(TAG_NUMBER);
            writer.put_u64(*n);
        }
        PayloadValue::Bytes(bytes) => {
            writer.put_u8(TAG_BYTES);
            writer.put_bytes(bytes);
        }
        PayloadValue::Map(nested) => {
            writer.put_u8(TAG_MAP);
            encode_payload(writer, nested);
        }
        PayloadValue::Seeds(seeds) => {
            writer.put_u8(TAG_SEEDS);
            writer.put_u32(seeds.len() as u32);
            for seed in seeds {
                writer.put_bytes(seed);
            }
        }
    }
}

fn decode_payload(reader: &mut WireReader, depth: u32) -> Result<Payload, WireError> {
    if depth > MAX_PAYLOAD_DEPTH {
        return Err(WireError::NestingTooDeep(MAX_PAYLOAD_DEPTH));
    }

    let count = reader.u32()?;
    let mut payload = Payload::new();
    for _ in 0..count {
        let key = reader.u8()?;
        if payload.get(PayloadKey(key)).is_some() {
            return Err(WireError::DuplicateKey(key));
        }
        let value = decode_value(reader, depth)?;
        payload = payload.with(PayloadKey(key), value);
    }
    Ok(payload)
}

fn decode_value(reader: &mut WireReader, depth: u32) -> Result<PayloadValue, WireError> {
    match reader.u8()? {
        TAG_ADDRESS => {
            let raw = reader.raw(crate::domain::Identity::LEN)?;
            // Length is fixed, so from_slice cannot fail here.
            let id = crate::domain::Identity::from_slice(raw)
                .map_err(|_| WireError::UnexpectedEof(reader.position()))?;
            Ok(PayloadValue::Address(id))
        }
        TAG_NUMBER => Ok(PayloadValue::Number(reader.u64()?)),
        TAG_BYTES => Ok(PayloadValue::Bytes(reader.bytes()?)),
        TAG_MAP => Ok(PayloadValue::Map(decode_payload(reader, depth + 1)?)),
        TAG_SEEDS => {
            let count = reader.u32()?;
            let mut seeds = SeedList::new();
            for _ in 0..count {
                seeds.push(reader.bytes()?);
            }
            Ok(PayloadValue::Seeds(seeds))
        }
        other => Err(WireError::UnknownValueTag(other)),
    }
}
