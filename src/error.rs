//! Errors raised while looking up, decoding and encoding action bytecode.

use thiserror::Error;

/**
  Failures of the codec. `UnknownOpcode` and `MalformedOperands` are recoverable while decoding:
  the decoder keeps the raw payload and records them as diagnostics instead of returning them.
  Every other variant aborts the current sequence.
*/
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CodecError {
  #[error("unknown opcode 0x{code:02X}{}", at(.offset))]
  UnknownOpcode {
    code: u8,
    offset: Option<usize>
  },

  #[error("unknown mnemonic `{name}`")]
  UnknownMnemonic {
    name: String
  },

  #[error(
    "stream truncated at offset {offset}{}: {needed} bytes needed, {available} available",
    opcode(.code)
  )]
  TruncatedStream {
    offset: usize,
    code: Option<u8>,
    needed: usize,
    available: usize
  },

  #[error(
    "branch 0x{code:02X} at offset {offset} targets offset {target}, which is not an instruction boundary"
  )]
  InvalidBranchTarget {
    offset: usize,
    code: u8,
    target: isize
  },

  #[error("opcode 0x{code:02X} cannot encode {field}: {value} exceeds {max}")]
  EncodeOverflow {
    code: u8,
    field: &'static str,
    value: i64,
    max: i64
  },

  #[error("branch 0x{code:02X} at index {index} targets index {target} in a sequence of {len}")]
  DanglingBranch {
    code: u8,
    index: usize,
    target: usize,
    len: usize
  },

  #[error("container 0x{code:02X} at offset {offset} nests {depth} levels deep")]
  NestingTooDeep {
    offset: usize,
    code: u8,
    depth: usize
  },

  #[error("malformed operands for opcode 0x{code:02X}{}: {reason}", at(.offset))]
  MalformedOperands {
    code: u8,
    offset: Option<usize>,
    reason: OperandError
  },
}

impl CodecError {
  /// Recoverable errors are diagnostics the decoder reports and then continues past.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, CodecError::UnknownOpcode { .. } | CodecError::MalformedOperands { .. })
  }
}

fn at(offset: &Option<usize>) -> String {
  match offset {
    Some(offset) => format!(" at offset {}", offset),
    None => String::new()
  }
}

fn opcode(code: &Option<u8>) -> String {
  match code {
    Some(code) => format!(" (opcode 0x{:02X})", code),
    None => String::new()
  }
}

/// Why an operand field could not be read or written.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum OperandError {
  #[error("string is not valid UTF-8")]
  InvalidUtf8,
  #[error("unterminated string")]
  UnterminatedString,
  #[error("boolean is neither 0 nor 1")]
  InvalidBoolean,
  #[error("unknown push value type")]
  UnknownPushType,
  #[error("operand length does not match its contents")]
  LengthMismatch,
  #[error("operand field is truncated")]
  Truncated,
  #[error("string contains a NUL byte")]
  NulInString,
  #[error("missing encoded body size")]
  MissingBodySize,
  #[error("operands do not match the opcode's layout")]
  LayoutMismatch,
  #[error("opcodes below the operand threshold carry no operands")]
  BelowThreshold,
  #[error("the end marker cannot appear inside a top-level block")]
  EndMarkerInBlock,
}

/// Failures while registering custom descriptors in an opcode table.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TableError {
  #[error("opcode table is frozen; 0x{code:02X} must be registered before the first lookup")]
  Frozen { code: u8 },

  #[error("opcode 0x{code:02X} is already registered")]
  DuplicateCode { code: u8 },

  #[error("mnemonic `{mnemonic}` is already registered")]
  DuplicateMnemonic { mnemonic: String },

  #[error("opcode 0x{code:02X} is below the operand threshold and cannot carry operands")]
  OperandsBelowThreshold { code: u8 },

  #[error("opcode 0x00 is reserved for the end marker")]
  ReservedEndMarker,
}

pub type Result<T> = std::result::Result<T, CodecError>;
