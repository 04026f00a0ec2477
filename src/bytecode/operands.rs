/*!
  Binary layout of the operand field of every action with inline operands. Parsing is done with
  `nom` over the exact operand slice the framing pass cut out, and every layout must consume its
  slice completely. Anything else is reported back as malformed so the caller can keep the bytes
  verbatim.

  Multi-byte integers are little-endian. Strings are UTF-8 and null-terminated. Doubles are two
  little-endian 32 bit words with the high word first.
*/

use std::convert::TryFrom;

use nom::{
  bytes::complete::{tag, take_till},
  combinator::{all_consuming, map, map_res, rest, verify},
  error::{Error as NomError, ErrorKind},
  multi::count,
  number::complete::{le_f32, le_i16, le_i32, le_u16, le_u32, le_u8},
  sequence::{pair, terminated},
  IResult
};

use crate::bytecode::instruction::{
  CatchTarget, Function, Function2, InstructionSequence, Operands, PushValue, RegisterParam,
  TryBlock
};
use crate::bytecode::opcode::OperandLayout;
use crate::error::{CodecError, OperandError, Result};

type Parsed<'a, T> = IResult<&'a [u8], T>;

// Push value type tags
const PUSH_STRING: u8      = 0;
const PUSH_FLOAT: u8       = 1;
const PUSH_NULL: u8        = 2;
const PUSH_UNDEFINED: u8   = 3;
const PUSH_REGISTER: u8    = 4;
const PUSH_BOOLEAN: u8     = 5;
const PUSH_DOUBLE: u8      = 6;
const PUSH_INTEGER: u8     = 7;
const PUSH_CONSTANT8: u8   = 8;
const PUSH_CONSTANT16: u8  = 9;

// Try flag bits
const TRY_HAS_CATCH: u8    = 0x01;
const TRY_HAS_FINALLY: u8  = 0x02;
const TRY_IN_REGISTER: u8  = 0x04;

// GotoFrame2 flag bits
const GOTO_PLAY: u8        = 0x01;
const GOTO_SCENE_BIAS: u8  = 0x02;

/// Operands parsed from one operand field.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedOperands {
  pub operands: Operands,
  /// Declared byte sizes of the nested bodies that follow the record, in wire order.
  pub body_sizes: Vec<usize>,
  /// The raw displacement of a branch.
  pub displacement: Option<i16>,
}

impl DecodedOperands {
  fn plain(operands: Operands) -> DecodedOperands {
    DecodedOperands { operands, body_sizes: vec![], displacement: None }
  }
}

// region Parsers

fn string(input: &[u8]) -> Parsed<'_, String> {
  map_res(
    terminated(take_till(|byte: u8| byte == 0), tag(&b"\0"[..])),
    |bytes: &[u8]| std::str::from_utf8(bytes).map(str::to_owned)
  )(input)
}

fn push_value(input: &[u8]) -> Parsed<'_, PushValue> {
  let (input, kind) = le_u8(input)?;
  match kind {
    PUSH_STRING     => map(string, PushValue::Str)(input),
    PUSH_FLOAT      => map(le_f32, PushValue::Float)(input),
    PUSH_NULL       => Ok((input, PushValue::Null)),
    PUSH_UNDEFINED  => Ok((input, PushValue::Undefined)),
    PUSH_REGISTER   => map(le_u8, PushValue::Register)(input),
    PUSH_BOOLEAN    => map(verify(le_u8, |byte: &u8| *byte <= 1), |byte| PushValue::Bool(byte == 1))(input),
    PUSH_DOUBLE     => map(pair(le_u32, le_u32), |(high, low): (u32, u32)| {
      PushValue::Double(f64::from_bits(((high as u64) << 32) | low as u64))
    })(input),
    PUSH_INTEGER    => map(le_i32, PushValue::Int)(input),
    PUSH_CONSTANT8  => map(le_u8, PushValue::Constant8)(input),
    PUSH_CONSTANT16 => map(le_u16, PushValue::Constant16)(input),
    _               => Err(nom::Err::Error(NomError::new(input, ErrorKind::Switch)))
  }
}

fn push_values(mut input: &[u8]) -> Parsed<'_, Vec<PushValue>> {
  let mut values = vec![];
  while !input.is_empty() {
    let (remaining, value) = push_value(input)?;
    values.push(value);
    input = remaining;
  }
  Ok((input, values))
}

fn constant_pool(input: &[u8]) -> Parsed<'_, Vec<String>> {
  let (input, length) = le_u16(input)?;
  count(string, length as usize)(input)
}

fn define_function(input: &[u8]) -> Parsed<'_, (Function, usize)> {
  let (input, name) = string(input)?;
  let (input, param_count) = le_u16(input)?;
  let (input, params) = count(string, param_count as usize)(input)?;
  let (input, code_size) = le_u16(input)?;
  let function = Function { name, params, body: InstructionSequence::new() };
  Ok((input, (function, code_size as usize)))
}

fn define_function2(input: &[u8]) -> Parsed<'_, (Function2, usize)> {
  let (input, name) = string(input)?;
  let (input, param_count) = le_u16(input)?;
  let (input, register_count) = le_u8(input)?;
  let (input, flags) = le_u16(input)?;
  let (input, params) = count(
    map(pair(le_u8, string), |(register, name)| RegisterParam { register, name }),
    param_count as usize
  )(input)?;
  let (input, code_size) = le_u16(input)?;
  let function = Function2 {
    name,
    register_count,
    flags,
    params,
    body: InstructionSequence::new()
  };
  Ok((input, (function, code_size as usize)))
}

fn try_block(input: &[u8]) -> Parsed<'_, (TryBlock, Vec<usize>)> {
  let (input, flags) = le_u8(input)?;
  let (input, try_size) = le_u16(input)?;
  let (input, catch_size) = le_u16(input)?;
  let (input, finally_size) = le_u16(input)?;
  let (input, catch_target) = if flags & TRY_IN_REGISTER != 0 {
    map(le_u8, CatchTarget::Register)(input)?
  } else {
    map(string, CatchTarget::Name)(input)?
  };
  let block = TryBlock {
    catch_block: flags & TRY_HAS_CATCH != 0,
    finally_block: flags & TRY_HAS_FINALLY != 0,
    reserved: flags >> 3,
    catch_target,
    try_body: InstructionSequence::new(),
    catch_body: InstructionSequence::new(),
    finally_body: InstructionSequence::new(),
  };
  let sizes = vec![try_size as usize, catch_size as usize, finally_size as usize];
  Ok((input, (block, sizes)))
}

fn goto_frame2(input: &[u8]) -> Parsed<'_, Operands> {
  let (input, flags) = le_u8(input)?;
  let (input, scene_bias) = if flags & GOTO_SCENE_BIAS != 0 {
    map(le_u16, Some)(input)?
  } else {
    (input, None)
  };
  let operands = Operands::GotoFrame2 {
    play: flags & GOTO_PLAY != 0,
    reserved: flags >> 2,
    scene_bias
  };
  Ok((input, operands))
}

fn reason(kind: ErrorKind) -> OperandError {
  match kind {
    ErrorKind::MapRes => OperandError::InvalidUtf8,
    ErrorKind::Tag    => OperandError::UnterminatedString,
    ErrorKind::Verify => OperandError::InvalidBoolean,
    ErrorKind::Switch => OperandError::UnknownPushType,
    _                 => OperandError::LengthMismatch
  }
}

fn complete<'a, O, F>(input: &'a [u8], parser: F) -> std::result::Result<O, OperandError>
  where F: FnMut(&'a [u8]) -> Parsed<'a, O>
{
  match all_consuming(parser)(input) {
    Ok((_, output)) => Ok(output),
    Err(nom::Err::Error(error)) | Err(nom::Err::Failure(error)) => Err(reason(error.code)),
    Err(nom::Err::Incomplete(_)) => Err(OperandError::Truncated)
  }
}

/**
  Parses the operand field of an action with the given layout. The error is the reason the
  decoder attaches to a `MalformedOperands` diagnostic.
*/
pub fn decode(layout: OperandLayout, input: &[u8]) -> std::result::Result<DecodedOperands, OperandError> {
  let decoded = match layout {
    OperandLayout::None => {
      if !input.is_empty() {
        return Err(OperandError::LengthMismatch);
      }
      DecodedOperands::plain(Operands::None)
    }

    OperandLayout::GotoFrame => DecodedOperands::plain(complete(input, map(le_u16, |frame| {
      Operands::GotoFrame { frame }
    }))?),

    OperandLayout::GetUrl => DecodedOperands::plain(complete(input, map(pair(string, string), |(url, target)| {
      Operands::GetUrl { url, target }
    }))?),

    OperandLayout::StoreRegister => DecodedOperands::plain(complete(input, map(le_u8, |register| {
      Operands::StoreRegister { register }
    }))?),

    OperandLayout::ConstantPool => DecodedOperands::plain(complete(input, map(constant_pool, |constants| {
      Operands::ConstantPool { constants }
    }))?),

    OperandLayout::WaitForFrame => DecodedOperands::plain(complete(input, map(pair(le_u16, le_u8), |(frame, skip_count)| {
      Operands::WaitForFrame { frame, skip_count }
    }))?),

    OperandLayout::SetTarget => DecodedOperands::plain(complete(input, map(string, |target| {
      Operands::SetTarget { target }
    }))?),

    OperandLayout::GotoLabel => DecodedOperands::plain(complete(input, map(string, |label| {
      Operands::GotoLabel { label }
    }))?),

    OperandLayout::WaitForFrame2 => DecodedOperands::plain(complete(input, map(le_u8, |skip_count| {
      Operands::WaitForFrame2 { skip_count }
    }))?),

    OperandLayout::GetUrl2 => DecodedOperands::plain(complete(input, map(le_u8, |flags| {
      Operands::GetUrl2 { flags }
    }))?),

    OperandLayout::GotoFrame2 => DecodedOperands::plain(complete(input, goto_frame2)?),

    OperandLayout::Push => DecodedOperands::plain(complete(input, map(push_values, |values| {
      Operands::Push { values }
    }))?),

    OperandLayout::Branch => {
      let displacement = complete(input, le_i16)?;
      DecodedOperands {
        operands: Operands::Branch { target: 0 },
        body_sizes: vec![],
        displacement: Some(displacement)
      }
    }

    OperandLayout::DefineFunction => {
      let (function, code_size) = complete(input, define_function)?;
      DecodedOperands {
        operands: Operands::DefineFunction(Box::new(function)),
        body_sizes: vec![code_size],
        displacement: None
      }
    }

    OperandLayout::DefineFunction2 => {
      let (function, code_size) = complete(input, define_function2)?;
      DecodedOperands {
        operands: Operands::DefineFunction2(Box::new(function)),
        body_sizes: vec![code_size],
        displacement: None
      }
    }

    OperandLayout::With => {
      let size = complete(input, le_u16)?;
      DecodedOperands {
        operands: Operands::With { body: InstructionSequence::new() },
        body_sizes: vec![size as usize],
        displacement: None
      }
    }

    OperandLayout::Try => {
      let (block, body_sizes) = complete(input, try_block)?;
      DecodedOperands {
        operands: Operands::Try(Box::new(block)),
        body_sizes,
        displacement: None
      }
    }

    OperandLayout::Raw => DecodedOperands::plain(complete(input, map(rest, |bytes: &[u8]| {
      Operands::Raw { bytes: bytes.to_vec() }
    }))?),
  };
  Ok(decoded)
}

// endregion

// region Writers

fn write_u16(code: u8, field: &'static str, value: usize, out: &mut Vec<u8>) -> Result<()> {
  let value = u16::try_from(value).map_err(|_| CodecError::EncodeOverflow {
    code,
    field,
    value: value as i64,
    max: u16::MAX as i64
  })?;
  out.extend_from_slice(&value.to_le_bytes());
  Ok(())
}

fn write_string(code: u8, text: &str, out: &mut Vec<u8>) -> Result<()> {
  if text.as_bytes().contains(&0) {
    return Err(CodecError::MalformedOperands {
      code,
      offset: None,
      reason: OperandError::NulInString
    });
  }
  out.extend_from_slice(text.as_bytes());
  out.push(0);
  Ok(())
}

fn write_push_value(code: u8, value: &PushValue, out: &mut Vec<u8>) -> Result<()> {
  match value {
    PushValue::Str(text) => {
      out.push(PUSH_STRING);
      write_string(code, text, out)?;
    }
    PushValue::Float(value) => {
      out.push(PUSH_FLOAT);
      out.extend_from_slice(&value.to_bits().to_le_bytes());
    }
    PushValue::Null => out.push(PUSH_NULL),
    PushValue::Undefined => out.push(PUSH_UNDEFINED),
    PushValue::Register(register) => out.extend_from_slice(&[PUSH_REGISTER, *register]),
    PushValue::Bool(value) => out.extend_from_slice(&[PUSH_BOOLEAN, *value as u8]),
    PushValue::Double(value) => {
      let bits = value.to_bits();
      out.push(PUSH_DOUBLE);
      out.extend_from_slice(&((bits >> 32) as u32).to_le_bytes());
      out.extend_from_slice(&(bits as u32).to_le_bytes());
    }
    PushValue::Int(value) => {
      out.push(PUSH_INTEGER);
      out.extend_from_slice(&value.to_le_bytes());
    }
    PushValue::Constant8(index) => out.extend_from_slice(&[PUSH_CONSTANT8, *index]),
    PushValue::Constant16(index) => {
      out.push(PUSH_CONSTANT16);
      out.extend_from_slice(&index.to_le_bytes());
    }
  }
  Ok(())
}

fn body_size(code: u8, body_sizes: &[usize], index: usize) -> Result<usize> {
  body_sizes.get(index).copied().ok_or(CodecError::MalformedOperands {
    code,
    offset: None,
    reason: OperandError::MissingBodySize
  })
}

fn check_bits(code: u8, field: &'static str, value: u8, max: u8) -> Result<()> {
  if value > max {
    return Err(CodecError::EncodeOverflow { code, field, value: value as i64, max: max as i64 });
  }
  Ok(())
}

/// Writes the operand field for `operands`. See `Instruction::encode_operands`.
pub fn encode(code: u8, operands: &Operands, body_sizes: &[usize], out: &mut Vec<u8>) -> Result<()> {
  match operands {
    Operands::None => {}

    Operands::GotoFrame { frame } => out.extend_from_slice(&frame.to_le_bytes()),

    Operands::GetUrl { url, target } => {
      write_string(code, url, out)?;
      write_string(code, target, out)?;
    }

    Operands::StoreRegister { register } => out.push(*register),

    Operands::ConstantPool { constants } => {
      write_u16(code, "constant count", constants.len(), out)?;
      for constant in constants {
        write_string(code, constant, out)?;
      }
    }

    Operands::WaitForFrame { frame, skip_count } => {
      out.extend_from_slice(&frame.to_le_bytes());
      out.push(*skip_count);
    }

    Operands::SetTarget { target } => write_string(code, target, out)?,

    Operands::GotoLabel { label } => write_string(code, label, out)?,

    Operands::WaitForFrame2 { skip_count } => out.push(*skip_count),

    Operands::GetUrl2 { flags } => out.push(*flags),

    Operands::GotoFrame2 { play, reserved, scene_bias } => {
      check_bits(code, "reserved flag bits", *reserved, 0x3F)?;
      let mut flags = reserved << 2;
      if *play {
        flags |= GOTO_PLAY;
      }
      if scene_bias.is_some() {
        flags |= GOTO_SCENE_BIAS;
      }
      out.push(flags);
      if let Some(bias) = scene_bias {
        out.extend_from_slice(&bias.to_le_bytes());
      }
    }

    Operands::Push { values } => {
      for value in values {
        write_push_value(code, value, out)?;
      }
    }

    Operands::Branch { .. } => out.extend_from_slice(&[0, 0]),

    Operands::DefineFunction(function) => {
      write_string(code, &function.name, out)?;
      write_u16(code, "parameter count", function.params.len(), out)?;
      for param in &function.params {
        write_string(code, param, out)?;
      }
      write_u16(code, "body size", body_size(code, body_sizes, 0)?, out)?;
    }

    Operands::DefineFunction2(function) => {
      write_string(code, &function.name, out)?;
      write_u16(code, "parameter count", function.params.len(), out)?;
      out.push(function.register_count);
      out.extend_from_slice(&function.flags.to_le_bytes());
      for param in &function.params {
        out.push(param.register);
        write_string(code, &param.name, out)?;
      }
      write_u16(code, "body size", body_size(code, body_sizes, 0)?, out)?;
    }

    Operands::With { .. } => write_u16(code, "body size", body_size(code, body_sizes, 0)?, out)?,

    Operands::Try(block) => {
      check_bits(code, "reserved flag bits", block.reserved, 0x1F)?;
      let mut flags = block.reserved << 3;
      if block.catch_block {
        flags |= TRY_HAS_CATCH;
      }
      if block.finally_block {
        flags |= TRY_HAS_FINALLY;
      }
      if let CatchTarget::Register(_) = block.catch_target {
        flags |= TRY_IN_REGISTER;
      }
      out.push(flags);
      write_u16(code, "try body size", body_size(code, body_sizes, 0)?, out)?;
      write_u16(code, "catch body size", body_size(code, body_sizes, 1)?, out)?;
      write_u16(code, "finally body size", body_size(code, body_sizes, 2)?, out)?;
      match &block.catch_target {
        CatchTarget::Name(name) => write_string(code, name, out)?,
        CatchTarget::Register(register) => out.push(*register)
      }
    }

    Operands::Raw { bytes } => out.extend_from_slice(bytes),
  }
  Ok(())
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  fn encoded(code: u8, operands: &Operands, body_sizes: &[usize]) -> Vec<u8> {
    let mut out = vec![];
    encode(code, operands, body_sizes, &mut out).unwrap();
    out
  }

  #[test]
  fn push_values_layout() {
    let operands = Operands::Push {
      values: vec![
        PushValue::Str("hi".to_string()),
        PushValue::Bool(true),
        PushValue::Double(1.0),
        PushValue::Constant16(0x0102),
      ]
    };
    let bytes = encoded(0x96, &operands, &[]);
    assert_eq!(
      bytes,
      vec![
        0, b'h', b'i', 0,
        5, 1,
        6, 0x00, 0x00, 0xF0, 0x3F, 0, 0, 0, 0,
        9, 0x02, 0x01
      ]
    );
    assert_eq!(decode(OperandLayout::Push, &bytes).unwrap(), DecodedOperands::plain(operands));
  }

  #[test]
  fn branch_displacement_is_signed() {
    let decoded = decode(OperandLayout::Branch, &[0xFB, 0xFF]).unwrap();
    assert_eq!(decoded.displacement, Some(-5));
  }

  #[test]
  fn malformed_operands_give_a_reason() {
    assert_eq!(decode(OperandLayout::GotoFrame, &[1, 2, 3]), Err(OperandError::LengthMismatch));
    assert_eq!(decode(OperandLayout::SetTarget, b"abc"), Err(OperandError::UnterminatedString));
    assert_eq!(decode(OperandLayout::SetTarget, &[0xFF, 0]), Err(OperandError::InvalidUtf8));
    assert_eq!(decode(OperandLayout::Push, &[5, 2]), Err(OperandError::InvalidBoolean));
    assert_eq!(decode(OperandLayout::Push, &[12]), Err(OperandError::UnknownPushType));
    assert_eq!(
      OperandError::InvalidBoolean.to_string(),
      "boolean is neither 0 nor 1"
    );
  }

  #[test]
  fn try_header() {
    let bytes = [0x07, 3, 0, 2, 0, 0, 0, 1];
    let decoded = decode(OperandLayout::Try, &bytes).unwrap();
    assert_eq!(decoded.body_sizes, vec![3, 2, 0]);
    match &decoded.operands {
      Operands::Try(block) => {
        assert!(block.catch_block);
        assert!(block.finally_block);
        assert_eq!(block.catch_target, CatchTarget::Register(1));
      }
      other => panic!("unexpected operands {:?}", other)
    }
    assert_eq!(encoded(0x8F, &decoded.operands, &[3, 2, 0]), bytes.to_vec());
  }

  #[test]
  fn goto_frame2_keeps_reserved_bits() {
    let bytes = [0b1010_0011, 0x05, 0x00];
    let decoded = decode(OperandLayout::GotoFrame2, &bytes).unwrap();
    assert_eq!(
      decoded.operands,
      Operands::GotoFrame2 { play: true, reserved: 0b10_1000, scene_bias: Some(5) }
    );
    assert_eq!(encoded(0x9F, &decoded.operands, &[]), bytes.to_vec());
  }

  #[test]
  fn overflowing_fields() {
    let operands = Operands::GotoFrame2 { play: false, reserved: 0x40, scene_bias: None };
    let mut out = vec![];
    assert!(matches!(
      encode(0x9F, &operands, &[], &mut out),
      Err(CodecError::EncodeOverflow { max: 0x3F, .. })
    ));

    let with = Operands::With { body: InstructionSequence::new() };
    assert_eq!(
      encode(0x94, &with, &[70_000], &mut out),
      Err(CodecError::EncodeOverflow { code: 0x94, field: "body size", value: 70_000, max: 65_535 })
    );

    let label = Operands::GotoLabel { label: "a\0b".to_string() };
    assert_eq!(
      encode(0x8C, &label, &[], &mut out),
      Err(CodecError::MalformedOperands { code: 0x8C, offset: None, reason: OperandError::NulInString })
    );
  }
}
