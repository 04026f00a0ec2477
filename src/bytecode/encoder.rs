/*!
  Serializes an `InstructionSequence` back into an action block.

  Encoding runs bottom-up. Container bodies are encoded first, since they are self-contained and
  their sizes go into the container's header. Every record's size is independent of any branch
  displacement (the displacement field is always two bytes), so branches are written with a zero
  displacement and patched once the start offset of every record in the sequence is known.
*/

use std::convert::TryFrom;

use crate::bytecode::instruction::{Instruction, InstructionSequence, Operands};
use crate::bytecode::opcode::{END_OF_ACTIONS, OPERAND_THRESHOLD};
use crate::error::{CodecError, OperandError, Result};

/// A branch displacement field to fill in once the layout of its sequence is known.
struct Patch {
  field: usize,
  index: usize,
  target: usize,
  code: u8,
}

/// Encodes a top-level block, end marker included.
pub fn encode(sequence: &InstructionSequence) -> Result<Vec<u8>> {
  let mut out = encode_block(sequence, true)?;
  out.push(END_OF_ACTIONS);
  Ok(out)
}

/// Encodes a container body: the same framing, without an end marker.
pub fn encode_body(sequence: &InstructionSequence) -> Result<Vec<u8>> {
  encode_block(sequence, false)
}

fn encode_block(sequence: &InstructionSequence, top_level: bool) -> Result<Vec<u8>> {
  let mut out = vec![];
  let mut starts = Vec::with_capacity(sequence.len() + 1);
  let mut patches = vec![];

  for (index, instruction) in sequence.iter().enumerate() {
    starts.push(out.len());
    encode_instruction(instruction, top_level, &mut out)?;
    if let Operands::Branch { target } = instruction.operands() {
      patches.push(Patch { field: out.len() - 2, index, target: *target, code: instruction.opcode() });
    }
  }
  starts.push(out.len());

  for patch in patches {
    let destination = *starts.get(patch.target).ok_or(CodecError::DanglingBranch {
      code: patch.code,
      index: patch.index,
      target: patch.target,
      len: sequence.len()
    })?;
    let displacement = destination as i64 - starts[patch.index + 1] as i64;
    let displacement = i16::try_from(displacement).map_err(|_| CodecError::EncodeOverflow {
      code: patch.code,
      field: "branch displacement",
      value: displacement,
      max: i16::MAX as i64
    })?;
    out[patch.field..patch.field + 2].copy_from_slice(&displacement.to_le_bytes());
  }

  Ok(out)
}

fn encode_instruction(instruction: &Instruction, top_level: bool, out: &mut Vec<u8>) -> Result<()> {
  let code = instruction.opcode();
  if top_level && code == END_OF_ACTIONS {
    return Err(CodecError::MalformedOperands {
      code,
      offset: instruction.offset(),
      reason: OperandError::EndMarkerInBlock
    });
  }

  let bodies = instruction.operands()
                          .bodies()
                          .into_iter()
                          .map(encode_body)
                          .collect::<Result<Vec<Vec<u8>>>>()?;
  let body_sizes: Vec<usize> = bodies.iter().map(Vec::len).collect();

  let mut field = vec![];
  instruction.encode_operands(&mut field, &body_sizes)?;

  out.push(code);
  if code >= OPERAND_THRESHOLD {
    let length = u16::try_from(field.len()).map_err(|_| CodecError::EncodeOverflow {
      code,
      field: "operand length",
      value: field.len() as i64,
      max: u16::MAX as i64
    })?;
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&field);
  } else if !field.is_empty() {
    return Err(CodecError::MalformedOperands {
      code,
      offset: instruction.offset(),
      reason: OperandError::BelowThreshold
    });
  }

  #[cfg(feature = "trace_codec")]
  tracing::trace!(code, length = field.len(), bodies = bodies.len(), "encoded action record");

  for body in bodies {
    out.extend_from_slice(&body);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::decoder::decode;
  use crate::bytecode::instruction::{CatchTarget, Function, Function2, PushValue, RegisterParam, TryBlock};
  use crate::bytecode::opcode::ActionCode;

  #[test]
  fn empty_sequence_is_the_end_marker() {
    assert_eq!(encode(&InstructionSequence::new()).unwrap(), vec![0x00]);
  }

  #[test]
  fn records_and_displacements() {
    let sequence = InstructionSequence::from(vec![
      Instruction::new(ActionCode::Play),
      Instruction::branch(ActionCode::Jump, 0),
      Instruction::branch(ActionCode::If, 3),
    ]);
    assert_eq!(
      encode(&sequence).unwrap(),
      vec![
        0x06,
        0x99, 0x02, 0x00, 0xFA, 0xFF,
        0x9D, 0x02, 0x00, 0x00, 0x00,
        0x00
      ]
    );
  }

  #[test]
  fn call_carries_a_zero_length() {
    let sequence = InstructionSequence::from(vec![Instruction::new(ActionCode::Call)]);
    assert_eq!(encode(&sequence).unwrap(), vec![0x9E, 0x00, 0x00, 0x00]);
  }

  #[test]
  fn branch_follows_its_target_through_an_insert() {
    let mut sequence = InstructionSequence::from(vec![
      Instruction::branch(ActionCode::Jump, 2),
      Instruction::new(ActionCode::Play),
      Instruction::new(ActionCode::Stop),
    ]);
    assert_eq!(&encode(&sequence).unwrap()[3..5], &[0x01, 0x00]);

    sequence.insert(2, Instruction::push(vec![PushValue::Int(7)]));
    let bytes = encode(&sequence).unwrap();
    // play (1) + push (3 + 5)
    assert_eq!(&bytes[3..5], &[0x09, 0x00]);

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded[0].branch_target(), Some(3));
    assert_eq!(decoded[3].opcode(), ActionCode::Stop.code());
  }

  #[test]
  fn container_sizes_are_computed() {
    let function = Function {
      name: String::new(),
      params: vec![],
      body: InstructionSequence::from(vec![
        Instruction::push(vec![PushValue::Int(1)]),
        Instruction::new(ActionCode::Return),
      ])
    };
    let sequence = InstructionSequence::from(vec![
      Instruction::with_operands(ActionCode::DefineFunction, Operands::DefineFunction(Box::new(function))),
    ]);
    let bytes = encode(&sequence).unwrap();
    assert_eq!(
      bytes,
      vec![
        0x9B, 0x05, 0x00, 0x00, 0x00, 0x00, 0x09, 0x00,
        0x96, 0x05, 0x00, 0x07, 0x01, 0x00, 0x00, 0x00,
        0x3E,
        0x00
      ]
    );
    assert_eq!(decode(&bytes).unwrap(), sequence);
  }

  #[test]
  fn register_function_with_a_loop() {
    let function = Function2 {
      name: "g".to_string(),
      register_count: 3,
      flags: Function2::PRELOAD_THIS | Function2::PRELOAD_ARGUMENTS,
      params: vec![
        RegisterParam { register: 1, name: "x".to_string() },
        RegisterParam { register: 0, name: "y".to_string() },
      ],
      body: InstructionSequence::from(vec![
        Instruction::new(ActionCode::Play),
        Instruction::branch(ActionCode::Jump, 0),
      ])
    };
    let sequence = InstructionSequence::from(vec![
      Instruction::with_operands(ActionCode::DefineFunction2, Operands::DefineFunction2(Box::new(function))),
    ]);
    let bytes = encode(&sequence).unwrap();
    assert_eq!(
      bytes,
      vec![
        0x8E, 0x0F, 0x00,
        b'g', 0x00, 0x02, 0x00, 0x03, 0x05, 0x00,
        0x01, b'x', 0x00, 0x00, b'y', 0x00,
        0x06, 0x00,
        0x06,
        0x99, 0x02, 0x00, 0xFA, 0xFF,
        0x00
      ]
    );
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, sequence);
    match decoded[0].operands() {
      Operands::DefineFunction2(function) => {
        assert!(function.has_flag(Function2::PRELOAD_ARGUMENTS));
        assert_eq!(function.body[1].branch_target(), Some(0));
      }
      other => panic!("unexpected operands {:?}", other)
    }
  }

  #[test]
  fn try_with_all_bodies_and_reserved_bits() {
    let block = TryBlock {
      catch_block: true,
      finally_block: true,
      reserved: 0x11,
      catch_target: CatchTarget::Name("e".to_string()),
      try_body: InstructionSequence::from(vec![
        Instruction::push(vec![PushValue::Bool(true)]),
        Instruction::branch(ActionCode::If, 2),
      ]),
      catch_body: InstructionSequence::from(vec![Instruction::new(ActionCode::Pop)]),
      finally_body: InstructionSequence::from(vec![Instruction::new(ActionCode::Stop)]),
    };
    let sequence = InstructionSequence::from(vec![
      Instruction::with_operands(ActionCode::Try, Operands::Try(Box::new(block))),
      Instruction::branch(ActionCode::Jump, 2),
    ]);
    let bytes = encode(&sequence).unwrap();
    assert_eq!(
      bytes,
      vec![
        0x8F, 0x09, 0x00, 0x8B, 0x0A, 0x00, 0x01, 0x00, 0x01, 0x00, b'e', 0x00,
        0x96, 0x02, 0x00, 0x05, 0x01,
        0x9D, 0x02, 0x00, 0x00, 0x00,
        0x17,
        0x07,
        0x99, 0x02, 0x00, 0x00, 0x00,
        0x00
      ]
    );
    assert_eq!(decode(&bytes).unwrap(), sequence);
  }

  #[test]
  fn special_floats_round_trip() {
    let sequence = InstructionSequence::from(vec![
      Instruction::push(vec![
        PushValue::Double(f64::NAN),
        PushValue::Double(-0.0),
        PushValue::Float(f32::NAN),
        PushValue::Float(-0.0),
        PushValue::Double(f64::NEG_INFINITY),
      ]),
    ]);
    let bytes = encode(&sequence).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, sequence);
    assert_eq!(encode(&decoded).unwrap(), bytes);

    let positive = InstructionSequence::from(vec![Instruction::push(vec![PushValue::Double(0.0)])]);
    let negative = InstructionSequence::from(vec![Instruction::push(vec![PushValue::Double(-0.0)])]);
    assert_ne!(encode(&positive).unwrap(), encode(&negative).unwrap());
    assert_ne!(decode(&encode(&positive).unwrap()).unwrap(), negative);
  }

  #[test]
  fn dangling_branch() {
    let sequence = InstructionSequence::from(vec![Instruction::branch(ActionCode::Jump, 5)]);
    assert_eq!(
      encode(&sequence),
      Err(CodecError::DanglingBranch { code: 0x99, index: 0, target: 5, len: 1 })
    );
  }

  #[test]
  fn displacement_out_of_range() {
    let sequence = InstructionSequence::from(vec![
      Instruction::branch(ActionCode::Jump, 2),
      Instruction::push(vec![PushValue::Str("x".repeat(40_000))]),
    ]);
    assert!(matches!(
      encode(&sequence),
      Err(CodecError::EncodeOverflow { field: "branch displacement", .. })
    ));
  }

  #[test]
  fn operand_field_out_of_range() {
    let sequence = InstructionSequence::from(vec![
      Instruction::push(vec![PushValue::Str("x".repeat(70_000))]),
    ]);
    assert_eq!(
      encode(&sequence),
      Err(CodecError::EncodeOverflow { code: 0x96, field: "operand length", value: 70_002, max: 65_535 })
    );
  }

  #[test]
  fn end_marker_is_not_an_instruction() {
    let sequence = InstructionSequence::from(vec![Instruction::opaque(0x00, vec![])]);
    assert!(matches!(encode(&sequence), Err(CodecError::MalformedOperands { code: 0, .. })));
  }

  #[test]
  fn opaque_bytes_are_reproduced() {
    let bytes = [0x06, 0xA5, 0x03, 0x00, 0x01, 0x02, 0x03, 0x5F, 0x00];
    let sequence = decode(&bytes).unwrap();
    assert_eq!(encode(&sequence).unwrap(), bytes.to_vec());
  }
}
