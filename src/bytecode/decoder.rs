/*!
  Turns an action block into an `InstructionSequence`.

  Decoding is a framing pass followed by a resolution pass, per sequence:

  1. Framing reads one record at a time: `[opcode:8]` for opcodes below the operand threshold,
     `[opcode:8][length:16][operands:length]` otherwise. The start offset of every record goes
     into a jump target table. Container records are followed by their bodies, which are framed
     recursively as sequences of their own. A top-level block ends at the zero opcode; a body
     ends at its declared size.
  2. Resolution turns each branch displacement into the index of the record it lands on. The
     end of the sequence is a valid target.

  Unknown opcodes and operands that do not parse keep their raw bytes and are recorded as
  diagnostics; decoding carries on past them.
*/

use std::collections::HashMap;
use std::convert::TryFrom;

use nom::{bytes::complete::take, number::complete::le_u16, IResult};

use crate::bytecode::instruction::{Instruction, InstructionSequence, Operands};
use crate::bytecode::opcode::{self, OpcodeTable, END_OF_ACTIONS, OPERAND_THRESHOLD};
use crate::error::{CodecError, Result};

/// Container bodies nested deeper than this are rejected.
pub const MAX_NESTING: usize = 256;

/// A branch waiting for the jump target table of its sequence to be complete.
struct PendingBranch {
  index: usize,
  offset: usize,
  end: usize,
  code: u8,
  displacement: i16,
}

pub struct Decoder<'t> {
  table: &'t OpcodeTable,
  diagnostics: Vec<CodecError>,
  depth: usize,
}

impl Decoder<'static> {
  /// A decoder over the process-wide opcode table.
  pub fn new() -> Decoder<'static> {
    Decoder::with_table(opcode::table())
  }
}

impl Default for Decoder<'static> {
  fn default() -> Decoder<'static> {
    Decoder::new()
  }
}

impl<'t> Decoder<'t> {
  pub fn with_table(table: &'t OpcodeTable) -> Decoder<'t> {
    Decoder { table, diagnostics: vec![], depth: 0 }
  }

  /// Recoverable problems met so far, oldest first.
  pub fn diagnostics(&self) -> &[CodecError] {
    &self.diagnostics
  }

  pub fn take_diagnostics(&mut self) -> Vec<CodecError> {
    std::mem::take(&mut self.diagnostics)
  }

  /// Decodes a top-level block, which must contain its end marker.
  pub fn decode(&mut self, bytes: &[u8]) -> Result<InstructionSequence> {
    self.depth = 0;
    let (sequence, consumed) = self.decode_block(bytes, 0, true)?;
    if consumed < bytes.len() {
      tracing::debug!(
        trailing = bytes.len() - consumed,
        "ignoring bytes after the end of the action block"
      );
    }
    Ok(sequence)
  }

  fn report(&mut self, diagnostic: CodecError) {
    tracing::warn!(%diagnostic, "keeping raw operand bytes");
    self.diagnostics.push(diagnostic);
  }

  /**
    Frames `bytes`, whose first byte sits at absolute offset `base`. Returns the sequence and the
    number of bytes consumed, end marker included.
  */
  fn decode_block(
    &mut self,
    bytes: &[u8],
    base: usize,
    terminated: bool
  ) -> Result<(InstructionSequence, usize)> {
    let table = self.table;
    let mut instructions: Vec<Instruction> = vec![];
    let mut jump_targets: HashMap<usize, usize> = HashMap::new();
    let mut branches: Vec<PendingBranch> = vec![];
    let mut position = 0;

    let end = loop {
      if position == bytes.len() {
        if terminated {
          return Err(CodecError::TruncatedStream {
            offset: base + position,
            code: None,
            needed: 1,
            available: 0
          });
        }
        break base + position;
      }

      let offset = base + position;
      let code = bytes[position];
      position += 1;
      if terminated && code == END_OF_ACTIONS {
        break offset;
      }

      let operand_bytes = if code >= OPERAND_THRESHOLD {
        let remaining = &bytes[position..];
        let header: IResult<&[u8], u16> = le_u16(remaining);
        let (after_header, length) = header.map_err(|_| CodecError::TruncatedStream {
          offset,
          code: Some(code),
          needed: 2,
          available: remaining.len()
        })?;
        let field: IResult<&[u8], &[u8]> = take(length)(after_header);
        let (_, operand_bytes) = field.map_err(|_| CodecError::TruncatedStream {
          offset,
          code: Some(code),
          needed: length as usize,
          available: after_header.len()
        })?;
        position += 2 + operand_bytes.len();
        operand_bytes
      } else {
        &[][..]
      };

      #[cfg(feature = "trace_codec")]
      tracing::trace!(offset, code, length = operand_bytes.len(), "framed action record");

      let index = instructions.len();
      jump_targets.insert(offset, index);

      let mut body_sizes = vec![];
      let instruction = match table.lookup(code) {
        Ok(descriptor) => match Instruction::decode_operands(operand_bytes, descriptor) {
          Ok(decoded) => {
            if let Some(displacement) = decoded.displacement {
              branches.push(PendingBranch { index, offset, end: base + position, code, displacement });
            }
            body_sizes = decoded.body_sizes;
            Instruction::decoded(code, Some(descriptor.clone()), offset, decoded.operands)
          }
          Err(reason) => {
            self.report(CodecError::MalformedOperands { code, offset: Some(offset), reason });
            let raw = Operands::Raw { bytes: operand_bytes.to_vec() };
            Instruction::decoded(code, Some(descriptor.clone()), offset, raw)
          }
        },
        Err(_) => {
          self.report(CodecError::UnknownOpcode { code, offset: Some(offset) });
          Instruction::decoded(code, None, offset, Operands::Raw { bytes: operand_bytes.to_vec() })
        }
      };

      let mut instruction = instruction;
      if !body_sizes.is_empty() {
        let bodies = self.decode_bodies(bytes, base, &mut position, offset, code, &body_sizes)?;
        for (slot, body) in instruction.operands_mut().bodies_mut().into_iter().zip(bodies) {
          *slot = body;
        }
      }
      instructions.push(instruction);
    };

    jump_targets.insert(end, instructions.len());
    for branch in branches {
      let target = branch.end as isize + branch.displacement as isize;
      let index = usize::try_from(target).ok().and_then(|target| jump_targets.get(&target));
      match index {
        Some(&index) => instructions[branch.index].set_branch_target(index),
        None => {
          return Err(CodecError::InvalidBranchTarget {
            offset: branch.offset,
            code: branch.code,
            target
          });
        }
      }
    }

    Ok((InstructionSequence::from(instructions), position))
  }

  /// Frames the bodies that follow a container record, advancing `position` past them.
  fn decode_bodies(
    &mut self,
    bytes: &[u8],
    base: usize,
    position: &mut usize,
    offset: usize,
    code: u8,
    body_sizes: &[usize]
  ) -> Result<Vec<InstructionSequence>> {
    if self.depth >= MAX_NESTING {
      return Err(CodecError::NestingTooDeep { offset, code, depth: self.depth + 1 });
    }

    self.depth += 1;
    let mut bodies = Vec::with_capacity(body_sizes.len());
    let mut result = Ok(());
    for &size in body_sizes {
      let available = bytes.len() - *position;
      if size > available {
        result = Err(CodecError::TruncatedStream { offset, code: Some(code), needed: size, available });
        break;
      }
      let body = &bytes[*position..*position + size];
      match self.decode_block(body, base + *position, false) {
        Ok((sequence, _)) => bodies.push(sequence),
        Err(error) => {
          result = Err(error);
          break;
        }
      }
      *position += size;
    }
    self.depth -= 1;
    result.map(|_| bodies)
  }
}

/// Decodes a top-level block with the process-wide opcode table.
pub fn decode(bytes: &[u8]) -> Result<InstructionSequence> {
  Decoder::new().decode(bytes)
}
