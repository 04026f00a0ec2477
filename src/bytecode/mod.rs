/*!

  Legacy ActionScript action blocks are byte streams of action records. A record is a single
  opcode byte when the opcode is below 0x80. From 0x80 up, the opcode is followed by a 16 bit
  little-endian length and that many operand bytes. A top-level block ends with a zero byte.

    Opcode:           8 bits
    Operand length:  16 bits (opcodes >= 0x80 only)
    Branch offset:   16 bits, signed, relative to the end of the branch record

  Function definitions, `with` and `try` are containers. Their headers give the byte sizes of
  one or more bodies, which immediately follow the record and use the same framing without an
  end marker.

  Decoded, a block is an `InstructionSequence` that owns its instructions, and a container's
  operands own its bodies. Branch targets are held as indices into the branch's own sequence
  rather than byte offsets, so a sequence can be edited and re-encoded without tracking layout.
  The opcode is not a Rust enum over the whole instruction: the opcode table is data, so custom
  opcodes can be registered, and anything the table does not know survives a round trip as raw
  bytes.

*/

mod decoder;
mod disassembly;
mod encoder;
mod instruction;
pub mod opcode;
mod operands;

pub use decoder::{decode, Decoder, MAX_NESTING};
pub use disassembly::{disassemble, listing, Disassembly};
pub use encoder::{encode, encode_body};
pub use instruction::{
  CatchTarget, Function, Function2, Instruction, InstructionSequence, Operands, PushValue,
  RegisterParam, TryBlock
};
pub use opcode::{
  lookup, lookup_by_mnemonic, register, ActionCode, Descriptor, OpcodeTable, OperandLayout,
  END_OF_ACTIONS, OPERAND_THRESHOLD
};
pub use operands::DecodedOperands;
